//! Operations waiting for a model that has not been registered yet.
//!
//! Relations are often declared by name (`"auth.User"`) before the target
//! model exists. Such operations are queued here, keyed by
//! `(app_label, model_name)`, and run by the registry as soon as the target
//! is registered.

use std::collections::BTreeMap;

use super::model::ModelRef;
use crate::error::{DjangoError, DjangoResult};

/// Callback run once with the model it was waiting for.
pub type ModelOperation = Box<dyn FnOnce(&ModelRef) + Send>;

/// Where a relation string points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget {
    /// `"self"`: the model declaring the relation.
    Itself,
    /// Another model, as `(app_label, lowercase model_name)`.
    Model(String, String),
}

/// Parses a relation reference relative to the declaring model's app.
///
/// Accepts `"self"`, `"Model"` (same app) and `"app_label.Model"`.
///
/// # Examples
///
/// ```
/// use django_rs_core::apps::{resolve_relation, RelationTarget};
///
/// assert_eq!(resolve_relation("blog", "self").unwrap(), RelationTarget::Itself);
/// assert_eq!(
///     resolve_relation("blog", "auth.User").unwrap(),
///     RelationTarget::Model("auth".into(), "user".into()),
/// );
/// ```
pub fn resolve_relation(origin_app_label: &str, relation: &str) -> DjangoResult<RelationTarget> {
    if relation == "self" {
        return Ok(RelationTarget::Itself);
    }
    let (app_label, model_name) = match relation.split_once('.') {
        Some((app_label, model_name)) => (app_label, model_name),
        None => (origin_app_label, relation),
    };
    if app_label.is_empty() || model_name.is_empty() || model_name.contains('.') {
        return Err(DjangoError::LookupError(format!(
            "Invalid model reference '{relation}'. String model references must be of the form 'app_label.ModelName'."
        )));
    }
    Ok(RelationTarget::Model(
        app_label.to_string(),
        model_name.to_lowercase(),
    ))
}

#[derive(Default)]
pub(crate) struct PendingOperations {
    waiting: BTreeMap<(String, String), Vec<ModelOperation>>,
}

impl PendingOperations {
    pub(crate) fn push(&mut self, app_label: &str, model_name: &str, op: ModelOperation) {
        self.waiting
            .entry((app_label.to_string(), model_name.to_lowercase()))
            .or_default()
            .push(op);
    }

    /// Removes and returns the operations waiting for this model.
    pub(crate) fn take(&mut self, app_label: &str, model_name: &str) -> Vec<ModelOperation> {
        self.waiting
            .remove(&(app_label.to_string(), model_name.to_lowercase()))
            .unwrap_or_default()
    }

    pub(crate) fn keys(&self) -> Vec<(String, String)> {
        self.waiting.keys().cloned().collect()
    }
}
