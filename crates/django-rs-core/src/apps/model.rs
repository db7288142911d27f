//! Model types as seen by the app registry.
//!
//! The registry does not care about fields or tables. It only needs to know
//! which app a model belongs to, its name, where it was defined and the three
//! flags that [`get_models`](super::AppRegistry::get_models) filters on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// Registry-level description of one model type.
///
/// # Examples
///
/// ```
/// use django_rs_core::apps::ModelType;
///
/// let article = ModelType::new("blog", "Article")
///     .with_module("blog.models", "src/blog/models.rs");
/// assert_eq!(article.model_name(), "article");
/// assert_eq!(article.label(), "blog.Article");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelType {
    app_label: String,
    object_name: String,
    model_name: String,
    module: String,
    source_file: PathBuf,
    auto_created: bool,
    deferred: bool,
    swapped: Option<String>,
}

/// Shared handle to a registered model type. Identity is [`Arc::ptr_eq`].
pub type ModelRef = Arc<ModelType>;

impl ModelType {
    /// Creates a model type named `object_name` in app `app_label`.
    ///
    /// The module defaults to `"<app_label>.models"` and the source file to
    /// `<app_label>/models.rs`.
    pub fn new(app_label: impl Into<String>, object_name: impl Into<String>) -> Self {
        let app_label = app_label.into();
        let object_name = object_name.into();
        Self {
            model_name: object_name.to_lowercase(),
            module: format!("{app_label}.models"),
            source_file: Path::new(&app_label).join("models.rs"),
            app_label,
            object_name,
            auto_created: false,
            deferred: false,
            swapped: None,
        }
    }

    /// Sets the defining module and its source file.
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>, source_file: impl Into<PathBuf>) -> Self {
        self.module = module.into();
        self.source_file = source_file.into();
        self
    }

    /// Marks the model as created automatically (e.g. an implicit m2m table).
    #[must_use]
    pub const fn auto_created(mut self, auto_created: bool) -> Self {
        self.auto_created = auto_created;
        self
    }

    /// Marks the model as a deferred-loading proxy class.
    #[must_use]
    pub const fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    /// Marks the model as swapped out in favour of `replacement`
    /// (an `"app_label.Model"` string).
    #[must_use]
    pub fn swapped_for(mut self, replacement: impl Into<String>) -> Self {
        self.swapped = Some(replacement.into());
        self
    }

    /// Wraps the model type in a [`ModelRef`].
    pub fn into_ref(self) -> ModelRef {
        Arc::new(self)
    }

    pub fn app_label(&self) -> &str {
        &self.app_label
    }

    /// The class name as written, e.g. `"Article"`.
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// The lowercased name used as registry key.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Dotted name of the module that defines this model.
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub const fn is_auto_created(&self) -> bool {
        self.auto_created
    }

    pub const fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// The replacement model label if this model has been swapped out.
    pub fn swapped(&self) -> Option<&str> {
        self.swapped.as_deref()
    }

    /// Returns `"app_label.ObjectName"`.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.object_name)
    }

    /// Returns `true` if both types were defined in the same source file,
    /// ignoring the file extension.
    ///
    /// The same model reached through two import paths must not count as a
    /// conflicting registration. Relative paths are resolved against the
    /// current directory; symlinks are not followed.
    pub fn same_source_as(&self, other: &Self) -> bool {
        source_stem(&self.source_file) == source_stem(&other.source_file)
    }
}

fn source_stem(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };
    absolute.with_extension("")
}

/// Insertion-ordered mapping of lowercase model name to model type.
#[derive(Debug, Default, Clone)]
pub struct ModelMap {
    models: Vec<ModelRef>,
    index: HashMap<String, usize>,
}

impl ModelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks a model up by name, case-insensitively.
    pub fn get(&self, model_name: &str) -> Option<&ModelRef> {
        self.index
            .get(&model_name.to_lowercase())
            .map(|&idx| &self.models[idx])
    }

    pub fn contains(&self, model_name: &str) -> bool {
        self.get(model_name).is_some()
    }

    /// Inserts `model` under its model name unless the name is taken.
    ///
    /// Returns the already registered model on collision; the map is left
    /// unchanged in that case.
    pub fn insert(&mut self, model: ModelRef) -> Result<(), ModelRef> {
        if let Some(&idx) = self.index.get(model.model_name()) {
            return Err(Arc::clone(&self.models[idx]));
        }
        self.index
            .insert(model.model_name().to_string(), self.models.len());
        self.models.push(model);
        Ok(())
    }

    /// Iterates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelRef> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Returns the models in registration order.
    pub fn to_vec(&self) -> Vec<ModelRef> {
        self.models.clone()
    }
}

/// A [`ModelMap`] shared between `all_models[label]` and the installed
/// [`AppConfig`](super::AppConfig) for that label.
pub type SharedModels = Arc<RwLock<ModelMap>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_is_lowercased() {
        let model = ModelType::new("shop", "OrderLine");
        assert_eq!(model.object_name(), "OrderLine");
        assert_eq!(model.model_name(), "orderline");
        assert_eq!(model.module(), "shop.models");
        assert_eq!(model.label(), "shop.OrderLine");
    }

    #[test]
    fn test_flags_default_off() {
        let model = ModelType::new("shop", "Order");
        assert!(!model.is_auto_created());
        assert!(!model.is_deferred());
        assert!(model.swapped().is_none());

        let model = model.auto_created(true).deferred(true).swapped_for("custom.Order");
        assert!(model.is_auto_created());
        assert!(model.is_deferred());
        assert_eq!(model.swapped(), Some("custom.Order"));
    }

    #[test]
    fn test_same_source_ignores_extension() {
        let a = ModelType::new("blog", "Post").with_module("blog.models", "/srv/blog/models.py");
        let b = ModelType::new("blog", "Post")
            .with_module("project.blog.models", "/srv/blog/models.pyc");
        let c = ModelType::new("blog", "Post").with_module("other.models", "/srv/other/models.py");
        assert!(a.same_source_as(&b));
        assert!(!a.same_source_as(&c));
    }

    #[test]
    fn test_same_source_resolves_relative_paths() {
        let cwd = std::env::current_dir().unwrap();
        let a = ModelType::new("blog", "Post").with_module("blog.models", "blog/models.rs");
        let b = ModelType::new("blog", "Post")
            .with_module("blog.models", cwd.join("blog").join("models.o"));
        assert!(a.same_source_as(&b));
    }

    #[test]
    fn test_model_map_first_insert_wins() {
        let mut map = ModelMap::new();
        let first = ModelType::new("blog", "Post").into_ref();
        let second = ModelType::new("blog", "POST").into_ref();

        assert!(map.insert(Arc::clone(&first)).is_ok());
        let existing = map.insert(second).unwrap_err();
        assert!(Arc::ptr_eq(&existing, &first));
        assert_eq!(map.len(), 1);
        assert!(Arc::ptr_eq(map.get("Post").unwrap(), &first));
    }

    #[test]
    fn test_model_map_keeps_order() {
        let mut map = ModelMap::new();
        for name in ["Zebra", "Apple", "Mango"] {
            map.insert(ModelType::new("zoo", name).into_ref()).unwrap();
        }
        let names: Vec<_> = map.iter().map(|m| m.object_name().to_string()).collect();
        assert_eq!(names, vec!["Zebra", "Apple", "Mango"]);
        assert!(map.contains("mango"));
        assert!(!map.is_empty());
    }
}
