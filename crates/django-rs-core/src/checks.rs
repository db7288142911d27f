//! System checks run against a populated app registry.
//!
//! A check is a plain function from [`AppRegistry`] to a list of
//! [`CheckMessage`]s. Checks are grouped in a [`CheckRegistry`] under tags
//! and can be run all at once or filtered by tag.
//!
//! Built-in checks (tag `"apps"`):
//!
//! - `apps.E001`: lazy model operations still wait for a model that was
//!   never registered.
//! - `apps.W001`: an installed app's label is not a valid identifier.
//!
//! ## Examples
//!
//! ```
//! use django_rs_core::apps::AppRegistry;
//! use django_rs_core::checks::{CheckMessage, CheckRegistry};
//!
//! let mut checks = CheckRegistry::new();
//! checks.register(
//!     |apps| {
//!         if apps.models_ready() {
//!             Vec::new()
//!         } else {
//!             vec![CheckMessage::warning("myapp.W001", "Registry not ready")]
//!         }
//!     },
//!     &["myapp"],
//! );
//!
//! let messages = checks.run_checks(None, &AppRegistry::new());
//! assert!(messages.is_empty());
//! ```

use std::fmt;

use crate::apps::AppRegistry;

/// Severity level for a check message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

/// A diagnostic produced by a system check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckMessage {
    pub level: CheckLevel,
    /// Stable identifier, e.g. `"apps.E001"`.
    pub id: String,
    pub msg: String,
    /// How to fix the problem.
    pub hint: Option<String>,
    /// The app, model or setting the message is about.
    pub obj: Option<String>,
}

impl CheckMessage {
    pub fn new(level: CheckLevel, id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
            msg: msg.into(),
            hint: None,
            obj: None,
        }
    }

    pub fn warning(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(CheckLevel::Warning, id, msg)
    }

    pub fn error(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(CheckLevel::Error, id, msg)
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn with_obj(mut self, obj: impl Into<String>) -> Self {
        self.obj = Some(obj.into());
        self
    }

    /// Returns `true` for warnings and above.
    pub fn is_serious(&self) -> bool {
        self.level >= CheckLevel::Warning
    }
}

impl fmt::Display for CheckMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(obj) = &self.obj {
            write!(f, "{obj}: ")?;
        }
        write!(f, "({}) {}: {}", self.id, self.level, self.msg)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n\tHINT: {hint}")?;
        }
        Ok(())
    }
}

/// A check function run against the app registry.
pub type CheckFn = fn(&AppRegistry) -> Vec<CheckMessage>;

struct RegisteredCheck {
    func: CheckFn,
    tags: Vec<String>,
}

/// Tagged collection of check functions.
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<RegisteredCheck>,
}

impl CheckRegistry {
    pub const fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// A registry holding the built-in `"apps"` checks.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(check_pending_operations, &["apps"]);
        registry.register(check_app_labels, &["apps"]);
        registry
    }

    pub fn register(&mut self, func: CheckFn, tags: &[&str]) {
        self.checks.push(RegisteredCheck {
            func,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        });
    }

    /// Runs every check (or those carrying one of `tags`) and collects the
    /// messages in registration order.
    pub fn run_checks(&self, tags: Option<&[&str]>, apps: &AppRegistry) -> Vec<CheckMessage> {
        let messages: Vec<CheckMessage> = self
            .checks
            .iter()
            .filter(|check| {
                tags.map_or(true, |wanted| {
                    wanted.iter().any(|tag| check.tags.iter().any(|t| t == tag))
                })
            })
            .flat_map(|check| (check.func)(apps))
            .collect();
        let serious = messages.iter().filter(|m| m.is_serious()).count();
        if serious > 0 {
            tracing::warn!("System checks identified {serious} issue(s)");
        }
        messages
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

// ── Built-in checks ─────────────────────────────────────────────────

/// Reports lazy operations whose target model never showed up.
fn check_pending_operations(apps: &AppRegistry) -> Vec<CheckMessage> {
    if !apps.models_ready() {
        return Vec::new();
    }
    apps.pending_operations()
        .into_iter()
        .map(|(app_label, model_name)| {
            CheckMessage::error(
                "apps.E001",
                format!(
                    "A lazy reference to '{app_label}.{model_name}' was never resolved: the model isn't registered."
                ),
            )
            .with_hint(format!(
                "Check that '{app_label}' is installed and defines '{model_name}'."
            ))
            .with_obj(format!("{app_label}.{model_name}"))
        })
        .collect()
}

/// Reports installed apps whose label is not a valid identifier.
fn check_app_labels(apps: &AppRegistry) -> Vec<CheckMessage> {
    let Ok(configs) = apps.get_app_configs(false) else {
        return Vec::new();
    };
    configs
        .iter()
        .filter(|config| !is_identifier(config.label()))
        .map(|config| {
            CheckMessage::warning(
                "apps.W001",
                format!("The app label '{}' isn't a valid identifier.", config.label()),
            )
            .with_hint("Set a label made of letters, digits and underscores.")
            .with_obj(config.name())
        })
        .collect()
}

fn is_identifier(label: &str) -> bool {
    let mut chars = label.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{AppDefinition, StaticLoader};

    #[test]
    fn test_check_level_ordering() {
        assert!(CheckLevel::Debug < CheckLevel::Info);
        assert!(CheckLevel::Warning < CheckLevel::Error);
        assert!(CheckLevel::Error < CheckLevel::Critical);
        assert_eq!(CheckLevel::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_check_message_display() {
        let m = CheckMessage::warning("apps.W001", "Bad label")
            .with_hint("Rename it")
            .with_obj("shop.orders-v2");
        assert_eq!(
            m.to_string(),
            "shop.orders-v2: (apps.W001) WARNING: Bad label\n\tHINT: Rename it"
        );
        assert_eq!(
            CheckMessage::new(CheckLevel::Info, "x.I001", "fine").to_string(),
            "(x.I001) INFO: fine"
        );
    }

    #[test]
    fn test_is_serious() {
        assert!(!CheckMessage::new(CheckLevel::Info, "x", "").is_serious());
        assert!(CheckMessage::warning("x", "").is_serious());
        assert!(CheckMessage::error("x", "").is_serious());
    }

    #[test]
    fn test_tag_filtering() {
        let mut checks = CheckRegistry::new();
        checks.register(|_| vec![CheckMessage::warning("a.W001", "a")], &["a"]);
        checks.register(|_| vec![CheckMessage::warning("b.W001", "b")], &["b", "shared"]);
        let apps = AppRegistry::new();

        assert_eq!(checks.len(), 2);
        assert_eq!(checks.run_checks(None, &apps).len(), 2);
        assert_eq!(checks.run_checks(Some(&["shared"]), &apps)[0].id, "b.W001");
        assert!(checks.run_checks(Some(&["nothing"]), &apps).is_empty());
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("auth"));
        assert!(is_identifier("_private2"));
        assert!(!is_identifier("2fa"));
        assert!(!is_identifier("orders-v2"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_invalid_label_reported() {
        let loader = StaticLoader::new()
            .app("shop.orders", AppDefinition::new())
            .app("legacy", AppDefinition::new().label("legacy-app"));
        let apps = AppRegistry::master(["shop.orders", "legacy"], loader);

        let messages = CheckRegistry::with_builtins().run_checks(Some(&["apps"]), &apps);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "apps.W001");
        assert_eq!(messages[0].obj.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_unresolved_lazy_reference_reported() {
        let apps = AppRegistry::new();
        apps.lazy_model_operation("auth", "Ghost", |_| {});

        let messages = CheckRegistry::with_builtins().run_checks(None, &apps);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "apps.E001");
        assert_eq!(messages[0].level, CheckLevel::Error);
        assert_eq!(messages[0].obj.as_deref(), Some("auth.ghost"));
    }

    #[test]
    fn test_clean_registry_has_no_messages() {
        let apps = AppRegistry::master(["blog"], StaticLoader::new().app("blog", AppDefinition::new()));
        apps.populate_models().unwrap();
        assert!(CheckRegistry::with_builtins().run_checks(None, &apps).is_empty());
    }
}
