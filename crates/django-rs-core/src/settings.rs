//! Settings system for the django-rs framework.
//!
//! This module provides the [`Settings`] struct, which holds framework
//! configuration, and [`LazySettings`], a globally-accessible,
//! lazily-initialized settings instance. The design mirrors Django's
//! `django.conf.settings` with sensible defaults.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// The complete set of framework settings.
///
/// Use [`SETTINGS`] to access the global instance.
///
/// # Examples
///
/// ```
/// use django_rs_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert!(settings.installed_apps.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled.
    pub debug: bool,
    /// Installed application dotted paths, in declaration order.
    pub installed_apps: Vec<String>,
    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,
    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            installed_apps: Vec::new(),
            log_level: "info".to_string(),
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup to set the
/// settings, then use [`get`](LazySettings::get) to access them.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert!(s.installed_apps.is_empty());
        assert_eq!(s.log_level, "info");
        assert!(s.extra.is_empty());
    }

    #[test]
    fn test_lazy_settings_configure_and_get() {
        let lazy = LazySettings::new();
        assert!(!lazy.is_configured());

        let mut settings = Settings::default();
        settings.debug = false;
        settings.installed_apps = vec!["blog".to_string()];

        lazy.configure(settings);
        assert!(lazy.is_configured());
        assert!(!lazy.get().debug);
        assert_eq!(lazy.get().installed_apps, vec!["blog".to_string()]);
    }

    #[test]
    #[should_panic(expected = "already been configured")]
    fn test_lazy_settings_double_configure_panics() {
        let lazy = LazySettings::new();
        lazy.configure(Settings::default());
        lazy.configure(Settings::default());
    }

    #[test]
    #[should_panic(expected = "not been configured")]
    fn test_lazy_settings_get_before_configure_panics() {
        let lazy = LazySettings::new();
        let _ = lazy.get();
    }
}
