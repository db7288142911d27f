//! Settings loading from configuration files.
//!
//! This module loads [`Settings`] from TOML or JSON files and applies
//! environment variable overrides on top.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `DJANGO_DEBUG` | `debug` |
//! | `DJANGO_LOG_LEVEL` | `log_level` |
//! | `DJANGO_INSTALLED_APPS` | `installed_apps` (comma-separated, order kept) |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use django_rs_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/settings.toml").unwrap();
//! println!("{} apps installed", settings.installed_apps.len());
//! ```

use std::path::Path;

use crate::error::DjangoError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, DjangoError> {
    // Merging through serde_json keeps defaults for absent keys.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| DjangoError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, DjangoError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, DjangoError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, DjangoError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| DjangoError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, DjangoError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, DjangoError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies environment variable overrides to a settings struct.
///
/// - `DJANGO_DEBUG` -> `debug` ("true"/"1"/"yes" => true, anything else => false)
/// - `DJANGO_LOG_LEVEL` -> `log_level`
/// - `DJANGO_INSTALLED_APPS` -> `installed_apps` (comma-separated)
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("DJANGO_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("DJANGO_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("DJANGO_INSTALLED_APPS") {
        settings.installed_apps = split_list(&val);
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, DjangoError> {
    std::fs::read_to_string(path).map_err(|e| {
        DjangoError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, DjangoError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        DjangoError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        DjangoError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── TOML loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_str_installed_apps_keep_order() {
        let toml = r#"
            installed_apps = ["django_rs.contrib.auth", "blog", "shop.orders"]
            debug = false
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(
            settings.installed_apps,
            vec!["django_rs.contrib.auth", "blog", "shop.orders"]
        );
        assert!(!settings.debug);
        // Defaults preserved
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_from_toml_str_extra_table() {
        let toml = r#"
            [extra]
            site_name = "example"
            retries = 3
        "#;

        let settings = from_toml_str(toml).unwrap();
        assert_eq!(settings.extra["site_name"], "example");
        assert_eq!(settings.extra["retries"], 3);
    }

    #[test]
    fn test_from_toml_str_empty() {
        let settings = from_toml_str("").unwrap();
        assert!(settings.debug);
        assert!(settings.installed_apps.is_empty());
    }

    #[test]
    fn test_from_toml_str_invalid() {
        let result = from_toml_str("[[invalid toml content");
        assert!(matches!(result, Err(DjangoError::ConfigurationError(_))));
    }

    #[test]
    fn test_from_toml_str_wrong_type() {
        let result = from_toml_str("installed_apps = 42");
        assert!(result.is_err());
    }

    // ── JSON loading ────────────────────────────────────────────────

    #[test]
    fn test_from_json_str_basic() {
        let json = r#"{
            "installed_apps": ["blog"],
            "log_level": "debug"
        }"#;

        let settings = from_json_str(json).unwrap();
        assert_eq!(settings.installed_apps, vec!["blog"]);
        assert_eq!(settings.log_level, "debug");
        assert!(settings.debug);
    }

    #[test]
    fn test_from_json_str_invalid() {
        assert!(from_json_str("{invalid json").is_err());
    }

    // ── File loading ────────────────────────────────────────────────

    #[test]
    fn test_from_toml_file() {
        let dir = std::env::temp_dir().join("django_rs_apps_test_toml");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test_settings.toml");
        std::fs::write(&path, "installed_apps = [\"a\", \"b\"]\n").unwrap();

        let settings = from_toml_file(&path).unwrap();
        assert_eq!(settings.installed_apps, vec!["a", "b"]);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_from_json_file() {
        let dir = std::env::temp_dir().join("django_rs_apps_test_json");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test_settings.json");
        std::fs::write(&path, r#"{"installed_apps": ["x"], "debug": false}"#).unwrap();

        let settings = from_json_file(&path).unwrap();
        assert_eq!(settings.installed_apps, vec!["x"]);
        assert!(!settings.debug);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_from_file_missing() {
        assert!(from_toml_file("/nonexistent/path/settings.toml").is_err());
        assert!(from_json_file("/nonexistent/path/settings.json").is_err());
    }

    // ── Environment variable overrides ──────────────────────────────

    // A single test owns the DJANGO_* variables so parallel tests never race.
    #[test]
    fn test_env_overrides() {
        std::env::set_var("DJANGO_DEBUG", "false");
        std::env::set_var("DJANGO_LOG_LEVEL", "debug");
        std::env::set_var("DJANGO_INSTALLED_APPS", "auth, blog ,, shop");

        let settings = from_env();
        assert!(!settings.debug);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.installed_apps, vec!["auth", "blog", "shop"]);

        std::env::set_var("DJANGO_DEBUG", "1");
        let mut settings = Settings::default();
        settings.debug = false;
        apply_env_overrides(&mut settings);
        assert!(settings.debug);

        std::env::remove_var("DJANGO_DEBUG");
        std::env::remove_var("DJANGO_LOG_LEVEL");
        std::env::remove_var("DJANGO_INSTALLED_APPS");
    }

    // ── merge_json helper ───────────────────────────────────────────

    #[test]
    fn test_merge_json_nested() {
        let base = serde_json::json!({"outer": {"a": 1, "b": 2}});
        let over = serde_json::json!({"outer": {"b": 3}});
        let merged = merge_json(base, over);
        assert_eq!(merged["outer"]["a"], 1);
        assert_eq!(merged["outer"]["b"], 3);
    }

    #[test]
    fn test_merge_json_array_override() {
        let base = serde_json::json!({"list": [1, 2, 3]});
        let over = serde_json::json!({"list": [4, 5]});
        let merged = merge_json(base, over);
        // Arrays are replaced, not merged
        assert_eq!(merged["list"], serde_json::json!([4, 5]));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a ,b,, c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }
}
