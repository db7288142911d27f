//! Temporary registry modifications for tests.
//!
//! Each helper changes the set of installed apps, runs a closure and restores
//! the previous state when the closure returns or panics. All of them clear
//! the `get_models` memo on entry and on exit.

use std::sync::Arc;

use super::config::{default_label, AppConfig};
use super::registry::{AppRegistry, Restore};
use crate::error::DjangoResult;

struct AddedApp {
    config: Arc<AppConfig>,
    made_available: bool,
}

impl AppRegistry {
    /// Runs `f` with `app_name` installed, then uninstalls it again.
    ///
    /// The app and its models are imported on entry. If an app with the same
    /// label is already installed nothing is added or removed. While an
    /// availability restriction is active the app is made available for the
    /// duration of the call.
    ///
    /// # Examples
    ///
    /// ```
    /// use django_rs_core::apps::{AppDefinition, AppRegistry, StaticLoader};
    ///
    /// let loader = StaticLoader::new().app("extra", AppDefinition::new());
    /// let registry = AppRegistry::with_loader(loader);
    ///
    /// let seen = registry.with_app("extra", || registry.has_app("extra").is_some()).unwrap();
    /// assert!(seen);
    /// assert!(registry.has_app("extra").is_none());
    /// ```
    pub fn with_app<R>(&self, app_name: &str, f: impl FnOnce() -> R) -> DjangoResult<R> {
        let added = self.add_app(app_name)?;
        let _restore = Restore(Some(move || self.remove_added_app(added)));
        Ok(f())
    }

    /// Runs `f` with the app `app_name` uninstalled, then puts it back at its
    /// original position.
    ///
    /// `app_name` may be the app's full name or its label. Unknown apps are
    /// ignored. The registry is fully populated first, so that nothing inside
    /// `f` populates it without the app.
    pub fn without_app<R>(&self, app_name: &str, f: impl FnOnce() -> R) -> DjangoResult<R> {
        let removed = {
            let _import = self.import_lock.lock();
            self.populate_models()?;
            let mut state = self.state.write();
            let label = state
                .app_configs
                .find_by_name(app_name)
                .map_or_else(|| default_label(app_name).to_string(), |c| c.label().to_string());
            state.models_cache.clear();
            state.app_configs.remove(&label)
        };
        if let Some((_, config)) = &removed {
            tracing::debug!("Temporarily uninstalled app '{}'", config.label());
        }

        let _restore = Restore(Some(move || {
            let mut state = self.state.write();
            if let Some((idx, config)) = removed {
                state.app_configs.insert_at(idx, config);
            }
            state.models_cache.clear();
        }));
        Ok(f())
    }

    /// Runs `f` with no apps installed, then restores them.
    ///
    /// Like [`without_app`](Self::without_app) this populates the registry
    /// before hiding anything.
    pub fn empty<R>(&self, f: impl FnOnce() -> R) -> DjangoResult<R> {
        let saved = {
            let _import = self.import_lock.lock();
            self.populate_models()?;
            let mut state = self.state.write();
            state.models_cache.clear();
            std::mem::take(&mut state.app_configs)
        };

        let _restore = Restore(Some(move || {
            let mut state = self.state.write();
            state.app_configs = saved;
            state.models_cache.clear();
        }));
        Ok(f())
    }

    fn add_app(&self, app_name: &str) -> DjangoResult<Option<AddedApp>> {
        let _import = self.import_lock.lock();
        self.populate_apps()?;
        let config = Arc::new(AppConfig::create(self.loader.import_app(app_name)?));
        if self.state.read().app_configs.contains(config.label()) {
            return Ok(None);
        }
        self.import_app_models(&config)?;

        let mut state = self.state.write();
        if state.app_configs.push(Arc::clone(&config)).is_err() {
            return Ok(None);
        }
        let made_available = state
            .available_apps
            .as_mut()
            .is_some_and(|available| available.insert(config.name().to_string()));
        state.models_cache.clear();
        tracing::debug!("Temporarily installed app '{}'", config.label());
        Ok(Some(AddedApp {
            config,
            made_available,
        }))
    }

    fn remove_added_app(&self, added: Option<AddedApp>) {
        let mut state = self.state.write();
        if let Some(added) = added {
            state.app_configs.remove(added.config.label());
            if added.made_available {
                if let Some(available) = state.available_apps.as_mut() {
                    available.remove(added.config.name());
                }
            }
        }
        state.models_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps::{AppDefinition, ModelType, ModelsQuery, StaticLoader};

    fn registry() -> AppRegistry {
        let models = |label: &'static str| {
            move |registry: &AppRegistry, _: &AppConfig| {
                registry.register_model(label, ModelType::new(label, "Item").into_ref());
                Ok(())
            }
        };
        let loader = StaticLoader::new()
            .app("a", AppDefinition::new().models(models("a")))
            .app("b", AppDefinition::new().models(models("b")))
            .app("c", AppDefinition::new().models(models("c")))
            .app("extra", AppDefinition::new().models(models("extra")));
        AppRegistry::master(["a", "b", "c"], loader)
    }

    fn labels(registry: &AppRegistry) -> Vec<String> {
        registry
            .state
            .read()
            .app_configs
            .iter()
            .map(|c| c.label().to_string())
            .collect()
    }

    #[test]
    fn test_with_app_adds_and_removes() {
        let registry = registry();
        assert_eq!(registry.get_models(&ModelsQuery::new()).unwrap().len(), 3);

        registry
            .with_app("extra", || {
                assert_eq!(labels(&registry), vec!["a", "b", "c", "extra"]);
                assert_eq!(registry.get_models(&ModelsQuery::new()).unwrap().len(), 4);
            })
            .unwrap();

        assert_eq!(labels(&registry), vec!["a", "b", "c"]);
        assert_eq!(registry.get_models(&ModelsQuery::new()).unwrap().len(), 3);
    }

    #[test]
    fn test_with_app_already_installed_is_noop() {
        let registry = registry();
        registry.populate_models().unwrap();
        registry
            .with_app("b", || assert_eq!(labels(&registry).len(), 3))
            .unwrap();
        assert_eq!(labels(&registry), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_with_app_unknown_fails_without_running() {
        let registry = registry();
        registry.populate_apps().unwrap();
        let mut ran = false;
        let result = registry.with_app("ghost", || ran = true);
        assert!(result.is_err());
        assert!(!ran);
    }

    #[test]
    fn test_with_app_extends_available_apps() {
        let registry = registry();
        registry.set_available_apps(["a"]).unwrap();
        registry
            .with_app("extra", || {
                assert_eq!(
                    registry.available_apps(),
                    Some(vec!["a".to_string(), "extra".to_string()])
                );
                assert!(registry.get_app_config("extra", false).is_ok());
            })
            .unwrap();
        assert_eq!(registry.available_apps(), Some(vec!["a".to_string()]));
        registry.unset_available_apps();
    }

    #[test]
    fn test_without_app_restores_position() {
        let registry = registry();
        registry.populate_models().unwrap();

        registry
            .without_app("b", || {
                assert_eq!(labels(&registry), vec!["a", "c"]);
                let models = registry.get_models(&ModelsQuery::new()).unwrap();
                assert!(models.iter().all(|m| m.app_label() != "b"));
            })
            .unwrap();

        assert_eq!(labels(&registry), vec!["a", "b", "c"]);
        assert_eq!(registry.get_models(&ModelsQuery::new()).unwrap().len(), 3);
    }

    #[test]
    fn test_without_unknown_app_is_noop() {
        let registry = registry();
        registry.populate_apps().unwrap();
        registry
            .without_app("ghost", || assert_eq!(labels(&registry).len(), 3))
            .unwrap();
        assert_eq!(labels(&registry).len(), 3);
    }

    #[test]
    fn test_without_app_on_unpopulated_registry() {
        let registry = registry();
        let inside = registry
            .without_app("a", || {
                registry
                    .get_app_configs(false)
                    .unwrap()
                    .iter()
                    .map(|c| c.label().to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap();
        assert_eq!(inside, vec!["b", "c"]);
        assert_eq!(labels(&registry), vec!["a", "b", "c"]);
        assert!(registry.get_model("a", "item", true).unwrap().is_some());
    }

    #[test]
    fn test_empty_hides_everything() {
        let registry = registry();
        registry.populate_models().unwrap();

        registry
            .empty(|| {
                assert!(registry.get_app_configs(false).unwrap().is_empty());
                assert!(registry.get_models(&ModelsQuery::new()).unwrap().is_empty());
                // Registered models stay reachable without the installed filter.
                assert_eq!(
                    registry
                        .get_models(&ModelsQuery::new().only_installed(false))
                        .unwrap()
                        .len(),
                    3
                );
            })
            .unwrap();

        assert_eq!(labels(&registry), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_on_unpopulated_registry() {
        let registry = registry();
        let inside = registry
            .empty(|| registry.get_app_configs(false).unwrap().len())
            .unwrap();
        assert_eq!(inside, 0);
        assert_eq!(registry.get_app_configs(false).unwrap().len(), 3);
        assert!(registry.models_ready());
        assert_eq!(registry.get_models(&ModelsQuery::new()).unwrap().len(), 3);
    }

    #[test]
    fn test_state_restored_after_panic() {
        let registry = registry();
        registry.populate_models().unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = registry.empty(|| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(labels(&registry), vec!["a", "b", "c"]);
    }
}
