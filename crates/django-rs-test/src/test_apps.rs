//! Isolated app registries for tests.
//!
//! [`TestApps`] declares a set of applications with [`TestApp`] and builds a
//! fresh master [`AppRegistry`] over a [`StaticLoader`], so tests never touch
//! the global [`APPS`](django_rs_core::APPS) slot.
//!
//! A test app can *require* models of other apps. Its models unit then fails
//! with [`ImportError::Cycle`] until those models are registered, which is
//! how order-dependent models units are exercised.

use std::path::PathBuf;
use std::sync::Arc;

use django_rs_core::apps::{AppConfig, AppDefinition, AppRegistry, ModelType, ReadyHook, StaticLoader};
use django_rs_core::{DjangoResult, ImportError};

/// Declaration of one application for [`TestApps`].
#[derive(Clone)]
pub struct TestApp {
    name: String,
    label: Option<String>,
    path: Option<PathBuf>,
    models_unit: bool,
    models: Vec<String>,
    model_types: Vec<ModelType>,
    requires: Vec<(String, String)>,
    ready: Option<ReadyHook>,
}

impl TestApp {
    /// An app named `name` without a models unit.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            path: None,
            models_unit: false,
            models: Vec::new(),
            model_types: Vec::new(),
            requires: Vec::new(),
            ready: None,
        }
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Gives the app a models unit registering plain models with these names.
    #[must_use]
    pub fn models(mut self, object_names: &[&str]) -> Self {
        self.models_unit = true;
        self.models
            .extend(object_names.iter().map(|name| (*name).to_string()));
        self
    }

    /// Adds a fully specified model type to the app's models unit.
    #[must_use]
    pub fn model(mut self, model: ModelType) -> Self {
        self.models_unit = true;
        self.model_types.push(model);
        self
    }

    /// Gives the app a models unit that registers nothing.
    #[must_use]
    pub const fn empty_models(mut self) -> Self {
        self.models_unit = true;
        self
    }

    /// Makes the models unit fail with a cycle until `app_label.model_name`
    /// has been registered.
    #[must_use]
    pub fn requires(mut self, app_label: impl Into<String>, model_name: impl Into<String>) -> Self {
        self.models_unit = true;
        self.requires.push((app_label.into(), model_name.into()));
        self
    }

    #[must_use]
    pub fn ready<F>(mut self, ready: F) -> Self
    where
        F: Fn(&AppConfig) + Send + Sync + 'static,
    {
        self.ready = Some(Arc::new(ready));
        self
    }

    fn into_definition(self) -> (String, AppDefinition) {
        let mut definition = AppDefinition::new();
        if let Some(label) = self.label {
            definition = definition.label(label);
        }
        if let Some(path) = self.path {
            definition = definition.path(path);
        }
        if let Some(ready) = self.ready {
            definition = definition.ready(move |config| ready(config));
        }
        if self.models_unit {
            let models = self.models;
            let model_types = self.model_types;
            let requires = self.requires;
            definition = definition.models(move |registry, app| {
                for (app_label, model_name) in &requires {
                    if registry.has_model(app_label, model_name).is_none() {
                        return Err(ImportError::cycle(
                            format!("{}.models", app.name()),
                            format!("{app_label}.{model_name}"),
                        ));
                    }
                }
                for name in &models {
                    registry.register_model(
                        app.label(),
                        ModelType::new(app.label(), name.as_str()).into_ref(),
                    );
                }
                for model in &model_types {
                    registry.register_model(app.label(), Arc::new(model.clone()));
                }
                Ok(())
            });
        }
        (self.name, definition)
    }
}

/// Builder for an isolated master registry.
///
/// # Examples
///
/// ```
/// use django_rs_test::{TestApp, TestApps};
///
/// let apps = TestApps::new()
///     .install(TestApp::new("blog").models(&["Post"]).requires("auth", "User"))
///     .install(TestApp::new("django_rs.contrib.auth").models(&["User"]))
///     .build_populated()
///     .unwrap();
///
/// assert!(apps.get_model("blog", "post", true).unwrap().is_some());
/// ```
#[derive(Default)]
pub struct TestApps {
    installed: Vec<String>,
    loader: StaticLoader,
}

impl TestApps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `app` and adds it to the installed apps, in call order.
    #[must_use]
    pub fn install(mut self, app: TestApp) -> Self {
        let (name, definition) = app.into_definition();
        self.loader.register(name.clone(), definition);
        self.installed.push(name);
        self
    }

    /// Declares `app` without installing it, so that it can be loaded later
    /// (e.g. with [`AppRegistry::with_app`]).
    #[must_use]
    pub fn declare(mut self, app: TestApp) -> Self {
        let (name, definition) = app.into_definition();
        self.loader.register(name, definition);
        self
    }

    /// Declares a raw [`AppDefinition`] and installs it.
    #[must_use]
    pub fn install_definition(mut self, name: impl Into<String>, definition: AppDefinition) -> Self {
        let name = name.into();
        self.loader.register(name.clone(), definition);
        self.installed.push(name);
        self
    }

    /// Builds an unpopulated master registry.
    pub fn build(self) -> AppRegistry {
        tracing::debug!("Building a test registry with {} app(s)", self.installed.len());
        AppRegistry::master(self.installed, self.loader)
    }

    /// Builds a master registry and imports all models.
    pub fn build_populated(self) -> DjangoResult<AppRegistry> {
        let registry = self.build();
        registry.populate_models()?;
        Ok(registry)
    }
}
