//! The module-import collaborator of the app registry.
//!
//! A [`ModuleLoader`] turns an installed-app name into an [`AppModule`] and
//! runs an app's models unit against the registry. Failures are tagged so
//! the population engine can tell a not-yet-available dependency
//! ([`ImportError::Cycle`]) from a genuine failure.
//!
//! [`StaticLoader`] is the table-driven implementation: every app is declared
//! up front with an [`AppDefinition`].

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::{AppConfig, AppRegistry};
use crate::error::ImportError;

/// Hook run once per app after all models have been imported.
pub type ReadyHook = Arc<dyn Fn(&AppConfig) + Send + Sync>;

/// Body of an app's models unit. It registers the app's models and may look
/// up other apps' models through the registry.
pub type ModelsFn = Arc<dyn Fn(&AppRegistry, &AppConfig) -> Result<(), ImportError> + Send + Sync>;

/// Resolves applications and imports their models units.
pub trait ModuleLoader: Send + Sync {
    /// Resolves the application module registered under `name`.
    fn import_app(&self, name: &str) -> Result<AppModule, ImportError>;

    /// Imports the models unit of `app_config`.
    ///
    /// Returns `Ok(None)` when the application has no models unit. The
    /// loader registers models through `registry`; it must not call
    /// [`AppRegistry::get_app_config`] for apps it depends on, and should use
    /// [`AppRegistry::has_model`] to check for models of other apps.
    fn import_models(
        &self,
        app_config: &AppConfig,
        registry: &AppRegistry,
    ) -> Result<Option<ModelsModule>, ImportError>;
}

/// A resolved application module.
#[derive(Clone)]
pub struct AppModule {
    /// Fully qualified dotted name.
    pub name: String,
    /// Directory holding the application.
    pub path: PathBuf,
    /// Label override; defaults to the last segment of `name`.
    pub label: Option<String>,
    /// Human-readable name override.
    pub verbose_name: Option<String>,
    /// Hook to run once the registry is fully populated.
    pub ready: Option<ReadyHook>,
}

impl AppModule {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            label: None,
            verbose_name: None,
            ready: None,
        }
    }
}

impl fmt::Debug for AppModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("label", &self.label)
            .field("verbose_name", &self.verbose_name)
            .field("ready", &self.ready.is_some())
            .finish()
    }
}

/// Handle to an imported models unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelsModule {
    /// Dotted name, e.g. `"blog.models"`.
    pub name: String,
    /// Source file the models were defined in.
    pub file: PathBuf,
}

impl ModelsModule {
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
        }
    }

    /// The app label this module belongs to: the second-to-last segment of
    /// its dotted name (`"shop.orders.models"` -> `"orders"`).
    pub fn app_label(&self) -> &str {
        app_label_of_module(&self.name)
    }
}

pub(crate) fn app_label_of_module(module: &str) -> &str {
    let mut segments = module.rsplit('.');
    let last = segments.next().unwrap_or(module);
    segments.next().unwrap_or(last)
}

/// Declaration of one application for [`StaticLoader`].
///
/// # Examples
///
/// ```
/// use django_rs_core::apps::{AppDefinition, ModelType};
///
/// let blog = AppDefinition::new()
///     .label("weblog")
///     .models(|registry, app| {
///         registry.register_model(app.label(), ModelType::new(app.label(), "Entry").into_ref());
///         Ok(())
///     });
/// ```
#[derive(Clone, Default)]
pub struct AppDefinition {
    path: Option<PathBuf>,
    label: Option<String>,
    verbose_name: Option<String>,
    models: Option<ModelsFn>,
    models_file: Option<PathBuf>,
    ready: Option<ReadyHook>,
}

impl AppDefinition {
    /// An application without a models unit.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = Some(verbose_name.into());
        self
    }

    /// Gives the application a models unit.
    #[must_use]
    pub fn models<F>(mut self, models: F) -> Self
    where
        F: Fn(&AppRegistry, &AppConfig) -> Result<(), ImportError> + Send + Sync + 'static,
    {
        self.models = Some(Arc::new(models));
        self
    }

    /// Source file reported for the models unit. Defaults to
    /// `<path>/models.rs`.
    #[must_use]
    pub fn models_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.models_file = Some(file.into());
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
}

impl fmt::Debug for AppDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDefinition")
            .field("path", &self.path)
            .field("label", &self.label)
            .field("has_models", &self.models.is_some())
            .finish_non_exhaustive()
    }
}

/// A [`ModuleLoader`] backed by a table of [`AppDefinition`]s built at startup.
///
/// # Examples
///
/// ```
/// use django_rs_core::apps::{AppDefinition, ModuleLoader, StaticLoader};
///
/// let loader = StaticLoader::new()
///     .app("django_rs.contrib.auth", AppDefinition::new())
///     .app("blog", AppDefinition::new().path("/srv/site/blog"));
///
/// let module = loader.import_app("blog").unwrap();
/// assert_eq!(module.path, std::path::PathBuf::from("/srv/site/blog"));
/// assert!(loader.import_app("missing").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    apps: HashMap<String, AppDefinition>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an application, replacing any previous declaration.
    #[must_use]
    pub fn app(mut self, name: impl Into<String>, definition: AppDefinition) -> Self {
        self.register(name, definition);
        self
    }

    /// Declares an application in place.
    pub fn register(&mut self, name: impl Into<String>, definition: AppDefinition) {
        self.apps.insert(name.into(), definition);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.apps.contains_key(name)
    }

    fn definition(&self, name: &str) -> Result<&AppDefinition, ImportError> {
        self.apps.get(name).ok_or_else(|| ImportError::NotFound {
            module: name.to_string(),
        })
    }
}

impl ModuleLoader for StaticLoader {
    fn import_app(&self, name: &str) -> Result<AppModule, ImportError> {
        let definition = self.definition(name)?;
        Ok(AppModule {
            name: name.to_string(),
            path: definition
                .path
                .clone()
                .unwrap_or_else(|| name.split('.').collect()),
            label: definition.label.clone(),
            verbose_name: definition.verbose_name.clone(),
            ready: definition.ready.clone(),
        })
    }

    fn import_models(
        &self,
        app_config: &AppConfig,
        registry: &AppRegistry,
    ) -> Result<Option<ModelsModule>, ImportError> {
        let definition = self.definition(app_config.name())?;
        let Some(models) = &definition.models else {
            return Ok(None);
        };
        models(registry, app_config)?;
        let file = definition
            .models_file
            .clone()
            .unwrap_or_else(|| app_config.path().join("models.rs"));
        Ok(Some(ModelsModule::new(
            format!("{}.models", app_config.name()),
            file,
        )))
    }
}
