//! Runtime descriptor for one installed application.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;

use super::loader::{AppModule, ModelsModule, ModuleLoader, ReadyHook};
use super::model::{ModelRef, SharedModels};
use super::AppRegistry;
use crate::error::ImportError;

/// Returns the default label for an application name: its last dotted
/// segment. `"django_rs.contrib.auth"` yields `"auth"`.
pub fn default_label(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[derive(Debug, Clone)]
enum ImportState {
    NotImported,
    Importing,
    Imported(Option<ModelsModule>),
}

/// Puts an unfinished import back to "not imported" when dropped, whether
/// the loader returned an error or panicked.
struct ResetUnfinished<'a>(&'a Mutex<ImportState>);

impl Drop for ResetUnfinished<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        if matches!(*state, ImportState::Importing) {
            *state = ImportState::NotImported;
        }
    }
}

/// An installed application.
///
/// Created once from an [`AppModule`] while the registry populates its apps.
/// After creation only the models side changes: [`import_models`] records
/// the models unit and attaches the shared model collection.
///
/// [`import_models`]: AppConfig::import_models
pub struct AppConfig {
    name: String,
    label: String,
    verbose_name: String,
    path: PathBuf,
    ready_hook: Option<ReadyHook>,
    import_state: Mutex<ImportState>,
    models: OnceLock<SharedModels>,
}

impl AppConfig {
    /// Builds the config for a resolved application module.
    ///
    /// # Examples
    ///
    /// ```
    /// use django_rs_core::apps::{AppConfig, AppModule};
    ///
    /// let config = AppConfig::create(AppModule::new("django_rs.contrib.auth", "/srv/auth"));
    /// assert_eq!(config.label(), "auth");
    /// assert!(config.models_module().is_none());
    /// ```
    pub fn create(module: AppModule) -> Self {
        let label = module
            .label
            .unwrap_or_else(|| default_label(&module.name).to_string());
        let verbose_name = module.verbose_name.unwrap_or_else(|| label.clone());
        Self {
            name: module.name,
            label,
            verbose_name,
            path: module.path,
            ready_hook: module.ready,
            import_state: Mutex::new(ImportState::NotImported),
            models: OnceLock::new(),
        }
    }

    /// The fully qualified dotted name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The short unique identifier.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn verbose_name(&self) -> &str {
        &self.verbose_name
    }

    /// The directory holding the application.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The imported models unit, or `None` if the app has none or its models
    /// have not been imported yet.
    pub fn models_module(&self) -> Option<ModelsModule> {
        match &*self.import_state.lock() {
            ImportState::Imported(module) => module.clone(),
            ImportState::NotImported | ImportState::Importing => None,
        }
    }

    /// Returns `true` once [`import_models`](Self::import_models) succeeded.
    pub fn models_imported(&self) -> bool {
        matches!(*self.import_state.lock(), ImportState::Imported(_))
    }

    /// The app's models in registration order. Empty until models are imported.
    pub fn models(&self) -> Vec<ModelRef> {
        self.models
            .get()
            .map(|models| models.read().to_vec())
            .unwrap_or_default()
    }

    /// Case-insensitive lookup among this app's models.
    pub fn get_model(&self, model_name: &str) -> Option<ModelRef> {
        self.models
            .get()
            .and_then(|models| models.read().get(model_name).cloned())
    }

    /// Imports the app's models unit into `all_models`.
    ///
    /// Idempotent. While an import of this app is already running higher up
    /// the call chain this returns `Ok(())` without doing anything; the
    /// outer frame finishes the import. On failure the app goes back to
    /// "not imported" so a later attempt can retry.
    pub(crate) fn import_models(
        &self,
        all_models: SharedModels,
        loader: &dyn ModuleLoader,
        registry: &AppRegistry,
    ) -> Result<(), ImportError> {
        {
            let mut state = self.import_state.lock();
            match *state {
                ImportState::Imported(_) | ImportState::Importing => return Ok(()),
                ImportState::NotImported => *state = ImportState::Importing,
            }
        }
        let _reset = ResetUnfinished(&self.import_state);
        // Attached before the import so registrations show up through this app.
        let _ = self.models.set(all_models);

        let module = loader.import_models(self, registry)?;
        *self.import_state.lock() = ImportState::Imported(module);
        Ok(())
    }

    pub(crate) fn run_ready(&self) {
        if let Some(hook) = &self.ready_hook {
            hook(self);
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("path", &self.path)
            .field("models_module", &self.models_module())
            .finish_non_exhaustive()
    }
}
