//! The application and model registry.
//!
//! [`AppRegistry`] discovers installed applications, imports their models
//! units in declaration order and answers "which apps / which models" for the
//! rest of the framework.
//!
//! Population runs in two monotonic phases, apps then models, each guarded
//! by a process-wide reentrant import lock. Models units that fail with
//! [`ImportError::Cycle`] during the first pass are postponed and retried
//! exactly once by the outermost `populate_models` call.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use super::config::AppConfig;
use super::loader::{app_label_of_module, ModelsModule, ModuleLoader, StaticLoader};
use super::model::{ModelRef, SharedModels};
use super::pending::{resolve_relation, PendingOperations, RelationTarget};
use crate::error::{DjangoError, DjangoResult, ImportError};
use crate::logging::population_span;
use crate::settings::Settings;

/// Runs the wrapped action on drop, including during unwinding.
pub(crate) struct Restore<F: FnOnce()>(pub(crate) Option<F>);

impl<F: FnOnce()> Restore<F> {
    /// Drops the action without running it.
    pub(crate) fn disarm(mut self) {
        self.0 = None;
    }
}

impl<F: FnOnce()> Drop for Restore<F> {
    fn drop(&mut self) {
        if let Some(restore) = self.0.take() {
            restore();
        }
    }
}

/// Progress of one population phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    NotStarted,
    InProgress,
    Done,
}

/// Parameters of [`AppRegistry::get_models`]. Also the lookup cache key.
///
/// By default only installed models are returned, and auto-created,
/// deferred and swapped models are excluded.
///
/// # Examples
///
/// ```
/// use django_rs_core::apps::ModelsQuery;
///
/// let query = ModelsQuery::new().include_auto_created(true).only_installed(false);
/// assert!(query.include_auto_created);
/// assert!(!query.only_installed);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelsQuery {
    /// Restrict to the app owning this models module (dotted name).
    pub module: Option<String>,
    pub include_auto_created: bool,
    pub include_deferred: bool,
    pub only_installed: bool,
    pub include_swapped: bool,
}

impl Default for ModelsQuery {
    fn default() -> Self {
        Self {
            module: None,
            include_auto_created: false,
            include_deferred: false,
            only_installed: true,
            include_swapped: false,
        }
    }
}

impl ModelsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to the models of `module`'s app.
    #[must_use]
    pub fn module(mut self, module: &ModelsModule) -> Self {
        self.module = Some(module.name.clone());
        self
    }

    #[must_use]
    pub const fn include_auto_created(mut self, include: bool) -> Self {
        self.include_auto_created = include;
        self
    }

    #[must_use]
    pub const fn include_deferred(mut self, include: bool) -> Self {
        self.include_deferred = include;
        self
    }

    #[must_use]
    pub const fn only_installed(mut self, only_installed: bool) -> Self {
        self.only_installed = only_installed;
        self
    }

    #[must_use]
    pub const fn include_swapped(mut self, include: bool) -> Self {
        self.include_swapped = include;
        self
    }

    fn admits(&self, model: &ModelRef) -> bool {
        (self.include_auto_created || !model.is_auto_created())
            && (self.include_deferred || !model.is_deferred())
            && (self.include_swapped || model.swapped().is_none())
    }
}

/// Installed app configs keyed by label, in declaration order.
#[derive(Debug, Default, Clone)]
pub(crate) struct AppConfigs {
    configs: Vec<Arc<AppConfig>>,
    labels: HashMap<String, usize>,
}

impl AppConfigs {
    pub(crate) fn get(&self, label: &str) -> Option<&Arc<AppConfig>> {
        self.labels.get(label).map(|&idx| &self.configs[idx])
    }

    pub(crate) fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    pub(crate) fn find_by_name(&self, name: &str) -> Option<&Arc<AppConfig>> {
        self.configs.iter().find(|config| config.name() == name)
    }

    /// Appends `config`; hands it back if its label is taken.
    pub(crate) fn push(&mut self, config: Arc<AppConfig>) -> Result<(), Arc<AppConfig>> {
        if self.contains(config.label()) {
            return Err(config);
        }
        self.labels
            .insert(config.label().to_string(), self.configs.len());
        self.configs.push(config);
        Ok(())
    }

    /// Replaces the config with the same label in place, or appends it.
    pub(crate) fn upsert(&mut self, config: Arc<AppConfig>) {
        match self.labels.get(config.label()) {
            Some(&idx) => self.configs[idx] = config,
            None => {
                let _ = self.push(config);
            }
        }
    }

    /// Removes the config with this label, returning its position.
    pub(crate) fn remove(&mut self, label: &str) -> Option<(usize, Arc<AppConfig>)> {
        let idx = self.labels.remove(label)?;
        let config = self.configs.remove(idx);
        self.reindex();
        Some((idx, config))
    }

    /// Puts a removed config back at `idx` (clamped to the end).
    pub(crate) fn insert_at(&mut self, idx: usize, config: Arc<AppConfig>) {
        if self.contains(config.label()) {
            return;
        }
        let idx = idx.min(self.configs.len());
        self.configs.insert(idx, config);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.labels = self
            .configs
            .iter()
            .enumerate()
            .map(|(idx, config)| (config.label().to_string(), idx))
            .collect();
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<AppConfig>> {
        self.configs.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.configs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub(crate) fn to_vec(&self) -> Vec<Arc<AppConfig>> {
        self.configs.clone()
    }
}

/// Mutable registry state. Never held across a call into the loader.
pub(crate) struct RegistryState {
    pub(crate) app_configs: AppConfigs,
    all_models: HashMap<String, SharedModels>,
    all_models_order: Vec<String>,
    pub(crate) available_apps: Option<HashSet<String>>,
    apps_phase: Phase,
    models_phase: Phase,
    deferring: bool,
    postponed: Vec<Arc<AppConfig>>,
    pub(crate) models_cache: HashMap<ModelsQuery, Vec<ModelRef>>,
}

impl RegistryState {
    fn new(initial_phase: Phase) -> Self {
        Self {
            app_configs: AppConfigs::default(),
            all_models: HashMap::new(),
            all_models_order: Vec::new(),
            available_apps: None,
            apps_phase: initial_phase,
            models_phase: initial_phase,
            deferring: false,
            postponed: Vec::new(),
            models_cache: HashMap::new(),
        }
    }

    /// The shared model map for `app_label`, created on first use.
    pub(crate) fn models_for(&mut self, app_label: &str) -> SharedModels {
        if let Some(models) = self.all_models.get(app_label) {
            return Arc::clone(models);
        }
        let models = SharedModels::default();
        self.all_models
            .insert(app_label.to_string(), Arc::clone(&models));
        self.all_models_order.push(app_label.to_string());
        models
    }

    fn is_available(&self, app_config: &AppConfig) -> bool {
        self.available_apps
            .as_ref()
            .map_or(true, |available| available.contains(app_config.name()))
    }

    /// Drops models whose app is hidden by `available_apps`.
    fn restrict(&self, models: Vec<ModelRef>, only_installed: bool) -> Vec<ModelRef> {
        let Some(available) = &self.available_apps else {
            return models;
        };
        if !only_installed {
            return models;
        }
        models
            .into_iter()
            .filter(|model| {
                self.app_configs
                    .get(model.app_label())
                    .is_some_and(|config| available.contains(config.name()))
            })
            .collect()
    }

    /// The label of the installed app owning `module`, falling back to the
    /// label encoded in the dotted name.
    fn label_of_module<'a>(&'a self, module: &'a str) -> &'a str {
        module
            .strip_suffix(".models")
            .and_then(|app_name| self.app_configs.find_by_name(app_name))
            .map_or_else(|| app_label_of_module(module), |config| config.label())
    }

    fn candidates(&self, query: &ModelsQuery) -> Vec<ModelRef> {
        let installed = |label: &str| {
            self.app_configs
                .get(label)
                .map(|config| config.models())
                .unwrap_or_default()
        };
        let registered = |label: &str| {
            self.all_models
                .get(label)
                .map(|models| models.read().to_vec())
                .unwrap_or_default()
        };

        match (&query.module, query.only_installed) {
            (Some(module), true) => installed(self.label_of_module(module)),
            (Some(module), false) => registered(self.label_of_module(module)),
            (None, true) => self
                .app_configs
                .iter()
                .flat_map(|config| config.models())
                .collect(),
            (None, false) => self
                .all_models_order
                .iter()
                .flat_map(|label| registered(label.as_str()))
                .collect(),
        }
    }
}

/// The central registry of installed applications and their models.
///
/// A *master* registry is populated from a list of installed app names
/// through a [`ModuleLoader`]. A non-master registry (see [`AppRegistry::new`])
/// only knows what is registered into it and treats every registered model as
/// installed.
///
/// Registries are shared by reference; install the process-wide one with
/// [`APPS`](super::APPS).
///
/// # Examples
///
/// ```
/// use django_rs_core::apps::{AppDefinition, AppRegistry, ModelType, StaticLoader};
///
/// let loader = StaticLoader::new().app(
///     "blog",
///     AppDefinition::new().models(|registry, app| {
///         registry.register_model(app.label(), ModelType::new("blog", "Post").into_ref());
///         Ok(())
///     }),
/// );
/// let registry = AppRegistry::master(["blog"], loader);
///
/// let post = registry.get_model("blog", "POST", true).unwrap().unwrap();
/// assert_eq!(post.object_name(), "Post");
/// assert!(registry.models_ready());
/// ```
pub struct AppRegistry {
    master: bool,
    installed_apps: Vec<String>,
    pub(crate) loader: Arc<dyn ModuleLoader>,
    pub(crate) import_lock: ReentrantMutex<()>,
    pub(crate) state: RwLock<RegistryState>,
    pending: Mutex<PendingOperations>,
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRegistry {
    /// Creates a non-master registry with no loader behind it.
    pub fn new() -> Self {
        Self::with_loader(StaticLoader::new())
    }

    /// Creates a non-master registry that can still load apps on demand
    /// (through [`load_app`](Self::load_app) or [`with_app`](Self::with_app)).
    pub fn with_loader(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            master: false,
            installed_apps: Vec::new(),
            loader: Arc::new(loader),
            import_lock: ReentrantMutex::new(()),
            state: RwLock::new(RegistryState::new(Phase::Done)),
            pending: Mutex::new(PendingOperations::default()),
        }
    }

    /// Creates a master registry that populates itself from `installed_apps`
    /// on first use.
    pub fn master<I, S>(installed_apps: I, loader: impl ModuleLoader + 'static) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            master: true,
            installed_apps: installed_apps.into_iter().map(Into::into).collect(),
            loader: Arc::new(loader),
            import_lock: ReentrantMutex::new(()),
            state: RwLock::new(RegistryState::new(Phase::NotStarted)),
            pending: Mutex::new(PendingOperations::default()),
        }
    }

    /// Creates a master registry for `settings.installed_apps`.
    pub fn from_settings(settings: &Settings, loader: impl ModuleLoader + 'static) -> Self {
        Self::master(settings.installed_apps.iter().cloned(), loader)
    }

    pub const fn is_master(&self) -> bool {
        self.master
    }

    /// The configured application names, in declaration order.
    pub fn installed_apps(&self) -> &[String] {
        &self.installed_apps
    }

    /// Returns `true` once all app configs have been created.
    pub fn apps_ready(&self) -> bool {
        self.state.read().apps_phase == Phase::Done
    }

    /// Returns `true` once every models unit has been imported.
    ///
    /// Code that wants to cache `get_models()` results itself may do so once
    /// this is `true`. Implies [`apps_ready`](Self::apps_ready).
    ///
    /// This turns `true` before the ready hooks run, so that hooks can query
    /// the registry. Another thread may observe it while hooks are still
    /// running; lookups from that thread do not wait for them.
    pub fn models_ready(&self) -> bool {
        self.state.read().models_phase == Phase::Done
    }

    // ── Population ──────────────────────────────────────────────────

    /// Creates an [`AppConfig`] for every installed app, in declared order.
    ///
    /// Thread-safe and idempotent, but not reentrant: calling it from inside
    /// an app import fails.
    pub fn populate_apps(&self) -> DjangoResult<()> {
        if self.apps_ready() {
            return Ok(());
        }
        // Imports run under the import lock so that two threads populating at
        // once cannot deadlock on each other's half-imported modules.
        let _import = self.import_lock.lock();
        {
            let mut state = self.state.write();
            match state.apps_phase {
                Phase::Done => return Ok(()),
                Phase::InProgress => {
                    return Err(DjangoError::ImproperlyConfigured(
                        "populate_apps() isn't reentrant".to_string(),
                    ))
                }
                Phase::NotStarted => {}
            }
            // Declaration order is only guaranteed for a pristine registry.
            if !state.app_configs.is_empty() {
                return Err(DjangoError::ImproperlyConfigured(
                    "populate_apps() isn't reentrant".to_string(),
                ));
            }
            state.apps_phase = Phase::InProgress;
        }
        // Back to not-started on failure, or if a loader panics.
        let reset = Restore(Some(|| self.state.write().apps_phase = Phase::NotStarted));

        let span = population_span("apps");
        let _entered = span.enter();
        tracing::debug!("Populating {} installed app(s)", self.installed_apps.len());
        let configs = self
            .load_app_configs()
            .inspect_err(|err| tracing::error!("App population failed: {err}"))?;
        reset.disarm();

        tracing::debug!("Loaded {} app config(s)", configs.len());
        let mut state = self.state.write();
        state.app_configs = configs;
        state.apps_phase = Phase::Done;
        Ok(())
    }

    fn load_app_configs(&self) -> DjangoResult<AppConfigs> {
        let mut configs = AppConfigs::default();
        for app_name in &self.installed_apps {
            let module = self.loader.import_app(app_name)?;
            let config = Arc::new(AppConfig::create(module));
            tracing::debug!("Created app config '{}' for {}", config.label(), config.name());
            if let Err(duplicate) = configs.push(config) {
                return Err(DjangoError::ImproperlyConfigured(format!(
                    "Application labels aren't unique, duplicates: {}",
                    duplicate.label()
                )));
            }
        }
        Ok(configs)
    }

    /// Imports the models unit of every installed app.
    ///
    /// Thread-safe, idempotent and reentrant: a models unit may trigger this
    /// again while it is being imported. Units failing with
    /// [`ImportError::Cycle`] are postponed; the outermost call retries every
    /// postponed unit once after the first pass and returns the first retry
    /// failure unchanged.
    ///
    /// A failed or panicking population leaves the models phase not started,
    /// so the next call starts over.
    pub fn populate_models(&self) -> DjangoResult<()> {
        if self.models_ready() {
            return Ok(());
        }
        let _import = self.import_lock.lock();
        if self.models_ready() {
            return Ok(());
        }

        self.populate_apps()?;

        let outermost = {
            let mut state = self.state.write();
            let outermost = !state.deferring;
            if outermost {
                state.deferring = true;
                state.postponed.clear();
                state.models_phase = Phase::InProgress;
            }
            outermost
        };

        if !outermost {
            return self.import_all_models(false);
        }
        // Leaves the registry ready for a fresh outermost call when the
        // import fails or a models unit panics.
        let reset = Restore(Some(|| {
            let mut state = self.state.write();
            state.deferring = false;
            state.postponed.clear();
            state.models_phase = Phase::NotStarted;
        }));

        let span = population_span("models");
        let _entered = span.enter();
        tracing::debug!("Importing models");
        if let Err(err) = self.import_all_models(true) {
            tracing::error!("Model population failed: {err}");
            return Err(err);
        }
        reset.disarm();

        {
            let mut state = self.state.write();
            state.deferring = false;
            state.postponed.clear();
            state.models_phase = Phase::Done;
            tracing::info!(
                "App registry ready: {} app(s), {} model(s)",
                state.app_configs.len(),
                state
                    .all_models
                    .values()
                    .map(|models| models.read().len())
                    .sum::<usize>()
            );
        }

        let configs = self.state.read().app_configs.to_vec();
        for config in configs {
            config.run_ready();
        }
        Ok(())
    }

    fn import_all_models(&self, outermost: bool) -> DjangoResult<()> {
        let configs = self.state.read().app_configs.to_vec();
        for app_config in configs {
            match self.import_app_models(&app_config) {
                Ok(()) => {}
                Err(err) if err.is_cycle() => {
                    tracing::debug!("Postponing models of '{}': {err}", app_config.label());
                    self.state.write().postponed.push(app_config);
                }
                Err(err) => return Err(err.into()),
            }
        }

        if !outermost {
            return Ok(());
        }

        let postponed = std::mem::take(&mut self.state.write().postponed);
        let mut first_error = None;
        for app_config in postponed {
            tracing::debug!("Retrying models of '{}'", app_config.label());
            if let Err(err) = self.import_app_models(&app_config) {
                tracing::debug!("Retry of '{}' failed: {err}", app_config.label());
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    pub(crate) fn import_app_models(&self, app_config: &AppConfig) -> Result<(), ImportError> {
        let models = self.state.write().models_for(app_config.label());
        app_config.import_models(models, self.loader.as_ref(), self)
    }

    // ── App lookups ─────────────────────────────────────────────────

    /// Returns the installed app configs in declaration order.
    ///
    /// With `only_with_models_module`, imports models first and skips apps
    /// without a models unit. Apps hidden by
    /// [`set_available_apps`](Self::set_available_apps) are skipped.
    pub fn get_app_configs(&self, only_with_models_module: bool) -> DjangoResult<Vec<Arc<AppConfig>>> {
        self.populate_for(only_with_models_module)?;

        let state = self.state.read();
        Ok(state
            .app_configs
            .iter()
            .filter(|config| !only_with_models_module || config.models_module().is_some())
            .filter(|config| state.is_available(config))
            .cloned()
            .collect())
    }

    /// Returns the app config for `app_label`.
    ///
    /// Fails with [`DjangoError::LookupError`] for an unknown label (or, with
    /// `only_with_models_module`, an app without models unit) and with
    /// [`DjangoError::UnavailableApp`] when the app is hidden.
    pub fn get_app_config(
        &self,
        app_label: &str,
        only_with_models_module: bool,
    ) -> DjangoResult<Arc<AppConfig>> {
        self.populate_for(only_with_models_module)?;

        let state = self.state.read();
        let Some(app_config) = state.app_configs.get(app_label) else {
            return Err(DjangoError::LookupError(format!(
                "No installed app with label '{app_label}'."
            )));
        };
        if only_with_models_module && app_config.models_module().is_none() {
            return Err(DjangoError::LookupError(format!(
                "App with label '{app_label}' doesn't have a models module."
            )));
        }
        if !state.is_available(app_config) {
            return Err(DjangoError::UnavailableApp(format!(
                "App with label '{app_label}' isn't available."
            )));
        }
        Ok(Arc::clone(app_config))
    }

    fn populate_for(&self, models: bool) -> DjangoResult<()> {
        if models {
            self.populate_models()
        } else {
            self.populate_apps()
        }
    }

    /// Returns the config of the installed app named `app_name`, if any.
    ///
    /// Takes no import lock; safe to call while the registry is populating.
    pub fn has_app(&self, app_name: &str) -> Option<Arc<AppConfig>> {
        self.state.read().app_configs.find_by_name(app_name).cloned()
    }

    /// Filesystem paths of the installed apps that have a models unit.
    pub fn get_app_paths(&self) -> DjangoResult<Vec<PathBuf>> {
        Ok(self
            .get_app_configs(true)?
            .iter()
            .map(|config| config.path().to_path_buf())
            .collect())
    }

    // ── Model lookups ───────────────────────────────────────────────

    /// Returns the models matching `query`.
    ///
    /// Results are memoized per query and the memo is cleared by every new
    /// registration. The `available_apps` restriction is applied after the
    /// memo, so the memo stays valid when the restriction changes.
    pub fn get_models(&self, query: &ModelsQuery) -> DjangoResult<Vec<ModelRef>> {
        let mut key = query.clone();
        if !self.master {
            key.only_installed = false;
        }

        {
            let state = self.state.read();
            if let Some(models) = state.models_cache.get(&key) {
                return Ok(state.restrict(models.clone(), key.only_installed));
            }
        }

        self.populate_models()?;

        let mut state = self.state.write();
        let models: Vec<ModelRef> = state
            .candidates(&key)
            .into_iter()
            .filter(|model| key.admits(model))
            .collect();
        let only_installed = key.only_installed;
        state.models_cache.insert(key, models.clone());
        Ok(state.restrict(models, only_installed))
    }

    /// Returns the model `app_label.model_name` (case-insensitive), or
    /// `Ok(None)` if there is none.
    ///
    /// With `only_installed`, an app that is installed but hidden by
    /// `available_apps` yields [`DjangoError::UnavailableApp`] whether or not
    /// the model exists. Non-master registries ignore `only_installed`.
    pub fn get_model(
        &self,
        app_label: &str,
        model_name: &str,
        only_installed: bool,
    ) -> DjangoResult<Option<ModelRef>> {
        let only_installed = only_installed && self.master;
        self.populate_models()?;

        let state = self.state.read();
        if only_installed {
            let Some(app_config) = state.app_configs.get(app_label) else {
                return Ok(None);
            };
            if !state.is_available(app_config) {
                return Err(DjangoError::UnavailableApp(format!(
                    "App with label '{app_label}' isn't available."
                )));
            }
        }
        Ok(state
            .all_models
            .get(app_label)
            .and_then(|models| models.read().get(model_name).cloned()))
    }

    /// Returns the model if it has been registered, whether or not its app is
    /// installed.
    ///
    /// Takes no import lock; safe to call while the registry is populating.
    pub fn has_model(&self, app_label: &str, model_name: &str) -> Option<ModelRef> {
        self.state
            .read()
            .all_models
            .get(app_label)
            .and_then(|models| models.read().get(model_name).cloned())
    }

    // ── Registration ────────────────────────────────────────────────

    /// Registers `model` under `app_label`.
    ///
    /// A second model with the same name is ignored: if it comes from the
    /// same source file (modulo extension) it is the same model imported
    /// through another path, otherwise it conflicts and the first one stays.
    /// A new registration clears the `get_models` memo and runs the lazy
    /// operations waiting for this model.
    ///
    /// Expected to be called from a models unit, i.e. under the import lock.
    /// Must not call [`get_app_config`](Self::get_app_config).
    pub fn register_model(&self, app_label: &str, model: ModelRef) {
        {
            let mut state = self.state.write();
            let models = state.models_for(app_label);
            let inserted = models.write().insert(Arc::clone(&model));
            if let Err(existing) = inserted {
                if existing.same_source_as(&model) {
                    tracing::debug!(
                        "Model '{}.{}' imported again from {}; keeping the first registration",
                        app_label,
                        model.model_name(),
                        model.module()
                    );
                } else {
                    tracing::warn!(
                        "Conflicting '{}' models in application '{}': {} and {}; keeping the first",
                        model.model_name(),
                        app_label,
                        existing.module(),
                        model.module()
                    );
                }
                return;
            }
            state.models_cache.clear();
        }
        tracing::trace!("Registered model {}.{}", app_label, model.object_name());

        let waiting = self.pending.lock().take(app_label, model.model_name());
        for operation in waiting {
            operation(&model);
        }
    }

    /// Registers several models under `app_label`.
    pub fn register_models(&self, app_label: &str, models: impl IntoIterator<Item = ModelRef>) {
        for model in models {
            self.register_model(app_label, model);
        }
    }

    /// Imports one app and its models and installs it permanently.
    ///
    /// Replaces an installed app with the same label. Returns the app's
    /// models unit.
    pub fn load_app(&self, app_name: &str) -> DjangoResult<Option<ModelsModule>> {
        let _import = self.import_lock.lock();
        let config = Arc::new(AppConfig::create(self.loader.import_app(app_name)?));
        self.import_app_models(&config)?;

        let mut state = self.state.write();
        state.app_configs.upsert(Arc::clone(&config));
        state.models_cache.clear();
        tracing::debug!("Loaded app '{}'", config.label());
        Ok(config.models_module())
    }

    // ── Lazy operations ─────────────────────────────────────────────

    /// Runs `operation` with the model `app_label.model_name` as soon as it
    /// is registered: immediately if it already is, otherwise on
    /// registration.
    pub fn lazy_model_operation<F>(&self, app_label: &str, model_name: &str, operation: F)
    where
        F: FnOnce(&ModelRef) + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if let Some(model) = self.has_model(app_label, model_name) {
            drop(pending);
            operation(&model);
            return;
        }
        pending.push(app_label, model_name, Box::new(operation));
    }

    /// Resolves `relation` relative to `origin` (`"self"`, `"Model"` or
    /// `"app_label.Model"`) and runs `operation` once the target exists.
    pub fn add_lazy_relation<F>(&self, origin: &ModelRef, relation: &str, operation: F) -> DjangoResult<()>
    where
        F: FnOnce(&ModelRef) + Send + 'static,
    {
        match resolve_relation(origin.app_label(), relation)? {
            RelationTarget::Itself => operation(origin),
            RelationTarget::Model(app_label, model_name) => {
                self.lazy_model_operation(&app_label, &model_name, operation);
            }
        }
        Ok(())
    }

    /// `(app_label, model_name)` pairs that lazy operations still wait for.
    pub fn pending_operations(&self) -> Vec<(String, String)> {
        self.pending.lock().keys()
    }

    // ── Availability ────────────────────────────────────────────────

    /// Restricts the apps visible through the lookup methods to `available`.
    ///
    /// Must be paired with [`unset_available_apps`](Self::unset_available_apps);
    /// a second call in a row is a [`DjangoError::Usage`] error. Every name
    /// must be an installed app.
    pub fn set_available_apps<I, S>(&self, available: I) -> DjangoResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.state.read().available_apps.is_some() {
            return Err(already_restricted());
        }
        let available: HashSet<String> = available.into_iter().map(Into::into).collect();
        let installed: HashSet<String> = self
            .get_app_configs(false)?
            .iter()
            .map(|config| config.name().to_string())
            .collect();

        let mut extra: Vec<&str> = available
            .difference(&installed)
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            extra.sort_unstable();
            return Err(DjangoError::ImproperlyConfigured(format!(
                "Available apps isn't a subset of installed apps, extra apps: {}",
                extra.join(", ")
            )));
        }

        let mut state = self.state.write();
        if state.available_apps.is_some() {
            return Err(already_restricted());
        }
        state.available_apps = Some(available);
        Ok(())
    }

    /// Cancels a previous [`set_available_apps`](Self::set_available_apps).
    pub fn unset_available_apps(&self) {
        self.state.write().available_apps = None;
    }

    /// The active restriction, sorted, or `None` when unrestricted.
    pub fn available_apps(&self) -> Option<Vec<String>> {
        self.state.read().available_apps.as_ref().map(|available| {
            let mut names: Vec<String> = available.iter().cloned().collect();
            names.sort();
            names
        })
    }
}

fn already_restricted() -> DjangoError {
    DjangoError::Usage(
        "set_available_apps() may be called only once in a row; make sure it's paired with unset_available_apps()"
            .to_string(),
    )
}

impl std::fmt::Debug for AppRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("AppRegistry")
            .field("master", &self.master)
            .field("apps_phase", &state.apps_phase)
            .field("models_phase", &state.models_phase)
            .field("app_configs", &state.app_configs.len())
            .finish_non_exhaustive()
    }
}
