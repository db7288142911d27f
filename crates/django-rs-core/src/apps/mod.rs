//! Application registry and lifecycle management.
//!
//! An installed application is described by an [`AppConfig`]. The
//! [`AppRegistry`] creates one per installed app, imports each app's models
//! unit through a [`ModuleLoader`] and then answers lookups such as
//! [`get_model`](AppRegistry::get_model) and
//! [`get_models`](AppRegistry::get_models).
//!
//! ## Lifecycle
//!
//! 1. **Apps**: configs are created in declaration order
//!    ([`AppRegistry::populate_apps`]).
//! 2. **Models**: every models unit is imported, postponing units that
//!    depend on not-yet-imported models ([`AppRegistry::populate_models`]).
//! 3. **Ready**: each app's ready hook runs once, in declaration order.
//!
//! Every lookup populates the registry on demand.

mod config;
mod global;
mod loader;
mod model;
mod pending;
mod registry;
mod scoped;

pub use config::{default_label, AppConfig};
pub use global::{LazyApps, APPS};
pub use loader::{AppDefinition, AppModule, ModelsFn, ModelsModule, ModuleLoader, ReadyHook, StaticLoader};
pub use model::{ModelMap, ModelRef, ModelType, SharedModels};
pub use pending::{resolve_relation, ModelOperation, RelationTarget};
pub use registry::{AppRegistry, ModelsQuery};
