//! # django-rs-core
//!
//! The application registry of the django-rs framework, with the settings,
//! error, logging and check infrastructure it is built on.
//!
//! ## Modules
//!
//! - [`apps`] - App configs, model types and the [`AppRegistry`]
//! - [`error`] - Error types and result aliases
//! - [`settings`] / [`settings_loader`] - Framework settings and how to load them
//! - [`logging`] - Tracing-based logging integration
//! - [`checks`] - System checks over a populated registry

pub mod apps;
pub mod checks;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use apps::{AppConfig, AppRegistry, ModelsQuery, APPS};
pub use error::{DjangoError, DjangoResult, ImportError};
pub use settings::{Settings, SETTINGS};
