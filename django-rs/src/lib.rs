//! # django-rs
//!
//! The django-rs application registry.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `django-rs` for everything, or on the individual crates
//! for finer-grained control.
//!
//! ```
//! use django_rs::core::apps::{AppDefinition, AppRegistry, StaticLoader};
//!
//! let registry = AppRegistry::master(["blog"], StaticLoader::new().app("blog", AppDefinition::new()));
//! assert_eq!(registry.get_app_configs(false).unwrap().len(), 1);
//! ```

/// App registry, settings, logging, checks and error types.
pub use django_rs_core as core;

/// Availability guards and isolated registries for tests.
#[cfg(feature = "testing")]
pub use django_rs_test as test;

pub use django_rs_core::{AppRegistry, DjangoError, DjangoResult, Settings, APPS};
