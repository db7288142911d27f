//! # django-rs-test
//!
//! Testing utilities for code built on the django-rs app registry.
//!
//! - [`available_apps`]: restrict a registry to a subset of its installed
//!   apps for the lifetime of a guard.
//! - [`test_apps`]: declare a handful of apps and models and get an isolated
//!   master registry for them.

pub mod available_apps;
pub mod test_apps;

pub use available_apps::{with_available_apps, AvailableApps};
pub use test_apps::{TestApp, TestApps};
