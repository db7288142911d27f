//! Core error types for the django-rs framework.
//!
//! This module provides [`DjangoError`], the error enum returned by the app
//! registry, the settings loader and the check framework, and [`ImportError`],
//! the tagged failure a [`ModuleLoader`](crate::apps::ModuleLoader) reports
//! when an application or its models unit cannot be loaded.

use thiserror::Error;

/// Failure reported while importing an application or its models unit.
///
/// The population engine only ever retries [`ImportError::Cycle`]; every
/// other variant is a genuine failure and is surfaced to the caller as-is.
#[derive(Error, Debug)]
pub enum ImportError {
    /// A dependency of `module` is not available yet, usually because it
    /// belongs to an application whose models have not been imported.
    #[error("cannot import {module}: {dependency} is not available yet")]
    Cycle {
        /// The module being imported.
        module: String,
        /// The dependency that could not be resolved.
        dependency: String,
    },

    /// No module is known under this name.
    #[error("no module named '{module}'")]
    NotFound {
        /// The requested module.
        module: String,
    },

    /// The module exists but failed while loading.
    #[error("error importing {module}: {reason}")]
    Failed {
        /// The module being imported.
        module: String,
        /// Why the import failed.
        reason: String,
    },

    /// A registry call made while importing failed.
    #[error(transparent)]
    Registry(Box<DjangoError>),
}

impl ImportError {
    /// Creates an [`ImportError::Cycle`].
    pub fn cycle(module: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::Cycle {
            module: module.into(),
            dependency: dependency.into(),
        }
    }

    /// Creates an [`ImportError::Failed`].
    pub fn failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the import may succeed once more modules are loaded.
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }
}

impl From<DjangoError> for ImportError {
    fn from(err: DjangoError) -> Self {
        match err {
            DjangoError::Import(inner) => inner,
            other => Self::Registry(Box::new(other)),
        }
    }
}

/// The primary error type for the django-rs framework.
///
/// Configuration and usage errors abort the operation that raised them.
/// [`LookupError`](DjangoError::LookupError) and
/// [`UnavailableApp`](DjangoError::UnavailableApp) are ordinary outcomes that
/// callers are expected to match on.
#[derive(Error, Debug)]
pub enum DjangoError {
    // ── Configuration ────────────────────────────────────────────────

    /// The framework is improperly configured.
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Registry lookups ─────────────────────────────────────────────

    /// No installed application (or models unit) matches the lookup.
    #[error("Lookup error: {0}")]
    LookupError(String),

    /// The application exists but is hidden by `set_available_apps`.
    #[error("Unavailable app: {0}")]
    UnavailableApp(String),

    /// The registry API was called in an invalid sequence.
    #[error("Usage error: {0}")]
    Usage(String),

    // ── Imports ──────────────────────────────────────────────────────

    /// An application or models unit failed to import.
    #[error(transparent)]
    Import(#[from] ImportError),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DjangoError {
    /// Returns `true` for a plain "nothing matches" outcome.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::LookupError(_))
    }

    /// Returns `true` when the target exists but is excluded by an
    /// availability restriction.
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::UnavailableApp(_))
    }
}

/// A convenience type alias for `Result<T, DjangoError>`.
pub type DjangoResult<T> = Result<T, DjangoError>;
