//! The process-wide master registry.
//!
//! Exactly one master [`AppRegistry`] is meant to exist per process. It is
//! built at startup (usually with [`AppRegistry::from_settings`]) and
//! installed into [`APPS`], from where the rest of the framework reads it.

use std::sync::OnceLock;

use super::registry::AppRegistry;
use crate::error::{DjangoError, DjangoResult};

/// A once-initialized slot holding the master app registry.
pub struct LazyApps {
    inner: OnceLock<AppRegistry>,
}

impl Default for LazyApps {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyApps {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Installs the master registry.
    ///
    /// Fails with [`DjangoError::ImproperlyConfigured`] if a registry is
    /// already installed, or if `registry` is not a master registry.
    pub fn install(&self, registry: AppRegistry) -> DjangoResult<&AppRegistry> {
        if !registry.is_master() {
            return Err(DjangoError::ImproperlyConfigured(
                "only a master app registry can be installed globally".to_string(),
            ));
        }
        let mut fresh = Some(registry);
        let installed = self.inner.get_or_init(|| fresh.take().unwrap_or_default());
        if fresh.is_some() {
            return Err(DjangoError::ImproperlyConfigured(
                "There should be only one master app registry".to_string(),
            ));
        }
        tracing::debug!("Installed the master app registry");
        Ok(installed)
    }

    /// Returns the master registry.
    ///
    /// # Panics
    ///
    /// Panics if no registry has been installed.
    pub fn get(&self) -> &AppRegistry {
        self.inner
            .get()
            .expect("App registry has not been installed. Call APPS.install() first.")
    }

    /// Returns the master registry, or `None` before installation.
    pub fn try_get(&self) -> Option<&AppRegistry> {
        self.inner.get()
    }

    /// Returns `true` once a registry has been installed.
    pub fn is_installed(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global master app registry.
pub static APPS: LazyApps = LazyApps::new();
