//! Availability restriction for tests.
//!
//! Tests that only care about a few apps can hide the rest of the installed
//! apps from registry lookups. The restriction is lifted when the guard is
//! dropped, even if the test panics.
//!
//! ## Example
//!
//! ```
//! use django_rs_test::{AvailableApps, TestApp, TestApps};
//!
//! let apps = TestApps::new()
//!     .install(TestApp::new("blog").models(&["Post"]))
//!     .install(TestApp::new("shop").models(&["Order"]))
//!     .build();
//!
//! {
//!     let _guard = AvailableApps::set(&apps, ["blog"]).unwrap();
//!     assert!(apps.get_app_config("shop", false).is_err());
//! }
//! assert!(apps.get_app_config("shop", false).is_ok());
//! ```

use django_rs_core::apps::AppRegistry;
use django_rs_core::DjangoResult;

/// Keeps an availability restriction active on a registry until dropped.
#[must_use = "the restriction is lifted as soon as the guard is dropped"]
pub struct AvailableApps<'a> {
    registry: &'a AppRegistry,
}

impl<'a> AvailableApps<'a> {
    /// Restricts `registry` to `available`.
    ///
    /// Fails if a restriction is already active or if a name is not an
    /// installed app.
    pub fn set<I, S>(registry: &'a AppRegistry, available: I) -> DjangoResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        registry.set_available_apps(available)?;
        tracing::debug!("Restricted available apps for a test");
        Ok(Self { registry })
    }

    /// The registry this guard restricts.
    pub const fn registry(&self) -> &'a AppRegistry {
        self.registry
    }
}

impl Drop for AvailableApps<'_> {
    fn drop(&mut self) {
        self.registry.unset_available_apps();
    }
}

/// Runs `f` with `registry` restricted to `available`.
pub fn with_available_apps<I, S, F, R>(registry: &AppRegistry, available: I, f: F) -> DjangoResult<R>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
    F: FnOnce() -> R,
{
    let _guard = AvailableApps::set(registry, available)?;
    Ok(f())
}
