//! Logging integration for the django-rs framework.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and the span used while the app
//! registry is being populated.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level` (e.g. "debug", "info", "warn",
/// "error"). In debug mode a pretty, human-readable format is used; in production
/// a structured JSON format is used. Installing a second subscriber is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one population phase of the app registry.
///
/// `phase` is `"apps"` or `"models"`.
///
/// # Examples
///
/// ```
/// use django_rs_core::logging::population_span;
///
/// let span = population_span("models");
/// let _guard = span.enter();
/// tracing::debug!("importing models");
/// ```
pub fn population_span(phase: &str) -> tracing::Span {
    tracing::debug_span!("populate", phase = phase)
}
