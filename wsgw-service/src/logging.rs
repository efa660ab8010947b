//! Tracing subscriber installation.
//!
//! The log level comes from `LOG_LEVEL` (`debug` or `info`, defaulting to
//! `info`); `APP_ENV=development` additionally records the emitting file and
//! line on every event.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Subsequent calls are no-ops so test binaries may call this freely.
pub fn install_tracing() {
    let level = match std::env::var("LOG_LEVEL").as_deref() {
        Ok("debug") => "debug",
        _ => "info",
    };
    let filter = EnvFilter::new(level);
    let development = std::env::var("APP_ENV").is_ok_and(|env| env == "development");

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(development)
        .with_line_number(development);
    if subscriber.try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
