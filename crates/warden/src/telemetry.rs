//! Logging setup.

use tracing_subscriber::{EnvFilter, fmt};

use crate::WardenError;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"info"`
/// or `"warden=debug,warden_lobby=debug"`) is used.
///
/// # Errors
/// [`WardenError::Telemetry`] if a global subscriber is already installed.
pub fn init(default_directive: &str) -> Result<(), WardenError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| WardenError::Telemetry(e.to_string()))
}
