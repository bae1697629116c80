//! Logging utilities
//!
//! Application-wide logging configuration built on env_logger. The library
//! itself only emits through the `log` facade; embedding applications that
//! have no logger of their own can call [`setup_logger`] once.

use std::str::FromStr;

use log::LevelFilter;

use crate::models::error::{BridgeError, BridgeResult};

/// Sets up the global logger with the specified log level.
///
/// Initializes env_logger with formatting that omits module paths and
/// targets for cleaner output. The `RUST_LOG` environment variable still
/// takes precedence over `level`.
///
/// Calling this twice in one process fails, as does initializing it when
/// the embedding application already installed a logger.
pub fn setup_logger(level: &str) -> BridgeResult<()> {
    let log_level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .map_err(|e| BridgeError::other(format!("Logger already initialized: {e}")))
}
