//! Crate-wide constants and configuration values.
//!
//! This module centralizes all constant values used throughout the library,
//! including tool names, adb/am/pm subcommand strings, environment variables,
//! default values, timeouts, and device-side identifiers.

pub mod android;
pub mod commands;
pub mod defaults;
pub mod env_vars;
pub mod limits;
pub mod timeouts;
