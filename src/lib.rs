//! Droidbridge - host-side toolkit for driving Android devices and
//! emulators through `adb` and the adjacent SDK tools.
//!
//! The library is consumed by higher-level automation (UI test servers,
//! device farms) to install, sign, launch, query, monitor, and manipulate
//! applications and device state. It speaks only to the `adb` binary and
//! the SDK command-line tools; the ADB wire protocol itself stays out of
//! scope.
//!
//! # Architecture Overview
//!
//! - [`session`] - The [`Session`] type: one logical attachment to one
//!   device, carrying the command surface (app lifecycle, processes,
//!   permissions, settings, input, screen, filesystem, system, helper IPC)
//! - [`logcat`] - Long-lived `adb logcat` streamer with a parsed ring
//!   buffer and listener fanout
//! - [`signing`] - APK zip-align / sign / verify pipeline with a
//!   content-addressed signature cache
//! - [`tools`] - SDK binary, JDK tool, and bundled-resource resolution
//! - [`models`] - Core data structures and the crate error type
//! - [`utils`] - Command execution (trait-abstracted for mocking) and
//!   logging setup
//! - [`constants`] - Tool names, subcommand strings, timeouts, limits
//!
//! # Usage
//!
//! ```no_run
//! use droidbridge::session::{Session, SessionOptions};
//!
//! # async fn example() -> droidbridge::Result<()> {
//! let session = Session::create(SessionOptions::new()).await?;
//! let api = session.api_level().await?;
//! println!("Connected to an API {api} device");
//! session.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod logcat;
pub mod models;
pub mod session;
pub mod signing;
pub mod tools;
pub mod utils;

pub use models::error::{BridgeError, BridgeResult};
pub use session::{Session, SessionOptions};

/// Crate-wide result alias.
pub type Result<T> = BridgeResult<T>;
