//! Data models

pub mod app;
pub mod device;
pub mod error;
pub mod exec;
pub mod keystore;
pub mod log_entry;

pub use app::{FocusedApp, InstallOptions, StartAppOptions, UninstallOptions};
pub use device::{DeviceEntry, DeviceState};
pub use error::{BridgeError, BridgeResult};
pub use exec::{ExecOptions, ExecResult, RawOutput};
pub use keystore::{KeystoreConfig, KeystoreHash};
pub use log_entry::{LogEntry, LogLevel};
