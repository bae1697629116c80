//! Shared helpers for mock-driven integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use droidbridge::session::{Session, SessionOptions};
use droidbridge::utils::command_executor::mock::MockCommandExecutor;

pub const SERIAL: &str = "emulator-5554";

/// Canonical `adb devices` output with one usable device attached.
pub fn single_device_output() -> &'static str {
    "List of devices attached\nemulator-5554\tdevice\n"
}

/// A mock pre-loaded with the device listing the session factory issues.
pub fn base_mock() -> MockCommandExecutor {
    MockCommandExecutor::new().with_success("adb", &["devices"], single_device_output())
}

/// Builds a session on top of the given mock. The `adb` location is pinned
/// so no SDK needs to be installed on the test host.
pub async fn mock_session(mock: MockCommandExecutor) -> Session {
    mock_session_with_options(mock, SessionOptions::new()).await
}

pub async fn mock_session_with_options(
    mock: MockCommandExecutor,
    options: SessionOptions,
) -> Session {
    let options = options.with_adb_path(PathBuf::from("adb"));
    Session::with_executor(options, Arc::new(mock))
        .await
        .expect("session bootstrap against the mock executor")
}
