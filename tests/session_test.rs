//! Session bootstrap and device-fact tests against the mock executor.

use std::time::Duration;

use droidbridge::models::device::DeviceState;
use droidbridge::session::SessionOptions;
use droidbridge::utils::command_executor::mock::MockCommandExecutor;
use droidbridge::BridgeError;

mod common;
use common::{base_mock, mock_session, mock_session_with_options, SERIAL};

#[tokio::test]
async fn bootstrap_selects_the_only_usable_device() {
    let session = mock_session(base_mock()).await;
    assert_eq!(session.serial().as_deref(), Some(SERIAL));
    assert_eq!(session.default_args(), vec!["-s", SERIAL]);

    let devices = session.get_connected_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].state, DeviceState::Device);
}

#[tokio::test]
async fn bootstrap_leaves_multiple_devices_unselected() {
    let mock = MockCommandExecutor::new().with_success(
        "adb",
        &["devices"],
        "List of devices attached\nemulator-5554\tdevice\nR58M123ABC\tdevice\n",
    );
    let session = mock_session(mock).await;
    assert_eq!(session.serial(), None);
}

#[tokio::test]
async fn unauthorized_devices_are_not_usable() {
    let mock = MockCommandExecutor::new().with_success(
        "adb",
        &["devices"],
        "List of devices attached\nR58M123ABC\tunauthorized\n",
    );
    let session = mock_session(mock).await;
    assert_eq!(session.serial(), None);

    let err = session
        .get_devices_with_retry(Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected));
}

#[tokio::test]
async fn host_and_port_prepend_the_arg_prefix() {
    let mock = MockCommandExecutor::new().with_success(
        "adb",
        &["devices"],
        common::single_device_output(),
    );
    let options = SessionOptions::new()
        .with_adb_host("192.168.1.20")
        .with_adb_port(5038);
    let session = mock_session_with_options(mock, options).await;
    assert_eq!(
        session.default_args(),
        vec!["-H", "192.168.1.20", "-P", "5038", "-s", SERIAL]
    );
}

#[tokio::test]
async fn api_level_is_memoized() {
    let mock = base_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
            "27\n",
        );
    let session = mock_session(mock.clone()).await;

    assert_eq!(session.api_level().await.unwrap(), 27);
    assert_eq!(session.api_level().await.unwrap(), 27);

    let getprop_calls = mock
        .call_history()
        .iter()
        .filter(|(_, args)| args.iter().any(|a| a == "ro.build.version.sdk"))
        .count();
    assert_eq!(getprop_calls, 1, "the API level must be read exactly once");
}

#[tokio::test]
async fn preview_release_bumps_the_api_level() {
    let mock = base_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
            "28\n",
        )
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.release"],
            "Q\n",
        );
    let session = mock_session(mock).await;
    assert_eq!(session.api_level().await.unwrap(), 29);
}

#[tokio::test]
async fn release_number_does_not_bump() {
    let mock = base_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
            "28\n",
        )
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.release"],
            "9\n",
        );
    let session = mock_session(mock).await;
    assert_eq!(session.api_level().await.unwrap(), 28);
}

#[tokio::test]
async fn version_and_streaming_support() {
    let mock = base_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "version"],
            "Android Debug Bridge version 1.0.41\nVersion 34.0.4-10411341\n",
        )
        .with_success("adb", &["-s", SERIAL, "features"], "shell_v2\ncmd\nstat_v2\n");
    let session = mock_session(mock).await;

    let version = session.get_version().await.unwrap();
    assert_eq!(version.bridge, (1, 0, 41));
    assert!(session.is_streamed_install_supported().await.unwrap());
}

#[tokio::test]
async fn streaming_needs_the_cmd_feature() {
    let mock = base_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "version"],
            "Android Debug Bridge version 1.0.41\n",
        )
        .with_success("adb", &["-s", SERIAL, "features"], "shell_v2\nstat_v2\n");
    let session = mock_session(mock).await;
    assert!(!session.is_streamed_install_supported().await.unwrap());
}

#[tokio::test]
async fn suppressed_restart_skips_the_server_bounce() {
    let mock = base_mock();
    let options = SessionOptions::new().with_suppress_kill_server(true);
    let session = mock_session_with_options(mock.clone(), options).await;

    session.restart_adb().await.unwrap();
    assert!(mock
        .call_history()
        .iter()
        .all(|(_, args)| !args.iter().any(|a| a == "kill-server")));
}

#[tokio::test]
async fn restart_bounces_the_server() {
    let mock = base_mock()
        .with_success("adb", &["kill-server"], "")
        .with_success("adb", &["start-server"], "* daemon started successfully *\n");
    let session = mock_session(mock.clone()).await;

    session.restart_adb().await.unwrap();
    let history = mock.call_history();
    let verbs: Vec<&str> = history
        .iter()
        .filter_map(|(_, args)| args.first().map(String::as_str))
        .collect();
    assert!(verbs.contains(&"kill-server"));
    assert!(verbs.contains(&"start-server"));
}

#[tokio::test]
async fn logcat_requires_a_selected_device() {
    let mock = MockCommandExecutor::new().with_success(
        "adb",
        &["devices"],
        "List of devices attached\n",
    );
    let session = mock_session(mock).await;
    let err = session
        .start_logcat(droidbridge::logcat::LogcatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::NotConnected));
}
