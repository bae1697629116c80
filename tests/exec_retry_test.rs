//! Transient-failure recovery of the adb execution layer.

use droidbridge::utils::command_executor::mock::MockCommandExecutor;
use droidbridge::BridgeError;

mod common;
use common::{base_mock, mock_session, SERIAL};

#[tokio::test]
async fn device_dropout_is_rediscovered_and_retried() {
    let mock = base_mock()
        .with_failure(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
            1,
            "error: device not found",
        )
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
            "27\n",
        );
    let session = mock_session(mock.clone()).await;

    assert_eq!(session.api_level().await.unwrap(), 27);

    // One failed attempt, one successful retry, and a single memoized level.
    let getprop_calls = mock
        .call_history()
        .iter()
        .filter(|(_, args)| args.iter().any(|a| a == "ro.build.version.sdk"))
        .count();
    assert_eq!(getprop_calls, 2);
    assert_eq!(session.api_level().await.unwrap(), 27);
    let after_memo = mock
        .call_history()
        .iter()
        .filter(|(_, args)| args.iter().any(|a| a == "ro.build.version.sdk"))
        .count();
    assert_eq!(after_memo, 2, "memoized level must not re-read the device");
}

#[tokio::test]
async fn protocol_fault_bounces_the_server_before_retry() {
    let mock = base_mock()
        .with_success("adb", &["kill-server"], "")
        .with_success("adb", &["start-server"], "")
        .with_failure(
            "adb",
            &["-s", SERIAL, "shell", "echo", "ping"],
            1,
            "adb server version mismatch; protocol fault (no status)",
        )
        .with_success("adb", &["-s", SERIAL, "shell", "echo", "ping"], "ping\n");
    let session = mock_session(mock.clone()).await;

    let result = session
        .shell(&["echo", "ping"], &session.exec_options())
        .await
        .unwrap();
    assert_eq!(result.stdout_trimmed(), "ping");

    let verbs: Vec<String> = mock
        .call_history()
        .iter()
        .filter_map(|(_, args)| args.first().cloned())
        .collect();
    assert!(verbs.iter().any(|v| v == "kill-server"));
    assert!(verbs.iter().any(|v| v == "start-server"));
}

#[tokio::test]
async fn still_authorizing_pauses_and_retries() {
    let mock = base_mock()
        .with_failure(
            "adb",
            &["-s", SERIAL, "shell", "echo", "ping"],
            1,
            "error: device still authorizing",
        )
        .with_success("adb", &["-s", SERIAL, "shell", "echo", "ping"], "ping\n");
    let session = mock_session(mock).await;

    let result = session
        .shell(&["echo", "ping"], &session.exec_options())
        .await
        .unwrap();
    assert_eq!(result.stdout_trimmed(), "ping");
}

#[tokio::test]
async fn other_failures_surface_without_retry() {
    let mock = base_mock().with_failure(
        "adb",
        &["-s", SERIAL, "shell", "echo", "ping"],
        1,
        "error: closed",
    );
    let session = mock_session(mock.clone()).await;

    let err = session
        .shell(&["echo", "ping"], &session.exec_options())
        .await
        .unwrap_err();
    match err {
        BridgeError::ExecFailure {
            exit_code, stderr, ..
        } => {
            assert_eq!(exit_code, 1);
            assert!(stderr.contains("error: closed"));
        }
        other => panic!("expected ExecFailure, got {other:?}"),
    }

    let shell_calls = mock
        .call_history()
        .iter()
        .filter(|(_, args)| args.iter().any(|a| a == "echo"))
        .count();
    assert_eq!(shell_calls, 1, "non-transient failures must not retry");
}

#[tokio::test]
async fn retries_are_bounded() {
    // Three transient failures in a row exhaust the retry budget.
    let mock = base_mock()
        .with_failure(
            "adb",
            &["-s", SERIAL, "shell", "echo", "ping"],
            1,
            "error: device still authorizing",
        )
        .with_failure(
            "adb",
            &["-s", SERIAL, "shell", "echo", "ping"],
            1,
            "error: device still authorizing",
        )
        .with_failure(
            "adb",
            &["-s", SERIAL, "shell", "echo", "ping"],
            1,
            "error: device still authorizing",
        );
    let session = mock_session(mock.clone()).await;

    let err = session
        .shell(&["echo", "ping"], &session.exec_options())
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ExecFailure { .. }));

    let shell_calls = mock
        .call_history()
        .iter()
        .filter(|(_, args)| args.iter().any(|a| a == "echo"))
        .count();
    assert_eq!(shell_calls, 3, "two retries on top of the initial attempt");
}

#[tokio::test]
async fn shell_chunks_batches_by_command_length() {
    let mock = base_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
            "27\n",
        )
        .with_success_prefix("adb", &["-s", SERIAL, "shell", "rm"], "");
    let session = mock_session(mock.clone()).await;

    // 15 paths of ~90 characters each exceed one 1024-byte shell line.
    let items: Vec<String> = (0..15)
        .map(|i| format!("/data/local/tmp/some-deeply/nested/scratch/directory/with-long-components/file-{i:04}.tmp"))
        .collect();
    session
        .shell_chunks(
            |item| vec!["rm".to_string(), "-f".to_string(), item.to_string()],
            &items,
        )
        .await
        .unwrap();

    let rm_batches = mock
        .call_history()
        .iter()
        .filter(|(_, args)| args.iter().any(|a| a == "rm"))
        .count();
    assert!(rm_batches >= 2, "items must span multiple shell batches");

    // Items appear in order across batches.
    let all_args: Vec<String> = mock
        .call_history()
        .iter()
        .flat_map(|(_, args)| args.clone())
        .filter(|a| a.ends_with(".tmp"))
        .collect();
    let mut sorted = all_args.clone();
    sorted.sort();
    assert_eq!(all_args, sorted);
    assert_eq!(all_args.len(), 15);
}

#[tokio::test]
async fn linker_warnings_are_stripped_from_stdout() {
    let mock = base_mock().with_success(
        "adb",
        &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
        "WARNING: linker: libdvm.so has text relocations. This is wasting memory.\n27\n",
    );
    let session = mock_session(mock).await;
    assert_eq!(session.api_level().await.unwrap(), 27);
}
