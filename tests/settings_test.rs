//! Settings, locale, permission, and helper-IPC flows over the mock.

use droidbridge::session::settings_app::SmsListOptions;

mod common;
use common::{base_mock, mock_session, SERIAL};

const PKG: &str = "io.appium.android.apis";

fn api_28_mock() -> droidbridge::utils::command_executor::mock::MockCommandExecutor {
    base_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
            "28\n",
        )
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "ro.build.version.release"],
            "9\n",
        )
}

#[tokio::test]
async fn locale_converges_and_follows_the_helper() {
    let mock = api_28_mock()
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "persist.sys.locale"],
            "en-US\n",
        )
        .with_success(
            "adb",
            &["-s", SERIAL, "shell", "getprop", "persist.sys.locale"],
            "fr-FR\n",
        )
        .with_success(
            "adb",
            &[
                "-s",
                SERIAL,
                "shell",
                "am",
                "broadcast",
                "-n",
                "io.appium.settings/.receivers.LocaleSettingReceiver",
                "-a",
                "io.appium.settings.locale",
                "--es",
                "lang",
                "fr",
                "--es",
                "country",
                "FR",
            ],
            "Broadcast completed: result=-1\n",
        );
    let session = mock_session(mock).await;

    assert!(session
        .ensure_current_locale(Some("en"), Some("US"), None)
        .await
        .unwrap());

    session
        .set_device_sys_locale_via_setting_app("fr", "FR", None)
        .await
        .unwrap();

    assert!(session
        .ensure_current_locale(Some("fr"), Some("FR"), None)
        .await
        .unwrap());
}

#[tokio::test]
async fn granted_permissions_are_extracted_from_the_package_dump() {
    let dump = "\
Packages:
  Package [io.appium.android.apis] (2e0ccfe):
    install permissions:
      android.permission.INTERNET: granted=true
      android.permission.READ_CONTACTS: granted=false
";
    let mock = api_28_mock().with_success(
        "adb",
        &["-s", SERIAL, "shell", "dumpsys", "package", PKG],
        dump,
    );
    let session = mock_session(mock).await;

    let granted = session.get_granted_permissions(PKG).await.unwrap();
    assert!(granted.contains(&"android.permission.INTERNET".to_string()));
    assert!(!granted.contains(&"android.permission.READ_CONTACTS".to_string()));
}

#[tokio::test]
async fn grant_is_a_noop_below_api_23() {
    let mock = base_mock().with_success(
        "adb",
        &["-s", SERIAL, "shell", "getprop", "ro.build.version.sdk"],
        "22\n",
    );
    let session = mock_session(mock.clone()).await;

    let granted = session
        .grant_permission(PKG, "android.permission.CAMERA")
        .await
        .unwrap();
    assert!(!granted);
    assert!(mock
        .call_history()
        .iter()
        .all(|(_, args)| !args.iter().any(|a| a == "grant")));
}

#[tokio::test]
async fn hidden_api_policy_is_batched_into_one_shell_call() {
    let mock = api_28_mock().with_success(
        "adb",
        &[
            "-s",
            SERIAL,
            "shell",
            "settings",
            "put",
            "global",
            "hidden_api_policy_pre_p_apps",
            "1",
            ";",
            "settings",
            "put",
            "global",
            "hidden_api_policy_p_apps",
            "1",
            ";",
            "settings",
            "put",
            "global",
            "hidden_api_policy",
            "1",
            ";",
        ],
        "",
    );
    let session = mock_session(mock).await;
    session.set_hidden_api_policy(1).await.unwrap();
}

#[tokio::test]
async fn geo_location_round_trip_through_the_helper() {
    let ps_output = "\
USER           PID  PPID     VSZ    RSS WCHAN            ADDR S NAME
u0_a123       2158  1249 5890840  38716 0                   0 S io.appium.settings
";
    let mock = api_28_mock()
        .with_success("adb", &["-s", SERIAL, "shell", "ps", "-A"], ps_output)
        .with_success(
            "adb",
            &[
                "-s",
                SERIAL,
                "shell",
                "am",
                "broadcast",
                "-n",
                "io.appium.settings/.receivers.LocationInfoReceiver",
                "-a",
                "io.appium.settings.location",
            ],
            "Broadcast completed: result=-1, data=\"7.76 49.3 12.0\"\n",
        );
    let session = mock_session(mock).await;

    let location = session.get_geo_location().await.unwrap();
    assert_eq!(location.longitude, 7.76);
    assert_eq!(location.latitude, 49.3);
    assert_eq!(location.altitude, Some(12.0));
}

#[tokio::test]
async fn sms_list_parses_the_json_payload() {
    let ps_output = "\
USER           PID  PPID     VSZ    RSS WCHAN            ADDR S NAME
u0_a123       2158  1249 5890840  38716 0                   0 S io.appium.settings
";
    let payload = r#"{"items":[]}"#;
    let broadcast = format!("Broadcast completed: result=-1, data=\"{payload}\"\n");
    let mock = api_28_mock()
        .with_success("adb", &["-s", SERIAL, "shell", "ps", "-A"], ps_output)
        .with_success(
            "adb",
            &[
                "-s",
                SERIAL,
                "shell",
                "am",
                "broadcast",
                "-n",
                "io.appium.settings/.receivers.SmsReader",
                "-a",
                "io.appium.settings.sms.read",
                "--es",
                "max",
                "10",
            ],
            &broadcast,
        );
    let session = mock_session(mock).await;

    let sms = session
        .get_sms_list(&SmsListOptions { max: 10 })
        .await
        .unwrap();
    assert!(sms.get("items").is_some());
}
