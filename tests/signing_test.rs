//! Signing-pipeline behavior: verification caching and zip alignment.
//!
//! The SDK and JDK trees are faked on disk so the tool resolver finds real
//! paths; the tools themselves are answered by the mock executor.

use std::path::PathBuf;
use std::sync::Once;

use droidbridge::models::keystore::KeystoreConfig;
use droidbridge::session::SessionOptions;
use droidbridge::signing::CheckCertOptions;

mod common;
use common::{base_mock, mock_session, mock_session_with_options};

const DEFAULT_DIGEST: &str = "a40da80a59d170caa950cf15c18c454d47a39b26989d8b640ecd745ba71bf5dc";

static FAKE_TOOLS: Once = Once::new();

/// Lays out a fake SDK + JDK and points the environment at them. The
/// directories leak deliberately so every test in this binary sees the
/// same stable paths.
fn setup_fake_tools() -> (PathBuf, PathBuf) {
    FAKE_TOOLS.call_once(|| {
        let sdk = tempfile::tempdir().unwrap().keep();
        let jdk = tempfile::tempdir().unwrap().keep();

        let build_tools = sdk.join("build-tools").join("34.0.0");
        std::fs::create_dir_all(build_tools.join("lib")).unwrap();
        std::fs::write(build_tools.join("zipalign"), b"").unwrap();
        std::fs::write(build_tools.join("lib").join("apksigner.jar"), b"").unwrap();

        std::fs::create_dir_all(jdk.join("bin")).unwrap();
        std::fs::write(jdk.join("bin").join("java"), b"").unwrap();
        std::fs::write(jdk.join("bin").join("keytool"), b"").unwrap();

        std::env::set_var("ANDROID_HOME", &sdk);
        std::env::set_var("JAVA_HOME", &jdk);
    });
    (
        PathBuf::from(std::env::var("ANDROID_HOME").unwrap()),
        PathBuf::from(std::env::var("JAVA_HOME").unwrap()),
    )
}

fn apksigner_jar(sdk: &std::path::Path) -> String {
    sdk.join("build-tools")
        .join("34.0.0")
        .join("lib")
        .join("apksigner.jar")
        .to_string_lossy()
        .into_owned()
}

#[tokio::test]
async fn verification_verdicts_are_cached_by_content_hash() {
    let (sdk, _jdk) = setup_fake_tools();

    let dir = tempfile::tempdir().unwrap();
    let apk = dir.path().join("cached.apk");
    std::fs::write(&apk, b"apk bytes for the cache test").unwrap();
    let apk_str = apk.to_string_lossy().into_owned();
    let jar = apksigner_jar(&sdk);

    let verify_output = format!(
        "Signer #1 certificate DN: CN=Android Debug\nSigner #1 certificate SHA-256 digest: {DEFAULT_DIGEST}\n"
    );
    let mock = base_mock().with_success(
        "java",
        &[
            "-Xmx1024M",
            "-Xss1m",
            "-jar",
            &jar,
            "verify",
            "--print-certs",
            &apk_str,
        ],
        &verify_output,
    );
    let session = mock_session(mock.clone()).await;

    assert!(session
        .check_apk_cert(&apk, "io.appium.fake", CheckCertOptions::default())
        .await
        .unwrap());
    assert!(session
        .check_apk_cert(&apk, "io.appium.fake", CheckCertOptions::default())
        .await
        .unwrap());

    let java_calls = mock.calls_for("java").len();
    assert_eq!(java_calls, 1, "the second verdict must come from the cache");

    // A different keystore configuration bypasses the cached verdict.
    let keytool_output = "\
Alias name: testkey
Certificate fingerprints:
\t SHA-256: DE:AD:BE:EF:DE:AD:BE:EF:DE:AD:BE:EF:DE:AD:BE:EF:DE:AD:BE:EF:DE:AD:BE:EF:DE:AD:BE:EF:DE:AD:BE:EF
";
    let keystore = KeystoreConfig {
        use_keystore: true,
        keystore_path: Some(PathBuf::from("/tmp/test.keystore")),
        key_alias: Some("testkey".to_string()),
        keystore_password: Some("storepass".to_string()),
        key_password: Some("keypass".to_string()),
    };
    let mock2 = base_mock()
        .with_success(
            "keytool",
            &[
                "-v",
                "-list",
                "-alias",
                "testkey",
                "-keystore",
                "/tmp/test.keystore",
                "-storepass",
                "storepass",
            ],
            keytool_output,
        )
        .with_success(
            "java",
            &[
                "-Xmx1024M",
                "-Xss1m",
                "-jar",
                &jar,
                "verify",
                "--print-certs",
                &apk_str,
            ],
            &verify_output,
        );
    let keystore_session =
        mock_session_with_options(mock2.clone(), SessionOptions::new().with_keystore(keystore))
            .await;

    let verdict = keystore_session
        .check_apk_cert(&apk, "io.appium.fake", CheckCertOptions::default())
        .await
        .unwrap();
    assert!(!verdict, "the default cert does not match the keystore");
    assert_eq!(
        mock2.calls_for("java").len(),
        1,
        "the cache entry for another keystore must be bypassed"
    );
}

#[tokio::test]
async fn unsigned_apk_is_reported_not_errored() {
    let (sdk, _jdk) = setup_fake_tools();

    let dir = tempfile::tempdir().unwrap();
    let apk = dir.path().join("unsigned.apk");
    std::fs::write(&apk, b"unsigned bytes").unwrap();
    let apk_str = apk.to_string_lossy().into_owned();
    let jar = apksigner_jar(&sdk);

    let mock = base_mock().with_failure(
        "java",
        &[
            "-Xmx1024M",
            "-Xss1m",
            "-jar",
            &jar,
            "verify",
            "--print-certs",
            &apk_str,
        ],
        1,
        "DOES NOT VERIFY\nERROR: JAR signer does not exist",
    );
    let session = mock_session(mock).await;

    assert!(!session
        .check_apk_cert(&apk, "io.appium.fake", CheckCertOptions::default())
        .await
        .unwrap());
}

#[tokio::test]
async fn missing_file_is_unsigned() {
    setup_fake_tools();
    let session = mock_session(base_mock()).await;
    assert!(!session
        .check_apk_cert(
            std::path::Path::new("/nonexistent/missing.apk"),
            "pkg",
            CheckCertOptions::default()
        )
        .await
        .unwrap());
}

#[tokio::test]
async fn properties_init_race_counts_as_signed() {
    let (sdk, _jdk) = setup_fake_tools();

    let dir = tempfile::tempdir().unwrap();
    let apk = dir.path().join("racy.apk");
    std::fs::write(&apk, b"racy bytes").unwrap();
    let apk_str = apk.to_string_lossy().into_owned();
    let jar = apksigner_jar(&sdk);

    let mock = base_mock().with_failure(
        "java",
        &[
            "-Xmx1024M",
            "-Xss1m",
            "-jar",
            &jar,
            "verify",
            "--print-certs",
            &apk_str,
        ],
        1,
        "Exception in thread \"main\" java.lang.Error: Properties init: Could not determine current working directory.",
    );
    let session = mock_session(mock).await;

    assert!(session
        .check_apk_cert(&apk, "io.appium.fake", CheckCertOptions::default())
        .await
        .unwrap());
}

#[tokio::test]
async fn zip_align_is_idempotent() {
    setup_fake_tools();

    let dir = tempfile::tempdir().unwrap();
    let apk = dir.path().join("align-me.apk");
    std::fs::write(&apk, b"unaligned archive bytes").unwrap();
    let apk_str = apk.to_string_lossy().into_owned();

    let mock = base_mock()
        // First check: not aligned; after the rewrite, aligned.
        .with_failure("zipalign", &["-c", "4", &apk_str], 1, "")
        .with_success("zipalign", &["-c", "4", &apk_str], "Verification successful\n")
        .with_success_prefix("zipalign", &["-f", "4", &apk_str], "");
    let session = mock_session(mock).await;

    assert!(session.zip_align_apk(&apk).await.unwrap());
    assert!(!session.zip_align_apk(&apk).await.unwrap());
}

#[tokio::test]
async fn zip_align_rejects_missing_files() {
    setup_fake_tools();
    let session = mock_session(base_mock()).await;
    let err = session
        .zip_align_apk(std::path::Path::new("/nonexistent/app.apk"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        droidbridge::BridgeError::InvalidArgument { .. }
    ));
}
