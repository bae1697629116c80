//! Default values.

/// Default ADB server port.
pub const ADB_PORT: u16 = 5037;

/// Default ADB server host.
pub const ADB_HOST: &str = "127.0.0.1";

/// Ring buffer capacity of the logcat streamer.
pub const LOGCAT_BUFFER_SIZE: usize = 1000;

/// Logcat output format assumed by the line parser.
pub const LOGCAT_FORMAT: &str = "threadtime";

/// Bounded size of the process-wide signed-app cache.
pub const SIGNED_APP_CACHE_SIZE: usize = 30;

/// SHA-256 digest of the default `apksigner` test certificate.
pub const DEFAULT_CERT_DIGEST: &str =
    "a40da80a59d170caa950cf15c18c454d47a39b26989d8b640ecd745ba71bf5dc";

/// Bundled default signing key pair, relative to the resource root.
pub const DEFAULT_KEY: &str = "keys/testkey.pk8";
pub const DEFAULT_CERT: &str = "keys/testkey.x509.pem";

/// Number of transparent retries for recoverable `adb` failures.
pub const ADB_RETRY_COUNT: usize = 2;
