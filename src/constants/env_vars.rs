//! Environment variable names consulted by the toolkit.

pub const ANDROID_HOME: &str = "ANDROID_HOME";
pub const ANDROID_SDK_ROOT: &str = "ANDROID_SDK_ROOT";
pub const JAVA_HOME: &str = "JAVA_HOME";
pub const PATH: &str = "PATH";

/// Overrides the bundled-resource root (signing keys, default certificates).
pub const DROIDBRIDGE_RESOURCES: &str = "DROIDBRIDGE_RESOURCES";
