//! Timeout and polling-interval table.

use std::time::Duration;

/// Default timeout for a single `adb` invocation.
pub const ADB_EXEC: Duration = Duration::from_secs(40);

/// Default timeout for `adb install`.
pub const INSTALL: Duration = Duration::from_secs(60);

/// Default timeout for `adb bugreport`.
pub const BUGREPORT: Duration = Duration::from_secs(120);

/// Default timeout for the settings-helper app to come up.
pub const SETTINGS_APP_START: Duration = Duration::from_secs(5);

/// Polling interval while rediscovering devices.
pub const DEVICE_POLL: Duration = Duration::from_millis(200);

/// Polling interval of the activity / process waiters.
pub const CONDITION_POLL: Duration = Duration::from_millis(500);

/// Polling interval while waiting for the soft keyboard to hide.
pub const KEYBOARD_POLL: Duration = Duration::from_millis(500);

/// Pause before retrying while the device is still authorizing.
pub const AUTHORIZING_PAUSE: Duration = Duration::from_secs(1);

/// Locale convergence: attempts and pause between them.
pub const LOCALE_TRIES: usize = 5;
pub const LOCALE_PAUSE: Duration = Duration::from_secs(1);
