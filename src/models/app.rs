//! Option bags for application-lifecycle commands.

use std::time::Duration;

use crate::constants::timeouts;
use crate::models::error::{BridgeError, BridgeResult};

/// Options for [`crate::session::Session::install`].
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub timeout: Duration,
    /// `-t`: allow packages marked as test-only.
    pub allow_test_packages: bool,
    /// `-s`: install on the SD card.
    pub use_sdcard: bool,
    /// `-g`: grant all runtime permissions (API >= 23 only).
    pub grant_permissions: bool,
    /// `-r`: replace an existing application.
    pub replace: bool,
    /// `--no-incremental`: disable incremental installation.
    pub no_incremental: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            timeout: timeouts::INSTALL,
            allow_test_packages: false,
            use_sdcard: false,
            grant_permissions: false,
            replace: true,
            no_incremental: false,
        }
    }
}

impl InstallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_allow_test_packages(mut self, allow: bool) -> Self {
        self.allow_test_packages = allow;
        self
    }

    pub fn with_use_sdcard(mut self, use_sdcard: bool) -> Self {
        self.use_sdcard = use_sdcard;
        self
    }

    pub fn with_grant_permissions(mut self, grant: bool) -> Self {
        self.grant_permissions = grant;
        self
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_no_incremental(mut self, no_incremental: bool) -> Self {
        self.no_incremental = no_incremental;
        self
    }
}

/// Options for [`crate::session::Session::uninstall_apk`].
#[derive(Debug, Clone)]
pub struct UninstallOptions {
    pub timeout: Duration,
    /// `-k`: keep the data and cache directories.
    pub keep_data: bool,
}

impl Default for UninstallOptions {
    fn default() -> Self {
        Self {
            timeout: timeouts::ADB_EXEC,
            keep_data: false,
        }
    }
}

/// Options for [`crate::session::Session::start_app`].
///
/// At least one of `activity` / `action` is required. `wait_activity` may
/// contain `*` wildcards and comma-separated alternatives.
#[derive(Debug, Clone, Default)]
pub struct StartAppOptions {
    pub pkg: String,
    pub activity: Option<String>,
    pub action: Option<String>,
    pub category: Option<String>,
    pub flags: Option<String>,
    pub user: Option<String>,
    /// `-S`: force-stop the target app before starting the activity.
    pub stop_app: bool,
    /// `-W`: wait for the launch to complete.
    pub wait_for_launch: bool,
    pub wait_activity: Option<String>,
    pub wait_pkg: Option<String>,
    pub wait_duration: Option<Duration>,
    /// Extra intent arguments, e.g. `-e foo bar --ez baz true`.
    pub optional_intent_arguments: Option<String>,
}

impl StartAppOptions {
    pub fn new(pkg: impl Into<String>) -> Self {
        Self {
            pkg: pkg.into(),
            wait_for_launch: true,
            ..Self::default()
        }
    }

    pub fn with_activity(mut self, activity: impl Into<String>) -> Self {
        self.activity = Some(activity.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = Some(flags.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_stop_app(mut self, stop: bool) -> Self {
        self.stop_app = stop;
        self
    }

    pub fn with_wait_activity(mut self, pattern: impl Into<String>) -> Self {
        self.wait_activity = Some(pattern.into());
        self
    }

    pub fn with_wait_pkg(mut self, pkg: impl Into<String>) -> Self {
        self.wait_pkg = Some(pkg.into());
        self
    }

    pub fn with_wait_duration(mut self, duration: Duration) -> Self {
        self.wait_duration = Some(duration);
        self
    }

    pub fn with_optional_intent_arguments(mut self, args: impl Into<String>) -> Self {
        self.optional_intent_arguments = Some(args.into());
        self
    }

    /// `am start` needs a target: an explicit activity or an intent action.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.pkg.is_empty() {
            return Err(BridgeError::invalid_argument("pkg", "must not be empty"));
        }
        if self.activity.is_none() && self.action.is_none() {
            return Err(BridgeError::invalid_argument(
                "activity",
                "either an activity or an intent action is required",
            ));
        }
        Ok(())
    }
}

/// Focused application state reported by the window manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusedApp {
    pub app_package: String,
    /// Relative-normalized against `app_package` (shared prefix becomes `.`).
    pub app_activity: String,
}
