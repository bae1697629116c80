//! Device-side identifiers: keycodes, API-level gates, and the
//! `io.appium.settings` companion app surface.
//!
//! The settings helper exposes broadcast receivers for state that `adb`
//! cannot reach directly (clipboard, notifications, SMS, locale, location,
//! WiFi/data on real devices). Receiver components and action names are
//! fixed by the app's manifest and must match it exactly.

/// Android key event codes used by the input surface.
pub mod keycodes {
    pub const BACK: u32 = 4;
    pub const DEL: u32 = 67;
    pub const ESCAPE: u32 = 111;
    pub const FORWARD_DEL: u32 = 112;
}

/// API levels at which device behavior changes.
pub mod api {
    /// `am start -S` is understood.
    pub const STOP_APP_FLAG: u32 = 15;
    /// Runtime permissions, `monkey` activation, `persist.sys.locale`.
    pub const RUNTIME_PERMISSIONS: u32 = 23;
    /// Toybox `ps` with stable columns.
    pub const TOYBOX_PS: u32 = 24;
    /// `su -c` without an explicit uid; `am start-foreground-service`.
    pub const MODERN_SU: u32 = 26;
    /// Clipboard reads must run inside an IME context.
    pub const IME_CLIPBOARD: u32 = 29;
    /// `cmd connectivity|wifi|phone` toggles; last level where
    /// `dumpsys window windows` reports the focused app.
    pub const CMD_SERVICES: u32 = 30;
}

/// The on-device settings helper app.
pub mod settings_app {
    pub const PACKAGE: &str = "io.appium.settings";
    pub const MAIN_ACTIVITY: &str = "io.appium.settings/.Settings";
    pub const LOCATION_SERVICE: &str = "io.appium.settings/.LocationService";

    pub const WIFI_RECEIVER: &str = "io.appium.settings/.receivers.WiFiConnectionSettingReceiver";
    pub const WIFI_ACTION: &str = "io.appium.settings.wifi";
    pub const DATA_RECEIVER: &str = "io.appium.settings/.receivers.DataConnectionSettingReceiver";
    pub const DATA_ACTION: &str = "io.appium.settings.data_connection";
    pub const ANIMATION_RECEIVER: &str = "io.appium.settings/.receivers.AnimationSettingReceiver";
    pub const ANIMATION_ACTION: &str = "io.appium.settings.animation";
    pub const LOCALE_RECEIVER: &str = "io.appium.settings/.receivers.LocaleSettingReceiver";
    pub const LOCALE_ACTION: &str = "io.appium.settings.locale";
    pub const LOCATION_RECEIVER: &str = "io.appium.settings/.receivers.LocationInfoReceiver";
    pub const LOCATION_ACTION: &str = "io.appium.settings.location";
    pub const CLIPBOARD_RECEIVER: &str = "io.appium.settings/.receivers.ClipboardReceiver";
    pub const CLIPBOARD_ACTION: &str = "io.appium.settings.clipboard.get";
    pub const NOTIFICATIONS_ACTION: &str = "io.appium.settings.notifications";
    pub const SMS_RECEIVER: &str = "io.appium.settings/.receivers.SmsReader";
    pub const SMS_ACTION: &str = "io.appium.settings.sms.read";
    pub const MEDIA_SCAN_RECEIVER: &str = "io.appium.settings/.receivers.MediaScannerReceiver";
    pub const MEDIA_SCAN_ACTION: &str = "io.appium.settings.scan_media";

    /// Companion input methods shipped with the helper.
    pub const APPIUM_IME: &str = "io.appium.settings/.AppiumIME";
    pub const UNICODE_IME: &str = "io.appium.settings/.UnicodeIME";

    /// Logcat tag of the helper's location tracker.
    pub const LOCATION_TRACKER_TAG: &str = "LocationTracker";

    /// Lines that signal a completed location-cache refresh.
    pub const LOCATION_TRACKER_MARKERS: [&str; 2] = [
        "The location has been successfully received",
        "Successfully registered the location listener",
    ];
}

/// `settings` namespaces.
pub mod settings_ns {
    pub const GLOBAL: &str = "global";
    pub const SECURE: &str = "secure";
    pub const SYSTEM: &str = "system";
}

/// Hidden-API policy keys in the `global` namespace.
pub const HIDDEN_API_POLICY_KEYS: [&str; 3] = [
    "hidden_api_policy_pre_p_apps",
    "hidden_api_policy_p_apps",
    "hidden_api_policy",
];
