//! Command line tools and executables.

/// Android SDK command-line tools
pub const ADB: &str = "adb";
pub const ZIPALIGN: &str = "zipalign";
pub const AAPT: &str = "aapt";
pub const AAPT2: &str = "aapt2";
pub const ANDROID: &str = "android";

/// JDK tools (resolved under `$JAVA_HOME`)
pub const JAVA: &str = "java";
pub const KEYTOOL: &str = "keytool";
pub const JARSIGNER: &str = "jarsigner";

/// Bundled jars looked up inside build-tools / the resource tree
pub const APKSIGNER_JAR: &str = "apksigner.jar";
pub const BUNDLETOOL_JAR: &str = "bundletool.jar";

/// ADB subcommands and arguments
pub mod adb {
    pub const DEVICES: &str = "devices";
    pub const SHELL: &str = "shell";
    pub const INSTALL: &str = "install";
    pub const UNINSTALL: &str = "uninstall";
    pub const PUSH: &str = "push";
    pub const PULL: &str = "pull";
    pub const EMU: &str = "emu";
    pub const EXEC_OUT: &str = "exec-out";
    pub const LOGCAT: &str = "logcat";
    pub const VERSION: &str = "version";
    pub const FEATURES: &str = "features";
    pub const REBOOT: &str = "reboot";
    pub const ROOT: &str = "root";
    pub const UNROOT: &str = "unroot";
    pub const BUGREPORT: &str = "bugreport";
    pub const KILL_SERVER: &str = "kill-server";
    pub const START_SERVER: &str = "start-server";
    pub const WAIT_FOR_DEVICE: &str = "wait-for-device";

    pub const HOST_ARG: &str = "-H";
    pub const PORT_ARG: &str = "-P";
    pub const SERIAL_ARG: &str = "-s";

    // System properties
    pub const GETPROP: &str = "getprop";
    pub const SETPROP: &str = "setprop";
    pub const PROP_API_LEVEL: &str = "ro.build.version.sdk";
    pub const PROP_RELEASE: &str = "ro.build.version.release";
    pub const PROP_MODEL: &str = "ro.product.model";
    pub const PROP_MANUFACTURER: &str = "ro.product.manufacturer";
    pub const PROP_BOOT_COMPLETED: &str = "sys.boot_completed";
    pub const PROP_LOCALE: &str = "persist.sys.locale";
    pub const PROP_LANGUAGE: &str = "persist.sys.language";
    pub const PROP_COUNTRY: &str = "persist.sys.country";
}

/// Activity manager (`am`) subcommands
pub mod am {
    pub const AM: &str = "am";
    pub const START: &str = "start";
    pub const START_SERVICE: &str = "startservice";
    pub const START_FG_SERVICE: &str = "start-foreground-service";
    pub const BROADCAST: &str = "broadcast";
    pub const FORCE_STOP: &str = "force-stop";

    pub const WAIT_ARG: &str = "-W";
    pub const COMPONENT_ARG: &str = "-n";
    pub const ACTION_ARG: &str = "-a";
    pub const CATEGORY_ARG: &str = "-c";
    pub const FLAGS_ARG: &str = "-f";
    pub const DATA_ARG: &str = "-d";
    pub const USER_ARG: &str = "--user";
    pub const STOP_ARG: &str = "-S";
    pub const ES_ARG: &str = "--es";
    pub const EZ_ARG: &str = "--ez";
    pub const EXTRA_ARG: &str = "-e";
}

/// Package manager (`pm`) subcommands
pub mod pm {
    pub const PM: &str = "pm";
    pub const INSTALL: &str = "install";
    pub const LIST: &str = "list";
    pub const PACKAGES: &str = "packages";
    pub const GRANT: &str = "grant";
    pub const REVOKE: &str = "revoke";
    pub const CLEAR: &str = "clear";
}

/// Shell utilities invoked on the device
pub mod shell {
    pub const DUMPSYS: &str = "dumpsys";
    pub const SETTINGS: &str = "settings";
    pub const CMD: &str = "cmd";
    pub const INPUT: &str = "input";
    pub const IME: &str = "ime";
    pub const MONKEY: &str = "monkey";
    pub const WM: &str = "wm";
    pub const PS: &str = "ps";
    pub const KILL: &str = "kill";
    pub const SU: &str = "su";
    pub const SCREENCAP: &str = "screencap";
    pub const SCREENRECORD: &str = "screenrecord";
}

/// `apksigner` / `jarsigner` / `zipalign` arguments
pub mod signing {
    pub const SIGN: &str = "sign";
    pub const VERIFY: &str = "verify";
    pub const PRINT_CERTS: &str = "--print-certs";
    pub const KEY_ARG: &str = "--key";
    pub const CERT_ARG: &str = "--cert";
    pub const KS_ARG: &str = "--ks";
    pub const KS_KEY_ALIAS_ARG: &str = "--ks-key-alias";
    pub const KS_PASS_ARG: &str = "--ks-pass";
    pub const KEY_PASS_ARG: &str = "--key-pass";

    /// Required zip alignment page size
    pub const ALIGNMENT: &str = "4";
    pub const CHECK_ARG: &str = "-c";
    pub const FORCE_ARG: &str = "-f";

    /// JVM sizing used for apksigner invocations
    pub const JVM_MAX_HEAP: &str = "-Xmx1024M";
    pub const JVM_STACK: &str = "-Xss1m";
    pub const JAR_ARG: &str = "-jar";
}

/// `bundletool` subcommands
pub mod bundletool {
    pub const INSTALL_APKS: &str = "install-apks";
    pub const ADB_ARG: &str = "--adb";
    pub const APKS_ARG: &str = "--apks";
    pub const DEVICE_ID_ARG: &str = "--device-id";
}
