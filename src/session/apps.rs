//! Application lifecycle commands.
//!
//! Installation, launch, and teardown of packages, plus the focused-activity
//! queries and waiters the launch path is built on. Argument composition for
//! `am start` follows the documented `am` CLI ordering.

use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::{sleep, Instant};

use crate::constants::commands::{adb, am, bundletool, pm, shell, BUNDLETOOL_JAR};
use crate::constants::{android, timeouts};
use crate::models::app::{FocusedApp, InstallOptions, StartAppOptions, UninstallOptions};
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::{ExecOptions, ExecResult};
use crate::session::Session;

lazy_static! {
    static ref INSTALL_FAILED_REGEX: Regex = Regex::new(r"(INSTALL_[A-Z_]+)").unwrap();
    // API <= 30: `mFocusedApp=AppWindowToken{... ActivityRecord{... u0 pkg/activity t12}}`
    static ref FOCUSED_APP_REGEX: Regex =
        Regex::new(r"mFocusedApp.+Record\{.*\s([^\s/}]+)/([^\s/},]+),?(\s[^\s/}]+)*\}").unwrap();
    static ref CURRENT_FOCUS_REGEX: Regex =
        Regex::new(r"mCurrentFocus.+\{.+\s([^\s/]+)/(\S+)\b").unwrap();
    // API > 30: `mResumedActivity: ActivityRecord{188adcc u0 pkg/activity t807}`
    static ref RESUMED_ACTIVITY_REGEX: Regex =
        Regex::new(r"mResumedActivity.+Record\{.*\s([^\s/}]+)/([^\s/}]+)").unwrap();
    static ref MAIN_ACTION_REGEX: Regex =
        Regex::new(r"android\.intent\.action\.MAIN:").unwrap();
}

/// Maps [`InstallOptions`] to `adb install` flags for the given API level.
/// `-g` only exists with runtime permissions; below API 23 it is dropped
/// with a warning.
pub fn build_install_args(api_level: u32, opts: &InstallOptions, streaming: bool) -> Vec<String> {
    let mut args = Vec::new();
    if opts.replace {
        args.push("-r".to_string());
    }
    if opts.allow_test_packages {
        args.push("-t".to_string());
    }
    if opts.use_sdcard {
        args.push("-s".to_string());
    }
    if opts.grant_permissions {
        if api_level >= android::api::RUNTIME_PERMISSIONS {
            args.push("-g".to_string());
        } else {
            log::warn!(
                "Dropping -g: runtime permissions are unsupported on API {api_level}"
            );
        }
    }
    if opts.no_incremental {
        args.push("--no-incremental".to_string());
    }
    if streaming {
        args.push("--streaming".to_string());
    }
    args
}

/// Parses an `optionalIntentArguments` string into an argv tail.
///
/// The grammar alternates `-flag` and `key [value]` segments: a flag may
/// stand alone, and a trailing `key [value]` belongs to the most recent
/// flag. Values wrapped in single or double quotes keep their spaces.
pub fn parse_intent_arguments(raw: &str) -> BridgeResult<Vec<String>> {
    let tokens = tokenize_quoted(raw);
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if !token.starts_with('-') {
            return Err(BridgeError::invalid_argument(
                "optional_intent_arguments",
                format!("expected a -flag before '{token}'"),
            ));
        }
        out.push(token.clone());
        i += 1;
        // key
        if i < tokens.len() && !tokens[i].starts_with('-') {
            out.push(tokens[i].clone());
            i += 1;
            // value
            if i < tokens.len() && !tokens[i].starts_with('-') {
                out.push(tokens[i].clone());
                i += 1;
            }
        }
    }
    Ok(out)
}

fn tokenize_quoted(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in raw.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Relative-normalizes an activity name against its package: a fully
/// qualified name sharing the package prefix becomes `.Suffix`.
pub fn normalize_activity(pkg: &str, activity: &str) -> String {
    if let Some(rest) = activity.strip_prefix(pkg) {
        if rest.starts_with('.') {
            return rest.to_string();
        }
    }
    activity.to_string()
}

fn qualify_activity(pkg: &str, activity: &str) -> String {
    if activity.starts_with('.') {
        format!("{pkg}{activity}")
    } else {
        activity.to_string()
    }
}

/// Compiles a waiter pattern (`*` globs, comma-separated alternatives) into
/// anchored matchers.
fn activity_matchers(pkg: &str, pattern: &str) -> BridgeResult<Vec<Regex>> {
    let mut matchers = Vec::new();
    for alternative in pattern.split(',') {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            continue;
        }
        let qualified = qualify_activity(pkg, alternative);
        let escaped = regex::escape(&qualified).replace(r"\*", ".*");
        matchers.push(Regex::new(&format!("^{escaped}$"))?);
    }
    if matchers.is_empty() {
        return Err(BridgeError::invalid_argument(
            "activity_pattern",
            "no usable alternatives",
        ));
    }
    Ok(matchers)
}

fn parse_focused_modern(output: &str) -> Option<FocusedApp> {
    RESUMED_ACTIVITY_REGEX.captures(output).map(|caps| FocusedApp {
        app_package: caps[1].to_string(),
        app_activity: normalize_activity(&caps[1], &caps[2]),
    })
}

fn parse_focused_legacy(output: &str) -> Option<FocusedApp> {
    FOCUSED_APP_REGEX
        .captures(output)
        .or_else(|| CURRENT_FOCUS_REGEX.captures(output))
        .map(|caps| FocusedApp {
            app_package: caps[1].to_string(),
            app_activity: normalize_activity(&caps[1], &caps[2]),
        })
}

impl Session {
    /// Installs an APK (or `.apks` bundle) located on the host.
    ///
    /// Concurrent installs from the same session are serialized; concurrent
    /// installs of the same package from different sessions remain the
    /// caller's responsibility.
    pub async fn install(&self, apk_path: &Path, opts: &InstallOptions) -> BridgeResult<()> {
        if apk_path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("apks"))
            .unwrap_or(false)
        {
            return self.install_apks(apk_path, opts).await;
        }

        let _guard = self.install_lock().lock().await;
        let api = self.api_level().await?;
        let streaming = self.is_streamed_install_supported().await.unwrap_or(false);
        let flags = build_install_args(api, opts, streaming);

        let path_str = apk_path.to_string_lossy();
        let mut args = vec![adb::INSTALL];
        args.extend(flags.iter().map(String::as_str));
        args.push(&path_str);

        let exec_opts = ExecOptions::default().with_timeout(opts.timeout);
        let result = self.adb_exec(&args, &exec_opts).await.map_err(map_install_error)?;
        check_install_output(&result)
    }

    /// Installs an `.apks` bundle through `bundletool`.
    pub async fn install_apks(&self, apks_path: &Path, opts: &InstallOptions) -> BridgeResult<()> {
        let serial = self
            .serial()
            .ok_or(BridgeError::NotConnected)?;
        let java = self.tools().java()?;
        let jar = self.tools().resource(BUNDLETOOL_JAR)?;

        let _guard = self.install_lock().lock().await;
        let jar_str = jar.to_string_lossy();
        let adb_arg = format!("{}={}", bundletool::ADB_ARG, self.adb_path().display());
        let apks_arg = format!("{}={}", bundletool::APKS_ARG, apks_path.display());
        let device_arg = format!("{}={}", bundletool::DEVICE_ID_ARG, serial);
        let args = [
            "-jar",
            jar_str.as_ref(),
            bundletool::INSTALL_APKS,
            adb_arg.as_str(),
            apks_arg.as_str(),
            device_arg.as_str(),
        ];
        let exec_opts = ExecOptions::default().with_timeout(opts.timeout);
        self.exec_tool(&java, &args, &exec_opts).await?;
        Ok(())
    }

    /// Installs an APK already present on the device.
    pub async fn install_from_device_path(
        &self,
        device_path: &str,
        opts: &InstallOptions,
    ) -> BridgeResult<()> {
        let exec_opts = ExecOptions::default().with_timeout(opts.timeout);
        let result = self
            .shell(&[pm::PM, pm::INSTALL, "-r", device_path], &exec_opts)
            .await
            .map_err(map_install_error)?;
        check_install_output(&result)
    }

    /// Uninstalls a package. Returns `true` on success, `false` when the
    /// package was not installed.
    pub async fn uninstall_apk(&self, pkg: &str, opts: &UninstallOptions) -> BridgeResult<bool> {
        // A running app can wedge the uninstall.
        if let Err(e) = self.force_stop(pkg).await {
            log::debug!("force-stop before uninstall failed: {e}");
        }

        let exec_opts = ExecOptions::default()
            .with_timeout(opts.timeout)
            .with_ignore_stderr(true);
        let mut args = vec![adb::UNINSTALL];
        if opts.keep_data {
            args.push("-k");
        }
        args.push(pkg);
        let result = self.adb_exec(&args, &exec_opts).await?;
        let combined = format!("{}\n{}", result.stdout, result.stderr);
        if combined.contains("Success") {
            return Ok(true);
        }
        log::info!("'{pkg}' was not uninstalled: {}", combined.trim());
        Ok(false)
    }

    /// True when the package is present on the device.
    pub async fn is_app_installed(&self, pkg: &str) -> BridgeResult<bool> {
        let result = self
            .shell_plain(&[pm::PM, pm::LIST, pm::PACKAGES, pkg])
            .await?;
        let needle = format!("package:{pkg}");
        Ok(result.stdout.lines().any(|line| line.trim() == needle))
    }

    /// Brings an installed application to the foreground.
    pub async fn activate_app(&self, pkg: &str) -> BridgeResult<()> {
        let api = self.api_level().await?;
        if api >= android::api::RUNTIME_PERMISSIONS {
            let result = self
                .shell_plain(&[
                    shell::MONKEY,
                    "-p",
                    pkg,
                    "-c",
                    "android.intent.category.LAUNCHER",
                    "1",
                ])
                .await?;
            if result.stdout.contains("No activities found") {
                return Err(BridgeError::other(format!(
                    "'{pkg}' has no launchable activity"
                )));
            }
            return Ok(());
        }

        let activity = self.resolve_launchable_activity(pkg).await?;
        let component = format!("{pkg}/{activity}");
        self.shell_plain(&[am::AM, am::START, am::COMPONENT_ARG, &component])
            .await?;
        Ok(())
    }

    /// Extracts the package's launcher activity from the `dumpsys package`
    /// activity resolver table.
    async fn resolve_launchable_activity(&self, pkg: &str) -> BridgeResult<String> {
        let result = self.shell_plain(&[shell::DUMPSYS, "package", pkg]).await?;
        let mut in_main_section = false;
        for line in result.stdout.lines() {
            if MAIN_ACTION_REGEX.is_match(line) {
                in_main_section = true;
                continue;
            }
            if in_main_section {
                if let Some(pos) = line.find(&format!("{pkg}/")) {
                    let tail = &line[pos + pkg.len() + 1..];
                    let activity: String = tail
                        .chars()
                        .take_while(|c| !c.is_whitespace())
                        .collect();
                    if !activity.is_empty() {
                        return Ok(activity);
                    }
                }
                if line.trim().is_empty() {
                    in_main_section = false;
                }
            }
        }
        Err(BridgeError::parse_failure(
            format!("dumpsys package {pkg}"),
            "a MAIN-action activity entry",
        ))
    }

    /// Starts an activity through `am start`.
    ///
    /// When `wait_activity` is set, follows the launch with
    /// [`Session::wait_for_activity`] against `wait_pkg` (defaulting to the
    /// launched package).
    pub async fn start_app(&self, opts: &StartAppOptions) -> BridgeResult<ExecResult> {
        opts.validate()?;
        let api = self.api_level().await?;

        let component;
        let mut args: Vec<&str> = vec![am::AM, am::START];
        if opts.wait_for_launch {
            args.push(am::WAIT_ARG);
        }
        if let Some(activity) = &opts.activity {
            component = format!("{}/{}", opts.pkg, activity);
            args.push(am::COMPONENT_ARG);
            args.push(&component);
        }
        if opts.stop_app && api >= android::api::STOP_APP_FLAG {
            args.push(am::STOP_ARG);
        }
        if let Some(action) = &opts.action {
            args.push(am::ACTION_ARG);
            args.push(action);
        }
        if let Some(category) = &opts.category {
            args.push(am::CATEGORY_ARG);
            args.push(category);
        }
        if let Some(flags) = &opts.flags {
            args.push(am::FLAGS_ARG);
            args.push(flags);
        }
        if let Some(user) = &opts.user {
            args.push(am::USER_ARG);
            args.push(user);
        }
        let intent_args = match &opts.optional_intent_arguments {
            Some(raw) => parse_intent_arguments(raw)?,
            None => Vec::new(),
        };
        args.extend(intent_args.iter().map(String::as_str));

        let result = self.shell_plain(&args).await?;
        if result.stdout.contains("Error:") {
            return Err(BridgeError::other(format!(
                "Activity start failed: {}",
                result.stdout.trim()
            )));
        }

        if let Some(pattern) = &opts.wait_activity {
            let wait_pkg = opts.wait_pkg.as_deref().unwrap_or(&opts.pkg);
            let duration = opts.wait_duration.unwrap_or(Duration::from_secs(20));
            self.wait_for_activity(wait_pkg, pattern, duration).await?;
        }
        Ok(result)
    }

    /// Opens a URI, optionally pinned to one package.
    pub async fn start_uri(&self, uri: &str, pkg: Option<&str>) -> BridgeResult<()> {
        let mut args = vec![
            am::AM,
            am::START,
            am::WAIT_ARG,
            am::ACTION_ARG,
            "android.intent.action.VIEW",
            am::DATA_ARG,
            uri,
        ];
        if let Some(pkg) = pkg {
            args.push(pkg);
        }
        self.shell_plain(&args).await?;
        Ok(())
    }

    pub async fn force_stop(&self, pkg: &str) -> BridgeResult<()> {
        self.shell_plain(&[am::AM, am::FORCE_STOP, pkg]).await?;
        Ok(())
    }

    /// `am kill`: stops the package's background processes only.
    pub async fn kill_package(&self, pkg: &str) -> BridgeResult<()> {
        self.shell_plain(&[am::AM, "kill", pkg]).await?;
        Ok(())
    }

    /// Clears the package's data and caches.
    pub async fn clear(&self, pkg: &str) -> BridgeResult<()> {
        let result = self.shell_plain(&[pm::PM, pm::CLEAR, pkg]).await?;
        if result.stdout.contains("Success") {
            Ok(())
        } else {
            Err(BridgeError::other(format!(
                "Failed to clear '{pkg}': {}",
                result.stdout.trim()
            )))
        }
    }

    pub async fn stop_and_clear(&self, pkg: &str) -> BridgeResult<()> {
        self.force_stop(pkg).await?;
        self.clear(pkg).await
    }

    /// The package and activity currently holding input focus.
    pub async fn get_focused_package_and_activity(&self) -> BridgeResult<FocusedApp> {
        let api = self.api_level().await?;
        if api <= android::api::CMD_SERVICES {
            let result = self
                .shell_plain(&[shell::DUMPSYS, "window", "windows"])
                .await?;
            return parse_focused_legacy(&result.stdout).ok_or_else(|| {
                BridgeError::parse_failure(
                    "dumpsys window windows",
                    "an mFocusedApp or mCurrentFocus record",
                )
            });
        }
        let result = self
            .shell_plain(&[shell::DUMPSYS, "activity", "activities"])
            .await?;
        parse_focused_modern(&result.stdout).ok_or_else(|| {
            BridgeError::parse_failure("dumpsys activity activities", "an mResumedActivity record")
        })
    }

    /// Waits until the focused activity matches `pattern`.
    pub async fn wait_for_activity(
        &self,
        pkg: &str,
        pattern: &str,
        timeout: Duration,
    ) -> BridgeResult<()> {
        self.wait_for_activity_or_not(pkg, pattern, false, timeout)
            .await
    }

    /// Waits until the focused activity no longer matches `pattern`.
    pub async fn wait_for_not_activity(
        &self,
        pkg: &str,
        pattern: &str,
        timeout: Duration,
    ) -> BridgeResult<()> {
        self.wait_for_activity_or_not(pkg, pattern, true, timeout)
            .await
    }

    /// Shared waiter: polls the focused activity until at least one
    /// alternative of `pattern` matches (or none does, with
    /// `wait_for_stop`), failing after `timeout`.
    pub async fn wait_for_activity_or_not(
        &self,
        pkg: &str,
        pattern: &str,
        wait_for_stop: bool,
        timeout: Duration,
    ) -> BridgeResult<()> {
        let matchers = activity_matchers(pkg, pattern)?;
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(focused) = self.get_focused_package_and_activity().await {
                let qualified = qualify_activity(&focused.app_package, &focused.app_activity);
                let with_pkg = format!("{}/{}", focused.app_package, qualified);
                let matched = matchers.iter().any(|m| {
                    if m.as_str().contains('/') {
                        m.is_match(&with_pkg)
                    } else {
                        m.is_match(&qualified)
                    }
                });
                if matched != wait_for_stop {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::timeout(
                    format!(
                        "waiting for activity '{pattern}' to {}",
                        if wait_for_stop { "stop" } else { "appear" }
                    ),
                    timeout.as_millis(),
                ));
            }
            sleep(timeouts::CONDITION_POLL).await;
        }
    }
}

fn map_install_error(error: BridgeError) -> BridgeError {
    if let Some(stderr) = error.stderr() {
        if let Some(caps) = INSTALL_FAILED_REGEX.captures(stderr) {
            return BridgeError::InstallFailed {
                code: caps[1].to_string(),
            };
        }
    }
    error
}

fn check_install_output(result: &ExecResult) -> BridgeResult<()> {
    // `adb install` reports some failures on stdout with a zero exit.
    if let Some(caps) = INSTALL_FAILED_REGEX.captures(&result.stdout) {
        return Err(BridgeError::InstallFailed {
            code: caps[1].to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_args_api_23() {
        let opts = InstallOptions::new()
            .with_allow_test_packages(true)
            .with_grant_permissions(true);
        assert_eq!(build_install_args(23, &opts, false), ["-r", "-t", "-g"]);
    }

    #[test]
    fn install_args_api_22_drops_grant() {
        let opts = InstallOptions::new()
            .with_allow_test_packages(true)
            .with_grant_permissions(true);
        assert_eq!(build_install_args(22, &opts, false), ["-r", "-t"]);
    }

    #[test]
    fn install_args_streaming_and_extras() {
        let opts = InstallOptions::new()
            .with_use_sdcard(true)
            .with_no_incremental(true);
        assert_eq!(
            build_install_args(30, &opts, true),
            ["-r", "-s", "--no-incremental", "--streaming"]
        );
    }

    #[test]
    fn intent_arguments_flag_key_value() {
        let args = parse_intent_arguments("-e foo bar --ez enabled true -d").unwrap();
        assert_eq!(args, ["-e", "foo", "bar", "--ez", "enabled", "true", "-d"]);
    }

    #[test]
    fn intent_arguments_quoted_value_keeps_spaces() {
        let args = parse_intent_arguments("-e message 'hello there world'").unwrap();
        assert_eq!(args, ["-e", "message", "hello there world"]);
    }

    #[test]
    fn intent_arguments_reject_leading_key() {
        assert!(parse_intent_arguments("foo -e bar").is_err());
    }

    #[test]
    fn activity_normalization() {
        assert_eq!(
            normalize_activity("io.appium.android.apis", "io.appium.android.apis.ApiDemos"),
            ".ApiDemos"
        );
        assert_eq!(
            normalize_activity("io.appium.android.apis", "com.other.Activity"),
            "com.other.Activity"
        );
        assert_eq!(normalize_activity("io.appium.android.apis", ".ApiDemos"), ".ApiDemos");
    }

    #[test]
    fn focused_app_legacy_parse() {
        let dump = "  mCurrentFocus=Window{4f6cd3b u0 io.appium.android.apis/io.appium.android.apis.ApiDemos}\n  mFocusedApp=AppWindowToken{a80486 token=Token{f0ae5d7 ActivityRecord{64bb9f9 u0 io.appium.android.apis/.ApiDemos t807}}}\n";
        let focused = parse_focused_legacy(dump).unwrap();
        assert_eq!(focused.app_package, "io.appium.android.apis");
        assert_eq!(focused.app_activity, ".ApiDemos");
    }

    #[test]
    fn focused_app_modern_parse() {
        let dump = "    mResumedActivity: ActivityRecord{188adcc u0 com.android.settings/.Settings t807}\n";
        let focused = parse_focused_modern(dump).unwrap();
        assert_eq!(focused.app_package, "com.android.settings");
        assert_eq!(focused.app_activity, ".Settings");
    }

    #[test]
    fn activity_matchers_glob_and_alternatives() {
        let matchers = activity_matchers("io.appium.android.apis", "*.ApiDemos,.Other").unwrap();
        assert!(matchers
            .iter()
            .any(|m| m.is_match("io.appium.android.apis.ApiDemos")));
        assert!(matchers
            .iter()
            .any(|m| m.is_match("io.appium.android.apis.Other")));
        assert!(!matchers.iter().any(|m| m.is_match("com.example.Main")));
    }
}
