//! Settings-helper IPC.
//!
//! Drives the `io.appium.settings` companion app through Android broadcasts
//! to reach state `adb` cannot touch directly: clipboard, notifications,
//! SMS, locale, geolocation, and connectivity toggles on real devices. The
//! helper's receiver components and action names are fixed by its manifest
//! (see [`crate::constants::android::settings_app`]).

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::{sleep, Instant};

use crate::constants::android::{self, settings_app};
use crate::constants::commands::{am, shell};
use crate::constants::timeouts;
use crate::models::error::{BridgeError, BridgeResult};
use crate::session::Session;

lazy_static! {
    static ref BROADCAST_RESULT_REGEX: Regex =
        Regex::new(r"Broadcast completed:\s*result=(-?\d+)(?:,\s*data=\x22(.*)\x22)?").unwrap();
}

/// A geographic fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoLocation {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: Option<f64>,
    pub satellites: Option<u32>,
    pub speed: Option<f64>,
}

impl GeoLocation {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            altitude: None,
            satellites: None,
            speed: None,
        }
    }
}

/// Options for [`Session::require_running_settings_app`].
#[derive(Debug, Clone)]
pub struct RequireSettingsAppOptions {
    pub timeout: Duration,
    /// Re-activate whatever app held focus before the helper was launched.
    pub should_restore_current_app: bool,
}

impl Default for RequireSettingsAppOptions {
    fn default() -> Self {
        Self {
            timeout: timeouts::SETTINGS_APP_START,
            should_restore_current_app: false,
        }
    }
}

/// Options for [`Session::get_sms_list`].
#[derive(Debug, Clone)]
pub struct SmsListOptions {
    pub max: usize,
}

impl Default for SmsListOptions {
    fn default() -> Self {
        Self { max: 100 }
    }
}

/// Parses `am broadcast` output: the completion line must report
/// `result=-1` (RESULT_OK); the optional `data="..."` payload is returned.
fn parse_broadcast_output(output: &str) -> BridgeResult<Option<String>> {
    let caps = BROADCAST_RESULT_REGEX.captures(output).ok_or_else(|| {
        BridgeError::parse_failure(
            output.lines().last().unwrap_or_default(),
            "a 'Broadcast completed: result=N' line",
        )
    })?;
    if &caps[1] != "-1" {
        return Err(BridgeError::other(format!(
            "The settings helper rejected the broadcast (result={})",
            &caps[1]
        )));
    }
    Ok(caps.get(2).map(|m| m.as_str().to_string()))
}

impl Session {
    /// Ensures the settings helper process is running, launching its main
    /// activity when needed and polling until it appears.
    pub async fn require_running_settings_app(
        &self,
        opts: &RequireSettingsAppOptions,
    ) -> BridgeResult<()> {
        if self.process_exists(settings_app::PACKAGE).await? {
            return Ok(());
        }
        log::debug!("Starting the settings helper app");

        let previous_app = if opts.should_restore_current_app {
            self.get_focused_package_and_activity()
                .await
                .map(|f| f.app_package)
                .ok()
        } else {
            None
        };

        self.shell_plain(&[
            am::AM,
            am::START,
            am::WAIT_ARG,
            am::COMPONENT_ARG,
            settings_app::MAIN_ACTIVITY,
        ])
        .await?;

        let deadline = Instant::now() + opts.timeout;
        loop {
            if self.process_exists(settings_app::PACKAGE).await? {
                break;
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::start_failed(
                    "settings helper app",
                    format!("not running after {} ms", opts.timeout.as_millis()),
                ));
            }
            sleep(timeouts::CONDITION_POLL).await;
        }

        if let Some(pkg) = previous_app {
            if pkg != settings_app::PACKAGE {
                if let Err(e) = self.activate_app(&pkg).await {
                    log::warn!("Could not restore '{pkg}' to the foreground: {e}");
                }
            }
        }
        Ok(())
    }

    /// Sends a broadcast to one of the helper's receivers and returns the
    /// optional `data=` payload.
    async fn settings_helper_broadcast(
        &self,
        receiver: Option<&str>,
        action: &str,
        extras: &[&str],
    ) -> BridgeResult<Option<String>> {
        let mut args = vec![am::AM, am::BROADCAST];
        if let Some(receiver) = receiver {
            args.push(am::COMPONENT_ARG);
            args.push(receiver);
        }
        args.push(am::ACTION_ARG);
        args.push(action);
        args.extend_from_slice(extras);
        let result = self.shell_plain(&args).await?;
        parse_broadcast_output(&result.stdout)
    }

    /// Toggles window/transition/animator animations through the helper.
    pub async fn set_animation_state(&self, on: bool) -> BridgeResult<()> {
        let status = if on { "enable" } else { "disable" };
        self.settings_helper_broadcast(
            Some(settings_app::ANIMATION_RECEIVER),
            settings_app::ANIMATION_ACTION,
            &[am::ES_ARG, "setstatus", status],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn set_wifi_state_via_helper(&self, on: bool) -> BridgeResult<()> {
        let status = if on { "enable" } else { "disable" };
        self.settings_helper_broadcast(
            Some(settings_app::WIFI_RECEIVER),
            settings_app::WIFI_ACTION,
            &[am::ES_ARG, "setstatus", status],
        )
        .await?;
        Ok(())
    }

    pub(crate) async fn set_data_state_via_helper(&self, on: bool) -> BridgeResult<()> {
        let status = if on { "enable" } else { "disable" };
        self.settings_helper_broadcast(
            Some(settings_app::DATA_RECEIVER),
            settings_app::DATA_ACTION,
            &[am::ES_ARG, "setstatus", status],
        )
        .await?;
        Ok(())
    }

    /// Changes the device locale through the helper.
    pub async fn set_device_sys_locale_via_setting_app(
        &self,
        language: &str,
        country: &str,
        script: Option<&str>,
    ) -> BridgeResult<()> {
        let mut extras = vec![am::ES_ARG, "lang", language, am::ES_ARG, "country", country];
        if let Some(script) = script {
            extras.push(am::ES_ARG);
            extras.push("script");
            extras.push(script);
        }
        self.settings_helper_broadcast(
            Some(settings_app::LOCALE_RECEIVER),
            settings_app::LOCALE_ACTION,
            &extras,
        )
        .await?;
        Ok(())
    }

    /// Applies a mock location fix.
    ///
    /// Emulators take the fix over the console; the call is repeated with
    /// decimal commas because some emulator builds parse coordinates with
    /// the host locale. Real devices go through the helper's foreground
    /// location service.
    pub async fn set_geo_location(
        &self,
        location: &GeoLocation,
        is_emulator: bool,
    ) -> BridgeResult<()> {
        if is_emulator {
            let mut positional = vec![
                location.longitude.to_string(),
                location.latitude.to_string(),
            ];
            if let Some(altitude) = location.altitude {
                positional.push(altitude.to_string());
                if let Some(satellites) = location.satellites {
                    positional.push(satellites.to_string());
                    if let Some(speed) = location.speed {
                        positional.push(speed.to_string());
                    }
                }
            }
            let mut args = vec!["geo".to_string(), "fix".to_string()];
            args.extend(positional.iter().cloned());
            let argv: Vec<&str> = args.iter().map(String::as_str).collect();
            self.exec_emu_console_command(&argv).await?;

            let comma_args: Vec<String> =
                args.iter().map(|a| a.replace('.', ",")).collect();
            let comma_argv: Vec<&str> = comma_args.iter().map(String::as_str).collect();
            self.exec_emu_console_command(&comma_argv).await?;
            return Ok(());
        }

        self.require_running_settings_app(&RequireSettingsAppOptions::default())
            .await?;
        let api = self.api_level().await?;
        let start_verb = if api >= android::api::MODERN_SU {
            am::START_FG_SERVICE
        } else {
            am::START_SERVICE
        };
        let longitude = location.longitude.to_string();
        let latitude = location.latitude.to_string();
        let mut args = vec![
            am::AM,
            start_verb,
            am::COMPONENT_ARG,
            settings_app::LOCATION_SERVICE,
            am::EXTRA_ARG,
            "longitude",
            &longitude,
            am::EXTRA_ARG,
            "latitude",
            &latitude,
        ];
        let altitude = location.altitude.map(|a| a.to_string());
        if let Some(altitude) = &altitude {
            args.push(am::EXTRA_ARG);
            args.push("altitude");
            args.push(altitude);
        }
        let speed = location.speed.map(|s| s.to_string());
        if let Some(speed) = &speed {
            args.push(am::EXTRA_ARG);
            args.push("speed");
            args.push(speed);
        }
        self.shell_plain(&args).await?;
        Ok(())
    }

    /// Reads the device's current location through the helper.
    pub async fn get_geo_location(&self) -> BridgeResult<GeoLocation> {
        self.require_running_settings_app(&RequireSettingsAppOptions::default())
            .await?;
        let data = self
            .settings_helper_broadcast(
                Some(settings_app::LOCATION_RECEIVER),
                settings_app::LOCATION_ACTION,
                &[],
            )
            .await?
            .ok_or_else(|| {
                BridgeError::parse_failure("am broadcast", "a location data payload")
            })?;
        parse_location_payload(&data)
    }

    /// Forces the helper to refresh its location cache, then waits for its
    /// tracker to confirm in the device log.
    pub async fn refresh_geo_location_cache(&self, timeout: Duration) -> BridgeResult<()> {
        self.settings_helper_broadcast(
            Some(settings_app::LOCATION_RECEIVER),
            settings_app::LOCATION_ACTION,
            &[am::EZ_ARG, "forceUpdate", "true"],
        )
        .await?;

        let deadline = Instant::now() + timeout;
        loop {
            let result = self
                .shell_plain(&["logcat", "-d", "-s", settings_app::LOCATION_TRACKER_TAG])
                .await?;
            if settings_app::LOCATION_TRACKER_MARKERS
                .iter()
                .any(|marker| result.stdout.contains(marker))
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Location cache refresh was not confirmed within {} ms",
                    timeout.as_millis()
                );
                return Ok(());
            }
            sleep(timeouts::CONDITION_POLL).await;
        }
    }

    /// Reads the device clipboard through the helper. The payload is
    /// base64-encoded. From API 29 on, clipboard access is only granted to
    /// the active IME, so the read runs inside an enforced IME context.
    pub async fn get_clipboard(&self) -> BridgeResult<String> {
        self.require_running_settings_app(&RequireSettingsAppOptions::default())
            .await?;
        let api = self.api_level().await?;
        let read = || async {
            self.settings_helper_broadcast(
                Some(settings_app::CLIPBOARD_RECEIVER),
                settings_app::CLIPBOARD_ACTION,
                &[],
            )
            .await
        };
        let data = if api >= android::api::IME_CLIPBOARD {
            self.run_in_ime_context(settings_app::APPIUM_IME, read)
                .await?
        } else {
            read().await?
        };
        Ok(data.unwrap_or_default())
    }

    /// Notifications captured by the helper's listener, as JSON.
    pub async fn get_notifications(&self) -> BridgeResult<serde_json::Value> {
        self.require_running_settings_app(&RequireSettingsAppOptions::default())
            .await?;
        let data = self
            .settings_helper_broadcast(None, settings_app::NOTIFICATIONS_ACTION, &[])
            .await?
            .ok_or_else(|| {
                BridgeError::parse_failure("am broadcast", "a notifications payload")
            })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// SMS messages stored on the device, as JSON.
    pub async fn get_sms_list(&self, opts: &SmsListOptions) -> BridgeResult<serde_json::Value> {
        self.require_running_settings_app(&RequireSettingsAppOptions::default())
            .await?;
        let max = opts.max.to_string();
        let data = self
            .settings_helper_broadcast(
                Some(settings_app::SMS_RECEIVER),
                settings_app::SMS_ACTION,
                &[am::ES_ARG, "max", &max],
            )
            .await?
            .ok_or_else(|| BridgeError::parse_failure("am broadcast", "an SMS payload"))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Types arbitrary Unicode text by switching to the helper's Unicode
    /// IME for the duration of the call. The text travels UTF-7 encoded.
    pub async fn type_unicode(&self, text: &str) -> BridgeResult<()> {
        let encoded = encode_utf7(text);
        self.run_in_ime_context(settings_app::UNICODE_IME, || async {
            self.input_text(&encoded).await
        })
        .await
    }

    /// Sends a synthetic editor action (`/<action>/` token) through the
    /// helper IME.
    pub async fn perform_editor_action(&self, action: u32) -> BridgeResult<()> {
        let token = format!("/{action}/");
        self.run_in_ime_context(settings_app::APPIUM_IME, || async {
            self.shell_plain(&[shell::INPUT, "text", &token]).await?;
            Ok(())
        })
        .await
    }

    /// Asks the media scanner to pick up a device path.
    pub async fn scan_media(&self, device_path: &str) -> BridgeResult<()> {
        self.settings_helper_broadcast(
            Some(settings_app::MEDIA_SCAN_RECEIVER),
            settings_app::MEDIA_SCAN_ACTION,
            &[am::ES_ARG, "path", device_path],
        )
        .await?;
        Ok(())
    }

    /// Scoped IME acquisition: remembers the current default IME, enables
    /// and activates `ime`, runs `work`, and restores the previous IME on
    /// every exit path. A failure inside `work` still restores before the
    /// original error is re-raised.
    pub async fn run_in_ime_context<T, F, Fut>(&self, ime: &str, work: F) -> BridgeResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = BridgeResult<T>>,
    {
        let previous = self.default_ime().await?;
        self.enable_and_set_ime(ime).await?;
        let result = work().await;
        if let Some(previous) = previous.filter(|p| p != ime) {
            if let Err(e) = self.enable_and_set_ime(&previous).await {
                log::warn!("Could not restore IME '{previous}': {e}");
            }
        }
        result
    }

    /// The current default IME, when one is configured.
    pub async fn default_ime(&self) -> BridgeResult<Option<String>> {
        let value = self
            .get_setting(android::settings_ns::SECURE, "default_input_method")
            .await?;
        let value = value.trim().to_string();
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    /// True when `ime` is the current default input method.
    pub async fn is_ime_active(&self, ime: &str) -> BridgeResult<bool> {
        Ok(self.default_ime().await?.as_deref() == Some(ime))
    }

    /// `ime enable <ime>`; the IME must be installed on the device.
    pub async fn enable_ime(&self, ime: &str) -> BridgeResult<()> {
        self.shell_plain(&[shell::IME, "enable", ime]).await?;
        Ok(())
    }

    /// `ime set <ime>`; implies the IME is enabled.
    pub async fn set_ime(&self, ime: &str) -> BridgeResult<()> {
        self.shell_plain(&[shell::IME, "set", ime]).await?;
        Ok(())
    }

    async fn enable_and_set_ime(&self, ime: &str) -> BridgeResult<()> {
        self.enable_ime(ime).await?;
        self.set_ime(ime).await
    }
}

/// Parses the helper's `"lon lat alt"` location payload.
fn parse_location_payload(data: &str) -> BridgeResult<GeoLocation> {
    let mut tokens = data.split_whitespace();
    let (Some(longitude), Some(latitude)) = (tokens.next(), tokens.next()) else {
        return Err(BridgeError::parse_failure(data, "'longitude latitude [altitude]'"));
    };
    let longitude = longitude
        .parse()
        .map_err(|_| BridgeError::parse_failure(data, "a numeric longitude"))?;
    let latitude = latitude
        .parse()
        .map_err(|_| BridgeError::parse_failure(data, "a numeric latitude"))?;
    let altitude = tokens.next().and_then(|t| t.parse().ok());
    Ok(GeoLocation {
        longitude,
        latitude,
        altitude,
        satellites: None,
        speed: None,
    })
}

/// Encodes text as UTF-7 for transport through `input text`.
///
/// Directly representable characters pass through; everything else is
/// grouped into `+<base64 of UTF-16BE>-` blocks, with `+` itself written
/// as `+-`.
fn encode_utf7(text: &str) -> String {
    fn is_direct(c: char) -> bool {
        c.is_ascii_alphanumeric() || "'(),-./:? \t\r\n".contains(c)
    }

    let mut out = String::new();
    let mut pending: Vec<u16> = Vec::new();
    for c in text.chars() {
        if c == '+' {
            flush_utf7_block(&mut out, &mut pending);
            out.push_str("+-");
        } else if is_direct(c) {
            flush_utf7_block(&mut out, &mut pending);
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush_utf7_block(&mut out, &mut pending);
    out
}

fn flush_utf7_block(out: &mut String, pending: &mut Vec<u16>) {
    if pending.is_empty() {
        return;
    }
    let bytes: Vec<u8> = pending.iter().flat_map(|u| u.to_be_bytes()).collect();
    out.push('+');
    out.push_str(&base64_no_pad(&bytes));
    out.push('-');
    pending.clear();
}

/// Minimal standard-alphabet base64 without padding, as the UTF-7 block
/// body requires.
fn base64_no_pad(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 64] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        out.push(ALPHABET[(triple >> 18) as usize & 0x3f] as char);
        out.push(ALPHABET[(triple >> 12) as usize & 0x3f] as char);
        if chunk.len() > 1 {
            out.push(ALPHABET[(triple >> 6) as usize & 0x3f] as char);
        }
        if chunk.len() > 2 {
            out.push(ALPHABET[triple as usize & 0x3f] as char);
        }
    }
    out
}
