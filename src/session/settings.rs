//! Device settings: namespaces, connectivity toggles, locale, hidden-API
//! policy.

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::sleep;

use crate::constants::android::{self, HIDDEN_API_POLICY_KEYS};
use crate::constants::commands::{adb, am, shell};
use crate::constants::timeouts;
use crate::models::error::BridgeResult;
use crate::session::Session;

lazy_static! {
    static ref NULL_VALUE_REGEX: Regex = Regex::new(r"^null$").unwrap();
}

fn enable_keyword(on: bool) -> &'static str {
    if on {
        "enable"
    } else {
        "disable"
    }
}

impl Session {
    /// `settings get <namespace> <key>`. A device-side `null` becomes an
    /// empty string.
    pub async fn get_setting(&self, namespace: &str, key: &str) -> BridgeResult<String> {
        let result = self
            .shell_plain(&[shell::SETTINGS, "get", namespace, key])
            .await?;
        let value = result.stdout_trimmed().to_string();
        if NULL_VALUE_REGEX.is_match(&value) {
            return Ok(String::new());
        }
        Ok(value)
    }

    /// `settings put <namespace> <key> <value>`.
    pub async fn set_setting(&self, namespace: &str, key: &str, value: &str) -> BridgeResult<()> {
        self.shell_plain(&[shell::SETTINGS, "put", namespace, key, value])
            .await?;
        Ok(())
    }

    /// Toggles airplane mode.
    ///
    /// API >= 30 has a first-class `cmd connectivity` verb. Older releases
    /// need the global flag plus a state broadcast, which requires root from
    /// API 24 on.
    pub async fn set_airplane_mode(&self, on: bool) -> BridgeResult<()> {
        let api = self.api_level().await?;
        if api >= android::api::CMD_SERVICES {
            self.shell_plain(&[
                shell::CMD,
                "connectivity",
                "airplane-mode",
                enable_keyword(on),
            ])
            .await?;
            return Ok(());
        }

        let flag = if on { "1" } else { "0" };
        self.set_setting(android::settings_ns::GLOBAL, "airplane_mode_on", flag)
            .await?;
        let state = if on { "true" } else { "false" };
        let broadcast = [
            am::AM,
            am::BROADCAST,
            am::ACTION_ARG,
            "android.intent.action.AIRPLANE_MODE",
            am::EZ_ARG,
            "state",
            state,
        ];
        let opts = self
            .exec_options()
            .with_privileged(api >= android::api::TOYBOX_PS);
        self.shell(&broadcast, &opts).await?;
        Ok(())
    }

    /// True when airplane mode is on.
    pub async fn is_airplane_mode_on(&self) -> BridgeResult<bool> {
        let value = self
            .get_setting(android::settings_ns::GLOBAL, "airplane_mode_on")
            .await?;
        Ok(value.trim() == "1")
    }

    /// Toggles WiFi. API >= 30 uses `cmd wifi`; older devices go through
    /// the settings helper app.
    pub async fn set_wifi_state(&self, on: bool) -> BridgeResult<()> {
        let api = self.api_level().await?;
        if api >= android::api::CMD_SERVICES {
            self.shell_plain(&[shell::CMD, "wifi", "set-wifi-enabled", enable_keyword(on)])
                .await?;
            return Ok(());
        }
        self.set_wifi_state_via_helper(on).await
    }

    pub async fn is_wifi_on(&self) -> BridgeResult<bool> {
        let value = self
            .get_setting(android::settings_ns::GLOBAL, "wifi_on")
            .await?;
        Ok(value.trim() != "0" && !value.trim().is_empty())
    }

    /// Toggles mobile data. API >= 30 uses `cmd phone`; older devices go
    /// through the settings helper app.
    pub async fn set_data_state(&self, on: bool) -> BridgeResult<()> {
        let api = self.api_level().await?;
        if api >= android::api::CMD_SERVICES {
            self.shell_plain(&[shell::CMD, "phone", "data", enable_keyword(on)])
                .await?;
            return Ok(());
        }
        self.set_data_state_via_helper(on).await
    }

    /// The device locale, e.g. `en-US`.
    pub async fn get_device_locale(&self) -> BridgeResult<String> {
        let api = self.api_level().await?;
        if api >= android::api::RUNTIME_PERMISSIONS {
            let result = self
                .shell_plain(&[adb::GETPROP, adb::PROP_LOCALE])
                .await?;
            return Ok(result.stdout_trimmed().to_string());
        }
        let language = self
            .shell_plain(&[adb::GETPROP, adb::PROP_LANGUAGE])
            .await?;
        let country = self
            .shell_plain(&[adb::GETPROP, adb::PROP_COUNTRY])
            .await?;
        Ok(format!(
            "{}-{}",
            language.stdout_trimmed(),
            country.stdout_trimmed()
        ))
    }

    /// Polls until the device locale matches the expectation, at most five
    /// one-second rounds. Returns whether it converged.
    pub async fn ensure_current_locale(
        &self,
        language: Option<&str>,
        country: Option<&str>,
        script: Option<&str>,
    ) -> BridgeResult<bool> {
        if language.is_none() && country.is_none() {
            log::warn!("ensure_current_locale called without an expectation");
            return Ok(false);
        }
        let matcher = locale_matcher(language, country, script)?;

        for attempt in 0..timeouts::LOCALE_TRIES {
            let locale = self.get_device_locale().await?;
            if matcher.is_match(&locale) {
                return Ok(true);
            }
            log::debug!(
                "Locale is '{locale}', waiting for '{}' (attempt {})",
                matcher.as_str(),
                attempt + 1
            );
            sleep(timeouts::LOCALE_PAUSE).await;
        }
        Ok(false)
    }

    /// Sets the three `hidden_api_policy*` global keys.
    pub async fn set_hidden_api_policy(&self, value: u32) -> BridgeResult<()> {
        let value = value.to_string();
        let keys: Vec<String> = HIDDEN_API_POLICY_KEYS.iter().map(|k| k.to_string()).collect();
        self.shell_chunks(
            |key| {
                vec![
                    shell::SETTINGS.to_string(),
                    "put".to_string(),
                    android::settings_ns::GLOBAL.to_string(),
                    key.to_string(),
                    value.clone(),
                ]
            },
            &keys,
        )
        .await
    }

    /// Deletes the three `hidden_api_policy*` global keys.
    pub async fn reset_hidden_api_policy(&self) -> BridgeResult<()> {
        let keys: Vec<String> = HIDDEN_API_POLICY_KEYS.iter().map(|k| k.to_string()).collect();
        self.shell_chunks(
            |key| {
                vec![
                    shell::SETTINGS.to_string(),
                    "delete".to_string(),
                    android::settings_ns::GLOBAL.to_string(),
                    key.to_string(),
                ]
            },
            &keys,
        )
        .await
    }
}

/// Builds the case-insensitive matcher for an expected locale: present
/// parts join as `language[-script]-country`; a single part matches its
/// subtag position.
fn locale_matcher(
    language: Option<&str>,
    country: Option<&str>,
    script: Option<&str>,
) -> BridgeResult<Regex> {
    let pattern = match (language, country) {
        (Some(language), Some(country)) => match script {
            Some(script) => format!(
                "(?i)^{}-{}-{}$",
                regex::escape(language),
                regex::escape(script),
                regex::escape(country)
            ),
            None => format!("(?i)^{}-{}$", regex::escape(language), regex::escape(country)),
        },
        (Some(language), None) => format!("(?i)^{}(-.+)?$", regex::escape(language)),
        (None, Some(country)) => format!("(?i)^.+-{}$", regex::escape(country)),
        (None, None) => unreachable!("checked by the caller"),
    };
    Ok(Regex::new(&pattern)?)
}
