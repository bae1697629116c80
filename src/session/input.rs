//! Key events, text input, and the soft keyboard.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::{sleep, Instant};

use crate::constants::android::keycodes;
use crate::constants::commands::shell;
use crate::constants::timeouts;
use crate::models::error::{BridgeError, BridgeResult};
use crate::session::Session;

lazy_static! {
    static ref INPUT_SHOWN_REGEX: Regex = Regex::new(r"mInputShown=(\w+)").unwrap();
    static ref INPUT_VIEW_SHOWN_REGEX: Regex = Regex::new(r"mIsInputViewShown=(\w+)").unwrap();
}

/// Soft keyboard visibility as reported by `dumpsys input_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardState {
    pub is_keyboard_shown: bool,
    /// Whether the IME window can be dismissed at all.
    pub can_close_keyboard: bool,
}

/// Prepares a string for `input text`: spaces become `%s`, and the whole
/// value is wrapped in whichever quote style does not collide with its
/// content.
pub fn escape_for_input_text(text: &str) -> String {
    let escaped = text.replace(' ', "%s");
    if escaped.contains('\'') {
        format!("\"{}\"", escaped.replace('"', "\\\""))
    } else {
        format!("'{escaped}'")
    }
}

impl Session {
    /// Sends one key event.
    pub async fn keyevent(&self, code: u32) -> BridgeResult<()> {
        let code = code.to_string();
        self.shell_plain(&[shell::INPUT, "keyevent", &code]).await?;
        Ok(())
    }

    /// Clears a focused text field by deleting `length` characters in both
    /// directions: interleaved DEL / FORWARD_DEL events, `length` of each.
    pub async fn clear_text_field(&self, length: usize) -> BridgeResult<()> {
        if length == 0 {
            return Ok(());
        }
        let del = keycodes::DEL.to_string();
        let forward_del = keycodes::FORWARD_DEL.to_string();
        let mut args = vec![shell::INPUT, "keyevent"];
        for _ in 0..length {
            args.push(&del);
            args.push(&forward_del);
        }
        self.shell_plain(&args).await?;
        Ok(())
    }

    /// Types text through `input text`.
    pub async fn input_text(&self, text: &str) -> BridgeResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let escaped = escape_for_input_text(text);
        self.shell_plain(&[shell::INPUT, "text", &escaped]).await?;
        Ok(())
    }

    /// Reads soft keyboard visibility from `dumpsys input_method`.
    pub async fn is_soft_keyboard_present(&self) -> BridgeResult<KeyboardState> {
        let result = self
            .shell_plain(&[shell::DUMPSYS, "input_method"])
            .await?;
        let capture = |regex: &Regex| {
            regex
                .captures(&result.stdout)
                .map(|caps| &caps[1] == "true")
        };
        let is_input_view_shown = capture(&INPUT_VIEW_SHOWN_REGEX).ok_or_else(|| {
            BridgeError::parse_failure("dumpsys input_method", "an mIsInputViewShown flag")
        })?;
        let is_input_shown = capture(&INPUT_SHOWN_REGEX).unwrap_or(is_input_view_shown);
        Ok(KeyboardState {
            is_keyboard_shown: is_input_shown,
            can_close_keyboard: is_input_view_shown,
        })
    }

    /// Hides the soft keyboard: ESC first, BACK as the fallback, polling
    /// visibility every half second. Returns `false` when there was nothing
    /// to hide, `true` once hidden, and times out otherwise.
    pub async fn hide_keyboard(&self, timeout: Duration) -> BridgeResult<bool> {
        let state = self.is_soft_keyboard_present().await?;
        if !state.is_keyboard_shown {
            return Ok(false);
        }
        if !state.can_close_keyboard {
            log::info!("The soft keyboard cannot be dismissed on this screen");
            return Ok(false);
        }

        // ESC gets the first half of the budget, BACK the second.
        for code in [keycodes::ESCAPE, keycodes::BACK] {
            self.keyevent(code).await?;
            let deadline = Instant::now() + timeout / 2;
            loop {
                if !self.is_soft_keyboard_present().await?.is_keyboard_shown {
                    return Ok(true);
                }
                if Instant::now() >= deadline {
                    break;
                }
                sleep(timeouts::KEYBOARD_POLL).await;
            }
        }
        Err(BridgeError::timeout(
            "hiding the soft keyboard",
            timeout.as_millis(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_become_placeholders() {
        assert_eq!(escape_for_input_text("hello world"), "'hello%sworld'");
    }

    #[test]
    fn apostrophes_switch_to_double_quotes() {
        assert_eq!(escape_for_input_text("it's here"), "\"it's%shere\"");
    }

    #[test]
    fn keyboard_regexes() {
        let dump = "  mInputShown=true\n  mIsInputViewShown=false\n";
        assert_eq!(&INPUT_SHOWN_REGEX.captures(dump).unwrap()[1], "true");
        assert_eq!(&INPUT_VIEW_SHOWN_REGEX.captures(dump).unwrap()[1], "false");
    }
}
