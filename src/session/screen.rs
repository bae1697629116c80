//! Screen queries, screenshots, and screen recording.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::commands::shell;
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::ExecOptions;
use crate::session::Session;

lazy_static! {
    static ref SCREEN_SIZE_REGEX: Regex =
        Regex::new(r"(?:Physical|Override) size:\s*(\d+x\d+)").unwrap();
    static ref SCREEN_DENSITY_REGEX: Regex =
        Regex::new(r"(?:Physical|Override) density:\s*(\d+)").unwrap();
    static ref ORIENTATION_REGEX: Regex = Regex::new(r"SurfaceOrientation:\s*(\d)").unwrap();
}

/// Options for [`Session::screenrecord`].
#[derive(Debug, Clone, Default)]
pub struct ScreenrecordOptions {
    /// Recording length; the device default is 180 s.
    pub time_limit: Option<Duration>,
    /// Bits per second, e.g. `4000000`.
    pub bit_rate: Option<u32>,
    /// `WIDTHxHEIGHT` override.
    pub size: Option<String>,
}

impl Session {
    /// The screen resolution as `WIDTHxHEIGHT`, from `wm size`.
    pub async fn get_screen_size(&self) -> BridgeResult<String> {
        let result = self.shell_plain(&[shell::WM, "size"]).await?;
        // An override, when present, wins over the physical size.
        let mut last = None;
        for caps in SCREEN_SIZE_REGEX.captures_iter(&result.stdout) {
            last = Some(caps[1].to_string());
        }
        last.ok_or_else(|| BridgeError::parse_failure("wm size", "Physical size: WxH"))
    }

    /// The screen density in dpi, from `wm density`.
    pub async fn get_screen_density(&self) -> BridgeResult<u32> {
        let result = self.shell_plain(&[shell::WM, "density"]).await?;
        let mut last = None;
        for caps in SCREEN_DENSITY_REGEX.captures_iter(&result.stdout) {
            last = caps[1].parse().ok();
        }
        last.ok_or_else(|| BridgeError::parse_failure("wm density", "Physical density: N"))
    }

    /// The surface orientation (0-3), from `dumpsys input`.
    pub async fn get_screen_orientation(&self) -> BridgeResult<u8> {
        let result = self.shell_plain(&[shell::DUMPSYS, "input"]).await?;
        ORIENTATION_REGEX
            .captures(&result.stdout)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or_else(|| BridgeError::parse_failure("dumpsys input", "SurfaceOrientation: N"))
    }

    /// Captures the screen as PNG bytes via `exec-out screencap -p`.
    /// The bytes are passed through unchanged.
    pub async fn take_screenshot(&self, display_id: Option<u32>) -> BridgeResult<Vec<u8>> {
        let display;
        let mut args = vec![shell::SCREENCAP, "-p"];
        if let Some(id) = display_id {
            display = id.to_string();
            args.push("-d");
            args.push(&display);
        }
        self.exec_out(&args, &self.exec_options()).await
    }

    /// Records the screen to `remote_path` on the device, blocking until
    /// the recording completes. The subprocess timeout tracks the recording
    /// length plus a grace period for muxing.
    pub async fn screenrecord(
        &self,
        remote_path: &str,
        opts: &ScreenrecordOptions,
    ) -> BridgeResult<()> {
        let mut args: Vec<String> = vec![shell::SCREENRECORD.to_string()];
        let time_limit = opts.time_limit.unwrap_or(Duration::from_secs(180));
        args.push("--time-limit".to_string());
        args.push(time_limit.as_secs().to_string());
        if let Some(bit_rate) = opts.bit_rate {
            args.push("--bit-rate".to_string());
            args.push(bit_rate.to_string());
        }
        if let Some(size) = &opts.size {
            args.push("--size".to_string());
            args.push(size.clone());
        }
        args.push(remote_path.to_string());

        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let exec_opts = ExecOptions::default().with_timeout(time_limit + Duration::from_secs(10));
        self.shell(&argv, &exec_opts).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_size_prefers_override() {
        let dump = "Physical size: 1080x1920\nOverride size: 720x1280\n";
        let mut last = None;
        for caps in SCREEN_SIZE_REGEX.captures_iter(dump) {
            last = Some(caps[1].to_string());
        }
        assert_eq!(last.as_deref(), Some("720x1280"));
    }

    #[test]
    fn orientation_regex() {
        let dump = "  ... SurfaceOrientation: 1\n";
        assert_eq!(&ORIENTATION_REGEX.captures(dump).unwrap()[1], "1");
    }
}
