//! Device list entries as reported by `adb devices`.

use serde::{Deserialize, Serialize};

/// Connection state of an attached device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Device,
    Offline,
    Unauthorized,
    Recovery,
    Bootloader,
    Sideload,
    Host,
    NoPermissions,
    Unknown,
}

impl DeviceState {
    /// Only `device` is usable by default.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Device)
    }
}

impl std::str::FromStr for DeviceState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "device" => Self::Device,
            "offline" => Self::Offline,
            "unauthorized" => Self::Unauthorized,
            "recovery" => Self::Recovery,
            "bootloader" => Self::Bootloader,
            "sideload" => Self::Sideload,
            "host" => Self::Host,
            "no permissions" => Self::NoPermissions,
            _ => Self::Unknown,
        })
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Device => "device",
            Self::Offline => "offline",
            Self::Unauthorized => "unauthorized",
            Self::Recovery => "recovery",
            Self::Bootloader => "bootloader",
            Self::Sideload => "sideload",
            Self::Host => "host",
            Self::NoPermissions => "no permissions",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One `(serial, state)` pair from `adb devices` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub serial: String,
    pub state: DeviceState,
}

impl DeviceEntry {
    pub fn new(serial: impl Into<String>, state: DeviceState) -> Self {
        Self {
            serial: serial.into(),
            state,
        }
    }

    /// Parses the tail of `adb devices` output (everything after the
    /// `List of devices attached` banner). Daemon chatter lines such as
    /// `* daemon started successfully *` are skipped.
    pub fn parse_list(output: &str) -> Vec<DeviceEntry> {
        output
            .lines()
            .skip_while(|line| !line.contains("List of devices"))
            .skip(1)
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('*') {
                    return None;
                }
                // `no permissions` carries a space, so split on the first tab
                // or run of whitespace only once.
                let (serial, state) = line.split_once(char::is_whitespace)?;
                let state = state.trim().parse().ok()?;
                Some(DeviceEntry::new(serial.trim(), state))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_list() {
        let out = "List of devices attached\nemulator-5554\tdevice\n0123456789ABCDEF\tunauthorized\n\n";
        let entries = DeviceEntry::parse_list(out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].serial, "emulator-5554");
        assert_eq!(entries[0].state, DeviceState::Device);
        assert_eq!(entries[1].state, DeviceState::Unauthorized);
    }

    #[test]
    fn skips_daemon_banner() {
        let out = "* daemon not running; starting now at tcp:5037\n* daemon started successfully\nList of devices attached\nemulator-5554\tdevice\n";
        let entries = DeviceEntry::parse_list(out);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].state.is_usable());
    }

    #[test]
    fn maps_exotic_states() {
        let out = "List of devices attached\nserial1\tno permissions\nserial2\tsomething-new\n";
        let entries = DeviceEntry::parse_list(out);
        assert_eq!(entries[0].state, DeviceState::NoPermissions);
        assert_eq!(entries[1].state, DeviceState::Unknown);
        assert!(!entries[0].state.is_usable());
    }
}
