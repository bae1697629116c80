//! Parsed logcat records.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // `-v threadtime`: `06-25 14:03:22.559  1234  5678 I ActivityManager: Start proc ...`
    static ref THREADTIME_REGEX: Regex = Regex::new(
        r"^(\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3})\s+(\d+)\s+(\d+)\s+([VDIWEFS])\s+(.*?)\s*:\s(.*)$"
    )
    .unwrap();
}

/// Logcat priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Silent,
}

impl LogLevel {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'V' => Self::Verbose,
            'D' => Self::Debug,
            'I' => Self::Info,
            'W' => Self::Warn,
            'E' => Self::Error,
            'F' => Self::Fatal,
            'S' => Self::Silent,
            _ => return None,
        })
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = match self {
            Self::Verbose => 'V',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warn => 'W',
            Self::Error => 'E',
            Self::Fatal => 'F',
            Self::Silent => 'S',
        };
        write!(f, "{c}")
    }
}

/// One parsed logcat line.
///
/// The parser assumes `-v threadtime` output. Lines in any other format
/// still produce an entry, with the raw line preserved in `message` and
/// the structured fields left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Device-side timestamp (`MM-DD HH:MM:SS.mmm`), empty when unparsed.
    pub timestamp: String,
    pub pid: u32,
    pub tid: u32,
    pub level: Option<LogLevel>,
    pub tag: String,
    pub message: String,
}

impl LogEntry {
    /// Parses one line of `logcat -v threadtime` output.
    pub fn parse(line: &str) -> Self {
        if let Some(caps) = THREADTIME_REGEX.captures(line) {
            let level = caps
                .get(4)
                .and_then(|m| m.as_str().chars().next())
                .and_then(LogLevel::from_char);
            return Self {
                timestamp: caps[1].to_string(),
                pid: caps[2].parse().unwrap_or(0),
                tid: caps[3].parse().unwrap_or(0),
                level,
                tag: caps[5].to_string(),
                message: caps[6].to_string(),
            };
        }
        Self {
            timestamp: String::new(),
            pid: 0,
            tid: 0,
            level: None,
            tag: String::new(),
            message: line.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_threadtime_line() {
        let entry = LogEntry::parse(
            "06-25 14:03:22.559  1234  5678 I ActivityManager: Start proc 9012:io.appium.settings/u0a123",
        );
        assert_eq!(entry.timestamp, "06-25 14:03:22.559");
        assert_eq!(entry.pid, 1234);
        assert_eq!(entry.tid, 5678);
        assert_eq!(entry.level, Some(LogLevel::Info));
        assert_eq!(entry.tag, "ActivityManager");
        assert_eq!(entry.message, "Start proc 9012:io.appium.settings/u0a123");
    }

    #[test]
    fn parses_tag_with_spaces_and_colon_message() {
        let entry =
            LogEntry::parse("01-01 00:00:01.000     1     2 W dalvikvm: method: called: twice");
        assert_eq!(entry.tag, "dalvikvm");
        assert_eq!(entry.message, "method: called: twice");
        assert_eq!(entry.level, Some(LogLevel::Warn));
    }

    #[test]
    fn alternate_format_keeps_raw_line() {
        let raw = "--------- beginning of main";
        let entry = LogEntry::parse(raw);
        assert!(entry.timestamp.is_empty());
        assert!(entry.tag.is_empty());
        assert_eq!(entry.level, None);
        assert_eq!(entry.message, raw);
    }
}
