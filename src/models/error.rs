//! Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Required environment variable is not set: {var}")]
    EnvMissing { var: String },

    #[error("No usable device is connected")]
    NotConnected,

    #[error("Device {serial} is waiting for authorization")]
    AuthorizationPending { serial: String },

    #[error("'{op}' timed out after {millis} ms")]
    Timeout { op: String, millis: u128 },

    #[error("Command '{cmdline}' exited with code {exit_code}: {stderr}")]
    ExecFailure {
        cmdline: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Could not parse '{input}': expected {expected}")]
    ParseFailure { input: String, expected: String },

    #[error("APK is signed with an unexpected certificate")]
    SignatureMismatch,

    #[error("Failed to start {subsystem}: {reason}")]
    StartFailed { subsystem: String, reason: String },

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Package installation failed: {code}")]
    InstallFailed { code: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{message}")]
    Other { message: String },
}

impl BridgeError {
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    pub fn env_missing(var: impl Into<String>) -> Self {
        Self::EnvMissing { var: var.into() }
    }

    pub fn timeout(op: impl Into<String>, millis: u128) -> Self {
        Self::Timeout {
            op: op.into(),
            millis,
        }
    }

    pub fn parse_failure(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::ParseFailure {
            input: input.into(),
            expected: expected.into(),
        }
    }

    pub fn start_failed(subsystem: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartFailed {
            subsystem: subsystem.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Stderr of the failed subprocess, when this error carries one.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ExecFailure { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
