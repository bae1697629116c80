//! Subprocess results and per-call options.
//!
//! Every command surface returns the same [`ExecResult`] record; callers
//! pick the projection they want (`stdout()`, the full record) instead of
//! the library switching return shapes per call.

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::timeouts;

/// Captured output of a finished subprocess, before any text decoding.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl RawOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Structured `{stdout, stderr, exit_code}` record of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    /// The stdout projection most callers want, right-trimmed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

impl From<RawOutput> for ExecResult {
    fn from(raw: RawOutput) -> Self {
        Self {
            stdout: raw.stdout_lossy(),
            stderr: raw.stderr_lossy(),
            exit_code: raw.exit_code,
        }
    }
}

/// Options accepted by every command surface.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Upper bound on the child's lifetime; exceeding it kills the child.
    pub timeout: Duration,
    /// Treat stderr output on a zero exit as noise instead of a failure hint.
    pub ignore_stderr: bool,
    /// Route `shell` calls through `su`.
    pub privileged: bool,
    /// Working directory for directly-invoked tools.
    pub cwd: Option<PathBuf>,
    /// Extra environment for directly-invoked tools.
    pub env: Vec<(String, String)>,
    /// On Windows, pass arguments through without the default quoting.
    /// Ignored on other hosts.
    pub windows_verbatim_arguments: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: timeouts::ADB_EXEC,
            ignore_stderr: false,
            privileged: false,
            cwd: None,
            env: Vec::new(),
            windows_verbatim_arguments: false,
        }
    }
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_ignore_stderr(mut self, ignore: bool) -> Self {
        self.ignore_stderr = ignore;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_windows_verbatim_arguments(mut self, verbatim: bool) -> Self {
        self.windows_verbatim_arguments = verbatim;
        self
    }
}
