//! Command execution utilities
//!
//! This module provides a unified interface for executing external commands
//! asynchronously. It handles output capture, per-call timeouts with child
//! termination, optional working directory and environment overrides, and
//! debug logging in a consistent manner across the library.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::timeout;

use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::{ExecOptions, RawOutput};
use crate::utils::quoting::quote_for_exec;

/// Renders a program + argv as a single display line, quoted per host rules.
pub fn format_cmdline<S: AsRef<OsStr>>(program: S, args: &[&str]) -> String {
    let mut parts = vec![quote_for_exec(&program.as_ref().to_string_lossy())];
    parts.extend(args.iter().map(|a| quote_for_exec(a)));
    parts.join(" ")
}

/// A utility for executing external commands asynchronously.
///
/// CommandRunner provides a consistent interface for running `adb` and the
/// other Android SDK tools. It captures both output streams as raw bytes
/// (screenshots travel through the same path as text), and enforces the
/// caller's timeout by killing the child process.
///
/// The runner itself never interprets exit codes; callers decide what a
/// non-zero exit means, since the retry layer needs stderr of failed
/// invocations intact.
#[derive(Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Executes a command and waits for it to complete.
    ///
    /// The child is spawned with all stdio detached from the parent's;
    /// stdout and stderr are captured in full. When `opts.timeout` elapses
    /// before the child exits, the child is killed and a
    /// [`BridgeError::Timeout`] is returned.
    pub async fn run(
        &self,
        program: &Path,
        args: &[&str],
        opts: &ExecOptions,
    ) -> BridgeResult<RawOutput> {
        let cmdline = format_cmdline(program, args);
        log::debug!("Executing: {cmdline}");

        let mut command = Command::new(program);
        #[cfg(windows)]
        if opts.windows_verbatim_arguments {
            for arg in args {
                command.raw_arg(arg);
            }
        } else {
            command.args(args);
        }
        #[cfg(not(windows))]
        command.args(args);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must reap the child.
            .kill_on_drop(true);
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &opts.env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                BridgeError::tool_not_found(program.to_string_lossy())
            } else {
                BridgeError::Io(source)
            }
        })?;

        let output = match timeout(opts.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                log::warn!(
                    "Command timed out after {} ms: {cmdline}",
                    opts.timeout.as_millis()
                );
                return Err(BridgeError::timeout(cmdline, opts.timeout.as_millis()));
            }
        };

        let raw = RawOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            // A signal-terminated child reports no code; normalize to -1.
            exit_code: output.status.code().unwrap_or(-1),
        };
        log::debug!(
            "Command exited with {} ({} stdout bytes, {} stderr bytes)",
            raw.exit_code,
            raw.stdout.len(),
            raw.stderr.len()
        );
        Ok(raw)
    }

    /// Spawns a command without waiting for completion and returns its pid.
    ///
    /// Used for fire-and-forget children that outlive the call, such as the
    /// emulator console. The exit status is not monitored.
    pub async fn spawn(&self, program: &Path, args: &[&str]) -> BridgeResult<u32> {
        log::debug!("Spawning: {}", format_cmdline(program, args));
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(child.id().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = CommandRunner::new();
        let out = runner
            .run(
                Path::new("sh"),
                &["-c", "printf hello; exit 3"],
                &ExecOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout_lossy(), "hello");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn kills_child_on_timeout() {
        let runner = CommandRunner::new();
        let opts = ExecOptions::default().with_timeout(Duration::from_millis(100));
        let err = runner
            .run(Path::new("sleep"), &["5"], &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_binary_maps_to_tool_not_found() {
        let runner = CommandRunner::new();
        let err = runner
            .run(
                Path::new("definitely-not-a-real-binary"),
                &[],
                &ExecOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ToolNotFound { .. }));
    }
}
