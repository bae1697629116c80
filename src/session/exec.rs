//! Command execution against the selected device.
//!
//! Everything here funnels through [`Session::adb_exec`]: it prepends the
//! session's default argument prefix, strips the known linker warning from
//! stdout, and transparently recovers from the three transient `adb`
//! failures (server protocol fault, device dropout, pending authorization).
//! Direct tool invocations (`zipalign`, `apksigner`, `java`) use
//! [`Session::exec_tool`] and bypass the adb-specific handling.

use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::sleep;

use crate::constants::commands::{adb, shell};
use crate::constants::{android, defaults, limits, timeouts};
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::{ExecOptions, ExecResult};
use crate::session::Session;
use crate::utils::command::format_cmdline;
use crate::utils::quoting::quote_for_exec;

lazy_static! {
    static ref LINKER_WARNING_REGEX: Regex = Regex::new(r"(?m)^WARNING: linker.+$").unwrap();
}

/// Stderr fragments that mark a call as transiently recoverable.
const PROTOCOL_FAULT: &str = "protocol fault (no status)";
const DEVICE_NOT_FOUND: &str = "error: device not found";
const DEVICE_AUTHORIZING: &str = "error: device still authorizing";

fn strip_linker_warnings(stdout: &str) -> String {
    if !stdout.contains("WARNING: linker") {
        return stdout.to_string();
    }
    LINKER_WARNING_REGEX.replace_all(stdout, "").into_owned()
}

impl Session {
    /// Runs `adb` with the session's default argument prefix.
    ///
    /// A non-zero exit surfaces as [`BridgeError::ExecFailure`] carrying the
    /// full command line and both output streams, unless
    /// `opts.ignore_stderr` is set, in which case the record is returned
    /// as-is for the caller to inspect. Recoverable failures are retried up
    /// to two times; only the final failure surfaces.
    pub async fn adb_exec(&self, args: &[&str], opts: &ExecOptions) -> BridgeResult<ExecResult> {
        let default_args = self.default_args();
        let mut full_args: Vec<&str> = default_args.iter().map(String::as_str).collect();
        full_args.extend_from_slice(args);

        let mut attempt = 0;
        loop {
            let raw = self.executor().run(self.adb_path(), &full_args, opts).await?;
            if raw.success() || opts.ignore_stderr {
                return Ok(ExecResult {
                    stdout: strip_linker_warnings(&raw.stdout_lossy()),
                    stderr: raw.stderr_lossy(),
                    exit_code: raw.exit_code,
                });
            }

            let stderr = raw.stderr_lossy();
            let failure = BridgeError::ExecFailure {
                cmdline: format_cmdline(self.adb_path(), &full_args),
                exit_code: raw.exit_code,
                stdout: raw.stdout_lossy(),
                stderr: stderr.clone(),
            };
            if attempt == defaults::ADB_RETRY_COUNT {
                return Err(failure);
            }

            if stderr.contains(PROTOCOL_FAULT) {
                log::warn!("adb protocol fault; bouncing the server before retrying");
                self.kill_server().await?;
                self.start_server().await?;
            } else if stderr.contains(DEVICE_NOT_FOUND) {
                log::warn!("Device went away; waiting for it to reappear");
                self.get_devices_with_retry(Duration::from_secs(20)).await?;
            } else if stderr.contains(DEVICE_AUTHORIZING) {
                log::warn!("Device is still authorizing; pausing before retry");
                sleep(timeouts::AUTHORIZING_PAUSE).await;
            } else {
                return Err(failure);
            }
            attempt += 1;
        }
    }

    /// `adb shell <argv>` with the session's default timeout.
    pub(crate) async fn shell_plain(&self, argv: &[&str]) -> BridgeResult<ExecResult> {
        self.shell(argv, &self.exec_options()).await
    }

    /// Runs a command in the device shell.
    ///
    /// With `opts.privileged`, the command is wrapped in `su -c` on API >=
    /// 26 and `su 0 -c` below; each argument is quoted for the device shell
    /// before joining.
    pub fn shell<'a>(
        &'a self,
        argv: &'a [&str],
        opts: &'a ExecOptions,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = BridgeResult<ExecResult>> + Send + 'a>>
    {
        Box::pin(async move {
            if opts.privileged {
                let joined = argv
                    .iter()
                    .map(|a| quote_for_exec(a))
                    .collect::<Vec<_>>()
                    .join(" ");
                let api = self.api_level().await?;
                return if api >= android::api::MODERN_SU {
                    self.adb_exec(&[adb::SHELL, shell::SU, "-c", &joined], opts)
                        .await
                } else {
                    self.adb_exec(&[adb::SHELL, shell::SU, "0", "-c", &joined], opts)
                        .await
                };
            }

            let mut args = vec![adb::SHELL];
            args.extend_from_slice(argv);
            self.adb_exec(&args, opts).await
        })
    }

    /// Applies `argv_fn` to every item and executes the resulting commands
    /// in batches whose joined length stays within the device shell input
    /// limit. Batches run in item order; the first failing batch surfaces
    /// immediately.
    pub async fn shell_chunks<F>(&self, argv_fn: F, items: &[String]) -> BridgeResult<()>
    where
        F: Fn(&str) -> Vec<String>,
    {
        let api = self.api_level().await?;
        let limit = if api < limits::SHELL_LIMIT_API_FLOOR {
            limits::SHELL_COMMAND_LENGTH_LEGACY
        } else {
            limits::SHELL_COMMAND_LENGTH
        };

        let mut batch: Vec<String> = Vec::new();
        let mut batch_len = 0usize;
        for item in items {
            let mut argv = argv_fn(item);
            argv.push(";".to_string());
            let addition: usize = argv.iter().map(|a| a.len() + 1).sum();
            if batch_len + addition > limit && !batch.is_empty() {
                self.run_shell_batch(&batch).await?;
                batch.clear();
                batch_len = 0;
            }
            batch_len += addition;
            batch.extend(argv);
        }
        if !batch.is_empty() {
            self.run_shell_batch(&batch).await?;
        }
        Ok(())
    }

    async fn run_shell_batch(&self, batch: &[String]) -> BridgeResult<()> {
        let argv: Vec<&str> = batch.iter().map(String::as_str).collect();
        self.shell(&argv, &self.exec_options()).await?;
        Ok(())
    }

    /// `adb exec-out <argv>`: raw stdout bytes, passed through unchanged.
    pub async fn exec_out(&self, argv: &[&str], opts: &ExecOptions) -> BridgeResult<Vec<u8>> {
        let default_args = self.default_args();
        let mut full_args: Vec<&str> = default_args.iter().map(String::as_str).collect();
        full_args.push(adb::EXEC_OUT);
        full_args.extend_from_slice(argv);

        let raw = self.executor().run(self.adb_path(), &full_args, opts).await?;
        if !raw.success() {
            return Err(BridgeError::ExecFailure {
                cmdline: format_cmdline(self.adb_path(), &full_args),
                exit_code: raw.exit_code,
                stdout: String::new(),
                stderr: raw.stderr_lossy(),
            });
        }
        Ok(raw.stdout)
    }

    /// Direct subprocess execution, not routed through adb.
    pub async fn exec_tool(
        &self,
        program: &Path,
        argv: &[&str],
        opts: &ExecOptions,
    ) -> BridgeResult<ExecResult> {
        let raw = self.executor().run(program, argv, opts).await?;
        if !raw.success() && !opts.ignore_stderr {
            return Err(BridgeError::ExecFailure {
                cmdline: format_cmdline(program, argv),
                exit_code: raw.exit_code,
                stdout: raw.stdout_lossy(),
                stderr: raw.stderr_lossy(),
            });
        }
        Ok(raw.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_linker_warnings_only() {
        let stdout = "WARNING: linker: libdvm.so has text relocations.\n28\nWARNING: linker: again\n";
        let cleaned = strip_linker_warnings(stdout);
        assert_eq!(cleaned.trim(), "28");
    }

    #[test]
    fn leaves_clean_stdout_untouched() {
        let stdout = "value with WARNING inline but not a linker line";
        assert_eq!(strip_linker_warnings(stdout), stdout);
    }
}
