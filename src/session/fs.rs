//! Device filesystem helpers.

use std::path::Path;
use std::time::Duration;

use crate::constants::commands::adb;
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::ExecOptions;
use crate::session::Session;

impl Session {
    /// Copies a host file or directory onto the device.
    pub async fn push(&self, local: &Path, remote: &str, timeout: Duration) -> BridgeResult<()> {
        let local = local.to_string_lossy();
        let opts = ExecOptions::default().with_timeout(timeout);
        self.adb_exec(&[adb::PUSH, local.as_ref(), remote], &opts)
            .await?;
        Ok(())
    }

    /// Copies a device file or directory to the host.
    pub async fn pull(&self, remote: &str, local: &Path, timeout: Duration) -> BridgeResult<()> {
        let local = local.to_string_lossy();
        let opts = ExecOptions::default().with_timeout(timeout);
        self.adb_exec(&[adb::PULL, remote, local.as_ref()], &opts)
            .await?;
        Ok(())
    }

    /// True when the remote path exists.
    pub async fn file_exists(&self, remote: &str) -> BridgeResult<bool> {
        let opts = self.exec_options().with_ignore_stderr(true);
        let result = self.shell(&["ls", remote], &opts).await?;
        Ok(result.exit_code == 0 && !result.stdout.contains("No such file"))
    }

    /// Size of a remote file in bytes, parsed from `ls -la`.
    pub async fn file_size(&self, remote: &str) -> BridgeResult<u64> {
        let result = self.shell_plain(&["ls", "-la", remote]).await?;
        let line = result
            .stdout
            .lines()
            .find(|l| l.contains(remote) || !l.trim().is_empty())
            .unwrap_or_default();
        // toybox: perms links owner group size date time name
        let fields: Vec<&str> = line.split_whitespace().collect();
        fields
            .get(4)
            .or_else(|| fields.get(3))
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| BridgeError::parse_failure(line, "an ls -la size column"))
    }

    /// Creates a remote directory, parents included.
    pub async fn mkdir(&self, remote: &str) -> BridgeResult<()> {
        self.shell_plain(&["mkdir", "-p", remote]).await?;
        Ok(())
    }

    /// Recursively removes a remote path.
    pub async fn rimraf(&self, remote: &str) -> BridgeResult<()> {
        self.shell_plain(&["rm", "-rf", remote]).await?;
        Ok(())
    }
}
