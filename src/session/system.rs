//! System-level device commands: properties, reboot, adbd privileges,
//! bugreports, and the emulator console passthrough.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tokio::time::{sleep, Instant};

use crate::constants::commands::adb;
use crate::constants::timeouts;
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::ExecOptions;
use crate::session::Session;

impl Session {
    /// `getprop <name>`, trimmed.
    pub async fn get_device_property(&self, name: &str) -> BridgeResult<String> {
        let result = self.shell_plain(&[adb::GETPROP, name]).await?;
        Ok(result.stdout_trimmed().to_string())
    }

    /// `setprop <name> <value>`. Persistent properties need root from API
    /// 26 on, so the call escalates when the plain set is rejected.
    pub async fn set_device_property(&self, name: &str, value: &str) -> BridgeResult<()> {
        match self.shell_plain(&[adb::SETPROP, name, value]).await {
            Ok(_) => Ok(()),
            Err(BridgeError::ExecFailure { .. }) => {
                let opts = self.exec_options().with_privileged(true);
                self.shell(&[adb::SETPROP, name, value], &opts).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_model(&self) -> BridgeResult<String> {
        self.get_device_property(adb::PROP_MODEL).await
    }

    pub async fn get_manufacturer(&self) -> BridgeResult<String> {
        self.get_device_property(adb::PROP_MANUFACTURER).await
    }

    /// The Android release string, e.g. `14`.
    pub async fn get_platform_version(&self) -> BridgeResult<String> {
        self.get_device_property(adb::PROP_RELEASE).await
    }

    /// Reboots the device and waits for the boot animation to finish.
    pub async fn reboot(&self, timeout: Duration) -> BridgeResult<()> {
        self.adb_exec(&[adb::REBOOT], &self.exec_options()).await?;
        let deadline = Instant::now() + timeout;

        self.wait_for_device(timeout).await?;
        loop {
            let completed = self
                .get_device_property(adb::PROP_BOOT_COMPLETED)
                .await
                .unwrap_or_default();
            if completed == "1" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::timeout("device reboot", timeout.as_millis()));
            }
            sleep(timeouts::CONDITION_POLL).await;
        }
    }

    /// Restarts adbd with root privileges. Returns `false` when it was
    /// already running as root.
    pub async fn root(&self) -> BridgeResult<bool> {
        self.set_adbd_root(true).await
    }

    /// Drops adbd back to shell privileges.
    pub async fn unroot(&self) -> BridgeResult<bool> {
        self.set_adbd_root(false).await
    }

    async fn set_adbd_root(&self, root: bool) -> BridgeResult<bool> {
        let verb = if root { adb::ROOT } else { adb::UNROOT };
        let opts = self.exec_options().with_ignore_stderr(true);
        let result = self.adb_exec(&[verb], &opts).await?;
        let combined = format!("{}\n{}", result.stdout, result.stderr);
        if combined.contains("already running") {
            return Ok(false);
        }
        if combined.contains("cannot run as root") {
            return Err(BridgeError::other(
                "adbd cannot run as root on production builds",
            ));
        }
        Ok(true)
    }

    /// Collects a bugreport into `dest_dir`. Modern `adb` writes a
    /// timestamped zip on its own; the chosen directory is returned.
    pub async fn bugreport(&self, dest_dir: &Path) -> BridgeResult<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.to_string_lossy();
        let opts = ExecOptions::default().with_timeout(timeouts::BUGREPORT);
        let started = Local::now().format("%Y%m%d-%H%M%S");
        log::info!("Collecting bugreport ({started}) into {dest}");
        self.adb_exec(&[adb::BUGREPORT, dest.as_ref()], &opts).await?;
        Ok(dest_dir.to_path_buf())
    }

    /// Runs a command on the emulator console, e.g. `["geo", "fix", ...]`.
    /// Fails when the selected device is not an emulator.
    pub async fn exec_emu_console_command(&self, args: &[&str]) -> BridgeResult<String> {
        let mut full = vec![adb::EMU];
        full.extend_from_slice(args);
        let result = self.adb_exec(&full, &self.exec_options()).await?;
        let stdout = result.stdout;
        if stdout.contains("KO") || stdout.contains("unknown command") {
            return Err(BridgeError::other(format!(
                "Emulator console rejected '{}': {}",
                args.join(" "),
                stdout.trim()
            )));
        }
        Ok(stdout)
    }

    /// Heuristic: emulator serials look like `emulator-5554`.
    pub fn is_emulator(&self) -> bool {
        self.serial()
            .map(|s| s.starts_with("emulator-"))
            .unwrap_or(false)
    }
}
