//! Device session management.
//!
//! A [`Session`] is one logical attachment to one device: it carries the
//! resolved `adb` location, the default argument prefix (host/port/serial),
//! memoized device facts (API level, feature list, bridge version), the
//! keystore configuration for the signing pipeline, and an optional logcat
//! streamer handle.
//!
//! Sub-surfaces are implemented as `impl Session` blocks in the sibling
//! modules: command execution ([`exec`]), application lifecycle ([`apps`]),
//! processes, permissions, settings, input, screen, device filesystem,
//! system commands, and the settings-helper IPC ([`settings_app`]).

pub mod apps;
pub mod exec;
pub mod fs;
pub mod input;
pub mod permissions;
pub mod processes;
pub mod screen;
pub mod settings;
pub mod settings_app;
pub mod system;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use tokio::time::{sleep, Instant};

use crate::constants::commands::{adb, ADB};
use crate::constants::{defaults, timeouts};
use crate::logcat::{Logcat, LogcatOptions};
use crate::models::device::{DeviceEntry, DeviceState};
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::ExecOptions;
use crate::models::keystore::KeystoreConfig;
use crate::signing::cache::{shared_cache, SignedApkCache};
use crate::tools::SdkToolResolver;
use crate::utils::command::CommandRunner;
use crate::utils::command_executor::CommandExecutor;

lazy_static! {
    static ref BRIDGE_VERSION_REGEX: Regex =
        Regex::new(r"Android Debug Bridge version\s+(\d+)\.(\d+)\.(\d+)").unwrap();
    static ref BINARY_VERSION_REGEX: Regex =
        Regex::new(r"(?m)^(?:Version|Revision)\s+([\d.]+)(?:-(\S+))?").unwrap();
}

/// Versions reported by the `adb` client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbVersion {
    /// Bridge protocol version, e.g. `(1, 0, 41)`.
    pub bridge: (u32, u32, u32),
    /// Binary release, e.g. `34.0.4`.
    pub binary: Option<String>,
    /// Build number following the release, e.g. `10411341`.
    pub build: Option<String>,
}

/// Options accepted by the session factory.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub adb_host: Option<String>,
    pub adb_port: Option<u16>,
    /// Default timeout for every `adb` invocation.
    pub adb_exec_timeout: Duration,
    /// Explicit `adb` location; skips SDK resolution when set.
    pub adb_path: Option<PathBuf>,
    /// Bounds the private signed-app cache; `None` shares the process-wide
    /// cache with its fixed bound.
    pub remote_apps_cache_limit: Option<usize>,
    pub keystore: KeystoreConfig,
    /// Skip the server bounce in [`Session::restart_adb`].
    pub suppress_kill_server: bool,
    /// Replayed into every logcat startup.
    pub clear_device_logs_on_start: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            adb_host: None,
            adb_port: None,
            adb_exec_timeout: timeouts::ADB_EXEC,
            adb_path: None,
            remote_apps_cache_limit: None,
            keystore: KeystoreConfig::default(),
            suppress_kill_server: false,
            clear_device_logs_on_start: false,
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adb_host(mut self, host: impl Into<String>) -> Self {
        self.adb_host = Some(host.into());
        self
    }

    pub fn with_adb_port(mut self, port: u16) -> Self {
        self.adb_port = Some(port);
        self
    }

    pub fn with_adb_exec_timeout(mut self, timeout: Duration) -> Self {
        self.adb_exec_timeout = timeout;
        self
    }

    pub fn with_adb_path(mut self, path: PathBuf) -> Self {
        self.adb_path = Some(path);
        self
    }

    pub fn with_keystore(mut self, keystore: KeystoreConfig) -> Self {
        self.keystore = keystore;
        self
    }

    pub fn with_remote_apps_cache_limit(mut self, limit: usize) -> Self {
        self.remote_apps_cache_limit = Some(limit);
        self
    }

    pub fn with_suppress_kill_server(mut self, suppress: bool) -> Self {
        self.suppress_kill_server = suppress;
        self
    }

    pub fn with_clear_device_logs_on_start(mut self, clear: bool) -> Self {
        self.clear_device_logs_on_start = clear;
        self
    }
}

/// Memoized per-device facts. Cleared when the selected device changes.
#[derive(Debug, Default)]
struct SessionState {
    serial: Option<String>,
    default_args: Vec<String>,
    api_level: Option<u32>,
    features: Option<Vec<String>>,
    version: Option<AdbVersion>,
}

/// One logical attachment to one device.
///
/// Cloning shares all state; a `Session` may be driven from multiple tasks
/// concurrently (see the crate-level concurrency notes).
#[derive(Clone)]
pub struct Session {
    executor: Arc<dyn CommandExecutor>,
    tools: SdkToolResolver,
    adb_path: PathBuf,
    options: SessionOptions,
    state: Arc<Mutex<SessionState>>,
    /// Serializes `adb install` against this device from this session.
    install_lock: Arc<tokio::sync::Mutex<()>>,
    logcat: Arc<tokio::sync::Mutex<Option<Logcat>>>,
    signed_cache: Arc<Mutex<SignedApkCache>>,
}

impl Session {
    /// Creates a session against the local SDK installation.
    ///
    /// Resolves `adb` (via `$ANDROID_HOME` / `$ANDROID_SDK_ROOT` / `$PATH`),
    /// queries `adb devices` (which also starts the server daemon when it is
    /// not running), and selects the device automatically when exactly one
    /// usable device is attached.
    pub async fn create(options: SessionOptions) -> BridgeResult<Self> {
        Self::with_executor(options, Arc::new(CommandRunner::new())).await
    }

    /// Creates a session with a custom command executor.
    /// This is primarily used for testing with mock executors.
    pub async fn with_executor(
        options: SessionOptions,
        executor: Arc<dyn CommandExecutor>,
    ) -> BridgeResult<Self> {
        let tools = SdkToolResolver::new();
        let adb_path = match &options.adb_path {
            Some(path) => path.clone(),
            None => tools.binary(ADB)?,
        };

        let signed_cache = match options.remote_apps_cache_limit {
            Some(limit) => Arc::new(Mutex::new(SignedApkCache::new(limit))),
            None => shared_cache(),
        };

        let session = Self {
            executor,
            tools,
            adb_path,
            options,
            state: Arc::new(Mutex::new(SessionState::default())),
            install_lock: Arc::new(tokio::sync::Mutex::new(())),
            logcat: Arc::new(tokio::sync::Mutex::new(None)),
            signed_cache,
        };
        session.rebuild_default_args();

        let devices = session.get_connected_devices().await?;
        let mut usable = devices.iter().filter(|d| d.state.is_usable());
        match (usable.next(), usable.next()) {
            (Some(only), None) => {
                log::info!("Auto-selecting the only connected device: {}", only.serial);
                session.set_device(only);
            }
            (Some(_), Some(_)) => {
                log::info!("Multiple devices attached; none selected yet");
            }
            _ => log::warn!("No usable device attached"),
        }
        Ok(session)
    }

    pub(crate) fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    pub fn tools(&self) -> &SdkToolResolver {
        &self.tools
    }

    pub fn adb_path(&self) -> &PathBuf {
        &self.adb_path
    }

    pub fn keystore(&self) -> &KeystoreConfig {
        &self.options.keystore
    }

    pub(crate) fn signed_cache(&self) -> &Arc<Mutex<SignedApkCache>> {
        &self.signed_cache
    }

    pub(crate) fn install_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.install_lock
    }

    /// Default `ExecOptions` carrying the session's adb timeout.
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions::default().with_timeout(self.options.adb_exec_timeout)
    }

    /// Serial of the selected device, if any.
    pub fn serial(&self) -> Option<String> {
        self.state.lock().unwrap().serial.clone()
    }

    fn require_serial(&self) -> BridgeResult<String> {
        self.serial().ok_or(BridgeError::NotConnected)
    }

    /// Current `adb [-H host] [-P port] [-s serial]` prefix.
    pub fn default_args(&self) -> Vec<String> {
        self.state.lock().unwrap().default_args.clone()
    }

    fn rebuild_default_args(&self) {
        let mut state = self.state.lock().unwrap();
        let mut args = Vec::new();
        if let Some(host) = &self.options.adb_host {
            if host != defaults::ADB_HOST {
                args.push(adb::HOST_ARG.to_string());
                args.push(host.clone());
            }
        }
        if let Some(port) = self.options.adb_port {
            if port != defaults::ADB_PORT {
                args.push(adb::PORT_ARG.to_string());
                args.push(port.to_string());
            }
        }
        if let Some(serial) = &state.serial {
            args.push(adb::SERIAL_ARG.to_string());
            args.push(serial.clone());
        }
        state.default_args = args;
    }

    /// Selects a device and rebuilds the default argument prefix.
    /// Memoized device facts are dropped with the previous selection.
    pub fn set_device(&self, entry: &DeviceEntry) {
        {
            let mut state = self.state.lock().unwrap();
            if state.serial.as_deref() != Some(entry.serial.as_str()) {
                state.api_level = None;
                state.features = None;
            }
            state.serial = Some(entry.serial.clone());
        }
        self.rebuild_default_args();
    }

    /// All `(serial, state)` pairs parsed from `adb devices`.
    pub async fn get_connected_devices(&self) -> BridgeResult<Vec<DeviceEntry>> {
        // Not routed through `adb_exec`: rediscovery is itself a retry
        // handler, and must not carry a `-s` prefix.
        let opts = self.exec_options();
        let raw = self
            .executor
            .run(&self.adb_path, &[adb::DEVICES], &opts)
            .await?;
        if !raw.success() {
            return Err(BridgeError::ExecFailure {
                cmdline: format!("{} devices", self.adb_path.display()),
                exit_code: raw.exit_code,
                stdout: raw.stdout_lossy(),
                stderr: raw.stderr_lossy(),
            });
        }
        Ok(DeviceEntry::parse_list(&raw.stdout_lossy()))
    }

    /// Polls `adb devices` until at least one usable device appears.
    pub async fn get_devices_with_retry(
        &self,
        timeout: Duration,
    ) -> BridgeResult<Vec<DeviceEntry>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.get_connected_devices().await {
                Ok(devices) => {
                    if devices.iter().any(|d| d.state.is_usable()) {
                        return Ok(devices);
                    }
                    if devices
                        .iter()
                        .any(|d| d.state == DeviceState::Unauthorized)
                    {
                        log::warn!("A device is attached but not yet authorized");
                    }
                }
                Err(e) => log::debug!("Device listing failed, retrying: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::NotConnected);
            }
            sleep(timeouts::DEVICE_POLL).await;
        }
    }

    /// Convenience over `get_connected_devices().len() > 0`.
    pub async fn is_device_connected(&self) -> BridgeResult<bool> {
        Ok(!self.get_connected_devices().await?.is_empty())
    }

    /// `adb wait-for-device`, timeout-guarded.
    pub async fn wait_for_device(&self, timeout: Duration) -> BridgeResult<()> {
        let opts = ExecOptions::default().with_timeout(timeout);
        self.adb_exec(&[adb::WAIT_FOR_DEVICE], &opts).await?;
        Ok(())
    }

    /// Bounces the ADB server, unless suppressed by the session options.
    pub async fn restart_adb(&self) -> BridgeResult<()> {
        if self.options.suppress_kill_server {
            log::debug!("Server restart suppressed by session options");
            return Ok(());
        }
        self.kill_server().await?;
        self.start_server().await
    }

    pub(crate) async fn kill_server(&self) -> BridgeResult<()> {
        let opts = self.exec_options();
        // kill-server exits non-zero when no server was running.
        let _ = self
            .executor
            .run(&self.adb_path, &[adb::KILL_SERVER], &opts)
            .await?;
        Ok(())
    }

    pub(crate) async fn start_server(&self) -> BridgeResult<()> {
        let opts = self.exec_options();
        let raw = self
            .executor
            .run(&self.adb_path, &[adb::START_SERVER], &opts)
            .await?;
        if raw.success() {
            Ok(())
        } else {
            Err(BridgeError::start_failed("adb server", raw.stderr_lossy()))
        }
    }

    /// Bridge and binary versions from `adb version`, cached on the session.
    pub async fn get_version(&self) -> BridgeResult<AdbVersion> {
        if let Some(version) = self.state.lock().unwrap().version.clone() {
            return Ok(version);
        }
        let result = self.adb_exec(&[adb::VERSION], &self.exec_options()).await?;
        let version = Self::parse_version(&result.stdout)?;
        self.state.lock().unwrap().version = Some(version.clone());
        Ok(version)
    }

    fn parse_version(output: &str) -> BridgeResult<AdbVersion> {
        let caps = BRIDGE_VERSION_REGEX.captures(output).ok_or_else(|| {
            BridgeError::parse_failure(
                output.lines().next().unwrap_or_default(),
                "Android Debug Bridge version <x.y.z>",
            )
        })?;
        let bridge = (
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[3].parse().unwrap_or(0),
        );
        let (binary, build) = match BINARY_VERSION_REGEX.captures(output) {
            Some(caps) => (
                Some(caps[1].to_string()),
                caps.get(2).map(|m| m.as_str().to_string()),
            ),
            None => (None, None),
        };
        Ok(AdbVersion {
            bridge,
            binary,
            build,
        })
    }

    /// The device API level, memoized on first successful query.
    ///
    /// Preview builds report the previous SDK with the upcoming release's
    /// codename letter in `ro.build.version.release`; such a device is
    /// stored as the next API level.
    pub async fn api_level(&self) -> BridgeResult<u32> {
        if let Some(api) = self.state.lock().unwrap().api_level {
            return Ok(api);
        }
        let result = self
            .shell_plain(&[adb::GETPROP, adb::PROP_API_LEVEL])
            .await?;
        let raw = result.stdout_trimmed();
        let mut api: u32 = raw
            .parse()
            .map_err(|_| BridgeError::parse_failure(raw, "numeric ro.build.version.sdk"))?;

        if api >= 28 {
            let release = self
                .shell_plain(&[adb::GETPROP, adb::PROP_RELEASE])
                .await?;
            let release = release.stdout_trimmed().to_lowercase();
            if let Some(expected) = char::from_u32('q' as u32 + (api - 28)) {
                if release == expected.to_string() {
                    log::debug!(
                        "Release '{release}' is a preview codename; treating API {api} as {}",
                        api + 1
                    );
                    api += 1;
                }
            }
        }

        self.state.lock().unwrap().api_level = Some(api);
        Ok(api)
    }

    /// Transport features advertised for this device (`adb features`).
    pub async fn list_features(&self) -> BridgeResult<Vec<String>> {
        if let Some(features) = self.state.lock().unwrap().features.clone() {
            return Ok(features);
        }
        let result = self
            .adb_exec(&[adb::FEATURES], &self.exec_options())
            .await?;
        let features: Vec<String> = result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        self.state.lock().unwrap().features = Some(features.clone());
        Ok(features)
    }

    /// Whether `adb install --streaming` can be used against this device.
    pub async fn is_streamed_install_supported(&self) -> BridgeResult<bool> {
        let features = self.list_features().await?;
        if !features.iter().any(|f| f == "cmd") {
            return Ok(false);
        }
        let version = self.get_version().await?;
        Ok(version.bridge >= (1, 0, 40))
    }

    /// Starts a logcat streamer bound to this session's device.
    ///
    /// Fails with `StartFailed` when a streamer is already attached.
    pub async fn start_logcat(&self, mut opts: LogcatOptions) -> BridgeResult<()> {
        let serial = self.require_serial()?;
        let mut slot = self.logcat.lock().await;
        if slot.as_ref().map(Logcat::is_running).unwrap_or(false) {
            return Err(BridgeError::start_failed("logcat", "already running"));
        }
        opts.clear_device_logs_on_start =
            opts.clear_device_logs_on_start || self.options.clear_device_logs_on_start;
        let logcat = Logcat::start(self.adb_path.clone(), self.default_args_with(&serial), opts)
            .await?;
        *slot = Some(logcat);
        Ok(())
    }

    fn default_args_with(&self, serial: &str) -> Vec<String> {
        let mut args = self.default_args();
        if !args.iter().any(|a| a == adb::SERIAL_ARG) {
            args.push(adb::SERIAL_ARG.to_string());
            args.push(serial.to_string());
        }
        args
    }

    /// Stops an attached logcat streamer. Idempotent.
    pub async fn stop_logcat(&self) -> BridgeResult<()> {
        let mut slot = self.logcat.lock().await;
        if let Some(logcat) = slot.as_ref() {
            logcat.stop().await?;
        }
        *slot = None;
        Ok(())
    }

    /// Runs `f` against the attached logcat streamer.
    pub async fn with_logcat<T>(
        &self,
        f: impl FnOnce(&Logcat) -> T,
    ) -> BridgeResult<T> {
        let slot = self.logcat.lock().await;
        match slot.as_ref() {
            Some(logcat) => Ok(f(logcat)),
            None => Err(BridgeError::other("No logcat streamer is attached")),
        }
    }

    /// Explicit shutdown: stops any attached logcat.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.stop_logcat().await
    }
}
