//! Streaming logcat collector.
//!
//! [`Logcat`] owns a long-lived `adb logcat` child process. A dedicated
//! reader task parses each stdout line into a [`LogEntry`], appends it to a
//! bounded ring buffer, and fans it out to registered listeners in arrival
//! order. The buffer stays readable after the stream stops; it is discarded
//! with the streamer itself.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::constants::commands::adb;
use crate::constants::defaults;
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::ExecOptions;
use crate::models::log_entry::LogEntry;
use crate::utils::command::CommandRunner;

/// How long to wait for the child to produce its first sign of life.
/// A silent device is not an error; expiry counts as a successful start.
const STARTUP_WAIT: Duration = Duration::from_secs(10);

/// Options for starting a logcat stream.
#[derive(Debug, Clone)]
pub struct LogcatOptions {
    /// `-v` output format; the entry parser assumes `threadtime`.
    pub format: String,
    /// `tag:priority` filter specs appended to the command line.
    pub filter_specs: Vec<String>,
    /// Ring buffer capacity.
    pub max_buffer_size: usize,
    /// Issue `logcat -c` before starting the stream.
    pub clear_device_logs_on_start: bool,
}

impl Default for LogcatOptions {
    fn default() -> Self {
        Self {
            format: defaults::LOGCAT_FORMAT.to_string(),
            filter_specs: Vec::new(),
            max_buffer_size: defaults::LOGCAT_BUFFER_SIZE,
            clear_device_logs_on_start: false,
        }
    }
}

/// Events fanned out to listeners.
#[derive(Debug, Clone)]
pub enum LogcatEvent {
    Entry(LogEntry),
    /// The child exited while the stream was supposed to be running.
    Error(String),
}

/// Opaque handle returned by [`Logcat::on`]; pass to [`Logcat::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&LogcatEvent) + Send + Sync>;

#[derive(Default)]
struct LogcatState {
    buffer: VecDeque<LogEntry>,
    listeners: Vec<(u64, Listener)>,
}

enum StartupEvent {
    Output,
    SpawnFailure(String),
}

/// A running (or stopped) logcat stream bound to one device.
pub struct Logcat {
    adb_path: PathBuf,
    default_args: Vec<String>,
    state: Arc<Mutex<LogcatState>>,
    running: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    child: Arc<tokio::sync::Mutex<Option<tokio::process::Child>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_listener_id: AtomicU64,
}

impl Logcat {
    /// Spawns `adb logcat` and waits for startup.
    ///
    /// Startup succeeds once the first stdout line arrives or stderr emits
    /// anything other than an `execvp()` complaint; an `execvp()` line means
    /// the binary could not be executed and fails with `StartFailed`.
    pub async fn start(
        adb_path: PathBuf,
        default_args: Vec<String>,
        opts: LogcatOptions,
    ) -> BridgeResult<Self> {
        if opts.clear_device_logs_on_start {
            clear_device_logs(&adb_path, &default_args).await;
        }

        let mut args: Vec<String> = default_args.clone();
        args.push(adb::LOGCAT.to_string());
        args.push("-v".to_string());
        args.push(opts.format.clone());
        args.extend(opts.filter_specs.iter().cloned());

        log::debug!("Starting logcat: {} {}", adb_path.display(), args.join(" "));
        let mut child = Command::new(&adb_path)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BridgeError::start_failed("logcat", e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::start_failed("logcat", "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::start_failed("logcat", "stderr not captured"))?;

        let streamer = Self {
            adb_path,
            default_args,
            state: Arc::new(Mutex::new(LogcatState::default())),
            running: Arc::new(AtomicBool::new(true)),
            stopping: Arc::new(AtomicBool::new(false)),
            child: Arc::new(tokio::sync::Mutex::new(Some(child))),
            tasks: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        };

        let (startup_tx, mut startup_rx) = mpsc::channel::<StartupEvent>(4);

        let stdout_task = tokio::spawn(Self::read_stdout(
            stdout,
            Arc::clone(&streamer.state),
            Arc::clone(&streamer.running),
            Arc::clone(&streamer.stopping),
            opts.max_buffer_size,
            startup_tx.clone(),
        ));
        let stderr_task = tokio::spawn(Self::read_stderr(stderr, startup_tx));
        streamer
            .tasks
            .lock()
            .unwrap()
            .extend([stdout_task, stderr_task]);

        match tokio::time::timeout(STARTUP_WAIT, startup_rx.recv()).await {
            Ok(Some(StartupEvent::SpawnFailure(line))) => {
                streamer.stop().await?;
                return Err(BridgeError::start_failed("logcat", line));
            }
            Ok(Some(StartupEvent::Output)) => {}
            // Channel closed or silent device: the child is running.
            Ok(None) | Err(_) => {}
        }
        Ok(streamer)
    }

    async fn read_stdout(
        stdout: impl AsyncRead + Unpin,
        state: Arc<Mutex<LogcatState>>,
        running: Arc<AtomicBool>,
        stopping: Arc<AtomicBool>,
        max_buffer_size: usize,
        startup_tx: mpsc::Sender<StartupEvent>,
    ) {
        let mut reader = BufReader::new(stdout);
        let mut buf: Vec<u8> = Vec::new();
        let mut first = true;
        loop {
            buf.clear();
            let n = match reader.read_until(b'\n', &mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    log::warn!("logcat read error: {e}");
                    break;
                }
            };
            if n == 0 {
                break;
            }
            // A chunk without a trailing newline is a partial line cut off
            // at end-of-stream; discard it.
            if buf.last() != Some(&b'\n') {
                continue;
            }
            if first {
                let _ = startup_tx.try_send(StartupEvent::Output);
                first = false;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            let entry = LogEntry::parse(line);
            let event = LogcatEvent::Entry(entry.clone());
            let listeners: Vec<Listener> = {
                let mut state = state.lock().unwrap();
                state.buffer.push_back(entry);
                while state.buffer.len() > max_buffer_size {
                    state.buffer.pop_front();
                }
                state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
            };
            for listener in listeners {
                listener(&event);
            }
        }

        if !stopping.load(Ordering::SeqCst) {
            log::warn!("logcat exited unexpectedly");
            running.store(false, Ordering::SeqCst);
            let listeners: Vec<Listener> = {
                let state = state.lock().unwrap();
                state.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
            };
            let event = LogcatEvent::Error("logcat process exited unexpectedly".to_string());
            for listener in listeners {
                listener(&event);
            }
        }
        running.store(false, Ordering::SeqCst);
    }

    async fn read_stderr(stderr: impl AsyncRead + Unpin, startup_tx: mpsc::Sender<StartupEvent>) {
        let mut lines = BufReader::new(stderr).lines();
        let mut first = true;
        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains("execvp()") {
                let _ = startup_tx.try_send(StartupEvent::SpawnFailure(line.clone()));
            } else if first {
                let _ = startup_tx.try_send(StartupEvent::Output);
            }
            first = false;
            log::debug!("logcat stderr: {line}");
        }
    }

    /// Whether the child process is still streaming.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the stream: kills the child and joins the reader tasks. The
    /// ring buffer remains readable. Idempotent.
    pub async fn stop(&self) -> BridgeResult<()> {
        self.stopping.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                log::debug!("logcat child was already gone: {e}");
            }
            let _ = child.wait().await;
        }
        self.running.store(false, Ordering::SeqCst);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    /// Runs `adb logcat -c` next to the stream. Failures are logged and
    /// swallowed; a buffer clear on the device must not kill the session.
    pub async fn clear(&self) {
        clear_device_logs(&self.adb_path, &self.default_args).await;
    }

    /// Snapshot copy of the ring buffer, oldest first.
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .unwrap()
            .buffer
            .iter()
            .cloned()
            .collect()
    }

    /// Registers a listener invoked for every event after startup.
    pub fn on(&self, listener: impl Fn(&LogcatEvent) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .listeners
            .push((id, Arc::new(listener)));
        ListenerId(id)
    }

    /// Removes a previously registered listener.
    pub fn off(&self, id: ListenerId) {
        self.state
            .lock()
            .unwrap()
            .listeners
            .retain(|(listener_id, _)| *listener_id != id.0);
    }
}

async fn clear_device_logs(adb_path: &std::path::Path, default_args: &[String]) {
    let mut args: Vec<&str> = default_args.iter().map(String::as_str).collect();
    args.push(adb::LOGCAT);
    args.push("-c");
    let runner = CommandRunner::new();
    match runner.run(adb_path, &args, &ExecOptions::default()).await {
        Ok(raw) if raw.success() => {}
        Ok(raw) => log::warn!("Failed to clear device logs: {}", raw.stderr_lossy().trim()),
        Err(e) => log::warn!("Failed to clear device logs: {e}"),
    }
}
