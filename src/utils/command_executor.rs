//! Command execution abstraction for testability
//!
//! This module provides a trait-based abstraction over command execution,
//! allowing for easy mocking in tests while maintaining the same behavior
//! in production code.

use std::path::Path;

use async_trait::async_trait;

use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::{ExecOptions, RawOutput};
use crate::utils::command::CommandRunner;

/// Trait for executing external commands
///
/// This abstraction allows dependency injection of command execution logic,
/// making it possible to mock external command calls in tests. The retry
/// layer dispatches on stderr of failed invocations, so implementations
/// must return captured output for non-zero exits rather than erroring.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command to completion and capture its output.
    async fn run(
        &self,
        program: &Path,
        args: &[&str],
        opts: &ExecOptions,
    ) -> BridgeResult<RawOutput>;

    /// Spawn a command without waiting and return its process ID.
    async fn spawn(&self, program: &Path, args: &[&str]) -> BridgeResult<u32>;
}

#[async_trait]
impl CommandExecutor for CommandRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[&str],
        opts: &ExecOptions,
    ) -> BridgeResult<RawOutput> {
        CommandRunner::run(self, program, args, opts).await
    }

    async fn spawn(&self, program: &Path, args: &[&str]) -> BridgeResult<u32> {
        CommandRunner::spawn(self, program, args).await
    }
}

pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    type CallHistory = Arc<Mutex<Vec<(String, Vec<String>)>>>;
    type ResponseMap = Arc<Mutex<HashMap<String, VecDeque<Result<RawOutput, String>>>>>;
    type PrefixResponses = Arc<Mutex<Vec<(String, Vec<String>, RawOutput)>>>;

    /// Mock implementation of CommandExecutor for testing.
    ///
    /// Responses are keyed by `"<program> <args joined>"`, with a fallback
    /// match on the program's basename so tests don't need to know resolved
    /// tool paths. A key may hold a FIFO of responses; the last response is
    /// replayed once the queue is down to one, so a single canned response
    /// also answers repeated calls.
    #[derive(Clone, Default)]
    pub struct MockCommandExecutor {
        responses: ResponseMap,
        prefix_responses: PrefixResponses,
        spawn_responses: Arc<Mutex<HashMap<String, u32>>>,
        call_history: CallHistory,
    }

    impl MockCommandExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        fn key(command: &str, args: &[&str]) -> String {
            format!("{} {}", command, args.join(" "))
        }

        /// Queue a raw response for a specific command.
        pub fn with_output(self, command: &str, args: &[&str], output: RawOutput) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(Self::key(command, args))
                .or_default()
                .push_back(Ok(output));
            self
        }

        /// Queue a successful (exit 0) stdout-only response.
        pub fn with_success(self, command: &str, args: &[&str], stdout: &str) -> Self {
            self.with_output(
                command,
                args,
                RawOutput {
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: Vec::new(),
                    exit_code: 0,
                },
            )
        }

        /// Queue a failing response with the given exit code and stderr.
        pub fn with_failure(
            self,
            command: &str,
            args: &[&str],
            exit_code: i32,
            stderr: &str,
        ) -> Self {
            self.with_output(
                command,
                args,
                RawOutput {
                    stdout: Vec::new(),
                    stderr: stderr.as_bytes().to_vec(),
                    exit_code,
                },
            )
        }

        /// Queue a hard execution error (e.g. binary missing).
        pub fn with_error(self, command: &str, args: &[&str], error: &str) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(Self::key(command, args))
                .or_default()
                .push_back(Err(error.to_string()));
            self
        }

        /// Queue a response matched on an argument prefix instead of the
        /// full argv. Useful when trailing arguments are generated at run
        /// time (temp file paths).
        pub fn with_success_prefix(
            self,
            command: &str,
            args_prefix: &[&str],
            stdout: &str,
        ) -> Self {
            self.prefix_responses.lock().unwrap().push((
                command.to_string(),
                args_prefix.iter().map(|s| s.to_string()).collect(),
                RawOutput {
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: Vec::new(),
                    exit_code: 0,
                },
            ));
            self
        }

        /// Add a spawn response.
        pub fn with_spawn_response(self, command: &str, args: &[&str], pid: u32) -> Self {
            self.spawn_responses
                .lock()
                .unwrap()
                .insert(Self::key(command, args), pid);
            self
        }

        /// Get the call history.
        pub fn call_history(&self) -> Vec<(String, Vec<String>)> {
            self.call_history.lock().unwrap().clone()
        }

        /// Calls whose program basename matches `program`.
        pub fn calls_for(&self, program: &str) -> Vec<Vec<String>> {
            self.call_history
                .lock()
                .unwrap()
                .iter()
                .filter(|(cmd, _)| {
                    Path::new(cmd)
                        .file_name()
                        .map(|n| n.to_string_lossy() == program)
                        .unwrap_or(false)
                })
                .map(|(_, args)| args.clone())
                .collect()
        }

        pub fn clear_history(&self) {
            self.call_history.lock().unwrap().clear();
        }

        fn next_response(&self, key: &str, basename_key: &str) -> Option<Result<RawOutput, String>> {
            let mut responses = self.responses.lock().unwrap();
            for candidate in [key, basename_key] {
                if let Some(queue) = responses.get_mut(candidate) {
                    if queue.len() > 1 {
                        return queue.pop_front();
                    }
                    if let Some(last) = queue.front() {
                        return Some(last.clone());
                    }
                }
            }
            None
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn run(
            &self,
            program: &Path,
            args: &[&str],
            _opts: &ExecOptions,
        ) -> BridgeResult<RawOutput> {
            let program_str = program.to_string_lossy().into_owned();
            let key = Self::key(&program_str, args);

            self.call_history.lock().unwrap().push((
                program_str.clone(),
                args.iter().map(|s| s.to_string()).collect(),
            ));

            let basename = program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| program_str.clone());
            let basename_key = Self::key(&basename, args);

            if let Some(response) = self.next_response(&key, &basename_key) {
                return match response {
                    Ok(output) => Ok(output),
                    Err(message) => Err(BridgeError::other(message)),
                };
            }

            let prefix_responses = self.prefix_responses.lock().unwrap();
            for (command, prefix, output) in prefix_responses.iter() {
                let program_matches = *command == program_str || *command == basename;
                let prefix_matches = args.len() >= prefix.len()
                    && prefix.iter().zip(args.iter()).all(|(p, a)| p == a);
                if program_matches && prefix_matches {
                    return Ok(output.clone());
                }
            }
            Err(BridgeError::other(format!("No mock response for: {key}")))
        }

        async fn spawn(&self, program: &Path, args: &[&str]) -> BridgeResult<u32> {
            let program_str = program.to_string_lossy().into_owned();
            let key = Self::key(&program_str, args);

            self.call_history.lock().unwrap().push((
                program_str.clone(),
                args.iter().map(|s| s.to_string()).collect(),
            ));

            let basename = program
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| program_str.clone());
            let basename_key = Self::key(&basename, args);

            let spawn_responses = self.spawn_responses.lock().unwrap();
            spawn_responses
                .get(&key)
                .or_else(|| spawn_responses.get(&basename_key))
                .copied()
                .ok_or_else(|| BridgeError::other(format!("No mock spawn response for: {key}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockCommandExecutor;
    use super::*;

    #[tokio::test]
    async fn mock_replays_success() {
        let executor = MockCommandExecutor::new().with_success("echo", &["hello"], "hello\n");

        let out = executor
            .run(Path::new("echo"), &["hello"], &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(out.stdout_lossy(), "hello\n");
        assert_eq!(out.exit_code, 0);

        let history = executor.call_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].0, "echo");
    }

    #[tokio::test]
    async fn mock_matches_on_basename() {
        let executor = MockCommandExecutor::new().with_success("adb", &["devices"], "ok");

        let out = executor
            .run(
                Path::new("/opt/sdk/platform-tools/adb"),
                &["devices"],
                &ExecOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out.stdout_lossy(), "ok");
    }

    #[tokio::test]
    async fn mock_sequences_then_repeats_last() {
        let executor = MockCommandExecutor::new()
            .with_failure("adb", &["get-state"], 1, "error: device not found")
            .with_success("adb", &["get-state"], "device");

        let first = executor
            .run(Path::new("adb"), &["get-state"], &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(first.exit_code, 1);

        for _ in 0..2 {
            let next = executor
                .run(Path::new("adb"), &["get-state"], &ExecOptions::default())
                .await
                .unwrap();
            assert_eq!(next.stdout_lossy(), "device");
        }
    }

    #[tokio::test]
    async fn unknown_command_errors() {
        let executor = MockCommandExecutor::new();
        let err = executor
            .run(Path::new("adb"), &["devices"], &ExecOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No mock response"));
    }
}
