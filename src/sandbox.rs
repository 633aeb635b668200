//! Runs generated programs as child processes in throwaway directories.

use crate::codegen::GeneratedProgram;
use crate::config::SandboxConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorKind {
    Timeout,
    RuntimeFailure,
    MalformedOutput,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionErrorKind::Timeout => f.write_str("timeout"),
            ExecutionErrorKind::RuntimeFailure => f.write_str("runtime failure"),
            ExecutionErrorKind::MalformedOutput => f.write_str("malformed output"),
        }
    }
}

/// Outcome of one sandbox run
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Ok {
        answer: Value,
    },
    Error {
        kind: ExecutionErrorKind,
        message: String,
    },
}

impl ExecutionResult {
    fn error(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        ExecutionResult::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Isolated execution of an untrusted program
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, program: &GeneratedProgram) -> ExecutionResult;
}

pub struct SandboxExecutor {
    root: PathBuf,
    config: SandboxConfig,
}

impl SandboxExecutor {
    /// Executor whose working directories are created under `root`
    pub fn new(root: impl Into<PathBuf>, config: &SandboxConfig) -> Self {
        Self {
            root: root.into(),
            config: config.clone(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// One launch in a fresh directory. `Err` only for spawn failures.
    async fn run_once(&self, program: &GeneratedProgram) -> std::io::Result<ExecutionResult> {
        tokio::fs::create_dir_all(&self.root).await?;
        // Removed on drop, which also covers timeout and cancellation
        let workdir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.root)?;
        let program_path = workdir.path().join(&self.config.program_file);
        tokio::fs::write(&program_path, &program.source).await?;

        let mut command = Command::new(&self.config.interpreter);
        command
            .arg(&self.config.program_file)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn()?;
        // Dropped before `workdir`, so nothing the program forked outlives the run
        let _group = ProcessGroup(child.id());

        let limit = self.config.output_limit_bytes;
        let stdout = child.stdout.take().map(|s| tokio::spawn(read_limited(s, limit)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(read_limited(s, limit)));
        let readers: Vec<_> = [&stdout, &stderr]
            .into_iter()
            .flatten()
            .map(|h| h.abort_handle())
            .collect();

        // Forked children can hold the pipes open after the main process exits,
        // so the deadline covers the reads as well as the wait
        let finished = tokio::time::timeout(self.timeout(), async {
            let status = child.wait().await;
            (status, collect(stdout).await, collect(stderr).await)
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok((Ok(status), stdout, stderr)) => (status, stdout, stderr),
            Ok((Err(e), _, _)) => {
                return Ok(ExecutionResult::error(
                    ExecutionErrorKind::RuntimeFailure,
                    format!("failed to wait for program: {e}"),
                ));
            }
            Err(_) => {
                ::log::warn!(
                    "Program in {} timed out after {}s, killing",
                    workdir.path().display(),
                    self.config.timeout_secs
                );
                let _ = child.kill().await;
                for reader in readers {
                    reader.abort();
                }
                return Ok(ExecutionResult::error(
                    ExecutionErrorKind::Timeout,
                    format!("program exceeded {}s", self.config.timeout_secs),
                ));
            }
        };

        ::log::debug!(
            "Program exited with {:?} ({} bytes stdout, {} bytes stderr)",
            status.code(),
            stdout.len(),
            stderr.len()
        );

        if !status.success() {
            let message = if stderr.trim().is_empty() {
                format!("program exited with {status}")
            } else {
                stderr.trim().to_string()
            };
            return Ok(ExecutionResult::error(ExecutionErrorKind::RuntimeFailure, message));
        }

        Ok(parse_output(&stdout))
    }
}

#[async_trait]
impl Execute for SandboxExecutor {
    async fn execute(&self, program: &GeneratedProgram) -> ExecutionResult {
        let attempts = self.config.launch_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.run_once(program).await {
                Ok(result) => return result,
                Err(e) if is_transient(&e) && attempt < attempts => {
                    ::log::warn!("Launch attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e.to_string();
                }
                Err(e) => {
                    last_error = e.to_string();
                    break;
                }
            }
        }

        ExecutionResult::error(
            ExecutionErrorKind::RuntimeFailure,
            format!(
                "could not launch {}: {}",
                self.config.interpreter, last_error
            ),
        )
    }
}

/// Kills every process in the program's group when dropped
struct ProcessGroup(Option<u32>);

impl Drop for ProcessGroup {
    #[cfg(unix)]
    fn drop(&mut self) {
        let Some(pid) = self.0 else {
            return;
        };
        // The leader may already be gone; the group id stays valid while members remain
        let _ = std::process::Command::new("kill")
            .args(["-KILL", "--", &format!("-{pid}")])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {}
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::ResourceBusy
            | ErrorKind::ExecutableFileBusy
    )
}

/// Parse the last non-empty stdout line as `{"answer": <scalar>}`
pub fn parse_output(stdout: &str) -> ExecutionResult {
    let malformed = |reason: &str| {
        ExecutionResult::error(
            ExecutionErrorKind::MalformedOutput,
            format!("{reason}; stdout was: {}", crate::utils::truncate_chars(stdout, 2000)),
        )
    };

    let Some(line) = stdout.lines().rev().find(|l| !l.trim().is_empty()) else {
        return malformed("program printed nothing");
    };

    let value: Value = match serde_json::from_str(line.trim()) {
        Ok(v) => v,
        Err(_) => return malformed("last line is not JSON"),
    };

    match value.get("answer") {
        Some(answer @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
            ExecutionResult::Ok {
                answer: answer.clone(),
            }
        }
        Some(Value::Null) => malformed("answer is null"),
        Some(_) => malformed("answer is not a scalar"),
        None => malformed("last line has no \"answer\" key"),
    }
}

async fn read_limited<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    kept
}

async fn collect(handle: Option<tokio::task::JoinHandle<Vec<u8>>>) -> String {
    match handle {
        Some(h) => String::from_utf8_lossy(&h.await.unwrap_or_default()).into_owned(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn shell_program(script: &str) -> GeneratedProgram {
        GeneratedProgram {
            body: script.to_string(),
            source: script.to_string(),
        }
    }

    fn executor(root: &Path, timeout_secs: u64) -> SandboxExecutor {
        let mut config = SandboxConfig::default();
        config.interpreter = "sh".to_string();
        config.program_file = "solution.sh".to_string();
        config.timeout_secs = timeout_secs;
        SandboxExecutor::new(root, &config)
    }

    fn leftover_dirs(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_last_line_is_the_answer() {
        let root = tempfile::tempdir().unwrap();
        let program = shell_program("echo 'loading data'\necho '{\"answer\": 41}'\necho\necho '{\"answer\": 42}'\necho ''\n");

        let result = executor(root.path(), 5).execute(&program).await;
        assert_eq!(result, ExecutionResult::Ok { answer: json!(42) });
        assert_eq!(leftover_dirs(root.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_program() {
        let root = tempfile::tempdir().unwrap();
        let program = shell_program("sleep 5\necho '{\"answer\": 1}'\n");

        let started = std::time::Instant::now();
        let result = executor(root.path(), 1).execute(&program).await;
        assert!(matches!(
            result,
            ExecutionResult::Error { kind: ExecutionErrorKind::Timeout, .. }
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(leftover_dirs(root.path()), 0);
    }

    #[tokio::test]
    async fn test_background_process_cannot_outlive_timeout() {
        let root = tempfile::tempdir().unwrap();
        let program = shell_program("sleep 8 &\necho '{\"answer\": 1}'\n");

        let started = std::time::Instant::now();
        let result = executor(root.path(), 1).execute(&program).await;
        assert!(matches!(
            result,
            ExecutionResult::Error { kind: ExecutionErrorKind::Timeout, .. }
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(leftover_dirs(root.path()), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_detached_children_are_killed_after_the_run() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let marker = scratch.path().join("marker");
        let program = shell_program(&format!(
            "(sleep 2; touch '{}') >/dev/null 2>&1 &\necho '{{\"answer\": 1}}'\n",
            marker.display()
        ));

        let result = executor(root.path(), 5).execute(&program).await;
        assert_eq!(result, ExecutionResult::Ok { answer: json!(1) });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let root = tempfile::tempdir().unwrap();
        let program = shell_program("echo '{\"answer\": 1}'\necho 'ValueError: bad column' >&2\nexit 3\n");

        match executor(root.path(), 5).execute(&program).await {
            ExecutionResult::Error { kind, message } => {
                assert_eq!(kind, ExecutionErrorKind::RuntimeFailure);
                assert_eq!(message, "ValueError: bad column");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_output_is_malformed() {
        let root = tempfile::tempdir().unwrap();
        let program = shell_program("echo 'the answer is 42'\n");

        match executor(root.path(), 5).execute(&program).await {
            ExecutionResult::Error { kind, message } => {
                assert_eq!(kind, ExecutionErrorKind::MalformedOutput);
                assert!(message.contains("the answer is 42"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_runtime_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut config = SandboxConfig::default();
        config.interpreter = "definitely-not-an-interpreter".to_string();
        let executor = SandboxExecutor::new(root.path(), &config);

        match executor.execute(&shell_program("")).await {
            ExecutionResult::Error { kind, message } => {
                assert_eq!(kind, ExecutionErrorKind::RuntimeFailure);
                assert!(message.starts_with("could not launch"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_runs_use_separate_directories() {
        let root = tempfile::tempdir().unwrap();
        let executor = executor(root.path(), 5);
        let program = shell_program("printf '{\"answer\": \"%s\"}\\n' \"$(pwd)\"\n");

        let (a, b) = tokio::join!(executor.execute(&program), executor.execute(&program));
        match (a, b) {
            (ExecutionResult::Ok { answer: a }, ExecutionResult::Ok { answer: b }) => {
                assert_ne!(a, b);
            }
            other => panic!("unexpected results: {other:?}"),
        }
    }

    #[test]
    fn test_parse_output_rules() {
        assert_eq!(
            parse_output("{\"answer\": \"abc\"}\n"),
            ExecutionResult::Ok { answer: json!("abc") }
        );
        assert_eq!(
            parse_output("{\"answer\": true}"),
            ExecutionResult::Ok { answer: json!(true) }
        );
        for bad in ["", "{\"answer\": null}", "{\"answer\": [1, 2]}", "{\"result\": 1}", "42 apples"] {
            assert!(
                matches!(
                    parse_output(bad),
                    ExecutionResult::Error { kind: ExecutionErrorKind::MalformedOutput, .. }
                ),
                "{bad:?} should be malformed"
            );
        }
    }
}
