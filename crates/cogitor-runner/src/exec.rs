//! Cancellation-aware subprocess execution with combined output capture.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{RunnerError, RunnerResult};

/// One subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Exec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Split a full command line on whitespace. Returns `None` for an
    /// empty command.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            env: Vec::new(),
        })
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of one subprocess run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

/// Run one command to completion under the scope token. A tripped scope
/// skips the spawn entirely; a trip mid-run kills the child and awaits it
/// best-effort before returning `Cancelled`.
pub async fn run_captured(
    scope: &CancellationToken,
    exec: &Exec,
    cwd: &Path,
) -> RunnerResult<ExecOutput> {
    if scope.is_cancelled() {
        return Err(RunnerError::Cancelled);
    }
    debug!(command = %exec.display(), cwd = %cwd.display(), "spawning");

    let mut command = tokio::process::Command::new(&exec.program);
    command
        .args(&exec.args)
        .current_dir(cwd)
        .envs(exec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let status = tokio::select! {
        _ = scope.cancelled() => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            return Err(RunnerError::Cancelled);
        }
        status = child.wait() => status?,
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    let mut output = String::from_utf8_lossy(&stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&stderr));

    Ok(ExecOutput {
        success: status.success(),
        exit_code: status.code(),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn command_line_splits_on_whitespace() {
        let exec = Exec::from_command_line("gcc -o app main.c -lssl").unwrap();
        assert_eq!(exec.program, "gcc");
        assert_eq!(exec.args, vec!["-o", "app", "main.c", "-lssl"]);
        assert!(Exec::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let scope = CancellationToken::new();
        let exec = Exec::new("sh", vec!["-c".to_string(), "echo out_marker".to_string()]);
        let result = run_captured(&scope, &exec, &PathBuf::from(".")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.output.contains("out_marker"));
    }

    #[tokio::test]
    async fn captures_stderr_after_stdout() {
        let scope = CancellationToken::new();
        let exec = Exec::new(
            "sh",
            vec!["-c".to_string(), "echo first; echo second >&2; exit 3".to_string()],
        );
        let result = run_captured(&scope, &exec, &PathBuf::from(".")).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        let first = result.output.find("first").unwrap();
        let second = result.output.find("second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn pre_cancelled_scope_skips_the_spawn() {
        let scope = CancellationToken::new();
        scope.cancel();
        let exec = Exec::new("sh", vec!["-c".to_string(), "echo never".to_string()]);
        let err = run_captured(&scope, &exec, &PathBuf::from(".")).await.unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled));
    }

    #[tokio::test]
    async fn mid_run_cancellation_kills_the_child() {
        let scope = CancellationToken::new();
        let trip = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trip.cancel();
        });

        let exec = Exec::new("sleep", vec!["30".to_string()]);
        let started = std::time::Instant::now();
        let err = run_captured(&scope, &exec, &PathBuf::from(".")).await.unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn env_entries_reach_the_child() {
        let scope = CancellationToken::new();
        let exec = Exec::new("sh", vec!["-c".to_string(), "echo val=$COGITOR_T".to_string()])
            .with_env(vec![("COGITOR_T".to_string(), "42".to_string())]);
        let result = run_captured(&scope, &exec, &PathBuf::from(".")).await.unwrap();
        assert!(result.output.contains("val=42"));
    }
}
