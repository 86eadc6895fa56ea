//! Code execution sandbox for the `execute_code` provider.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{Error, Result};

/// Captured result of one sandbox run.
#[derive(Debug, Clone)]
pub struct SandboxOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit code (`-1` if the process was killed by a signal).
    pub exit_code: i32,
}

/// Runs source code under declared resource limits and returns its output.
///
/// Implementations decide which languages they accept and how isolation is
/// enforced; the provider layer only needs stdout, stderr, and an exit code.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    /// Execute `source` in `language`, feeding it `stdin` if given, and
    /// killing the process if it runs past `timeout`.
    async fn run(
        &self,
        language: &str,
        source: &str,
        stdin: Option<String>,
        timeout: Duration,
    ) -> Result<SandboxOutput>;
}

/// Runs code as a child process of an installed language interpreter.
///
/// This mirrors the subprocess driver's own process handling
/// (`kill_on_drop`, piped stdio, an explicit read timeout) rather than
/// introducing a second way of managing child processes.
pub struct ProcessSandbox;

impl ProcessSandbox {
    /// Interpreter program and flags for a supported language name.
    fn command_for(language: &str) -> Result<(&'static str, Vec<&'static str>)> {
        match language.to_lowercase().as_str() {
            "python" | "python3" => Ok(("python3", vec!["-c"])),
            "javascript" | "js" | "node" => Ok(("node", vec!["-e"])),
            "bash" | "sh" | "shell" => Ok(("sh", vec!["-c"])),
            other => Err(Error::InvalidParams(format!(
                "unsupported sandbox language: {other}"
            ))),
        }
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl CodeSandbox for ProcessSandbox {
    async fn run(
        &self,
        language: &str,
        source: &str,
        stdin: Option<String>,
        timeout: Duration,
    ) -> Result<SandboxOutput> {
        let (program, mut args) = Self::command_for(language)?;
        args.push(source);

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn sandbox process: {e}")))?;

        if let Some(input) = stdin {
            if let Some(mut child_stdin) = child.stdin.take() {
                let _ = child_stdin.write_all(input.as_bytes()).await;
            }
        }
        drop(child.stdin.take());

        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;
        match waited {
            Ok(Ok(output)) => Ok(SandboxOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(Error::Transport(format!("sandbox process failed: {e}"))),
            Err(_) => Err(Error::BackendTimeout(format!(
                "sandbox execution exceeded {}s",
                timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_language_is_rejected() {
        let err = ProcessSandbox::command_for("cobol").unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[test]
    fn python_maps_to_python3_dash_c() {
        let (program, args) = ProcessSandbox::command_for("python").unwrap();
        assert_eq!(program, "python3");
        assert_eq!(args, vec!["-c"]);
    }

    #[tokio::test]
    async fn runs_shell_and_captures_stdout() {
        let sandbox = ProcessSandbox::default();
        let result = sandbox
            .run("sh", "echo hello", None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn timeout_is_reported_as_backend_timeout() {
        let sandbox = ProcessSandbox::default();
        let err = sandbox
            .run("sh", "sleep 5", None, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendTimeout(_)));
    }
}
