use async_trait::async_trait;
use kill_tree::{blocking::kill_tree_with_config, Config};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Failed to spawn command: {0}")]
    Spawn(String),

    #[error("Command timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Failed to read command output: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr interleaved the way a terminal would roughly show them
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs a shell command line in the working directory.
///
/// Dropping the returned future must terminate the spawned process and
/// everything it started; this is how cancellation of a tool batch reaches
/// running commands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, CommandError>;
}

/// Runs commands through `sh -c` inside a fixed directory
#[derive(Debug, Clone)]
pub struct ShellRunner {
    cwd: PathBuf,
}

impl ShellRunner {
    pub fn new<P: Into<PathBuf>>(cwd: P) -> Self {
        Self { cwd: cwd.into() }
    }
}

/// Kills a spawned process and all of its descendants when dropped, unless
/// the process was seen to exit first.
struct ProcessTree {
    pid: Option<u32>,
}

impl ProcessTree {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn exited(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessTree {
    fn drop(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };
        let config = Config {
            signal: "SIGKILL".to_string(),
            ..Default::default()
        };
        match kill_tree_with_config(pid, &config) {
            Ok(outputs) => tracing::debug!(pid, killed = outputs.len(), "killed command process tree"),
            Err(e) => tracing::warn!(pid, error = %e, "failed to kill command process tree"),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, CommandError> {
        tracing::debug!(command, timeout_secs = timeout.as_secs(), "running command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CommandError::Spawn(e.to_string()))?;
        let mut tree = ProcessTree::new(child.id());

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout(timeout))?
            .map_err(|e| CommandError::Io(e.to_string()))?;
        tree.exited();

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }
}

/// Quote a single argument for `sh`
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_runner_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path());
        let output = runner
            .run("echo out; echo err 1>&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_shell_runner_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path());
        let err = runner
            .run("sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout(_)));
    }

    /// True once the process is gone or only a zombie waiting to be reaped
    #[cfg(target_os = "linux")]
    fn is_dead(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path());
        let err = runner
            .run("sleep 30 & echo $! > sleeper.pid; wait", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout(_)));

        let pid = std::fs::read_to_string(dir.path().join("sleeper.pid")).unwrap();
        let pid = pid.trim();
        let mut dead = false;
        for _ in 0..20 {
            if is_dead(pid) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(dead, "background process {} survived the timeout", pid);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_run_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path());
        let pid_file = dir.path().join("sleeper.pid");
        {
            let run = runner.run("sleep 30 & echo $! > sleeper.pid; wait", Duration::from_secs(30));
            // Abandon the run once the background process is up
            let _ = tokio::time::timeout(Duration::from_millis(500), run).await;
        }

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let mut dead = false;
        for _ in 0..20 {
            if is_dead(pid) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(dead, "background process {} survived cancellation", pid);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("fix: it's done"), r"'fix: it'\''s done'");
    }
}
