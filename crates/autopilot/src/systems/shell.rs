use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::schema::{optional_u64, required_str};
use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::workspace::CommandRunner;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 600;

lazy_static! {
    static ref DENIED: Vec<(Regex, &'static str)> = [
        (r"\bmkfs(\.\w+)?\b", "filesystem format"),
        (r"\bdd\b.*\b(if|of)=/dev/", "raw device access"),
        (r">\s*/dev/(sd|hd|nvme|disk)", "raw device write"),
        (r"\bchmod\s+(-R\s+)?777\s+/", "world writable permissions on the root"),
        (r"\bchmod\s+-R\s+777\b", "recursive world writable permissions"),
        (r"\bchown\s+-R\b", "recursive ownership change"),
        (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
        (r"\b(shutdown|reboot|halt|poweroff)\b", "system power control"),
    ]
    .into_iter()
    .map(|(pattern, reason)| (Regex::new(pattern).unwrap(), reason))
    .collect();
    /// Arguments of each `rm` invocation, up to the end of its pipeline stage
    static ref RM_ARGS: Regex = Regex::new(r"(?:^|[\s;&|(/])rm\s+([^;&|)\n]*)").unwrap();
}

/// True when some `rm` in the command line is both recursive and forced,
/// whatever the spelling, case or order of the flags
fn is_recursive_force_delete(command: &str) -> bool {
    RM_ARGS.captures_iter(command).any(|caps| {
        let (mut recursive, mut force) = (false, false);
        for arg in caps[1].split_whitespace() {
            if arg == "--" {
                break;
            }
            match arg.strip_prefix("--") {
                Some("recursive") => recursive = true,
                Some("force") => force = true,
                Some(_) => {}
                None => {
                    if let Some(flags) = arg.strip_prefix('-') {
                        recursive |= flags.contains(['r', 'R']);
                        force |= flags.contains('f');
                    }
                }
            }
        }
        recursive && force
    })
}

/// Fail with `CommandRejected` when the command matches a known destructive pattern
pub fn check_command(command: &str) -> AgentResult<()> {
    if is_recursive_force_delete(command) {
        return Err(AgentError::CommandRejected(format!(
            "{} (recursive force delete)",
            command.trim()
        )));
    }
    match DENIED.iter().find(|(pattern, _)| pattern.is_match(command)) {
        Some((_, reason)) => Err(AgentError::CommandRejected(format!(
            "{} ({})",
            command.trim(),
            reason
        ))),
        None => Ok(()),
    }
}

/// Arbitrary shell commands behind a deny-list
pub struct ShellSystem {
    tools: Vec<Tool>,
    runner: Arc<dyn CommandRunner>,
}

impl ShellSystem {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        let run_command = Tool::new(
            "run_command",
            "Run a shell command in the working directory and return its output and exit code. \
            Each call runs in a fresh shell, so chain dependent commands with `&&`.",
            json!({
                "type": "object",
                "required": ["command"],
                "properties": {
                    "command": {"type": "string", "description": "The command line to run."},
                    "timeout_secs": {
                        "type": "integer",
                        "default": DEFAULT_TIMEOUT_SECS,
                        "description": "Seconds before the command is killed."
                    }
                }
            }),
        );

        Self {
            tools: vec![run_command],
            runner,
        }
    }

    async fn run_command(&self, params: Value) -> AgentResult<Value> {
        let command = required_str(&params, "command")?;
        if command.trim().is_empty() {
            return Err(AgentError::InvalidParameters("'command' must not be empty".into()));
        }
        check_command(command)?;

        let timeout_secs = optional_u64(&params, "timeout_secs")
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, MAX_TIMEOUT_SECS);
        let output = self
            .runner
            .run(command, Duration::from_secs(timeout_secs))
            .await?;

        Ok(json!({
            "command": command,
            "exit_code": output.exit_code,
            "success": output.success(),
            "stdout": output.stdout,
            "stderr": output.stderr,
        }))
    }
}

#[async_trait]
impl System for ShellSystem {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run shell commands in the working directory"
    }

    fn instructions(&self) -> &str {
        "Prefer the dedicated file, git, testing and package tools. Destructive commands \
        are rejected before they run."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        match tool_call.name.as_str() {
            "run_command" => self.run_command(tool_call.parameters).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::command::MockCommandRunner;
    use crate::workspace::CommandOutput;
    use mockall::predicate::eq;

    #[test]
    fn test_denied_commands() {
        for command in [
            "rm -rf /",
            "sudo rm -fr ~/project",
            "rm -r -f build",
            "rm -Rf /",
            "rm -fR /",
            "rm -r --force /",
            "rm --recursive -f /",
            "rm --force --recursive /",
            "cd /tmp && /bin/rm -v -R -f .",
            "mkfs.ext4 /dev/sda1",
            "dd if=/dev/zero of=/dev/sda",
            "cat junk > /dev/sda",
            "chmod -R 777 /",
            "chmod 777 /etc",
            "chown -R nobody .",
            ":(){ :|:& };:",
            "sudo shutdown -h now",
        ] {
            assert!(
                matches!(check_command(command), Err(AgentError::CommandRejected(_))),
                "{} should be rejected",
                command
            );
        }
    }

    #[test]
    fn test_allowed_commands() {
        for command in [
            "ls -la",
            "rm notes.txt",
            "rm -r build",
            "rm -f stale.lock",
            "cargo test",
            "chmod +x run.sh",
            "echo rebooting",
            "perform -rf",
        ] {
            assert!(check_command(command).is_ok(), "{} should be allowed", command);
        }
    }

    #[tokio::test]
    async fn test_rejected_command_never_spawns() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().never();
        let system = ShellSystem::new(Arc::new(runner));

        let err = system
            .call(ToolCall::new("1", "run_command", json!({"command": "rm -rf /tmp/x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::CommandRejected(_)));
    }

    #[tokio::test]
    async fn test_runs_with_requested_timeout() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .with(eq("ls"), eq(Duration::from_secs(5)))
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stdout: "Cargo.toml\n".to_string(),
                    stderr: String::new(),
                    exit_code: Some(0),
                })
            });
        let system = ShellSystem::new(Arc::new(runner));

        let value = system
            .call(ToolCall::new("1", "run_command", json!({"command": "ls", "timeout_secs": 5})))
            .await
            .unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["stdout"], "Cargo.toml\n");
    }
}
