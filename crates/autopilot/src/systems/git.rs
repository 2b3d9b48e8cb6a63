use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::schema::{optional_str, required_str, string_list};
use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::workspace::{shell_quote, CommandOutput, CommandRunner};

const GIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct GitStatus {
    pub branch: Option<String>,
    pub staged: Vec<String>,
    pub modified: Vec<String>,
    pub untracked: Vec<String>,
    pub clean: bool,
}

/// Parse `git status --porcelain --branch` output
pub fn parse_status(output: &str) -> GitStatus {
    let mut status = GitStatus::default();
    for line in output.lines() {
        if let Some(branch) = line.strip_prefix("## ") {
            let name = branch.split("...").next().unwrap_or(branch);
            status.branch = Some(name.trim().to_string());
            continue;
        }
        if line.len() < 4 {
            continue;
        }
        let (code, path) = line.split_at(2);
        let path = path.trim().to_string();
        let mut chars = code.chars();
        let (index, worktree) = (chars.next().unwrap_or(' '), chars.next().unwrap_or(' '));
        if index == '?' {
            status.untracked.push(path);
            continue;
        }
        if index != ' ' {
            status.staged.push(path.clone());
        }
        if worktree != ' ' {
            status.modified.push(path);
        }
    }
    status.clean = status.staged.is_empty() && status.modified.is_empty() && status.untracked.is_empty();
    status
}

/// Version control through the git command line
pub struct GitSystem {
    tools: Vec<Tool>,
    runner: Arc<dyn CommandRunner>,
}

impl GitSystem {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        let git_status = Tool::new(
            "git_status",
            "Show the current branch and which files are staged, modified or untracked.",
            json!({"type": "object", "properties": {}}),
        );

        let git_commit = Tool::new(
            "git_commit",
            "Stage files and commit them. Stages every change when no files are given.",
            json!({
                "type": "object",
                "required": ["message"],
                "properties": {
                    "message": {"type": "string", "description": "The commit message."},
                    "files": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Files to stage before committing."
                    }
                }
            }),
        );

        let git_diff = Tool::new(
            "git_diff",
            "Show uncommitted changes, optionally for a single file.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Limit the diff to this file."}
                }
            }),
        );

        Self {
            tools: vec![git_status, git_commit, git_diff],
            runner,
        }
    }

    async fn git(&self, command: &str) -> AgentResult<CommandOutput> {
        let output = self.runner.run(command, GIT_TIMEOUT).await?;
        if !output.success() {
            return Err(AgentError::ExecutionError(format!(
                "`{}` failed: {}",
                command,
                output.combined().trim()
            )));
        }
        Ok(output)
    }

    async fn git_status(&self) -> AgentResult<Value> {
        let output = self.git("git status --porcelain --branch").await?;
        serde_json::to_value(parse_status(&output.stdout)).map_err(|e| AgentError::Internal(e.to_string()))
    }

    async fn git_commit(&self, params: Value) -> AgentResult<Value> {
        let message = required_str(&params, "message")?;
        if message.trim().is_empty() {
            return Err(AgentError::InvalidParameters("Commit message must not be empty".into()));
        }
        let files = string_list(&params, "files");
        let add = if files.is_empty() {
            "git add -A".to_string()
        } else {
            let quoted: Vec<String> = files.iter().map(|f| shell_quote(f)).collect();
            format!("git add -- {}", quoted.join(" "))
        };
        self.git(&add).await?;
        let output = self.git(&format!("git commit -m {}", shell_quote(message))).await?;

        Ok(json!({
            "message": message,
            "files": files,
            "output": output.stdout.trim(),
        }))
    }

    async fn git_diff(&self, params: Value) -> AgentResult<Value> {
        let command = match optional_str(&params, "path") {
            Some(path) => format!("git diff -- {}", shell_quote(path)),
            None => "git diff".to_string(),
        };
        let output = self.git(&command).await?;
        Ok(json!({
            "diff": output.stdout,
            "empty": output.stdout.trim().is_empty(),
        }))
    }
}

#[async_trait]
impl System for GitSystem {
    fn name(&self) -> &str {
        "git"
    }

    fn description(&self) -> &str {
        "Inspect and commit changes with git"
    }

    fn instructions(&self) -> &str {
        "Check git_status before committing, and write commit messages that describe the change."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        match tool_call.name.as_str() {
            "git_status" => self.git_status().await,
            "git_commit" => self.git_commit(tool_call.parameters).await,
            "git_diff" => self.git_diff(tool_call.parameters).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
