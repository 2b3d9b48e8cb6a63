use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::schema::{optional_str, required_str};
use super::shell::check_command;
use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::project::{Manifest, ManifestKind};
use crate::workspace::{shell_quote, CommandError, CommandRunner, FileSystem};

const TEST_TIMEOUT: Duration = Duration::from_secs(60);
const BUILD_TIMEOUT: Duration = Duration::from_secs(300);
/// Output returned to the model is cut to the last this many characters
const MAX_OUTPUT_CHARS: usize = 8_000;

lazy_static! {
    static ref TESTABLE: Regex = Regex::new(
        r"(?m)(?:^|\s)(?:export\s+)?(?:async\s+)?(?:function|def|fn|func)\s+([A-Za-z_]\w*)|^\s*(?:export\s+)?(?:const|let)\s+([A-Za-z_]\w*)\s*=\s*(?:async\s*)?\([^)]*\)\s*=>"
    )
    .unwrap();
    static ref CLASS_NAME: Regex = Regex::new(r"\b(?:class|struct)\s+([A-Za-z_]\w*)").unwrap();
}

fn tail(output: &str) -> String {
    let count = output.chars().count();
    if count <= MAX_OUTPUT_CHARS {
        return output.to_string();
    }
    let skipped: String = output.chars().skip(count - MAX_OUTPUT_CHARS).collect();
    format!("...{}", skipped)
}

/// Pick the test command from the manifest, falling back to the tree layout
async fn test_command(fs: &dyn FileSystem, manifest: Option<&Manifest>) -> Option<String> {
    match manifest.map(|m| m.kind) {
        Some(ManifestKind::Npm) => Some("npm test".to_string()),
        Some(ManifestKind::Cargo) => Some("cargo test".to_string()),
        Some(ManifestKind::Go) => Some("go test ./...".to_string()),
        Some(ManifestKind::Python) => Some("python -m pytest".to_string()),
        None => match fs.list("**/test_*.py").await {
            Ok(files) if !files.is_empty() => Some("python -m pytest".to_string()),
            _ => None,
        },
    }
}

fn build_command(manifest: &Manifest) -> Option<&'static str> {
    match manifest.kind {
        ManifestKind::Npm => Some("npm run build"),
        ManifestKind::Cargo => Some("cargo build"),
        ManifestKind::Go => Some("go build ./..."),
        ManifestKind::Python => None,
    }
}

/// Test file path conventions for a source file
fn test_path(path: &str) -> String {
    let source = Path::new(path);
    let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or(path);
    let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = source
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty());
    let name = match ext {
        "py" => format!("test_{}.py", stem),
        "go" => format!("{}_test.go", stem),
        "rs" => return format!("tests/{}.rs", stem),
        "" => format!("{}.test", stem),
        ext => format!("{}.test.{}", stem, ext),
    };
    match parent {
        Some(parent) => format!("{}/{}", parent, name),
        None => name,
    }
}

/// Run, scaffold and build
pub struct TestingSystem {
    tools: Vec<Tool>,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
}

impl TestingSystem {
    pub fn new(fs: Arc<dyn FileSystem>, runner: Arc<dyn CommandRunner>) -> Self {
        let run_tests = Tool::new(
            "run_tests",
            "Run the project's test suite, or a single test file. Reports success and the tail of the output.",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Run only this test file."},
                    "command": {"type": "string", "description": "Override the detected test command."}
                }
            }),
        );

        let generate_tests = Tool::new(
            "generate_tests",
            "Suggest test cases for the functions and classes in a source file, and where the test file should live.",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {"type": "string", "description": "Source file to cover."}
                }
            }),
        );

        let build_project = Tool::new(
            "build_project",
            "Build the project with its detected build command.",
            json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string", "description": "Override the detected build command."}
                }
            }),
        );

        Self {
            tools: vec![run_tests, generate_tests, build_project],
            fs,
            runner,
        }
    }

    /// Failures and timeouts are reported in the payload so the model can
    /// read them; only a command that never started is an error.
    async fn run_reported(&self, command: &str, timeout: Duration) -> AgentResult<Value> {
        match self.runner.run(command, timeout).await {
            Ok(output) => Ok(json!({
                "command": command,
                "success": output.success(),
                "exit_code": output.exit_code,
                "output": tail(&output.combined()),
            })),
            Err(CommandError::Timeout(after)) => Ok(json!({
                "command": command,
                "success": false,
                "timed_out": true,
                "output": format!("Timed out after {}s", after.as_secs()),
            })),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_tests(&self, params: Value) -> AgentResult<Value> {
        let command = match optional_str(&params, "command") {
            Some(command) => {
                check_command(command)?;
                command.to_string()
            }
            None => {
                let manifest = Manifest::load(self.fs.as_ref()).await;
                test_command(self.fs.as_ref(), manifest.as_ref())
                    .await
                    .ok_or_else(|| AgentError::ExecutionError("Could not detect a test command for this project".into()))?
            }
        };
        let command = match optional_str(&params, "path") {
            Some(path) => format!("{} {}", command, shell_quote(path)),
            None => command,
        };
        self.run_reported(&command, TEST_TIMEOUT).await
    }

    async fn generate_tests(&self, params: Value) -> AgentResult<Value> {
        let path = required_str(&params, "path")?;
        let content = self.fs.read(path).await?;

        let functions: Vec<String> = TESTABLE
            .captures_iter(&content)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().to_string())
            .filter(|name| !name.starts_with('_') && name != "main")
            .collect();
        let classes: Vec<String> = CLASS_NAME
            .captures_iter(&content)
            .map(|caps| caps[1].to_string())
            .collect();

        let mut suggestions = Vec::new();
        for name in &functions {
            suggestions.push(format!("{} returns the expected result for typical input", name));
            suggestions.push(format!("{} handles empty or edge-case input", name));
            suggestions.push(format!("{} reports errors for invalid input", name));
        }
        for name in &classes {
            suggestions.push(format!("{} can be constructed with valid arguments", name));
            suggestions.push(format!("{} methods keep its state consistent", name));
        }

        Ok(json!({
            "path": path,
            "test_file": test_path(path),
            "functions": functions,
            "classes": classes,
            "suggestions": suggestions,
        }))
    }

    async fn build_project(&self, params: Value) -> AgentResult<Value> {
        let command = match optional_str(&params, "command") {
            Some(command) => {
                check_command(command)?;
                command.to_string()
            }
            None => Manifest::load(self.fs.as_ref())
                .await
                .as_ref()
                .and_then(build_command)
                .map(String::from)
                .ok_or_else(|| AgentError::ExecutionError("Could not detect a build command for this project".into()))?,
        };
        self.run_reported(&command, BUILD_TIMEOUT).await
    }
}

#[async_trait]
impl System for TestingSystem {
    fn name(&self) -> &str {
        "testing"
    }

    fn description(&self) -> &str {
        "Run tests, suggest new ones and build the project"
    }

    fn instructions(&self) -> &str {
        "Run the tests after changing code. A failing run is reported with success set to \
        false; read its output before trying again."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        match tool_call.name.as_str() {
            "run_tests" => self.run_tests(tool_call.parameters).await,
            "generate_tests" => self.generate_tests(tool_call.parameters).await,
            "build_project" => self.build_project(tool_call.parameters).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
