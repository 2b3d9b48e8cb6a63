use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;

use super::schema::{optional_bool, string_list};
use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};
use crate::project::{Manifest, ManifestKind};
use crate::workspace::{shell_quote, CommandRunner, FileSystem};

const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
const OUTDATED_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
    Cargo,
    Pip,
    Go,
}

impl PackageManager {
    /// Lockfiles decide between the javascript managers; otherwise the manifest does
    pub async fn detect(fs: &dyn FileSystem) -> Option<Self> {
        let lockfiles = [
            ("pnpm-lock.yaml", PackageManager::Pnpm),
            ("yarn.lock", PackageManager::Yarn),
            ("package-lock.json", PackageManager::Npm),
        ];
        for (file, manager) in lockfiles {
            if fs.read(file).await.is_ok() {
                return Some(manager);
            }
        }
        Manifest::load(fs).await.map(|manifest| match manifest.kind {
            ManifestKind::Npm => PackageManager::Npm,
            ManifestKind::Cargo => PackageManager::Cargo,
            ManifestKind::Python => PackageManager::Pip,
            ManifestKind::Go => PackageManager::Go,
        })
    }

    pub fn install_command(&self, packages: &[String], dev: bool) -> String {
        let packages = packages.iter().map(|p| shell_quote(p)).collect::<Vec<_>>().join(" ");
        match (self, dev) {
            (PackageManager::Npm, false) => format!("npm install {}", packages),
            (PackageManager::Npm, true) => format!("npm install --save-dev {}", packages),
            (PackageManager::Yarn, false) => format!("yarn add {}", packages),
            (PackageManager::Yarn, true) => format!("yarn add --dev {}", packages),
            (PackageManager::Pnpm, false) => format!("pnpm add {}", packages),
            (PackageManager::Pnpm, true) => format!("pnpm add --save-dev {}", packages),
            (PackageManager::Cargo, false) => format!("cargo add {}", packages),
            (PackageManager::Cargo, true) => format!("cargo add --dev {}", packages),
            (PackageManager::Pip, _) => format!("pip install {}", packages),
            (PackageManager::Go, _) => format!("go get {}", packages),
        }
    }

    pub fn outdated_command(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm outdated",
            PackageManager::Yarn => "yarn outdated",
            PackageManager::Pnpm => "pnpm outdated",
            PackageManager::Cargo => "cargo outdated",
            PackageManager::Pip => "pip list --outdated",
            PackageManager::Go => "go list -u -m all",
        }
    }
}

/// Dependency management through the project's package manager
pub struct PackageSystem {
    tools: Vec<Tool>,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn CommandRunner>,
}

impl PackageSystem {
    pub fn new(fs: Arc<dyn FileSystem>, runner: Arc<dyn CommandRunner>) -> Self {
        let install_package = Tool::new(
            "install_package",
            "Install one or more packages with the project's package manager.",
            json!({
                "type": "object",
                "required": ["packages"],
                "properties": {
                    "packages": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Package names, optionally with versions."
                    },
                    "dev": {"type": "boolean", "default": false, "description": "Install as a development dependency."}
                }
            }),
        );

        let check_outdated = Tool::new(
            "check_outdated",
            "List dependencies that have newer versions available.",
            json!({"type": "object", "properties": {}}),
        );

        Self {
            tools: vec![install_package, check_outdated],
            fs,
            runner,
        }
    }

    async fn manager(&self) -> AgentResult<PackageManager> {
        PackageManager::detect(self.fs.as_ref())
            .await
            .ok_or_else(|| AgentError::ExecutionError("Could not detect a package manager for this project".into()))
    }

    async fn install_package(&self, params: Value) -> AgentResult<Value> {
        let packages = string_list(&params, "packages");
        if packages.is_empty() {
            return Err(AgentError::InvalidParameters("'packages' must name at least one package".into()));
        }
        let dev = optional_bool(&params, "dev").unwrap_or(false);
        let manager = self.manager().await?;
        let command = manager.install_command(&packages, dev);

        let output = self.runner.run(&command, INSTALL_TIMEOUT).await?;
        if !output.success() {
            return Err(AgentError::ExecutionError(format!(
                "`{}` failed: {}",
                command,
                output.combined().trim()
            )));
        }
        Ok(json!({
            "manager": manager.to_string(),
            "command": command,
            "packages": packages,
            "dev": dev,
        }))
    }

    async fn check_outdated(&self) -> AgentResult<Value> {
        let manager = self.manager().await?;
        let command = manager.outdated_command();
        // `npm outdated` exits non-zero when it finds something
        let output = self.runner.run(command, OUTDATED_TIMEOUT).await?;
        Ok(json!({
            "manager": manager.to_string(),
            "command": command,
            "output": output.combined().trim(),
        }))
    }
}

#[async_trait]
impl System for PackageSystem {
    fn name(&self) -> &str {
        "packages"
    }

    fn description(&self) -> &str {
        "Install and audit project dependencies"
    }

    fn instructions(&self) -> &str {
        "Only install packages the task needs, and prefer ones the project already uses."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Value> {
        match tool_call.name.as_str() {
            "install_package" => self.install_package(tool_call.parameters).await,
            "check_outdated" => self.check_outdated().await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
