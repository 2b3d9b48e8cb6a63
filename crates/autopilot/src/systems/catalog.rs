use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::schema;
use super::{
    AnalysisSystem, FileSystemTools, GitSystem, PackageSystem, ShellSystem, System, TestingSystem,
};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall, ToolResult};
use crate::workspace::{CommandRunner, FileSystem};

/// Every tool the agent may invoke, indexed by name
#[derive(Default)]
pub struct ToolCatalog {
    systems: Vec<Box<dyn System>>,
    // tool name -> (system index, tool index)
    index: HashMap<String, (usize, usize)>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with every built-in system bound to the given collaborators
    pub fn developer(fs: Arc<dyn FileSystem>, runner: Arc<dyn CommandRunner>) -> AgentResult<Self> {
        let mut catalog = Self::new();
        catalog.register(Box::new(FileSystemTools::new(fs.clone())))?;
        catalog.register(Box::new(AnalysisSystem::new(fs.clone())))?;
        catalog.register(Box::new(GitSystem::new(runner.clone())))?;
        catalog.register(Box::new(TestingSystem::new(fs.clone(), runner.clone())))?;
        catalog.register(Box::new(PackageSystem::new(fs, runner.clone())))?;
        catalog.register(Box::new(ShellSystem::new(runner)))?;
        Ok(catalog)
    }

    /// Add a system. Fails without registering anything if one of its tool
    /// names is already taken.
    pub fn register(&mut self, system: Box<dyn System>) -> AgentResult<()> {
        let mut seen = Vec::new();
        for tool in system.tools() {
            if self.index.contains_key(&tool.name) || seen.contains(&&tool.name) {
                return Err(AgentError::Internal(format!(
                    "Duplicate tool name '{}' in system {}",
                    tool.name,
                    system.name()
                )));
            }
            seen.push(&tool.name);
        }

        let system_index = self.systems.len();
        for (tool_index, tool) in system.tools().iter().enumerate() {
            self.index
                .insert(tool.name.clone(), (system_index, tool_index));
        }
        self.systems.push(system);
        Ok(())
    }

    pub fn systems(&self) -> impl Iterator<Item = &dyn System> {
        self.systems.iter().map(|s| &**s)
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index
            .get(name)
            .map(|(system, tool)| &self.systems[*system].tools()[*tool])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Invoke a single call. Every failure, including an unknown tool name,
    /// is captured in the returned ToolResult.
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        let result = self.dispatch(call).await;
        match &result {
            Ok(_) => debug!(tool = %call.name, id = %call.id, "tool call succeeded"),
            Err(e) => warn!(tool = %call.name, id = %call.id, error = %e, "tool call failed"),
        }
        ToolResult::new(call, result)
    }

    async fn dispatch(&self, call: &ToolCall) -> AgentResult<serde_json::Value> {
        let (system_index, tool_index) = self
            .index
            .get(&call.name)
            .copied()
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        let system = &self.systems[system_index];
        schema::validate(&system.tools()[tool_index].parameters, &call.parameters)?;
        system.call(call.clone()).await
    }

    /// Invoke a batch concurrently. All calls start together and the batch
    /// settles when every call has; results come back in call order. When
    /// `cancel` fires, calls still running resolve to `Cancelled`.
    pub async fn invoke_all(&self, calls: &[ToolCall], cancel: &CancellationToken) -> Vec<ToolResult> {
        let futures: Vec<_> = calls
            .iter()
            .map(|call| async move {
                tokio::select! {
                    result = self.invoke(call) => result,
                    _ = cancel.cancelled() => ToolResult::new(call, Err(AgentError::Cancelled)),
                }
            })
            .collect();

        futures::future::join_all(futures).await
    }
}
