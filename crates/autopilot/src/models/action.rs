use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::tool::{ToolCall, ToolResult};
use crate::project::ProjectUnderstanding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    ToolCall,
    ToolResult,
    Response,
}

/// One observable event produced by the agent while handling a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    pub kind: ActionKind,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl AgentAction {
    fn new<S: Into<String>>(kind: ActionKind, description: S) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            description: description.into(),
            tool_call: None,
            tool_result: None,
        }
    }

    pub fn tool_call(call: &ToolCall) -> Self {
        let mut action = Self::new(ActionKind::ToolCall, format!("Calling {}", call.name));
        action.tool_call = Some(call.clone());
        action
    }

    pub fn tool_result(result: &ToolResult) -> Self {
        let description = match &result.result {
            Ok(_) => format!("{} succeeded", result.name),
            Err(e) => format!("{} failed: {}", result.name, e),
        };
        let mut action = Self::new(ActionKind::ToolResult, description);
        action.tool_result = Some(result.clone());
        action
    }

    pub fn response<S: Into<String>>(description: S) -> Self {
        Self::new(ActionKind::Response, description)
    }
}

/// How the loop reached FINALIZE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model answered without requesting any tools
    Completed,
    /// The loop stopped because it performed `max_iterations` rounds
    IterationCapReached,
}

/// Everything produced while handling one user turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgenticResponse {
    pub content: String,
    pub actions: Vec<AgentAction>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_understanding: Option<ProjectUnderstanding>,
    pub termination: Termination,
    pub rounds: usize,
}

impl AgenticResponse {
    pub fn reached_iteration_cap(&self) -> bool {
        self.termination == Termination::IterationCapReached
    }
}
