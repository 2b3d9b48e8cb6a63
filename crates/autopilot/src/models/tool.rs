use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AgentResult;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// A JSON schema describing the parameters the tool accepts
    pub parameters: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call request that a system can execute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Correlates the call with its result
    pub id: String,
    /// The name of the tool to execute
    pub name: String,
    /// The parameters for the execution
    #[serde(default)]
    pub parameters: Value,
}

impl ToolCall {
    /// Create a new ToolCall with the given id, name and parameters
    pub fn new<I: Into<String>, S: Into<String>>(id: I, name: S, parameters: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parameters,
        }
    }
}

/// The outcome of a single ToolCall, paired with it by id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub result: AgentResult<Value>,
}

impl ToolResult {
    pub fn new(call: &ToolCall, result: AgentResult<Value>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
