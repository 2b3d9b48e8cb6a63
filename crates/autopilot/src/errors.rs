use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workspace::command::CommandError;
use crate::workspace::fs::FsError;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Turn cancelled")]
    Cancelled,

    #[error("Turn exceeded its deadline")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

impl From<FsError> for AgentError {
    fn from(err: FsError) -> Self {
        AgentError::ExecutionError(err.to_string())
    }
}

impl From<CommandError> for AgentError {
    fn from(err: CommandError) -> Self {
        AgentError::ExecutionError(err.to_string())
    }
}
