use super::role::Role;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What a message in the ledger was produced for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Conversation,
    /// Synthesized summary of a tool batch, fed back to the model
    ToolFeedback,
    /// One-time description of the working tree
    ProjectContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: String::new(),
            kind: MessageKind::Conversation,
        }
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Append text to the message, separating from existing text with a newline
    pub fn with_text<S: AsRef<str>>(mut self, text: S) -> Self {
        if !self.content.is_empty() {
            self.content.push('\n');
        }
        self.content.push_str(text.as_ref());
        self
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_tool_feedback(&self) -> bool {
        self.kind == MessageKind::ToolFeedback
    }

    /// Size in characters, as counted by the context window policy
    pub fn size(&self) -> usize {
        self.content.chars().count()
    }
}
