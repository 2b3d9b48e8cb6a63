use std::sync::Arc;

use crate::models::action::{AgentAction, AgenticResponse, Termination};
use crate::models::tool::{ToolCall, ToolResult};
use crate::project::ProjectUnderstanding;

/// Receives every action the moment it happens
pub type ActionObserver = Arc<dyn Fn(&AgentAction) + Send + Sync>;

/// Collects everything one user turn produces, across all of its rounds.
///
/// Actions are handed to the observer as they are recorded, never batched.
pub struct ResponseAccumulator {
    observer: Option<ActionObserver>,
    content: String,
    actions: Vec<AgentAction>,
    tool_calls: Vec<ToolCall>,
    tool_results: Vec<ToolResult>,
    project_understanding: Option<ProjectUnderstanding>,
    rounds: usize,
}

impl ResponseAccumulator {
    pub fn new(observer: Option<ActionObserver>) -> Self {
        Self {
            observer,
            content: String::new(),
            actions: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            project_understanding: None,
            rounds: 0,
        }
    }

    pub fn record(&mut self, action: AgentAction) {
        if let Some(observer) = &self.observer {
            observer(&action);
        }
        self.actions.push(action);
    }

    /// Add the full text of one generation round
    pub fn push_text(&mut self, text: &str) {
        self.rounds += 1;
        if text.is_empty() {
            return;
        }
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(text);
    }

    pub fn push_calls(&mut self, calls: &[ToolCall]) {
        for call in calls {
            self.record(AgentAction::tool_call(call));
            self.tool_calls.push(call.clone());
        }
    }

    pub fn push_results(&mut self, results: &[ToolResult]) {
        for result in results {
            self.record(AgentAction::tool_result(result));
            self.tool_results.push(result.clone());
        }
    }

    pub fn set_project_understanding(&mut self, understanding: ProjectUnderstanding) {
        self.project_understanding = Some(understanding);
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn finish(self, termination: Termination) -> AgenticResponse {
        AgenticResponse {
            content: self.content,
            actions: self.actions,
            tool_calls: self.tool_calls,
            tool_results: self.tool_results,
            project_understanding: self.project_understanding,
            termination,
            rounds: self.rounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::ActionKind;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_observer_sees_actions_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: ActionObserver = Arc::new(move |action: &AgentAction| {
            sink.lock().unwrap().push(action.kind);
        });

        let mut accumulator = ResponseAccumulator::new(Some(observer));
        let call = ToolCall::new("1", "git_status", json!({}));
        accumulator.push_text("checking");
        accumulator.push_calls(&[call.clone()]);
        // Delivered before the turn is over
        assert_eq!(*seen.lock().unwrap(), vec![ActionKind::ToolCall]);

        accumulator.push_results(&[ToolResult::new(&call, Ok(json!({"clean": true})))]);
        accumulator.push_text("all clean");
        let response = accumulator.finish(Termination::Completed);

        assert_eq!(*seen.lock().unwrap(), vec![ActionKind::ToolCall, ActionKind::ToolResult]);
        assert_eq!(response.content, "checking\n\nall clean");
        assert_eq!(response.rounds, 2);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_results.len(), 1);
        assert_eq!(response.actions.len(), 2);
        assert!(!response.reached_iteration_cap());
    }
}
