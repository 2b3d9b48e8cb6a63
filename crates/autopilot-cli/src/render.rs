use console::style;
use serde_json::Value;

use autopilot::models::action::{ActionKind, AgentAction, AgenticResponse, Termination};

const MAX_PREVIEW_CHARS: usize = 120;

fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_PREVIEW_CHARS {
        return text;
    }
    let cut: String = text.chars().take(MAX_PREVIEW_CHARS).collect();
    format!("{}…", cut)
}

/// One line describing an action, without styling
pub fn describe_action(action: &AgentAction) -> String {
    match (action.kind, &action.tool_call, &action.tool_result) {
        (ActionKind::ToolCall, Some(call), _) => {
            format!("→ {} {}", call.name, preview(&call.parameters))
        }
        (ActionKind::ToolResult, _, Some(result)) => match &result.result {
            Ok(_) => format!("✓ {} ({})", result.name, result.id),
            Err(e) => format!("✗ {} ({}): {}", result.name, result.id, e),
        },
        _ => format!("• {}", action.description),
    }
}

/// Observer installed on the agent: prints every action as it happens
pub fn print_action(action: &AgentAction) {
    let line = describe_action(action);
    let styled = match action.kind {
        ActionKind::ToolCall => style(line).cyan(),
        ActionKind::ToolResult if action.tool_result.as_ref().is_some_and(|r| r.is_success()) => {
            style(line).green()
        }
        ActionKind::ToolResult => style(line).red(),
        ActionKind::Response => style(line).yellow(),
    };
    println!("\n{}", styled);
}

/// A closing line for the turn
pub fn summary(response: &AgenticResponse) -> String {
    let calls = response.tool_calls.len();
    match response.termination {
        Termination::Completed => format!(
            "{} round(s), {} tool call(s)",
            response.rounds, calls
        ),
        Termination::IterationCapReached => format!(
            "Stopped at the iteration cap after {} round(s) and {} tool call(s). Send another message to let it continue.",
            response.rounds, calls
        ),
    }
}
