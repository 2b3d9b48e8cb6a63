//! What the model gets to see: tool results rendered back into the
//! conversation, and the policy that keeps the ledger inside a size budget.
use crate::models::message::{Message, MessageKind};
use crate::models::role::Role;
use crate::models::tool::ToolResult;

const CONTINUE_INSTRUCTION: &str = "Continue with the task using these results. Request more tools \
if you need them, otherwise reply with your final answer and no tool_call block.";

/// Cut `text` to at most `max_chars` characters, marking the cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}\n... [truncated {} characters]", kept, count - max_chars)
}

/// The system message reporting a settled batch back to the model
pub fn feedback_message(results: &[ToolResult], max_result_chars: usize) -> Message {
    let mut text = String::from("Tool results:\n");
    for (i, result) in results.iter().enumerate() {
        let (status, body) = match &result.result {
            Ok(value) => (
                "SUCCESS",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
            ),
            Err(e) => ("ERROR", e.to_string()),
        };
        text.push_str(&format!(
            "\n[{}] {} (id: {}): {}\n{}\n",
            i + 1,
            result.name,
            result.id,
            status,
            truncate(&body, max_result_chars)
        ));
    }
    text.push('\n');
    text.push_str(CONTINUE_INSTRUCTION);

    Message::system()
        .with_text(text)
        .with_kind(MessageKind::ToolFeedback)
}

/// Shrink the ledger until it fits in `max_chars` characters.
///
/// The next generation cannot do without the newest user message, the
/// project summary, the newest assistant message and the tool feedback that
/// answers it, so those are kept. Older tool feedback goes first, oldest
/// first, then the oldest remaining messages. If what is kept is still over
/// budget, the pending feedback is truncated. Returns how many messages were
/// dropped.
pub fn trim_ledger(messages: &mut Vec<Message>, max_chars: usize) -> usize {
    let mut total: usize = messages.iter().map(Message::size).sum();
    let mut dropped = 0;

    while total > max_chars {
        let newest_user = messages.iter().rposition(|m| m.role == Role::User);
        let newest_assistant = messages.iter().rposition(|m| m.role == Role::Assistant);
        let droppable = |i: usize, m: &Message| {
            Some(i) != newest_user
                && Some(i) != newest_assistant
                && m.kind != MessageKind::ProjectContext
                && !is_pending(i, m, newest_assistant)
        };

        let victim = messages
            .iter()
            .enumerate()
            .find(|(i, m)| m.is_tool_feedback() && droppable(*i, m))
            .or_else(|| messages.iter().enumerate().find(|(i, m)| droppable(*i, m)))
            .map(|(i, _)| i);

        let Some(index) = victim else {
            break;
        };
        total -= messages.remove(index).size();
        dropped += 1;
    }

    if total > max_chars {
        shrink_pending_feedback(messages, total - max_chars);
    }

    if dropped > 0 {
        tracing::debug!(dropped, remaining = messages.len(), "trimmed conversation ledger");
    }
    dropped
}

/// Feedback the model has not answered yet
fn is_pending(index: usize, message: &Message, newest_assistant: Option<usize>) -> bool {
    message.is_tool_feedback() && newest_assistant.map_or(true, |a| index > a)
}

fn shrink_pending_feedback(messages: &mut [Message], mut excess: usize) {
    let newest_assistant = messages.iter().rposition(|m| m.role == Role::Assistant);
    for (i, message) in messages.iter_mut().enumerate() {
        if excess == 0 || !is_pending(i, message, newest_assistant) {
            continue;
        }
        let size = message.size();
        message.content = truncate(&message.content, size.saturating_sub(excess));
        excess = excess.saturating_sub(size.saturating_sub(message.size()));
        tracing::debug!(from = size, to = message.size(), "truncated pending tool feedback");
    }
}
