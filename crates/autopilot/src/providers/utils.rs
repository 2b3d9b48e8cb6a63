use anyhow::{anyhow, Result};
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};

use crate::models::message::Message;
use crate::models::role::Role;

/// How a streaming response separates its events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events: `data: {...}` lines, optionally ending with `data: [DONE]`
    Sse,
    /// One JSON object per line
    NdJson,
}

/// Convert the ledger into OpenAI chat messages, with the system prompt first
pub fn messages_to_openai_spec(system: &str, messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        spec.push(json!({"role": "system", "content": system}));
    }
    spec.extend(
        messages
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| json!({"role": m.role.as_str(), "content": m.content})),
    );
    spec
}

/// Convert the ledger into Anthropic messages. The API has no system role
/// inside the conversation and requires alternating turns, so system
/// messages are sent as user turns and consecutive turns of the same role
/// are merged.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut turns: Vec<(&str, String)> = Vec::new();
    for message in messages.iter().filter(|m| !m.content.is_empty()) {
        let role = match message.role {
            Role::Assistant => "assistant",
            Role::User | Role::System => "user",
        };
        match turns.last_mut() {
            Some((last, content)) if *last == role => {
                content.push_str("\n\n");
                content.push_str(&message.content);
            }
            _ => turns.push((role, message.content.clone())),
        }
    }
    turns
        .into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect()
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}

/// Turn a non-success status into an error carrying the response body
pub async fn check_status(response: Response) -> Result<Response> {
    match response.status() {
        StatusCode::OK => Ok(response),
        status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
            Err(anyhow!("Server error: {}", status))
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            if let Ok(value) = serde_json::from_str::<Value>(&body) {
                if let Some(err) = value.get("error").and_then(check_openai_context_length_error) {
                    return Err(err.into());
                }
            }
            Err(anyhow!("Request failed: {} - {}", status, body))
        }
    }
}

/// Split a byte stream into text deltas.
///
/// Each event is parsed as JSON and handed to `extract`, which returns the
/// delta it carries (if any) or an error the server reported. The stream
/// ends when the body ends or on an SSE `[DONE]` marker; the first error
/// ends it too.
pub fn text_deltas<S, B, F>(bytes: S, framing: Framing, extract: F) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    F: Fn(&Value) -> Result<Option<String>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while !finished {
            let mut lines = Vec::new();
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    buffer.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        lines.push(String::from_utf8_lossy(&line).trim().to_string());
                    }
                }
                Some(Err(e)) => {
                    yield Err(anyhow::Error::from(e));
                    return;
                }
                None => {
                    finished = true;
                    if !buffer.is_empty() {
                        lines.push(String::from_utf8_lossy(&buffer).trim().to_string());
                        buffer.clear();
                    }
                }
            }

            for line in lines {
                let payload = match framing {
                    Framing::Sse => match line.strip_prefix("data:") {
                        Some(data) => data.trim(),
                        None => continue,
                    },
                    Framing::NdJson => line.as_str(),
                };
                if payload.is_empty() {
                    continue;
                }
                if payload == "[DONE]" {
                    return;
                }
                let value: Value = match serde_json::from_str(payload) {
                    Ok(value) => value,
                    Err(e) => {
                        yield Err(anyhow!("Malformed stream event: {}", e));
                        return;
                    }
                };
                match extract(&value) {
                    Ok(Some(delta)) if !delta.is_empty() => {
                        yield Ok(delta);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    })
}
