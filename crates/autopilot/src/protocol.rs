//! The text protocol models use to request tools.
//!
//! A request is a fenced block tagged `tool_call` holding a JSON object:
//!
//! ````text
//! ```tool_call
//! {"tool_calls": [{"id": "call_1", "name": "read_file", "parameters": {"path": "src/main.rs"}}]}
//! ```
//! ````
//!
//! A turn may contain any number of blocks, and a block any number of
//! objects. Each object is parsed on its own so one malformed object never
//! hides the calls in the others.
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::tool::ToolCall;

/// Fence tag marking a tool call block
pub const FENCE_TAG: &str = "tool_call";

lazy_static! {
    static ref BLOCK: Regex = Regex::new(r"(?s)```tool_call[ \t]*\r?\n(.*?)```").unwrap();
}

#[derive(Deserialize)]
struct Envelope {
    tool_calls: Vec<RawCall>,
}

#[derive(Deserialize)]
struct RawCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    parameters: Option<Value>,
}

/// The calls found in a turn, plus a description of everything skipped
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Decoded {
    pub calls: Vec<ToolCall>,
    pub errors: Vec<String>,
}

impl Decoded {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Split a block body into top-level `{..}` spans, respecting JSON strings
fn json_objects(body: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        objects.push(&body[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    // An unterminated object is still handed to the parser so it gets reported
    if let Some(s) = start {
        objects.push(&body[s..]);
    }
    objects
}

/// Extract every tool call from a fully generated turn, in document order.
///
/// Calls without an id, or whose id was already used earlier in the turn,
/// get a fresh `call_<uuid>` id so results can always be paired.
pub fn decode(text: &str) -> Decoded {
    let mut decoded = Decoded::default();
    let mut seen = HashSet::new();

    for (block_index, block) in BLOCK.captures_iter(text).enumerate() {
        let body = block.get(1).map(|m| m.as_str()).unwrap_or("");
        let objects = json_objects(body);
        if objects.is_empty() && !body.trim().is_empty() {
            let error = format!("block {}: no JSON object found", block_index + 1);
            tracing::warn!(%error, "skipping tool call block");
            decoded.errors.push(error);
            continue;
        }

        for object in objects {
            let envelope: Envelope = match serde_json::from_str(object) {
                Ok(envelope) => envelope,
                Err(e) => {
                    let error = format!("block {}: {}", block_index + 1, e);
                    tracing::warn!(%error, "skipping malformed tool call object");
                    decoded.errors.push(error);
                    continue;
                }
            };

            for raw in envelope.tool_calls {
                if raw.name.trim().is_empty() {
                    decoded
                        .errors
                        .push(format!("block {}: tool call without a name", block_index + 1));
                    continue;
                }
                let id = match raw.id.filter(|id| !id.trim().is_empty()) {
                    Some(id) if !seen.contains(&id) => id,
                    _ => new_call_id(),
                };
                seen.insert(id.clone());
                let parameters = raw
                    .parameters
                    .filter(|p| !p.is_null())
                    .unwrap_or_else(|| Value::Object(Map::new()));
                decoded.calls.push(ToolCall::new(id, raw.name.trim(), parameters));
            }
        }
    }

    decoded
}

/// The turn's text with every tool call block removed
pub fn strip_tool_blocks(text: &str) -> String {
    BLOCK.replace_all(text, "").trim().to_string()
}

/// Render calls in the wire format, for prompts and tests
pub fn encode(calls: &[ToolCall]) -> String {
    let body = serde_json::json!({ "tool_calls": calls });
    format!("```{}\n{}\n```", FENCE_TAG, body)
}
