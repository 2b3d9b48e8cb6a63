use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::providers::base::{Provider, TextStream};

/// Characters per streamed delta
const CHUNK_CHARS: usize = 8;

enum Scripted {
    Reply(String),
    Error(String),
}

/// A mock provider that replays scripted replies, one per call, streamed in
/// small pieces
pub struct MockProvider {
    replies: Arc<Mutex<Vec<Scripted>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of replies
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(Scripted::Reply).collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose first call fails
    pub fn failing(message: &str) -> Self {
        let provider = Self::new(Vec::new());
        provider
            .replies
            .lock()
            .unwrap()
            .push(Scripted::Error(message.to_string()));
        provider
    }

    /// The messages sent with every call so far
    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<Message>>>> {
        self.requests.clone()
    }
}

fn split(text: &str) -> Vec<Result<String>> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(CHUNK_CHARS)
        .map(|chunk| Ok(chunk.iter().collect()))
        .collect()
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(&self, _system: &str, messages: &[Message]) -> Result<TextStream> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut replies = self.replies.lock().unwrap();
        let next = if replies.is_empty() {
            // Out of script: answer with an empty reply
            Scripted::Reply(String::new())
        } else {
            replies.remove(0)
        };
        match next {
            Scripted::Reply(text) => Ok(Box::pin(stream::iter(split(&text)))),
            Scripted::Error(message) => Ok(Box::pin(stream::iter(vec![Err(anyhow!(message))]))),
        }
    }
}
