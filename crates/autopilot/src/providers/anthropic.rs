use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, TextStream};
use super::configs::{AnthropicProviderConfig, ANTHROPIC_MAX_TOKENS};
use super::utils::{check_status, messages_to_anthropic_spec, text_deltas, Framing};
use crate::models::message::Message;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, system: &str, messages: &[Message]) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_anthropic_spec(messages),
            "max_tokens": self.config.max_tokens.unwrap_or(ANTHROPIC_MAX_TOKENS),
            "stream": true,
        });
        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        payload
    }
}

/// Only text deltas carry content; other events are bookkeeping
fn event_delta(event: &Value) -> Result<Option<String>> {
    match event.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => Ok(event
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(String::from)),
        Some("error") => Err(anyhow!(
            "Anthropic API error: {}",
            event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
        )),
        _ => Ok(None),
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.payload(system, messages))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(text_deltas(response.bytes_stream(), Framing::Sse, event_delta))
    }
}
