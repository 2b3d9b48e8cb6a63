use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, TextStream};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    check_openai_context_length_error, check_status, messages_to_openai_spec, text_deltas,
    Framing,
};
use crate::models::message::Message;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, system: &str, messages: &[Message]) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(system, messages),
            "stream": true,
        });
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }
        payload
    }
}

/// The text carried by one streamed chat completion chunk
fn chunk_delta(chunk: &Value) -> Result<Option<String>> {
    if let Some(error) = chunk.get("error") {
        if let Some(err) = check_openai_context_length_error(error) {
            return Err(err.into());
        }
        return Err(anyhow!("OpenAI API error: {}", error));
    }
    Ok(chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(String::from))
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&self.payload(system, messages))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(text_deltas(response.bytes_stream(), Framing::Sse, chunk_delta))
    }
}
