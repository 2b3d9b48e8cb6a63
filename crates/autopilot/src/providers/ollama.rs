use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, TextStream};
use super::configs::OllamaProviderConfig;
use super::utils::{check_status, messages_to_openai_spec, text_deltas, Framing};
use crate::models::message::Message;

pub struct OllamaProvider {
    client: Client,
    config: OllamaProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: OllamaProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, system: &str, messages: &[Message]) -> Value {
        let mut options = json!({});
        if let Some(temp) = self.config.temperature {
            options["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            options["num_predict"] = json!(tokens);
        }
        // Ollama's chat API takes the same message shape as OpenAI's
        json!({
            "model": self.config.model,
            "messages": messages_to_openai_spec(system, messages),
            "stream": true,
            "options": options,
        })
    }
}

fn line_delta(line: &Value) -> Result<Option<String>> {
    if let Some(error) = line.get("error") {
        return Err(anyhow!("Ollama error: {}", error.as_str().unwrap_or("unknown error")));
    }
    Ok(line
        .pointer("/message/content")
        .and_then(Value::as_str)
        .map(String::from))
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream> {
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&self.payload(system, messages))
            .send()
            .await?;
        let response = check_status(response).await?;

        Ok(text_deltas(response.bytes_stream(), Framing::NdJson, line_delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::{OLLAMA_HOST, OLLAMA_MODEL};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(body: &str) -> (MockServer, OllamaProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/x-ndjson"))
            .mount(&mock_server)
            .await;

        let config = OllamaProviderConfig {
            host: mock_server.uri(),
            model: OLLAMA_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        };

        let provider = OllamaProvider::new(config).unwrap();
        (mock_server, provider)
    }

    #[tokio::test]
    async fn test_complete_ndjson() -> Result<()> {
        let (_server, provider) = setup_mock_server(concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\" there\"},\"done\":false}\n",
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
        ))
        .await;

        let text = provider
            .complete("system", &[Message::user().with_text("Hello?")])
            .await?;
        assert_eq!(text, "Hi there");
        Ok(())
    }

    #[tokio::test]
    async fn test_error_line() {
        let (_server, provider) = setup_mock_server("{\"error\":\"model 'qwen2.5' not found\"}\n").await;
        let err = provider
            .complete("system", &[Message::user().with_text("Hello?")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Ollama error: model 'qwen2.5' not found");
    }

    #[test]
    fn test_default_host() {
        assert!(OLLAMA_HOST.starts_with("http://localhost"));
    }
}
