use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

use crate::models::message::Message;

/// A stream of generated text. It completes when generation is done, and an
/// `Err` item reports a failure part way through.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Base trait for text generation providers (OpenAI, Anthropic, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start generating a reply to `messages`, delivering text as it is produced
    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream>;

    /// Generate the whole reply at once
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<String> {
        let mut stream = self.stream(system, messages).await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    #[tokio::test]
    async fn test_complete_drains_the_stream() -> Result<()> {
        let provider = MockProvider::new(vec!["Hello there, how can I help?".to_string()]);
        let text = provider
            .complete("system", &[Message::user().with_text("hi")])
            .await?;
        assert_eq!(text, "Hello there, how can I help?");
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_surfaces_stream_errors() {
        let provider = MockProvider::failing("connection reset");
        let err = provider
            .complete("system", &[Message::user().with_text("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }
}
