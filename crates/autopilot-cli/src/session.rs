use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::prompt::{InputType, Prompt};
use crate::render;
use autopilot::agent::Agent;
use autopilot::errors::AgentError;

pub struct Session<P: Prompt> {
    agent: Agent,
    prompt: P,
}

impl<P: Prompt> Session<P> {
    pub fn new(agent: Agent, prompt: P) -> Self {
        Session { agent, prompt }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.prompt.render_notice(&format!(
            "Working in {} with {} tools",
            self.agent.settings().working_dir.display(),
            self.agent.catalog().len()
        ));
        self.prompt.ready();

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(content) = input.content {
                        self.process(&content).await?;
                    }
                }
                InputType::Clear => {
                    self.agent.clear_history();
                    self.prompt.render_notice("Started a fresh conversation.");
                }
                InputType::AskAgain => continue,
                InputType::Exit => break,
            }
        }
        Ok(())
    }

    pub async fn headless_start(&mut self, text: &str) -> Result<()> {
        self.process(text).await
    }

    /// Run one turn. Ctrl-C cancels it; failures are reported, not fatal.
    async fn process(&mut self, text: &str) -> Result<()> {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let prompt = &mut self.prompt;
        let result = self
            .agent
            .chat_with_cancel(text, |chunk| prompt.render_chunk(chunk), cancel)
            .await;
        watcher.abort();

        match result {
            Ok(response) => {
                self.prompt.render_answer(&response.content)?;
                self.prompt.render_notice(&render::summary(&response));
            }
            Err(AgentError::Cancelled) => {
                self.prompt.render_notice("\nInterrupted. The conversation is kept up to your last message.");
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                self.prompt.render_notice(&format!("\nError: {}", e));
            }
        }
        Ok(())
    }
}
