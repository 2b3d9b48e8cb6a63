use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use autopilot::agent::Agent;
use autopilot::config::Settings;
use autopilot::providers::factory::{self, ProviderType};

mod prompt;
mod render;
mod session;

use prompt::cliclack::CliclackPrompt;
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML settings file, layered under AUTOPILOT_* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider to use (openai, anthropic or ollama)
    #[arg(short, long, global = true)]
    provider: Option<ProviderType>,

    /// Most generation round-trips per message
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Directory the agent works in
    #[arg(short, long, global = true)]
    working_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive session
    Chat,

    /// Handle a single message and exit
    Run {
        /// The message to send
        #[arg(short, long)]
        text: String,
    },
}

impl Cli {
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(provider) = self.provider {
            overrides.push(("provider.type", provider.to_string()));
        }
        if let Some(max_iterations) = self.max_iterations {
            overrides.push(("agent.max_iterations", max_iterations.to_string()));
        }
        if let Some(dir) = &self.working_dir {
            overrides.push(("agent.working_dir", dir.display().to_string()));
        }
        overrides
    }
}

fn init_tracing() {
    // Logs go to stderr so they never interleave with streamed text
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autopilot=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_agent(cli: &Cli) -> Result<Agent> {
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load settings")?;
    tracing::debug!(provider = %settings.provider.provider_type(), "loaded settings");

    let provider = factory::get_provider(settings.provider.into_config())?;
    let agent = Agent::local(provider, settings.agent)?;
    Ok(agent.with_observer(Arc::new(render::print_action)))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let agent = build_agent(&cli)?;

    match &cli.command {
        Some(Command::Run { text }) => {
            let mut session = Session::new(agent, CliclackPrompt::new());
            session.headless_start(text).await
        }
        Some(Command::Chat) | None => {
            let mut session = Session::new(agent, CliclackPrompt::new());
            session.start().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "autopilot",
            "run",
            "--text",
            "list the js files",
            "--provider",
            "anthropic",
            "--max-iterations",
            "3",
        ])
        .unwrap();

        match &cli.command {
            Some(Command::Run { text }) => assert_eq!(text, "list the js files"),
            _ => panic!("Expected the run command"),
        }
        assert_eq!(
            cli.overrides(),
            vec![
                ("provider.type", "anthropic".to_string()),
                ("agent.max_iterations", "3".to_string()),
            ]
        );
    }

    #[test]
    fn test_chat_is_the_default() {
        let cli = Cli::try_parse_from(["autopilot"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.overrides().is_empty());
        assert!(Cli::try_parse_from(["autopilot", "--provider", "databricks"]).is_err());
    }
}
