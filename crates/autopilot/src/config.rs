use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::providers::configs::{
    AnthropicProviderConfig, OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig,
    ANTHROPIC_HOST, ANTHROPIC_MODEL, OLLAMA_HOST, OLLAMA_MODEL, OPENAI_HOST, OPENAI_MODEL,
};
use crate::providers::factory::ProviderType;

pub const ENV_PREFIX: &str = "AUTOPILOT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a provider field
pub fn to_env_var(field: &str) -> String {
    // Without any provider section the first thing missing is its type
    let field = if field == "provider" { "type" } else { field };
    format!("{}_PROVIDER__{}", ENV_PREFIX, field.to_uppercase())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
    #[serde(default = "default_project_context")]
    pub project_context: bool,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub turn_timeout_secs: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_context_chars: default_max_context_chars(),
            max_result_chars: default_max_result_chars(),
            project_context: default_project_context(),
            working_dir: default_working_dir(),
            turn_timeout_secs: None,
        }
    }
}

impl AgentSettings {
    pub fn turn_timeout(&self) -> Option<Duration> {
        self.turn_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
            ProviderSettings::Ollama { .. } => ProviderType::Ollama,
        }
    }

    // Convert to the ProviderConfig the factory takes
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub agent: AgentSettings,
    pub provider: ProviderSettings,
}

impl Settings {
    /// Defaults layered with `AUTOPILOT_*` environment variables
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None, &[])
    }

    /// Defaults, then the TOML file if given, then the environment, then
    /// explicit overrides such as command line flags (`("agent.max_iterations", "3")`).
    pub fn load(file: Option<&Path>, overrides: &[(&str, String)]) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Agent defaults
            .set_default("agent.max_iterations", default_max_iterations() as i64)?
            .set_default("agent.max_context_chars", default_max_context_chars() as i64)?
            .set_default("agent.max_result_chars", default_max_result_chars() as i64)?
            .set_default("agent.project_context", default_project_context())?
            .set_default("agent.working_dir", ".")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Layer on the environment variables
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (key, value) in overrides {
            builder = builder.set_override(*key, value.as_str())?;
        }

        let result: Result<Self, config::ConfigError> = builder.build()?.try_deserialize();

        // Handle missing field errors specially
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if let Some(field) = missing_field(&error_str) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

// Extract the field name from "missing field `api_key`..."
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.split("missing field `").nth(1)?;
    rest.split('`').next()
}

fn default_max_iterations() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    120_000
}

fn default_max_result_chars() -> usize {
    16_000
}

fn default_project_context() -> bool {
    true
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_anthropic_model() -> String {
    ANTHROPIC_MODEL.to_string()
}

fn default_ollama_host() -> String {
    OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    OLLAMA_MODEL.to_string()
}
