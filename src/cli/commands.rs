//! CLI command definitions

use crate::config::{
    AgentConfig, OracleConfig, ServerConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS,
};
use crate::error::{AgentError, Result};
use crate::oracle::LlmProvider;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bargain-agent")]
#[command(about = "LLM-backed bargaining agent speaking the A2A protocol", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the A2A server
    Serve {
        #[command(flatten)]
        server: ServerArgs,

        #[command(flatten)]
        oracle: OracleArgs,
    },

    /// Decide a single turn and print the reply
    Decide {
        /// File holding the message text or game state (stdin when omitted)
        input: Option<PathBuf>,

        #[command(flatten)]
        oracle: OracleArgs,
    },

    /// Print the agent card
    Card {
        #[command(flatten)]
        server: ServerArgs,

        #[command(flatten)]
        oracle: OracleArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on (falls back to PORT, then 8080)
    #[arg(short, long, env = "AGENT_PORT")]
    pub port: Option<u16>,

    /// Public URL advertised in the agent card
    #[arg(long, env = "AGENT_URL")]
    pub card_url: Option<String>,
}

impl ServerArgs {
    pub fn server_config(&self) -> Result<ServerConfig> {
        let port = match self.port {
            Some(port) => port,
            None => match std::env::var("PORT") {
                Ok(raw) => raw.trim().parse().map_err(|_| {
                    AgentError::InvalidConfig(format!("PORT '{}' is not a port number", raw))
                })?,
                Err(_) => DEFAULT_PORT,
            },
        };

        Ok(ServerConfig {
            host: self.host.clone(),
            port,
            card_url: self.card_url.clone(),
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct OracleArgs {
    /// Reasoning service flavour (anthropic, openai, ollama, ...)
    #[arg(long, env = "LLM_PROVIDER", default_value = "anthropic")]
    pub provider: LlmProvider,

    /// Model identifier
    #[arg(long, env = "ANTHROPIC_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// API key for the reasoning service
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the provider's endpoint
    #[arg(long, env = "LLM_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Bound on a single oracle request, in seconds
    #[arg(long, env = "ORACLE_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Oracle attempts per decision before the safe default is used
    #[arg(long, env = "DECISION_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Never call the reasoning service
    #[arg(long)]
    pub offline: bool,
}

impl OracleArgs {
    pub fn oracle_config(&self) -> OracleConfig {
        OracleConfig {
            provider: self.provider,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone().filter(|key| !key.trim().is_empty()),
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Full configuration for the given server settings
    pub fn agent_config(&self, server: ServerConfig) -> AgentConfig {
        AgentConfig {
            server,
            oracle: self.oracle_config(),
            max_attempts: self.max_attempts,
            offline: self.offline,
        }
    }
}
