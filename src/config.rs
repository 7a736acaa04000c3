//! Process configuration. Built once at startup and read-only afterwards.

use crate::error::{AgentError, Result};
use crate::negotiation::engine::EngineConfig;
use crate::negotiation::prompt::SYSTEM_INSTRUCTION;
use crate::oracle::LlmProvider;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Settings for the hosted reasoning service
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub provider: LlmProvider,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    /// Bound on a single oracle request
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Anthropic,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Where the A2A server listens and how it advertises itself
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub card_url: Option<String>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL published in the agent card
    pub fn public_url(&self) -> String {
        self.card_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/", self.host, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            card_url: None,
        }
    }
}

/// Full agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub oracle: OracleConfig,
    pub max_attempts: u32,
    /// Skip the reasoning service entirely and always use the fallback
    pub offline: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            oracle: OracleConfig::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            offline: false,
        }
    }
}

impl AgentConfig {
    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AgentError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if self.oracle.timeout.is_zero() {
            return Err(AgentError::InvalidConfig(
                "oracle timeout must be positive".to_string(),
            ));
        }
        if self.oracle.max_tokens == 0 {
            return Err(AgentError::InvalidConfig(
                "max tokens must be positive".to_string(),
            ));
        }
        if !self.offline && self.oracle.model.trim().is_empty() {
            return Err(AgentError::MissingConfig("model".to_string()));
        }
        Ok(())
    }

    /// Validation for running the server; port 0 is only useful in tests
    pub fn validate_for_serving(&self) -> Result<()> {
        self.validate()?;
        if self.server.port == 0 {
            return Err(AgentError::InvalidConfig("port must not be 0".to_string()));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_attempts: self.max_attempts,
            oracle_timeout: self.oracle.timeout,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        }
    }
}
