//! External reasoning oracle.
//!
//! The engine only sees [`ReasoningOracle`]; which service sits behind it is
//! decided at startup.

pub mod client;

pub use client::{LlmOracle, LlmProvider};

use crate::error::{AgentError, Result};
use async_trait::async_trait;

/// A single opaque request/response exchange with a reasoning service
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Send a prompt under a system instruction and return the reply text
    async fn invoke(&self, prompt: &str, system_instruction: &str) -> Result<String>;

    /// Model identifier, for logs
    fn model(&self) -> &str;
}

/// Oracle that is never reachable; every decision takes the fallback path
#[derive(Debug, Clone, Default)]
pub struct OfflineOracle;

#[async_trait]
impl ReasoningOracle for OfflineOracle {
    async fn invoke(&self, _prompt: &str, _system_instruction: &str) -> Result<String> {
        Err(AgentError::OracleUnavailable(
            "running offline, no reasoning service configured".to_string(),
        ))
    }

    fn model(&self) -> &str {
        "offline"
    }
}
