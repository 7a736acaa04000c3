//! Decision engine: turns a negotiation state into one legal action

use crate::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS};
use crate::error::{AgentError, DecisionError, Result};
use crate::oracle::ReasoningOracle;
use crate::types::StateDigest;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::fallback::fallback_action;
use super::parser::{parse_reply, ParsedReply};
use super::prompt::{render_correction, render_prompt, SYSTEM_INSTRUCTION};
use super::types::{Action, NegotiationState};

/// Retry and timeout policy for oracle consultations
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Oracle invocations per decision before falling back
    pub max_attempts: u32,
    /// Bound on a single invocation
    pub oracle_timeout: Duration,
    pub system_instruction: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            oracle_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

/// Where a decision came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionSource {
    /// The oracle answered legally on this attempt (1-based)
    Oracle { attempt: u32 },
    /// Every attempt failed and the safe default was used
    Fallback { failures: u32 },
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSource::Oracle { attempt } => write!(f, "oracle(attempt {})", attempt),
            DecisionSource::Fallback { failures } => write!(f, "fallback(after {} failures)", failures),
        }
    }
}

/// An action together with how it was reached
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub source: DecisionSource,
    pub reason: Option<String>,
    pub digest: StateDigest,
}

/// Decision engine. Holds no per-session state, so one instance serves
/// every session concurrently.
pub struct DecisionEngine {
    oracle: Arc<dyn ReasoningOracle>,
    config: EngineConfig,
}

impl DecisionEngine {
    /// Create a new engine around an oracle
    pub fn new(oracle: Arc<dyn ReasoningOracle>, mut config: EngineConfig) -> Self {
        config.max_attempts = config.max_attempts.max(1);
        Self { oracle, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        self.oracle.model()
    }

    /// Produce one legal action for `state`
    pub async fn decide(&self, state: &NegotiationState) -> std::result::Result<Action, DecisionError> {
        self.deliberate(state).await.map(|decision| decision.action)
    }

    /// Like [`decide`](Self::decide) but keeps provenance and the oracle's reason
    pub async fn deliberate(
        &self,
        state: &NegotiationState,
    ) -> std::result::Result<Decision, DecisionError> {
        state.validate()?;

        let digest = state.digest();
        let base_prompt = render_prompt(state);
        let mut corrections: Vec<String> = Vec::new();
        let mut failures = 0u32;

        for attempt in 1..=self.config.max_attempts {
            let prompt = render_correction(&base_prompt, &corrections);

            match self.consult(state, &prompt).await {
                Ok(ParsedReply { action, reason }) => {
                    tracing::info!(
                        digest = %digest,
                        action = %action.kind(),
                        attempt,
                        model = self.oracle.model(),
                        "Oracle decision accepted"
                    );
                    return Ok(Decision {
                        action,
                        source: DecisionSource::Oracle { attempt },
                        reason,
                        digest,
                    });
                }
                Err(err) => {
                    failures += 1;
                    tracing::warn!(
                        digest = %digest,
                        attempt,
                        kind = err.kind(),
                        error = %err,
                        "Oracle attempt failed"
                    );
                    // only replies that arrived can be corrected
                    if let AgentError::MalformedResponse(msg) = err {
                        corrections.push(msg);
                    }
                }
            }
        }

        let action = fallback_action(state);
        tracing::warn!(
            digest = %digest,
            action = %action.kind(),
            failures,
            "Falling back to safe default"
        );

        Ok(Decision {
            action,
            source: DecisionSource::Fallback { failures },
            reason: Some(format!(
                "safe default after {} failed oracle attempts",
                failures
            )),
            digest,
        })
    }

    async fn consult(&self, state: &NegotiationState, prompt: &str) -> Result<ParsedReply> {
        let call = self
            .oracle
            .invoke(prompt, &self.config.system_instruction);

        let reply = tokio::time::timeout(self.config.oracle_timeout, call)
            .await
            .map_err(|_| {
                AgentError::OracleUnavailable(format!(
                    "no reply within {:?}",
                    self.config.oracle_timeout
                ))
            })??;

        parse_reply(state, &reply)
    }
}
