//! Bargaining agent application wiring configuration, oracle, engine and server

use crate::a2a::{build_agent_card, encode_decision, parse_request, A2aServer, AgentCard};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::negotiation::DecisionEngine;
use crate::oracle::{LlmOracle, LlmProvider, OfflineOracle, ReasoningOracle};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Main agent application
#[derive(Clone)]
pub struct AgentApp {
    config: Arc<AgentConfig>,
    engine: Arc<DecisionEngine>,
}

impl AgentApp {
    /// Build the application from validated configuration
    pub fn new(config: AgentConfig) -> Result<Self> {
        config.validate()?;

        let oracle: Arc<dyn ReasoningOracle> = if config.offline {
            tracing::info!("Offline mode: every decision uses the safe default");
            Arc::new(OfflineOracle)
        } else {
            if config.oracle.api_key.is_none() && config.oracle.provider == LlmProvider::Anthropic {
                tracing::warn!(
                    "ANTHROPIC_API_KEY is not set; oracle calls will fail and decisions will fall back to the safe default"
                );
            }
            Arc::new(LlmOracle::new(config.oracle.clone())?)
        };

        let engine = Arc::new(DecisionEngine::new(oracle, config.engine_config()));

        Ok(Self {
            config: Arc::new(config),
            engine,
        })
    }

    pub fn config(&self) -> Arc<AgentConfig> {
        self.config.clone()
    }

    pub fn engine(&self) -> Arc<DecisionEngine> {
        self.engine.clone()
    }

    /// Agent card advertised by this process
    pub fn card(&self) -> AgentCard {
        build_agent_card(&self.config.server.public_url(), self.engine.model())
    }

    /// Run the A2A server until Ctrl+C
    pub async fn serve(&self) -> Result<()> {
        self.config.validate_for_serving()?;

        tracing::info!(
            "Bargaining agent using {} ({}), up to {} attempts per decision",
            self.engine.model(),
            if self.config.offline {
                "offline".to_string()
            } else {
                self.config.oracle.provider.to_string()
            },
            self.config.max_attempts
        );
        tracing::info!("Agent card URL: {}", self.config.server.public_url());

        let server = A2aServer::new(self.engine.clone(), self.card());
        server
            .serve_with_shutdown(&self.config.server.bind_addr(), shutdown_signal())
            .await
    }

    /// Decide one turn from a raw message body and return the encoded reply
    pub async fn decide_once(&self, input: &str) -> Result<JsonValue> {
        let request = parse_request(input, None)?;
        let decision = self.engine.deliberate(&request.state).await?;

        tracing::info!(
            digest = %decision.digest,
            action = %decision.action.kind(),
            source = %decision.source,
            "Decided single turn"
        );

        Ok(encode_decision(&request, &decision))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
