//! Bargaining Agent
//!
//! Decision engine for turn-based, two-party bargaining games. Each turn the
//! engine asks a hosted reasoning model for a move, checks that the move is
//! legal for the current state, and falls back to a deterministic safe move
//! when the model cannot produce one. The engine is exposed to game
//! assessors over the A2A protocol.

pub mod a2a;
pub mod cli;
pub mod config;
pub mod error;
pub mod negotiation;
pub mod oracle;
pub mod types;

// Re-export commonly used types
pub use config::{AgentConfig, OracleConfig, ServerConfig};
pub use error::{AgentError, DecisionError, Result};
pub use negotiation::{
    Action, Allocation, Decision, DecisionEngine, DecisionSource, EngineConfig, NegotiationState,
};
pub use oracle::{LlmOracle, LlmProvider, OfflineOracle, ReasoningOracle};
