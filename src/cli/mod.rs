//! CLI module for the bargaining agent

pub mod app;
pub mod commands;

pub use app::AgentApp;
pub use commands::{Cli, Commands, OracleArgs, ServerArgs};
