//! Bargaining agent binary

use anyhow::Context;
use bargain_agent::cli::{AgentApp, Cli, Commands};
use bargain_agent::config::ServerConfig;
use clap::Parser;
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { server, oracle } => {
            let config = oracle.agent_config(server.server_config()?);
            tracing::info!("Starting bargaining agent on {}", config.server.bind_addr());

            let app = AgentApp::new(config).context("invalid agent configuration")?;
            app.serve().await.context("A2A server failed")?;
        }

        Commands::Decide { input, oracle } => {
            let text = match input {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut text)
                        .await
                        .context("failed to read stdin")?;
                    text
                }
            };

            let app = AgentApp::new(oracle.agent_config(ServerConfig::default()))
                .context("invalid agent configuration")?;
            let reply = app.decide_once(&text).await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }

        Commands::Card { server, oracle } => {
            let app = AgentApp::new(oracle.agent_config(server.server_config()?))
                .context("invalid agent configuration")?;
            println!("{}", serde_json::to_string_pretty(&app.card())?);
        }
    }

    Ok(())
}
