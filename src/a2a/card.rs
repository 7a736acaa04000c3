//! Agent card published at the well-known discovery path

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.3.0";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub protocol_version: String,
    pub preferred_transport: String,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
}

/// Build the card for an agent reachable at `url`, reasoning with `model`
pub fn build_agent_card(url: &str, model: &str) -> AgentCard {
    let skill = AgentSkill {
        id: "negotiation".to_string(),
        name: "LLM-Powered Negotiation".to_string(),
        description: format!(
            "Reasons about valuations, BATNA and remaining turns with {} to propose, \
             accept or reject allocations in two-party bargaining games.",
            model
        ),
        tags: ["negotiation", "bargaining", "llm", "purple-agent"]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        examples: vec![
            "Negotiate item allocations using strategic reasoning".to_string(),
            "Accept or reject offers based on their value against the BATNA".to_string(),
        ],
    };

    AgentCard {
        name: "Bargaining Agent".to_string(),
        description: "Turn-based bargaining agent. Every reply is a legal game action, \
                      falling back to a deterministic safe move when the reasoning \
                      service cannot answer."
            .to_string(),
        url: url.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        preferred_transport: "JSONRPC".to_string(),
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string()],
        capabilities: AgentCapabilities {
            streaming: false,
            push_notifications: false,
        },
        skills: vec![skill],
    }
}
