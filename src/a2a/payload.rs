//! Translation between green-agent messages and engine types.
//!
//! Two payload schemas arrive over A2A: the engine's own camelCase
//! `NegotiationState`, and the observation format used by the bargaining
//! assessor (`quantities`, `valuations_self`, `batna_self`, ...). Replies are
//! encoded in the schema the request used.

use crate::error::{AgentError, Result};
use crate::negotiation::{
    extract_json_object, Action, Allocation, Decision, GameRules, Item, NegotiationState, TurnKind,
};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

const PROPOSE_MARKER: &str = "Action: PROPOSE";
const RESPOND_MARKER: &str = "Action: ACCEPT_OR_REJECT";

/// Schema a request arrived in, reused for the reply
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    Native,
    Observation,
}

/// A decoded decision request
#[derive(Clone, Debug)]
pub struct DecisionRequest {
    pub state: NegotiationState,
    pub format: WireFormat,
    /// Counterpart role label, when the assessor sends one
    pub role: Option<String>,
}

#[derive(Deserialize)]
struct Observation {
    quantities: Vec<f64>,
    valuations_self: Vec<f64>,
    batna_self: f64,
    #[serde(default)]
    current_offer: Option<ObservedOffer>,
    #[serde(default)]
    discount: Option<f64>,
    #[serde(default)]
    round: Option<u32>,
    #[serde(default)]
    max_rounds: Option<u32>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Deserialize)]
struct ObservedOffer {
    allocation_self: Vec<f64>,
    #[serde(default)]
    allocation_other: Option<Vec<f64>>,
}

/// Turn kind announced by the assessor's action marker
pub fn turn_marker(text: &str) -> Option<TurnKind> {
    if text.contains(RESPOND_MARKER) {
        Some(TurnKind::Respond)
    } else if text.contains(PROPOSE_MARKER) {
        Some(TurnKind::Propose)
    } else {
        None
    }
}

fn item_name(index: usize) -> String {
    format!("item_{}", index)
}

/// Decode a request from message text and an optional structured data part
pub fn parse_request(text: &str, data: Option<&JsonValue>) -> Result<DecisionRequest> {
    let payload = match data {
        Some(value) => value.clone(),
        None => {
            let object = extract_json_object(text).ok_or_else(|| {
                AgentError::InvalidPayload("message carries no JSON game state".to_string())
            })?;
            serde_json::from_str(object)
                .map_err(|e| AgentError::InvalidPayload(format!("game state is not JSON: {}", e)))?
        }
    };

    let object = payload
        .as_object()
        .ok_or_else(|| AgentError::InvalidPayload("game state must be a JSON object".to_string()))?;
    let marker = turn_marker(text);

    if object.contains_key("valuations_self") || object.contains_key("quantities") {
        from_observation(payload.clone(), marker)
    } else if object.contains_key("items") {
        let explicit_turn = object.contains_key("turn");
        let mut state: NegotiationState = serde_json::from_value(payload.clone())
            .map_err(|e| AgentError::InvalidPayload(format!("invalid negotiation state: {}", e)))?;
        if !explicit_turn {
            state.turn = marker.unwrap_or_default();
        }
        Ok(DecisionRequest {
            state,
            format: WireFormat::Native,
            role: None,
        })
    } else {
        Err(AgentError::InvalidPayload(
            "game state has neither 'items' nor 'quantities'".to_string(),
        ))
    }
}

fn from_observation(payload: JsonValue, marker: Option<TurnKind>) -> Result<DecisionRequest> {
    let obs: Observation = serde_json::from_value(payload)
        .map_err(|e| AgentError::InvalidPayload(format!("invalid observation: {}", e)))?;

    if obs.quantities.len() != obs.valuations_self.len() {
        return Err(AgentError::InvalidPayload(format!(
            "{} quantities but {} valuations",
            obs.quantities.len(),
            obs.valuations_self.len()
        )));
    }

    let items: Vec<Item> = obs
        .quantities
        .iter()
        .enumerate()
        .map(|(i, q)| Item::with_quantity(item_name(i), *q))
        .collect();
    let valuations: BTreeMap<String, f64> = obs
        .valuations_self
        .iter()
        .enumerate()
        .map(|(i, v)| (item_name(i), *v))
        .collect();

    let current_offer = match obs.current_offer {
        Some(offer) => Some(observed_offer(&obs.quantities, offer)?),
        None => None,
    };

    let turns_remaining = match (obs.max_rounds, obs.round) {
        (Some(max), Some(round)) => Some(max.saturating_sub(round)),
        _ => None,
    };

    let state = NegotiationState {
        items,
        valuations,
        batna: obs.batna_self,
        current_offer,
        history: Vec::new(),
        turn_limit: obs.max_rounds,
        turns_remaining,
        rules: GameRules {
            divisible: false,
            allow_reject: true,
        },
        turn: marker.unwrap_or_default(),
        discount: obs.discount,
        round: obs.round,
    };

    Ok(DecisionRequest {
        state,
        format: WireFormat::Observation,
        role: obs.role,
    })
}

fn observed_offer(quantities: &[f64], offer: ObservedOffer) -> Result<Allocation> {
    if offer.allocation_self.len() != quantities.len() {
        return Err(AgentError::InvalidPayload(format!(
            "offer covers {} items, game has {}",
            offer.allocation_self.len(),
            quantities.len()
        )));
    }

    if let Some(other) = &offer.allocation_other {
        let consistent = other.len() == quantities.len()
            && quantities
                .iter()
                .zip(offer.allocation_self.iter().zip(other))
                .all(|(q, (mine, theirs))| mine + theirs == *q);
        if !consistent {
            return Err(AgentError::InvalidPayload(
                "offer shares do not add up to the item quantities".to_string(),
            ));
        }
    }

    Ok(Allocation::from_shares(
        offer
            .allocation_self
            .iter()
            .enumerate()
            .map(|(i, share)| (item_name(i), *share)),
    ))
}

fn number(value: f64) -> JsonValue {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        JsonValue::from(value as i64)
    } else {
        JsonValue::from(value)
    }
}

/// Encode a decision in the request's schema
pub fn encode_decision(request: &DecisionRequest, decision: &Decision) -> JsonValue {
    let mut reply = match request.format {
        WireFormat::Native => encode_native(&decision.action),
        WireFormat::Observation => encode_observation(&request.state, &decision.action),
    };

    if let Some(reason) = &decision.reason {
        reply.insert("reason".to_string(), JsonValue::String(reason.clone()));
    }

    JsonValue::Object(reply)
}

fn encode_native(action: &Action) -> Map<String, JsonValue> {
    let mut reply = Map::new();
    reply.insert("action".to_string(), json!(action.kind().as_str()));
    if let Action::Propose { allocation } = action {
        let shares: Map<String, JsonValue> = allocation
            .iter()
            .map(|(item, share)| (item.clone(), number(*share)))
            .collect();
        reply.insert("allocation".to_string(), JsonValue::Object(shares));
    }
    reply
}

fn encode_observation(state: &NegotiationState, action: &Action) -> Map<String, JsonValue> {
    let mut reply = Map::new();
    match action {
        Action::Propose { allocation } => {
            let mine: Vec<f64> = state
                .items
                .iter()
                .map(|item| allocation.share(&item.name).unwrap_or(0.0))
                .collect();
            let theirs: Vec<JsonValue> = state
                .items
                .iter()
                .zip(&mine)
                .map(|(item, share)| number(item.quantity - share))
                .collect();
            reply.insert(
                "allocation_self".to_string(),
                JsonValue::Array(mine.into_iter().map(number).collect()),
            );
            reply.insert("allocation_other".to_string(), JsonValue::Array(theirs));
        }
        Action::Accept => {
            reply.insert("accept".to_string(), JsonValue::Bool(true));
        }
        Action::Reject => {
            reply.insert("accept".to_string(), JsonValue::Bool(false));
        }
    }
    reply
}
