//! Parsing and structural validation of oracle replies

use crate::error::{AgentError, Result};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;

use super::types::{Action, ActionKind, Allocation, NegotiationState};

/// A validated oracle reply
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedReply {
    pub action: Action,
    pub reason: Option<String>,
}

/// Locate the JSON object in free-form text: a ```json fence wins,
/// otherwise the first balanced top-level `{...}`
pub fn extract_json_object(text: &str) -> Option<&str> {
    const FENCE: &str = "```json";

    if let Some(start) = text.find(FENCE) {
        let body_start = start + FENCE.len();
        if let Some(len) = text[body_start..].find("```") {
            if let Some(object) = balanced_object(&text[body_start..body_start + len]) {
                return Some(object);
            }
        }
    }

    balanced_object(text)
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Allocation entries in reply order, duplicates kept so they can be reported
struct RawShares(Vec<(String, JsonValue)>);

impl<'de> Deserialize<'de> for RawShares {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SharesVisitor;

        impl<'de> Visitor<'de> for SharesVisitor {
            type Value = RawShares;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping item names to shares")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<RawShares, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((item, share)) = map.next_entry::<String, JsonValue>()? {
                    entries.push((item, share));
                }
                Ok(RawShares(entries))
            }
        }

        deserializer.deserialize_map(SharesVisitor)
    }
}

#[derive(Deserialize)]
struct RawReply {
    action: Option<JsonValue>,
    allocation: Option<RawShares>,
    reason: Option<JsonValue>,
}

fn malformed(msg: impl Into<String>) -> AgentError {
    AgentError::MalformedResponse(msg.into())
}

fn parse_kind(value: Option<&JsonValue>, legal: &[ActionKind]) -> Result<ActionKind> {
    let expected = legal
        .iter()
        .map(|k| format!("'{}'", k))
        .collect::<Vec<_>>()
        .join(", ");

    let raw = match value {
        Some(JsonValue::String(s)) => s,
        Some(other) => {
            return Err(malformed(format!(
                "'action' must be a string, got {}; expected one of {}",
                other, expected
            )))
        }
        None => {
            return Err(malformed(format!(
                "missing 'action' field; expected one of {}",
                expected
            )))
        }
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "propose" => Ok(ActionKind::Propose),
        "accept" => Ok(ActionKind::Accept),
        "reject" => Ok(ActionKind::Reject),
        _ => Err(malformed(format!(
            "unknown action '{}'; expected one of {}",
            raw, expected
        ))),
    }
}

fn parse_allocation(raw: Option<RawShares>) -> Result<Allocation> {
    let RawShares(entries) =
        raw.ok_or_else(|| malformed("a proposal must include an 'allocation' object"))?;

    let mut seen = HashSet::new();
    let mut allocation = Allocation::new();
    for (item, share) in entries {
        if !seen.insert(item.clone()) {
            return Err(malformed(format!(
                "item '{}' appears more than once in the allocation",
                item
            )));
        }
        let share = share.as_f64().ok_or_else(|| {
            malformed(format!("share for '{}' is not a number: {}", item, share))
        })?;
        allocation.set(item, share);
    }

    Ok(allocation)
}

/// Parse an oracle reply and check it is a legal action in `state`
pub fn parse_reply(state: &NegotiationState, reply: &str) -> Result<ParsedReply> {
    let object = extract_json_object(reply)
        .ok_or_else(|| malformed("no JSON object found in the reply"))?;

    let raw: RawReply = serde_json::from_str(object)
        .map_err(|e| malformed(format!("reply is not a valid answer object: {}", e)))?;

    let legal = state.legal_actions();
    let kind = parse_kind(raw.action.as_ref(), &legal)?;

    let action = match kind {
        ActionKind::Propose => Action::Propose {
            allocation: parse_allocation(raw.allocation)?,
        },
        ActionKind::Accept => Action::Accept,
        ActionKind::Reject => Action::Reject,
    };

    state.check_action(&action).map_err(malformed)?;

    let reason = match raw.reason {
        Some(JsonValue::String(reason)) if !reason.trim().is_empty() => Some(reason),
        _ => None,
    };

    Ok(ParsedReply { action, reason })
}
