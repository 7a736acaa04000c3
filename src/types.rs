//! Core identifier types shared by the engine and the A2A transport

use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

fn random_suffix() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Identifier of an A2A task (one decision request)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID
    pub fn generate() -> Self {
        Self(format!("task_{}", random_suffix()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an A2A context; one context is one negotiation session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn generate() -> Self {
        Self(format!("ctx_{}", random_suffix()))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single A2A message
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(format!("msg_{}", random_suffix()))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short Blake2b fingerprint of a negotiation state, used to correlate
/// decisions in logs
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateDigest(pub [u8; 8]);

impl StateDigest {
    /// Hash arbitrary bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(data);
        let result = hasher.finalize();

        let mut digest = [0u8; 8];
        digest.copy_from_slice(&result[..8]);
        StateDigest(digest)
    }

    /// Get digest as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
