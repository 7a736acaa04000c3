//! Negotiation decision engine and session bookkeeping

pub mod engine;
pub mod fallback;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod types;

pub use engine::{Decision, DecisionEngine, DecisionSource, EngineConfig};
pub use fallback::{even_split, fallback_action};
pub use parser::{extract_json_object, parse_reply, ParsedReply};
pub use prompt::{render_prompt, SYSTEM_INSTRUCTION};
pub use session::{NegotiationSession, SessionStatus};
pub use types::{
    Action, ActionKind, Allocation, GameRules, HistoryEntry, Item, NegotiationState, Party,
    TurnKind,
};
