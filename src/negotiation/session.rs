//! Negotiation session: the append-only record of one bargaining game

use crate::error::{AgentError, Result};
use crate::types::ContextId;
use std::time::SystemTime;

use super::types::{Action, Allocation, HistoryEntry, NegotiationState, Party};

/// Lifecycle of a session
#[derive(Clone, Debug, PartialEq)]
pub enum SessionStatus {
    /// Bargaining in progress
    Active,
    /// This agent accepted an offer
    Agreed,
    /// The last turn was played without agreement
    Exhausted,
    /// Closed by either side
    Closed { reason: String },
}

impl SessionStatus {
    /// Check if the session has ended
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

/// One negotiation with a counterpart, keyed by its A2A context
#[derive(Clone, Debug)]
pub struct NegotiationSession {
    context_id: ContextId,
    history: Vec<HistoryEntry>,
    status: SessionStatus,
    turns_played: u32,
    created_at: SystemTime,
}

impl NegotiationSession {
    /// Create new session
    pub fn new(context_id: ContextId) -> Self {
        Self {
            context_id,
            history: Vec::new(),
            status: SessionStatus::Active,
            turns_played: 0,
            created_at: SystemTime::now(),
        }
    }

    pub fn context_id(&self) -> &ContextId {
        &self.context_id
    }

    /// Moves so far, oldest first
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Number of decisions this agent has made
    pub fn turns_played(&self) -> u32 {
        self.turns_played
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AgentError::SessionClosed(format!(
                "{} is {:?}",
                self.context_id, self.status
            )));
        }
        Ok(())
    }

    /// Record the counterpart's outstanding offer. An offer that is still the
    /// latest move is not recorded twice; the same offer made again after
    /// our reply is a new move.
    pub fn record_offer(&mut self, offer: &Allocation) -> Result<()> {
        self.ensure_active()?;

        let already_recorded = self.history.last().is_some_and(|entry| {
            entry.by == Party::Counterpart
                && matches!(&entry.action, Action::Propose { allocation } if allocation == offer)
        });

        if !already_recorded {
            self.history.push(HistoryEntry::new(
                Party::Counterpart,
                Action::Propose {
                    allocation: offer.clone(),
                },
            ));
        }

        Ok(())
    }

    /// Record this agent's decision and advance the lifecycle
    pub fn record_action(&mut self, action: &Action, turns_remaining: Option<u32>) -> Result<()> {
        self.ensure_active()?;

        self.history
            .push(HistoryEntry::new(Party::Agent, action.clone()));
        self.turns_played += 1;

        if matches!(action, Action::Accept) {
            self.status = SessionStatus::Agreed;
        } else if turns_remaining == Some(0) {
            self.status = SessionStatus::Exhausted;
        }

        Ok(())
    }

    /// Supply accumulated history when the caller sent none
    pub fn hydrate(&self, state: &mut NegotiationState) {
        if state.history.is_empty() {
            state.history = self.history.clone();
        }
    }

    /// Close the session
    pub fn close(&mut self, reason: impl Into<String>) {
        if self.is_active() {
            self.status = SessionStatus::Closed {
                reason: reason.into(),
            };
        }
    }
}
