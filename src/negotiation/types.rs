//! Negotiation state, allocations and the action grammar

use crate::error::DecisionError;
use crate::types::StateDigest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

fn default_quantity() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A distinguishable good on the table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    /// The divisible unit of this item; shares of both parties sum to it
    #[serde(default = "default_quantity")]
    pub quantity: f64,
}

impl Item {
    /// A single unit item
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: 1.0,
        }
    }

    pub fn with_quantity(name: impl Into<String>, quantity: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}

/// Which side of the table made a move
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Agent,
    Counterpart,
}

/// The closed set of moves the engine can make
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Propose,
    Accept,
    Reject,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Propose => "propose",
            ActionKind::Accept => "accept",
            ActionKind::Reject => "reject",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// This agent's share of every item. The counterpart implicitly holds the
/// complement (`quantity - share`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allocation(BTreeMap<String, f64>);

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shares<I, S>(shares: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self(shares.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn set(&mut self, item: impl Into<String>, share: f64) {
        self.0.insert(item.into(), share);
    }

    pub fn share(&self, item: &str) -> Option<f64> {
        self.0.get(item).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A decision returned to the caller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Offer a new allocation to the counterpart
    Propose { allocation: Allocation },
    /// Take the current offer as-is
    Accept,
    /// Decline the current offer without countering
    Reject,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Propose { .. } => ActionKind::Propose,
            Action::Accept => ActionKind::Accept,
            Action::Reject => ActionKind::Reject,
        }
    }
}

/// Game-level rules that shape which actions are legal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRules {
    /// Whether fractional shares of an item are allowed
    #[serde(default)]
    pub divisible: bool,
    /// Whether a bare rejection is allowed alongside counter-proposing
    #[serde(default = "default_true")]
    pub allow_reject: bool,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            divisible: false,
            allow_reject: true,
        }
    }
}

/// What the game expects from this agent on the current turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    /// Any legal move
    #[default]
    Open,
    /// A proposal is required
    Propose,
    /// Accept or reject the current offer
    Respond,
}

/// One past move in the session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub by: Party,
    #[serde(rename = "move")]
    pub action: Action,
}

impl HistoryEntry {
    pub fn new(by: Party, action: Action) -> Self {
        Self { by, action }
    }
}

/// Everything the engine knows when asked for a decision
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationState {
    pub items: Vec<Item>,
    /// Per-unit value of each item to this agent
    pub valuations: BTreeMap<String, f64>,
    pub batna: f64,
    #[serde(default)]
    pub current_offer: Option<Allocation>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub turn_limit: Option<u32>,
    #[serde(default)]
    pub turns_remaining: Option<u32>,
    #[serde(default)]
    pub rules: GameRules,
    #[serde(default)]
    pub turn: TurnKind,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub round: Option<u32>,
}

impl NegotiationState {
    /// A first-move state with unit items
    pub fn new(items: Vec<Item>, valuations: BTreeMap<String, f64>, batna: f64) -> Self {
        Self {
            items,
            valuations,
            batna,
            current_offer: None,
            history: Vec::new(),
            turn_limit: None,
            turns_remaining: None,
            rules: GameRules::default(),
            turn: TurnKind::Open,
            discount: None,
            round: None,
        }
    }

    pub fn with_offer(mut self, offer: Allocation) -> Self {
        self.current_offer = Some(offer);
        self
    }

    pub fn with_turn(mut self, turn: TurnKind) -> Self {
        self.turn = turn;
        self
    }

    pub fn with_turns_remaining(mut self, turns: u32) -> Self {
        self.turns_remaining = Some(turns);
        self
    }

    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.name == name)
    }

    /// Per-unit valuation of an item, zero when unknown
    pub fn valuation(&self, name: &str) -> f64 {
        self.valuations.get(name).copied().unwrap_or(0.0)
    }

    /// Value of an allocation to this agent under its own valuations
    pub fn value_of(&self, allocation: &Allocation) -> f64 {
        self.items
            .iter()
            .map(|item| allocation.share(&item.name).unwrap_or(0.0) * self.valuation(&item.name))
            .sum()
    }

    /// Value of the outstanding offer, if any
    pub fn offer_value(&self) -> Option<f64> {
        self.current_offer.as_ref().map(|offer| self.value_of(offer))
    }

    /// Value of taking every item
    pub fn total_value(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.quantity * self.valuation(&item.name))
            .sum()
    }

    /// Whether a payoff is at least as good as walking away
    pub fn meets_batna(&self, value: f64) -> bool {
        value >= self.batna
    }

    /// Action kinds the game allows right now, in prompt order
    pub fn legal_actions(&self) -> Vec<ActionKind> {
        let has_offer = self.current_offer.is_some();
        match self.turn {
            TurnKind::Propose => vec![ActionKind::Propose],
            TurnKind::Respond if has_offer => vec![ActionKind::Accept, ActionKind::Reject],
            TurnKind::Respond => Vec::new(),
            TurnKind::Open => {
                let mut kinds = vec![ActionKind::Propose];
                if has_offer {
                    kinds.push(ActionKind::Accept);
                    if self.rules.allow_reject {
                        kinds.push(ActionKind::Reject);
                    }
                }
                kinds
            }
        }
    }

    /// Check that an allocation covers every item exactly once with a
    /// share inside `[0, quantity]`
    pub fn check_allocation(&self, allocation: &Allocation) -> std::result::Result<(), String> {
        for (name, _) in allocation.iter() {
            if self.item(name).is_none() {
                return Err(format!("unknown item '{}'", name));
            }
        }

        for item in &self.items {
            let share = allocation
                .share(&item.name)
                .ok_or_else(|| format!("missing share for item '{}'", item.name))?;

            if !share.is_finite() {
                return Err(format!("share for '{}' is not a number", item.name));
            }
            if share < 0.0 || share > item.quantity {
                return Err(format!(
                    "share {} for '{}' is outside 0..={}",
                    share, item.name, item.quantity
                ));
            }
            if !self.rules.divisible && share.fract() != 0.0 {
                return Err(format!(
                    "share {} for '{}' must be a whole number",
                    share, item.name
                ));
            }
        }

        Ok(())
    }

    /// Structural legality of an action in this state
    pub fn check_action(&self, action: &Action) -> std::result::Result<(), String> {
        let kind = action.kind();
        if !self.legal_actions().contains(&kind) {
            return Err(match kind {
                ActionKind::Accept | ActionKind::Reject if self.current_offer.is_none() => {
                    format!("'{}' requires an offer on the table and there is none", kind)
                }
                _ => format!("'{}' is not allowed on this turn", kind),
            });
        }

        if let Action::Propose { allocation } = action {
            self.check_allocation(allocation)?;
        }

        Ok(())
    }

    /// Reject states no legal action can be derived from
    pub fn validate(&self) -> std::result::Result<(), DecisionError> {
        let invalid = |msg: String| Err(DecisionError::InvalidState(msg));

        if self.items.is_empty() {
            return invalid("item list is empty".to_string());
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if !seen.insert(item.name.as_str()) {
                return invalid(format!("duplicate item '{}'", item.name));
            }
            if !item.quantity.is_finite() || item.quantity < 0.0 {
                return invalid(format!(
                    "item '{}' has negative quantity {}",
                    item.name, item.quantity
                ));
            }
            if !self.rules.divisible && item.quantity.fract() != 0.0 {
                return invalid(format!(
                    "item '{}' has fractional quantity {} in an indivisible game",
                    item.name, item.quantity
                ));
            }
            match self.valuations.get(&item.name) {
                None => return invalid(format!("no valuation for item '{}'", item.name)),
                Some(v) if !v.is_finite() || *v < 0.0 => {
                    return invalid(format!("valuation {} for '{}' is invalid", v, item.name))
                }
                Some(_) => {}
            }
        }

        if !self.batna.is_finite() {
            return invalid("batna is not a finite number".to_string());
        }

        if let Some(offer) = &self.current_offer {
            if let Err(reason) = self.check_allocation(offer) {
                return invalid(format!("current offer is malformed: {}", reason));
            }
        }

        let mut proposed = false;
        for (i, entry) in self.history.iter().enumerate() {
            match &entry.action {
                Action::Propose { allocation } => {
                    if let Err(reason) = self.check_allocation(allocation) {
                        return invalid(format!("history move {} is malformed: {}", i + 1, reason));
                    }
                    proposed = true;
                }
                Action::Accept | Action::Reject if !proposed => {
                    return invalid(format!(
                        "history move {} answers an offer that was never made",
                        i + 1
                    ));
                }
                Action::Accept | Action::Reject => {}
            }
        }

        if self.turn == TurnKind::Respond && self.current_offer.is_none() {
            return invalid("asked to respond but there is no current offer".to_string());
        }

        if let (Some(limit), Some(remaining)) = (self.turn_limit, self.turns_remaining) {
            if remaining > limit {
                return invalid(format!(
                    "turns remaining {} exceeds turn limit {}",
                    remaining, limit
                ));
            }
        }

        if let Some(discount) = self.discount {
            if !discount.is_finite() || discount <= 0.0 || discount > 1.0 {
                return invalid(format!("discount {} is outside (0, 1]", discount));
            }
        }

        Ok(())
    }

    /// Fingerprint of the full state
    pub fn digest(&self) -> StateDigest {
        StateDigest::from_bytes(&serde_json::to_vec(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_item_state() -> NegotiationState {
        NegotiationState::new(
            vec![Item::new("A"), Item::new("B")],
            BTreeMap::from([("A".to_string(), 10.0), ("B".to_string(), 4.0)]),
            3.0,
        )
    }

    #[test]
    fn test_value_of_allocation() {
        let state = two_item_state();
        let offer = Allocation::from_shares([("A", 1.0), ("B", 0.0)]);
        assert_eq!(state.value_of(&offer), 10.0);
        assert_eq!(state.total_value(), 14.0);
    }

    #[test]
    fn test_legal_actions_without_offer() {
        let state = two_item_state();
        assert_eq!(state.legal_actions(), vec![ActionKind::Propose]);
    }

    #[test]
    fn test_legal_actions_with_offer() {
        let offer = Allocation::from_shares([("A", 1.0), ("B", 0.0)]);
        let state = two_item_state().with_offer(offer.clone());
        assert_eq!(
            state.legal_actions(),
            vec![ActionKind::Propose, ActionKind::Accept, ActionKind::Reject]
        );

        let mut no_reject = two_item_state().with_offer(offer.clone());
        no_reject.rules.allow_reject = false;
        assert_eq!(
            no_reject.legal_actions(),
            vec![ActionKind::Propose, ActionKind::Accept]
        );

        let respond = two_item_state()
            .with_offer(offer)
            .with_turn(TurnKind::Respond);
        assert_eq!(
            respond.legal_actions(),
            vec![ActionKind::Accept, ActionKind::Reject]
        );
    }

    #[test]
    fn test_check_allocation_rejects_missing_and_unknown_items() {
        let state = two_item_state();

        let missing = Allocation::from_shares([("A", 1.0)]);
        assert!(state.check_allocation(&missing).unwrap_err().contains("missing"));

        let unknown = Allocation::from_shares([("A", 1.0), ("B", 0.0), ("C", 1.0)]);
        assert!(state.check_allocation(&unknown).unwrap_err().contains("unknown"));
    }

    #[test]
    fn test_check_allocation_share_bounds() {
        let state = two_item_state();

        let too_much = Allocation::from_shares([("A", 2.0), ("B", 0.0)]);
        assert!(state.check_allocation(&too_much).is_err());

        let negative = Allocation::from_shares([("A", -1.0), ("B", 0.0)]);
        assert!(state.check_allocation(&negative).is_err());

        let fractional = Allocation::from_shares([("A", 0.5), ("B", 0.5)]);
        assert!(state.check_allocation(&fractional).is_err());

        let mut divisible = two_item_state();
        divisible.rules.divisible = true;
        assert!(divisible.check_allocation(&fractional).is_ok());
    }

    #[test]
    fn test_accept_requires_offer() {
        let state = two_item_state();
        let err = state.check_action(&Action::Accept).unwrap_err();
        assert!(err.contains("requires an offer"));
        assert!(state.check_action(&Action::Reject).is_err());
    }

    #[test]
    fn test_validate_rejects_structurally_broken_states() {
        let empty = NegotiationState::new(vec![], BTreeMap::new(), 0.0);
        assert!(matches!(
            empty.validate(),
            Err(DecisionError::InvalidState(_))
        ));

        let mut dup = two_item_state();
        dup.items.push(Item::new("A"));
        assert!(dup.validate().is_err());

        let mut unvalued = two_item_state();
        unvalued.valuations.remove("B");
        assert!(unvalued.validate().is_err());

        let respond_without_offer = two_item_state().with_turn(TurnKind::Respond);
        assert!(respond_without_offer.validate().is_err());

        let mut over = two_item_state();
        over.turn_limit = Some(3);
        over.turns_remaining = Some(5);
        assert!(over.validate().is_err());

        let mut answer_without_offer = two_item_state();
        answer_without_offer.history = vec![
            HistoryEntry::new(Party::Agent, Action::Accept),
            HistoryEntry::new(
                Party::Counterpart,
                Action::Propose {
                    allocation: Allocation::from_shares([("A", 1.0), ("B", 0.0)]),
                },
            ),
        ];
        let err = answer_without_offer.validate().unwrap_err();
        assert!(err.to_string().contains("never made"));

        let mut unknown_item = two_item_state();
        unknown_item.history = vec![HistoryEntry::new(
            Party::Counterpart,
            Action::Propose {
                allocation: Allocation::from_shares([("Z", 7.0)]),
            },
        )];
        let err = unknown_item.validate().unwrap_err();
        assert!(err.to_string().contains("unknown item 'Z'"));

        let mut negative = two_item_state();
        negative.items[0].quantity = -1.0;
        assert!(negative.validate().is_err());

        assert!(two_item_state().validate().is_ok());
    }

    #[test]
    fn test_validate_accepts_consistent_history() {
        let mut state = two_item_state();
        state.history = vec![
            HistoryEntry::new(
                Party::Counterpart,
                Action::Propose {
                    allocation: Allocation::from_shares([("A", 0.0), ("B", 1.0)]),
                },
            ),
            HistoryEntry::new(Party::Agent, Action::Reject),
        ];
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_zero_quantity_item() {
        let mut state = two_item_state();
        state.items.push(Item::with_quantity("C", 0.0));
        state.valuations.insert("C".to_string(), 5.0);
        assert!(state.validate().is_ok());

        let none_of_c = Allocation::from_shares([("A", 1.0), ("B", 0.0), ("C", 0.0)]);
        assert!(state.check_allocation(&none_of_c).is_ok());

        let some_of_c = Allocation::from_shares([("A", 1.0), ("B", 0.0), ("C", 1.0)]);
        assert!(state.check_allocation(&some_of_c).is_err());
    }

    #[test]
    fn test_state_json_schema() {
        let json = r#"{
            "items": [{"name": "A"}, {"name": "B", "quantity": 3}],
            "valuations": {"A": 10, "B": 4},
            "batna": 3,
            "currentOffer": {"A": 1, "B": 0},
            "history": [{"by": "counterpart", "move": {"action": "propose", "allocation": {"A": 1, "B": 0}}}],
            "turnsRemaining": 2
        }"#;

        let state: NegotiationState = serde_json::from_str(json).unwrap();
        assert_eq!(state.items[0].quantity, 1.0);
        assert_eq!(state.items[1].quantity, 3.0);
        assert_eq!(state.offer_value(), Some(10.0));
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].by, Party::Counterpart);
        assert_eq!(state.turn, TurnKind::Open);
        assert!(state.rules.allow_reject);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(two_item_state().digest(), two_item_state().digest());
        assert_ne!(
            two_item_state().digest(),
            two_item_state().with_turns_remaining(1).digest()
        );
    }
}
