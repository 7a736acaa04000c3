//! Deterministic safe default used when the oracle cannot produce a legal
//! action. Pure function of the state: same state, same action.

use super::types::{Action, ActionKind, Allocation, NegotiationState, TurnKind};

/// Pick the safe default action for a state
pub fn fallback_action(state: &NegotiationState) -> Action {
    let offer_value = match (&state.current_offer, state.turn) {
        (Some(_), TurnKind::Propose) | (None, _) => None,
        (Some(offer), _) => Some(state.value_of(offer)),
    };

    match offer_value {
        None => Action::Propose {
            allocation: even_split(state),
        },
        Some(value) if state.meets_batna(value) => Action::Accept,
        Some(_) if state.legal_actions().contains(&ActionKind::Reject) => Action::Reject,
        Some(_) => Action::Propose {
            allocation: even_split(state),
        },
    }
}

/// Split every item as evenly as the game allows.
///
/// Divisible games halve each item. Indivisible games hand the odd unit of
/// an item to this agent on even valuation ranks and to the counterpart on
/// odd ranks, ranking by this agent's valuation (ties keep item order).
pub fn even_split(state: &NegotiationState) -> Allocation {
    let mut allocation = Allocation::new();

    if state.rules.divisible {
        for item in &state.items {
            allocation.set(item.name.clone(), item.quantity / 2.0);
        }
        return allocation;
    }

    let mut ranked: Vec<_> = state.items.iter().collect();
    // stable sort keeps item order on ties
    ranked.sort_by(|a, b| {
        state
            .valuation(&b.name)
            .partial_cmp(&state.valuation(&a.name))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for (rank, item) in ranked.into_iter().enumerate() {
        let half = item.quantity / 2.0;
        let share = if rank % 2 == 0 { half.ceil() } else { half.floor() };
        allocation.set(item.name.clone(), share);
    }

    allocation
}
