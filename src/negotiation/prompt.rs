//! Prompt rendering for the reasoning oracle.
//!
//! The legal-action section is generated from [`NegotiationState::legal_actions`],
//! the same list the reply parser checks against, so the two cannot drift.

use super::types::{Action, ActionKind, Allocation, NegotiationState, Party};

/// Most recent history entries shown to the oracle
pub const HISTORY_RECAP_LIMIT: usize = 12;

/// Fixed framing for every oracle call
pub const SYSTEM_INSTRUCTION: &str = "You are an expert negotiator in a two-party bargaining game. \
You receive the game state and must choose one legal move.

Rules you follow:
1. Maximize the total value you receive under your own valuations.
2. Your BATNA is the payoff you get if no agreement is reached. Never accept a deal worth less than your BATNA; walking away dominates it.
3. Account for the remaining turns: a game that runs out of turns ends in disagreement and pays everyone their BATNA. If a discount factor is given, later agreements are worth less.
4. The other party has different, private valuations. Offers they are likely to accept leave them something they value.
5. Answer with a single JSON object in exactly the format requested. No prose outside the JSON.";

/// Join lines with a trailing newline
fn join_lines(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Render the state description and answer format for one decision
pub fn render_prompt(state: &NegotiationState) -> String {
    let mut lines = vec![
        "Game state:".to_string(),
        "- Items (quantity, your value per unit):".to_string(),
    ];

    for item in &state.items {
        let per_unit = state.valuation(&item.name);
        lines.push(format!(
            "  - {}: quantity {}, value {} each ({} for all of it)",
            item.name,
            item.quantity,
            per_unit,
            per_unit * item.quantity
        ));
    }
    lines.push(format!(
        "- Your BATNA (payoff if no agreement is reached): {}",
        state.batna
    ));
    lines.push(format!(
        "- Value to you if you received everything: {}",
        state.total_value()
    ));

    match (state.turns_remaining, state.turn_limit) {
        (Some(remaining), Some(limit)) => {
            lines.push(format!("- Turns remaining: {} of {}", remaining, limit))
        }
        (Some(remaining), None) => lines.push(format!("- Turns remaining: {}", remaining)),
        (None, Some(limit)) => lines.push(format!("- Turn limit: {}", limit)),
        (None, None) => {}
    }
    if let Some(round) = state.round {
        lines.push(format!("- Current round: {}", round));
    }
    if let Some(discount) = state.discount {
        lines.push(format!("- Discount factor per round: {}", discount));
    }

    lines.push(String::new());
    match &state.current_offer {
        Some(offer) => {
            let value = state.value_of(offer);
            lines.push(format!(
                "Current offer to you: {}",
                describe_allocation(state, offer)
            ));
            lines.push(format!(
                "That offer is worth {} to you, which is {} your BATNA of {}.",
                value,
                if state.meets_batna(value) {
                    "at or above"
                } else {
                    "below"
                },
                state.batna
            ));
        }
        None => lines.push("No offer is on the table.".to_string()),
    }

    if !state.history.is_empty() {
        lines.push(String::new());
        lines.push("History:".to_string());
        let skipped = state.history.len().saturating_sub(HISTORY_RECAP_LIMIT);
        if skipped > 0 {
            lines.push(format!("  ({} earlier moves omitted)", skipped));
        }
        for (i, entry) in state.history.iter().enumerate().skip(skipped) {
            let who = match entry.by {
                Party::Agent => "You",
                Party::Counterpart => "Counterpart",
            };
            let what = match &entry.action {
                Action::Propose { allocation } => format!(
                    "proposed {} (worth {} to you)",
                    describe_allocation(state, allocation),
                    state.value_of(allocation)
                ),
                Action::Accept => "accepted".to_string(),
                Action::Reject => "rejected".to_string(),
            };
            lines.push(format!("  {}. {} {}", i + 1, who, what));
        }
    }

    lines.push(String::new());
    let mut out = join_lines(lines);
    out.push_str(&action_grammar(state));
    out
}

/// Append the reasons earlier replies were rejected
pub fn render_correction(base: &str, failures: &[String]) -> String {
    if failures.is_empty() {
        return base.to_string();
    }

    let mut lines = vec![
        String::new(),
        "Your previous answer was rejected. Fix the following and answer again:".to_string(),
    ];
    for (i, failure) in failures.iter().enumerate() {
        lines.push(format!("- attempt {}: {}", i + 1, failure));
    }

    let mut out = base.to_string();
    out.push_str(&join_lines(lines));
    out
}

/// The answer format, listing only the moves legal in this state
pub fn action_grammar(state: &NegotiationState) -> String {
    let mut lines = vec!["Legal moves this turn (answer with exactly one):".to_string()];

    for kind in state.legal_actions() {
        let line = match kind {
            ActionKind::Propose => {
                let shares = state
                    .items
                    .iter()
                    .map(|item| format!("\"{}\": <your share, 0 to {}>", item.name, item.quantity))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "- {{\"action\": \"propose\", \"allocation\": {{{}}}, \"reason\": \"<brief explanation>\"}}",
                    shares
                )
            }
            ActionKind::Accept => "- {\"action\": \"accept\", \"reason\": \"<brief explanation>\"} (take the current offer as-is)".to_string(),
            ActionKind::Reject => "- {\"action\": \"reject\", \"reason\": \"<brief explanation>\"} (decline without a counter-offer)".to_string(),
        };
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(
        "A proposal lists your own share of every item exactly once; the other party receives the rest."
            .to_string(),
    );
    lines.push(if state.rules.divisible {
        "Shares may be fractional.".to_string()
    } else {
        "Shares must be whole numbers.".to_string()
    });
    lines.push("Respond with the JSON object only.".to_string());
    join_lines(lines)
}

fn describe_allocation(state: &NegotiationState, allocation: &Allocation) -> String {
    state
        .items
        .iter()
        .map(|item| {
            let share = allocation.share(&item.name).unwrap_or(0.0);
            format!("{} {} of {}", item.name, share, item.quantity)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
