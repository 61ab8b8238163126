//! Slot candidates and confirmation arbitration.

use super::machine::Machine;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub unit_id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub label: String,
}

impl SlotCandidate {
    /// Lexicographic tie-break key: `(startsAt, endsAt, agentName/Id, label)`.
    fn tie_break_key(&self) -> (DateTime<Utc>, DateTime<Utc>, String, String) {
        let agent_key = self
            .agent_name
            .clone()
            .unwrap_or_else(|| self.agent_id.to_string());
        (self.starts_at, self.ends_at, agent_key, self.label.clone())
    }
}

/// Caps the normalized candidate list at `max_slot_options` and appends any
/// `pendingSlotConfirmation` already stored on the conversation.
pub fn build_candidate_list(
    mut candidates: Vec<SlotCandidate>,
    max_slot_options: usize,
    pending: Option<SlotCandidate>,
) -> Vec<SlotCandidate> {
    candidates.truncate(max_slot_options);
    if let Some(pending) = pending {
        if !candidates.iter().any(|c| *c == pending) {
            candidates.push(pending);
        }
    }
    candidates
}

/// Deterministically selects the earliest candidate by the tie-break key.
pub fn select_earliest(candidates: &[SlotCandidate]) -> Option<&SlotCandidate> {
    candidates
        .iter()
        .min_by_key(|c| c.tie_break_key())
}

lazy_static! {
    static ref POSITIVE_CONFIRMATION_REGEX: Regex =
        Regex::new(r"(?i)\b(yes|works for me|sounds good|confirm(ed)?|that time works|perfect|great, see you)\b").unwrap();
    static ref NEGATIVE_MODIFIER_REGEX: Regex =
        Regex::new(r"(?i)\b(no|not|can'?t|doesn'?t work|actually|instead|different time|won'?t work)\b").unwrap();
}

/// True when the inbound body reads as an unambiguous positive confirmation:
/// matches the positive pattern and carries no negative modifier.
pub fn is_unambiguous_confirmation(body: &str) -> bool {
    POSITIVE_CONFIRMATION_REGEX.is_match(body) && !NEGATIVE_MODIFIER_REGEX.is_match(body)
}

/// Event fed into the arbitration machine: the state the decision pipeline
/// has already gathered about slots and the AI/heuristic outcome.
#[derive(Debug, Clone)]
pub struct ArbitrationEvent {
    pub pending_slot: Option<SlotCandidate>,
    pub reached_showing_confirmed: bool,
    pub inbound_body: String,
    pub candidates: Vec<SlotCandidate>,
}

/// Outcome commands the decision pipeline acts on.
#[derive(Debug, Clone)]
pub enum ArbitrationCommand {
    AcceptPendingSlot { slot: SlotCandidate },
    ProposeSingleSlot { slot: SlotCandidate },
}

/// Slot confirmation arbitration:
/// - A pending slot plus an unambiguous confirming reply accepts it.
/// - Otherwise, reaching `showing_confirmed` with ≥2 candidates and no
///   pending slot deterministically proposes the earliest one.
#[derive(Default)]
pub struct SlotArbitrationMachine;

impl Machine for SlotArbitrationMachine {
    type Event = ArbitrationEvent;
    type Command = ArbitrationCommand;

    fn decide(&mut self, event: &ArbitrationEvent) -> Option<ArbitrationCommand> {
        if !event.reached_showing_confirmed {
            return None;
        }

        if let Some(pending) = &event.pending_slot {
            if is_unambiguous_confirmation(&event.inbound_body) {
                return Some(ArbitrationCommand::AcceptPendingSlot {
                    slot: pending.clone(),
                });
            }
            return None;
        }

        if event.candidates.len() >= 2 {
            let earliest = select_earliest(&event.candidates)?;
            return Some(ArbitrationCommand::ProposeSingleSlot {
                slot: earliest.clone(),
            });
        }

        None
    }
}
