//! Structured audit emission and the admin snapshot aggregator.

use crate::domain::AuditLog;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Closed audit action taxonomy. Values are load-bearing for downstream
/// consumers (dashboards, alerting) and must not be renamed casually.
pub mod actions {
    pub const AI_REPLY_DECISION: &str = "ai_reply_decision";
    pub const AI_REPLY_ESCALATED: &str = "ai_reply_escalated";
    pub const AI_REPLY_HUMAN_REQUIRED_QUEUED: &str = "ai_reply_human_required_queued";
    pub const AI_REPLY_CREATED: &str = "ai_reply_created";
    pub const AI_REPLY_SKIPPED: &str = "ai_reply_skipped";
    pub const AI_REPLY_SEND_ATTEMPTED: &str = "ai_reply_send_attempted";
    pub const AI_REPLY_DRAFT_CREATED: &str = "ai_reply_draft_created";
    pub const AI_REPLY_POLICY_BLOCKED: &str = "ai_reply_policy_blocked";
    pub const AI_REPLY_TEST_ALLOWLIST_BLOCKED: &str = "ai_reply_test_allowlist_blocked";
    pub const AI_REPLY_ERROR: &str = "ai_reply_error";
    pub const AI_REPLY_DISPATCH_ESCALATED: &str = "ai_reply_dispatch_escalated";
    pub const AI_REPLY_DISPATCH_DUPLICATE_SUPPRESSED: &str = "ai_reply_dispatch_duplicate_suppressed";
    pub const PLATFORM_DISPATCH_ERROR: &str = "platform_dispatch_error";
    pub const PLATFORM_DISPATCH_DLQ: &str = "platform_dispatch_dlq";
    pub const INGEST_CONVERSATION_LINKAGE_RESOLVED: &str = "ingest_conversation_linkage_resolved";
    pub const INGEST_CONVERSATION_LINKAGE_UNRESOLVED: &str = "ingest_conversation_linkage_unresolved";
    pub const WORKFLOW_STATE_TRANSITIONED: &str = "workflow_state_transitioned";
    pub const WORKFLOW_NO_REPLY_RECOVERED: &str = "workflow_no_reply_recovered";
    pub const INBOX_MANUAL_REPLY_DISPATCHED: &str = "inbox_manual_reply_dispatched";
    pub const INBOX_MESSAGE_APPROVED: &str = "inbox_message_approved";
    pub const INBOX_MESSAGE_REJECTED: &str = "inbox_message_rejected";
    pub const SHOWING_BOOKING_CREATED: &str = "showing_booking_created";
    pub const SHOWING_BOOKING_REPLAYED: &str = "showing_booking_replayed";
    pub const SHOWING_BOOKING_CONFLICT: &str = "showing_booking_conflict";
    pub const SHOWING_BOOKING_SLOT_UNAVAILABLE: &str = "showing_booking_slot_unavailable";
    pub const SHOWING_BOOKING_IDEMPOTENCY_CONFLICT: &str = "showing_booking_idempotency_conflict";
    pub const SHOWING_BOOKING_FAILED: &str = "showing_booking_failed";
}

/// Builds an in-memory `AuditLog` entry. Persistence is the worker's
/// responsibility via whatever store it's wired to; this module only shapes
/// the entry and emits the matching `tracing` event.
pub fn build(
    actor_type: &str,
    actor_id: Option<Uuid>,
    entity_type: &str,
    entity_id: &str,
    action: &str,
    details: HashMap<String, Value>,
) -> AuditLog {
    tracing::info!(
        action,
        entity_type,
        entity_id,
        actor_type,
        "audit event emitted"
    );
    AuditLog {
        id: Uuid::new_v4(),
        actor_type: actor_type.to_string(),
        actor_id,
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        action: action.to_string(),
        details,
        created_at: Utc::now(),
    }
}

/// Clamps an admin-supplied query parameter to `[min, max]`, falling back to
/// `default` when unparsable.
pub fn parse_positive_int(value: Option<&str>, default: u32, min: u32, max: u32) -> u32 {
    let parsed = value.and_then(|v| v.parse::<i64>().ok()).filter(|v| *v > 0);
    let candidate = parsed.map(|v| v as u32).unwrap_or(default);
    candidate.clamp(min, max)
}

#[derive(Debug, Clone, Default)]
pub struct SendCounters {
    pub sent: u64,
    pub drafted: u64,
    pub held: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BookingCounters {
    pub created: u64,
    pub replayed: u64,
    pub conflicts: u64,
    pub failed: u64,
}

/// Rolling-window payload for admin consumption. Built up
/// incrementally by the worker as audit entries are emitted; this struct is
/// the accumulator, not a query result.
#[derive(Debug, Clone, Default)]
pub struct SnapshotAggregate {
    pub window_start: Option<DateTime<Utc>>,
    pub inbound: u64,
    pub outbound: u64,
    pub sends: SendCounters,
    pub ai_decisions: u64,
    pub escalations: u64,
    pub dispatch_errors: u64,
    pub dlq: u64,
    pub bookings: BookingCounters,
    pub audit_events: u64,
    pub escalation_reasons: HashMap<String, u64>,
    pub bookings_by_status: HashMap<String, u64>,
    pub bookings_by_platform: HashMap<String, u64>,
    pub platform_failures_by_stage: HashMap<String, u64>,
    pub recent_errors: Vec<String>,
    pub recent_audit: Vec<String>,
}

impl SnapshotAggregate {
    pub fn record_audit(&mut self, entry: &AuditLog) {
        self.audit_events += 1;
        self.recent_audit.push(entry.action.clone());
        if self.recent_audit.len() > 50 {
            self.recent_audit.remove(0);
        }

        match entry.action.as_str() {
            actions::AI_REPLY_DECISION => self.ai_decisions += 1,
            actions::AI_REPLY_ESCALATED => {
                self.escalations += 1;
                if let Some(reason) = entry.details.get("reasonCode").and_then(|v| v.as_str()) {
                    *self.escalation_reasons.entry(reason.to_string()).or_insert(0) += 1;
                }
            }
            actions::PLATFORM_DISPATCH_ERROR => {
                self.dispatch_errors += 1;
                if let Some(stage) = entry.details.get("failedStage").and_then(|v| v.as_str()) {
                    *self
                        .platform_failures_by_stage
                        .entry(stage.to_string())
                        .or_insert(0) += 1;
                }
            }
            actions::PLATFORM_DISPATCH_DLQ => self.dlq += 1,
            actions::SHOWING_BOOKING_CREATED => {
                self.bookings.created += 1;
                *self
                    .bookings_by_status
                    .entry("created".to_string())
                    .or_insert(0) += 1;
            }
            actions::SHOWING_BOOKING_REPLAYED => self.bookings.replayed += 1,
            actions::SHOWING_BOOKING_CONFLICT | actions::SHOWING_BOOKING_SLOT_UNAVAILABLE => {
                self.bookings.conflicts += 1;
            }
            actions::SHOWING_BOOKING_FAILED => self.bookings.failed += 1,
            actions::AI_REPLY_ERROR => {
                if let Some(err) = entry.details.get("error").and_then(|v| v.as_str()) {
                    self.recent_errors.push(err.to_string());
                    if self.recent_errors.len() > 50 {
                        self.recent_errors.remove(0);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_range() {
        assert_eq!(parse_positive_int(Some("500"), 20, 1, 100), 100);
        assert_eq!(parse_positive_int(Some("0"), 20, 1, 100), 20);
        assert_eq!(parse_positive_int(None, 20, 1, 100), 20);
        assert_eq!(parse_positive_int(Some("50"), 20, 1, 100), 50);
    }

    #[test]
    fn negative_and_non_numeric_fall_back_to_default() {
        assert_eq!(parse_positive_int(Some("-5"), 20, 1, 100), 20);
        assert_eq!(parse_positive_int(Some("abc"), 20, 1, 100), 20);
    }

    #[test]
    fn records_escalation_reason_breakdown() {
        let mut agg = SnapshotAggregate::default();
        let mut details = HashMap::new();
        details.insert(
            "reasonCode".to_string(),
            Value::String("escalate_unsubscribe_requested".to_string()),
        );
        let entry = build(
            "system",
            None,
            "message",
            "m1",
            actions::AI_REPLY_ESCALATED,
            details,
        );
        agg.record_audit(&entry);
        assert_eq!(agg.escalations, 1);
        assert_eq!(
            agg.escalation_reasons.get("escalate_unsubscribe_requested"),
            Some(&1)
        );
    }
}
