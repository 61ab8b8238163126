use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_direction", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Dispatch-state embedded in `Message.metadata.dispatch`. A typed companion
/// to the JSON the queue adapter actually compare-and-sets against — the CAS
/// predicate itself always runs SQL-side, never emulated in application
/// memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dispatch_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    InProgress,
    Completed,
    Failed,
    Dlq,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRecord {
    pub attempts: u32,
    pub retry_exhausted: bool,
    pub last_error: Option<String>,
}

/// Closed set of DLQ escalation reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqReason {
    RetryExhausted,
    CircuitOpenExhausted,
    CaptchaExhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub key: String,
    pub state: DispatchState,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub delivery: Option<DeliveryRecord>,
    pub failed_stage: Option<String>,
    pub last_error: Option<String>,
    pub retry: Option<RetryRecord>,
    pub dlq_reason: Option<DlqReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub external_message_id: String,
    pub channel: String,
    pub provider_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub direction: Direction,
    pub external_message_id: Option<String>,
    pub body: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub sent_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Parses the embedded dispatch record out of `metadata["dispatch"]`, if
    /// any has been written yet.
    pub fn dispatch_record(&self) -> Option<DispatchRecord> {
        self.metadata
            .get("dispatch")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn ai_processed(&self) -> bool {
        self.metadata.contains_key("aiProcessedAt")
    }
}
