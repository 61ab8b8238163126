use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use super::availability::AssignmentMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "showing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShowingStatus {
    Pending,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
}

impl ShowingStatus {
    /// Statuses that occupy a showing slot for the exclusion constraint.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, ShowingStatus::Pending | ShowingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowingAppointment {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub agent_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub timezone: String,
    pub status: ShowingStatus,
    pub idempotency_key: String,
    pub external_booking_ref: Option<String>,
}
