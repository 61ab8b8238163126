use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "slot_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub unit_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub timezone: String,
    pub status: SlotStatus,
    pub source: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAvailabilitySlot {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub timezone: String,
    pub status: SlotStatus,
    pub source: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "assignment_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    Active,
    Passive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitAgentAssignment {
    pub unit_id: Uuid,
    pub agent_id: Uuid,
    pub assignment_mode: AssignmentMode,
    pub priority: i32,
}

/// True when `[a_start, a_end)` and `[b_start, b_end)` overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap() + chrono::Duration::hours(h)
    }

    #[test]
    fn detects_overlap() {
        assert!(intervals_overlap(t(0), t(2), t(1), t(3)));
    }

    #[test]
    fn half_open_interval_is_not_overlap_at_boundary() {
        assert!(!intervals_overlap(t(0), t(1), t(1), t(2)));
    }

    #[test]
    fn disjoint_intervals_do_not_overlap() {
        assert!(!intervals_overlap(t(0), t(1), t(5), t(6)));
    }
}
