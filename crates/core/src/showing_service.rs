//! Showing booking service. Replaces exceptions-as-control-
//! flow with an enum of result variants.

use crate::domain::{AssignmentMode, ShowingAppointment, ShowingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPayload {
    pub idempotency_key: String,
    pub platform_account_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub unit_id: Uuid,
    pub listing_id: Option<Uuid>,
    pub agent_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub timezone: String,
    pub status: Option<ShowingStatus>,
}

impl BookingPayload {
    fn matches(&self, other: &BookingPayload) -> bool {
        self.platform_account_id == other.platform_account_id
            && self.unit_id == other.unit_id
            && self.agent_id == other.agent_id
            && self.starts_at == other.starts_at
            && self.ends_at == other.ends_at
            && self.timezone == other.timezone
    }
}

#[derive(Debug, Clone)]
pub struct BookingCandidate {
    pub agent_id: Uuid,
    pub assignment_mode: AssignmentMode,
    pub priority: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// The actor attempting the booking. Agent-scoped actors may only book for
/// themselves.
pub enum Actor {
    Agent(Uuid),
    System,
}

/// Replaces exceptions used for control flow in booking.
#[derive(Debug, Clone)]
pub enum BookingOutcome {
    Created(ShowingAppointment),
    Replayed(ShowingAppointment),
    IdempotencyConflict {
        existing: ShowingAppointment,
        admin_review_required: bool,
    },
    SlotUnavailable {
        alternatives: Vec<BookingCandidate>,
        admin_review_required: bool,
    },
    BookingConflict {
        alternatives: Vec<BookingCandidate>,
    },
    Forbidden {
        requested_agent_id: Uuid,
        actual_agent_id: Uuid,
    },
    Failed(String),
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> anyhow::Result<Option<(ShowingAppointment, BookingPayload)>>;

    /// Candidates ordered by `assignmentMode` (active before passive), then
    /// `priority` ascending, then candidate start time, with any
    /// `unavailable` overlap already anti-joined out.
    async fn fetch_candidates(
        &self,
        unit_id: Uuid,
        date: chrono::NaiveDate,
        timezone: &str,
        include_passive: bool,
    ) -> anyhow::Result<Vec<BookingCandidate>>;

    /// Inserts under the `(unitId, [startsAt,endsAt), status IN
    /// (pending,confirmed))` exclusion constraint. Returns `Ok(None)` when
    /// the store rejects the insert on a constraint violation.
    async fn insert_appointment(
        &self,
        payload: &BookingPayload,
    ) -> anyhow::Result<Option<ShowingAppointment>>;
}

/// Books a showing appointment. Idempotency lookup precedes slot
/// validation to avoid false negatives when availability has since changed.
pub async fn book(
    store: &dyn BookingStore,
    actor: Actor,
    payload: BookingPayload,
) -> anyhow::Result<BookingOutcome> {
    if let Actor::Agent(requested) = actor {
        if requested != payload.agent_id {
            return Ok(BookingOutcome::Forbidden {
                requested_agent_id: requested,
                actual_agent_id: payload.agent_id,
            });
        }
    }

    if let Some((existing, existing_payload)) =
        store.find_by_idempotency_key(&payload.idempotency_key).await?
    {
        if existing_payload.matches(&payload) {
            return Ok(BookingOutcome::Replayed(existing));
        }
        return Ok(BookingOutcome::IdempotencyConflict {
            existing,
            admin_review_required: true,
        });
    }

    let candidates = store
        .fetch_candidates(
            payload.unit_id,
            payload.starts_at.date_naive(),
            &payload.timezone,
            true,
        )
        .await?;

    let covered = candidates.iter().any(|c| {
        c.agent_id == payload.agent_id
            && c.starts_at <= payload.starts_at
            && c.ends_at >= payload.ends_at
    });

    if !covered {
        return Ok(BookingOutcome::SlotUnavailable {
            alternatives: candidates,
            admin_review_required: true,
        });
    }

    match store.insert_appointment(&payload).await? {
        Some(appointment) => Ok(BookingOutcome::Created(appointment)),
        None => Ok(BookingOutcome::BookingConflict {
            alternatives: candidates,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeStore {
        existing: Mutex<Option<(ShowingAppointment, BookingPayload)>>,
        candidates: Vec<BookingCandidate>,
        reject_insert: bool,
    }

    fn appointment(id: Uuid, payload: &BookingPayload) -> ShowingAppointment {
        ShowingAppointment {
            id,
            unit_id: payload.unit_id,
            agent_id: payload.agent_id,
            conversation_id: payload.conversation_id,
            starts_at: payload.starts_at,
            ends_at: payload.ends_at,
            timezone: payload.timezone.clone(),
            status: payload.status.unwrap_or(ShowingStatus::Confirmed),
            idempotency_key: payload.idempotency_key.clone(),
            external_booking_ref: None,
        }
    }

    #[async_trait]
    impl BookingStore for FakeStore {
        async fn find_by_idempotency_key(
            &self,
            _key: &str,
        ) -> anyhow::Result<Option<(ShowingAppointment, BookingPayload)>> {
            Ok(self.existing.lock().unwrap().clone())
        }

        async fn fetch_candidates(
            &self,
            _unit_id: Uuid,
            _date: chrono::NaiveDate,
            _timezone: &str,
            _include_passive: bool,
        ) -> anyhow::Result<Vec<BookingCandidate>> {
            Ok(self.candidates.clone())
        }

        async fn insert_appointment(
            &self,
            payload: &BookingPayload,
        ) -> anyhow::Result<Option<ShowingAppointment>> {
            if self.reject_insert {
                return Ok(None);
            }
            let created = appointment(Uuid::new_v4(), payload);
            *self.existing.lock().unwrap() = Some((created.clone(), payload.clone()));
            Ok(Some(created))
        }
    }

    fn payload(key: &str, unit_id: Uuid, agent_id: Uuid) -> BookingPayload {
        let starts_at = Utc::now();
        BookingPayload {
            idempotency_key: key.to_string(),
            platform_account_id: Uuid::new_v4(),
            conversation_id: Some(Uuid::new_v4()),
            unit_id,
            listing_id: None,
            agent_id,
            starts_at,
            ends_at: starts_at + chrono::Duration::minutes(30),
            timezone: "America/Chicago".to_string(),
            status: None,
        }
    }

    #[tokio::test]
    async fn creates_booking_when_slot_is_covered() {
        let unit_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let p = payload("booking-thread-2", unit_id, agent_id);
        let store = FakeStore {
            existing: Mutex::new(None),
            candidates: vec![BookingCandidate {
                agent_id,
                assignment_mode: AssignmentMode::Active,
                priority: 1,
                starts_at: p.starts_at,
                ends_at: p.ends_at,
            }],
            reject_insert: false,
        };
        let outcome = book(&store, Actor::System, p).await.unwrap();
        assert!(matches!(outcome, BookingOutcome::Created(_)));
    }

    #[tokio::test]
    async fn idempotent_replay_returns_existing() {
        let unit_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let p = payload("booking-thread-2", unit_id, agent_id);
        let existing_appt = appointment(Uuid::new_v4(), &p);
        let store = FakeStore {
            existing: Mutex::new(Some((existing_appt.clone(), p.clone()))),
            candidates: vec![],
            reject_insert: false,
        };
        let outcome = book(&store, Actor::System, p).await.unwrap();
        match outcome {
            BookingOutcome::Replayed(appt) => assert_eq!(appt.id, existing_appt.id),
            other => panic!("expected Replayed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn differing_payload_with_same_key_is_conflict() {
        let unit_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let original = payload("booking-thread-2", unit_id, agent_id);
        let existing_appt = appointment(Uuid::new_v4(), &original);
        let mut different = original.clone();
        different.agent_id = Uuid::new_v4();

        let store = FakeStore {
            existing: Mutex::new(Some((existing_appt, original))),
            candidates: vec![],
            reject_insert: false,
        };
        let outcome = book(&store, Actor::System, different).await.unwrap();
        match outcome {
            BookingOutcome::IdempotencyConflict {
                admin_review_required,
                ..
            } => assert!(admin_review_required),
            other => panic!("expected IdempotencyConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_coverage_yields_slot_unavailable() {
        let unit_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let p = payload("booking-thread-3", unit_id, agent_id);
        let store = FakeStore {
            existing: Mutex::new(None),
            candidates: vec![],
            reject_insert: false,
        };
        let outcome = book(&store, Actor::System, p).await.unwrap();
        assert!(matches!(outcome, BookingOutcome::SlotUnavailable { .. }));
    }

    #[tokio::test]
    async fn exclusion_violation_yields_booking_conflict() {
        let unit_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let p = payload("booking-thread-4", unit_id, agent_id);
        let store = FakeStore {
            existing: Mutex::new(None),
            candidates: vec![BookingCandidate {
                agent_id,
                assignment_mode: AssignmentMode::Active,
                priority: 1,
                starts_at: p.starts_at,
                ends_at: p.ends_at,
            }],
            reject_insert: true,
        };
        let outcome = book(&store, Actor::System, p).await.unwrap();
        assert!(matches!(outcome, BookingOutcome::BookingConflict { .. }));
    }

    #[tokio::test]
    async fn agent_mismatch_is_forbidden() {
        let unit_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        let other_agent = Uuid::new_v4();
        let p = payload("booking-thread-5", unit_id, agent_id);
        let store = FakeStore {
            existing: Mutex::new(None),
            candidates: vec![],
            reject_insert: false,
        };
        let outcome = book(&store, Actor::Agent(other_agent), p).await.unwrap();
        assert!(matches!(outcome, BookingOutcome::Forbidden { .. }));
    }
}
