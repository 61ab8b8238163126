mod support;

use chrono::{Duration, Utc};
use leasebot_core::showing_postgres::PostgresBookingStore;
use leasebot_core::showing_service::{book, Actor, BookingOutcome, BookingPayload, BookingStore};
use test_context::test_context;
use uuid::Uuid;

use support::TestHarness;

fn payload(key: &str, unit_id: Uuid, agent_id: Uuid, starts_at: chrono::DateTime<Utc>) -> BookingPayload {
    BookingPayload {
        idempotency_key: key.to_string(),
        platform_account_id: Uuid::new_v4(),
        conversation_id: None,
        unit_id,
        listing_id: None,
        agent_id,
        starts_at,
        ends_at: starts_at + Duration::minutes(30),
        timezone: "America/New_York".to_string(),
        status: None,
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn booking_round_trips_through_the_exclusion_constraint(ctx: &TestHarness) {
    let pool = &ctx.pool;
    let unit_id = Uuid::new_v4();
    let agent_id = support::insert_agent(pool, "agent one").await;
    support::assign_agent_to_unit(pool, unit_id, agent_id, "active", 0).await;

    let starts_at = Utc::now() + Duration::hours(1);
    let ends_at = starts_at + Duration::minutes(30);
    support::insert_unit_availability(pool, unit_id, starts_at - Duration::minutes(30), ends_at + Duration::minutes(30)).await;
    support::insert_agent_availability(pool, agent_id, starts_at - Duration::minutes(30), ends_at + Duration::minutes(30)).await;

    let store = PostgresBookingStore::new(pool.clone());
    let p = payload("booking-a", unit_id, agent_id, starts_at);

    let outcome = book(&store, Actor::System, p.clone()).await.unwrap();
    let created = match outcome {
        BookingOutcome::Created(appt) => appt,
        other => panic!("expected Created, got {other:?}"),
    };

    let overlapping_starts = starts_at + Duration::minutes(10);
    let overlapping = payload("booking-b", unit_id, agent_id, overlapping_starts);
    let conflict_outcome = book(&store, Actor::System, overlapping).await.unwrap();
    assert!(matches!(conflict_outcome, BookingOutcome::BookingConflict { .. }));

    let replay_outcome = book(&store, Actor::System, p).await.unwrap();
    match replay_outcome {
        BookingOutcome::Replayed(appt) => assert_eq!(appt.id, created.id),
        other => panic!("expected Replayed, got {other:?}"),
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn non_overlapping_showings_on_the_same_unit_both_succeed(ctx: &TestHarness) {
    let pool = &ctx.pool;
    let unit_id = Uuid::new_v4();
    let agent_id = support::insert_agent(pool, "agent two").await;
    support::assign_agent_to_unit(pool, unit_id, agent_id, "active", 0).await;

    let first_start = Utc::now() + Duration::hours(2);
    let second_start = first_start + Duration::hours(1);
    support::insert_unit_availability(pool, unit_id, first_start - Duration::minutes(30), second_start + Duration::hours(1)).await;
    support::insert_agent_availability(pool, agent_id, first_start - Duration::minutes(30), second_start + Duration::hours(1)).await;

    let store = PostgresBookingStore::new(pool.clone());

    let first = book(&store, Actor::System, payload("booking-c", unit_id, agent_id, first_start))
        .await
        .unwrap();
    assert!(matches!(first, BookingOutcome::Created(_)));

    let second = book(&store, Actor::System, payload("booking-d", unit_id, agent_id, second_start))
        .await
        .unwrap();
    assert!(matches!(second, BookingOutcome::Created(_)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn booking_outside_any_candidate_window_is_slot_unavailable(ctx: &TestHarness) {
    let pool = &ctx.pool;
    let unit_id = Uuid::new_v4();
    let agent_id = support::insert_agent(pool, "agent three").await;
    support::assign_agent_to_unit(pool, unit_id, agent_id, "active", 0).await;

    let store = PostgresBookingStore::new(pool.clone());
    let starts_at = Utc::now() + Duration::hours(3);
    let outcome = book(&store, Actor::System, payload("booking-e", unit_id, agent_id, starts_at))
        .await
        .unwrap();
    assert!(matches!(outcome, BookingOutcome::SlotUnavailable { .. }));
}
