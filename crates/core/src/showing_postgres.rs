//! Postgres-backed `BookingStore`. The exclusion constraint
//! on `(unitId, [startsAt,endsAt), status IN (pending,confirmed))` is the
//! actual conflict detector; this layer only translates its violation
//! (SQLSTATE 23P01) into `Ok(None)` for `showing_service::book` to read as
//! `BookingConflict`.

use crate::domain::{AssignmentMode, ShowingAppointment, ShowingStatus};
use crate::showing_service::{BookingCandidate, BookingPayload, BookingStore};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> anyhow::Result<Option<(ShowingAppointment, BookingPayload)>> {
        let row = sqlx::query(
            r#"
            SELECT id, unit_id, agent_id, conversation_id, starts_at, ends_at, timezone,
                   status, idempotency_key, external_booking_ref, listing_id, platform_account_id
            FROM showing_appointments
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let appointment = ShowingAppointment {
            id: row.try_get("id")?,
            unit_id: row.try_get("unit_id")?,
            agent_id: row.try_get("agent_id")?,
            conversation_id: row.try_get("conversation_id")?,
            starts_at: row.try_get("starts_at")?,
            ends_at: row.try_get("ends_at")?,
            timezone: row.try_get("timezone")?,
            status: parse_status(row.try_get("status")?),
            idempotency_key: row.try_get("idempotency_key")?,
            external_booking_ref: row.try_get("external_booking_ref")?,
        };
        let payload = BookingPayload {
            idempotency_key: appointment.idempotency_key.clone(),
            platform_account_id: row.try_get("platform_account_id")?,
            conversation_id: appointment.conversation_id,
            unit_id: appointment.unit_id,
            listing_id: row.try_get("listing_id")?,
            agent_id: appointment.agent_id,
            starts_at: appointment.starts_at,
            ends_at: appointment.ends_at,
            timezone: appointment.timezone.clone(),
            status: Some(appointment.status),
        };
        Ok(Some((appointment, payload)))
    }

    async fn fetch_candidates(
        &self,
        unit_id: Uuid,
        date: chrono::NaiveDate,
        timezone: &str,
        include_passive: bool,
    ) -> anyhow::Result<Vec<BookingCandidate>> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        let rows = sqlx::query(
            r#"
            SELECT a.agent_id, u.assignment_mode, u.priority, a.starts_at, a.ends_at
            FROM unit_agent_assignments u
            JOIN agent_availability_slots a
              ON a.agent_id = u.agent_id
             AND a.status = 'available'
             AND a.starts_at < $3 AND $2 < a.ends_at
            JOIN availability_slots s
              ON s.unit_id = u.unit_id
             AND s.status = 'available'
             AND s.starts_at < a.ends_at AND a.starts_at < s.ends_at
            WHERE u.unit_id = $1
              AND s.timezone = $4
              AND ($5 OR u.assignment_mode = 'active')
              AND NOT EXISTS (
                  SELECT 1 FROM agent_availability_slots x
                  WHERE x.agent_id = a.agent_id AND x.status = 'unavailable'
                    AND x.starts_at < a.ends_at AND a.starts_at < x.ends_at
              )
            ORDER BY u.assignment_mode ASC, u.priority ASC, a.starts_at ASC
            "#,
        )
        .bind(unit_id)
        .bind(day_start)
        .bind(day_end)
        .bind(timezone)
        .bind(include_passive)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(BookingCandidate {
                    agent_id: row.try_get("agent_id")?,
                    assignment_mode: parse_assignment_mode(row.try_get("assignment_mode")?),
                    priority: row.try_get("priority")?,
                    starts_at: row.try_get("starts_at")?,
                    ends_at: row.try_get("ends_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(anyhow::Error::from)
    }

    async fn insert_appointment(
        &self,
        payload: &BookingPayload,
    ) -> anyhow::Result<Option<ShowingAppointment>> {
        let id = Uuid::new_v4();
        let status = payload.status.unwrap_or(ShowingStatus::Confirmed);

        let result = sqlx::query(
            r#"
            INSERT INTO showing_appointments
                (id, unit_id, agent_id, conversation_id, starts_at, ends_at, timezone,
                 status, idempotency_key, listing_id, platform_account_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(id)
        .bind(payload.unit_id)
        .bind(payload.agent_id)
        .bind(payload.conversation_id)
        .bind(payload.starts_at)
        .bind(payload.ends_at)
        .bind(&payload.timezone)
        .bind(status_str(status))
        .bind(&payload.idempotency_key)
        .bind(payload.listing_id)
        .bind(payload.platform_account_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Some(ShowingAppointment {
                id,
                unit_id: payload.unit_id,
                agent_id: payload.agent_id,
                conversation_id: payload.conversation_id,
                starts_at: payload.starts_at,
                ends_at: payload.ends_at,
                timezone: payload.timezone.clone(),
                status,
                idempotency_key: payload.idempotency_key.clone(),
                external_booking_ref: None,
            })),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23P01") => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_status(raw: String) -> ShowingStatus {
    match raw.as_str() {
        "pending" => ShowingStatus::Pending,
        "cancelled" => ShowingStatus::Cancelled,
        "no_show" => ShowingStatus::NoShow,
        "completed" => ShowingStatus::Completed,
        _ => ShowingStatus::Confirmed,
    }
}

fn status_str(status: ShowingStatus) -> &'static str {
    match status {
        ShowingStatus::Pending => "pending",
        ShowingStatus::Confirmed => "confirmed",
        ShowingStatus::Cancelled => "cancelled",
        ShowingStatus::NoShow => "no_show",
        ShowingStatus::Completed => "completed",
    }
}

fn parse_assignment_mode(raw: String) -> AssignmentMode {
    match raw.as_str() {
        "passive" => AssignmentMode::Passive,
        _ => AssignmentMode::Active,
    }
}
