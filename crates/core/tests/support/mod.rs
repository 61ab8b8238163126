mod harness;
mod schema;

pub use harness::TestHarness;

use chrono::{DateTime, Utc};
use connectors::Platform;
use sqlx::PgPool;
use uuid::Uuid;

/// Inserts a platform account with no real credential references (tests
/// never call through the connector registry).
pub async fn insert_platform_account(pool: &PgPool, platform: Platform, send_mode: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO platform_accounts (id, platform, is_active, send_mode, integration_mode, credentials) \
         VALUES ($1, $2, true, $3, 'api', '{}'::jsonb)",
    )
    .bind(id)
    .bind(platform.as_str())
    .bind(send_mode)
    .execute(pool)
    .await
    .expect("insert platform account");
    id
}

pub async fn insert_agent(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO agents (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .expect("insert agent");
    id
}

pub async fn assign_agent_to_unit(pool: &PgPool, unit_id: Uuid, agent_id: Uuid, mode: &str, priority: i32) {
    sqlx::query(
        "INSERT INTO unit_agent_assignments (unit_id, agent_id, assignment_mode, priority) VALUES ($1, $2, $3, $4)",
    )
    .bind(unit_id)
    .bind(agent_id)
    .bind(mode)
    .bind(priority)
    .execute(pool)
    .await
    .expect("assign agent to unit");
}

pub async fn insert_unit_availability(
    pool: &PgPool,
    unit_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) {
    sqlx::query(
        "INSERT INTO availability_slots (id, unit_id, starts_at, ends_at, timezone, status, source) \
         VALUES ($1, $2, $3, $4, 'America/New_York', 'available', 'manual')",
    )
    .bind(Uuid::new_v4())
    .bind(unit_id)
    .bind(starts_at)
    .bind(ends_at)
    .execute(pool)
    .await
    .expect("insert unit availability");
}

pub async fn insert_agent_availability(
    pool: &PgPool,
    agent_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) {
    sqlx::query(
        "INSERT INTO agent_availability_slots (id, agent_id, starts_at, ends_at, timezone, status, source) \
         VALUES ($1, $2, $3, $4, 'America/New_York', 'available', 'manual')",
    )
    .bind(Uuid::new_v4())
    .bind(agent_id)
    .bind(starts_at)
    .bind(ends_at)
    .execute(pool)
    .await
    .expect("insert agent availability");
}

pub async fn insert_conversation(
    pool: &PgPool,
    platform_account_id: Uuid,
    external_thread_id: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO conversations (id, platform_account_id, external_thread_id, status, workflow_state, last_message_at) \
         VALUES ($1, $2, $3, 'open', 'lead', NOW())",
    )
    .bind(id)
    .bind(platform_account_id)
    .bind(external_thread_id)
    .execute(pool)
    .await
    .expect("insert conversation");
    id
}

pub async fn insert_inbound_message(
    pool: &PgPool,
    conversation_id: Uuid,
    body: &str,
    sent_at: DateTime<Utc>,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO messages (id, conversation_id, direction, body, metadata, sent_at, created_at) \
         VALUES ($1, $2, 'inbound', $3, '{}'::jsonb, $4, NOW())",
    )
    .bind(id)
    .bind(conversation_id)
    .bind(body)
    .bind(sent_at)
    .execute(pool)
    .await
    .expect("insert inbound message");
    id
}
