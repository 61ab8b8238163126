//! Test-only table setup.
//!
//! Schema migrations and seed data are out of scope for this crate; these
//! `CREATE TABLE` statements exist only so integration tests have something
//! to point a real Postgres at. They are not a migration framework — there
//! is no versioning, no up/down pair, nothing shipped to a deployment.

use sqlx::PgPool;

pub async fn create_schema(pool: &PgPool) {
    sqlx::raw_sql(
        r#"
        CREATE TABLE platform_accounts (
            id UUID PRIMARY KEY,
            platform TEXT NOT NULL,
            is_active BOOLEAN NOT NULL DEFAULT true,
            send_mode TEXT NOT NULL DEFAULT 'draft_only',
            integration_mode TEXT NOT NULL DEFAULT 'rpa',
            credentials JSONB NOT NULL DEFAULT '{}'::jsonb
        );

        CREATE TABLE conversations (
            id UUID PRIMARY KEY,
            platform_account_id UUID NOT NULL REFERENCES platform_accounts(id),
            external_thread_id TEXT NOT NULL,
            assigned_agent_id UUID,
            lead_name TEXT,
            status TEXT NOT NULL DEFAULT 'open',
            workflow_state TEXT NOT NULL DEFAULT 'lead',
            workflow_outcome TEXT,
            showing_state TEXT,
            last_message_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (platform_account_id, external_thread_id)
        );

        CREATE TABLE messages (
            id UUID PRIMARY KEY,
            conversation_id UUID NOT NULL REFERENCES conversations(id),
            direction TEXT NOT NULL,
            external_message_id TEXT,
            body TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            sent_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        CREATE UNIQUE INDEX messages_conversation_external_id_idx
            ON messages (conversation_id, external_message_id)
            WHERE external_message_id IS NOT NULL;

        CREATE TABLE agents (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE unit_agent_assignments (
            unit_id UUID NOT NULL,
            agent_id UUID NOT NULL,
            assignment_mode TEXT NOT NULL DEFAULT 'active',
            priority INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (unit_id, agent_id)
        );
        CREATE UNIQUE INDEX unit_agent_assignments_active_priority_idx
            ON unit_agent_assignments (unit_id, priority)
            WHERE assignment_mode = 'active';

        CREATE TABLE availability_slots (
            id UUID PRIMARY KEY,
            unit_id UUID NOT NULL,
            starts_at TIMESTAMPTZ NOT NULL,
            ends_at TIMESTAMPTZ NOT NULL,
            timezone TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'available',
            source TEXT NOT NULL DEFAULT 'manual',
            notes TEXT
        );

        CREATE TABLE agent_availability_slots (
            id UUID PRIMARY KEY,
            agent_id UUID NOT NULL,
            starts_at TIMESTAMPTZ NOT NULL,
            ends_at TIMESTAMPTZ NOT NULL,
            timezone TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'available',
            source TEXT NOT NULL DEFAULT 'manual',
            notes TEXT
        );

        CREATE EXTENSION IF NOT EXISTS btree_gist;

        CREATE TABLE showing_appointments (
            id UUID PRIMARY KEY,
            unit_id UUID NOT NULL,
            agent_id UUID NOT NULL,
            conversation_id UUID REFERENCES conversations(id),
            starts_at TIMESTAMPTZ NOT NULL,
            ends_at TIMESTAMPTZ NOT NULL,
            timezone TEXT NOT NULL,
            status TEXT NOT NULL,
            idempotency_key TEXT NOT NULL UNIQUE,
            external_booking_ref TEXT,
            listing_id UUID,
            platform_account_id UUID,
            EXCLUDE USING gist (
                unit_id WITH =,
                tstzrange(starts_at, ends_at, '[)') WITH &&
            ) WHERE (status IN ('pending', 'confirmed'))
        );

        CREATE TABLE automation_rules (
            id UUID PRIMARY KEY,
            platform_account_id UUID NOT NULL,
            trigger_type TEXT NOT NULL DEFAULT 'intent_match',
            intent TEXT,
            template_id UUID,
            priority INTEGER NOT NULL DEFAULT 0,
            is_enabled BOOLEAN NOT NULL DEFAULT true,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );

        CREATE TABLE templates (
            id UUID PRIMARY KEY,
            platform_account_id UUID,
            name TEXT NOT NULL,
            locale TEXT NOT NULL DEFAULT 'en-US',
            body TEXT NOT NULL,
            variables TEXT[] NOT NULL DEFAULT '{}',
            is_active BOOLEAN NOT NULL DEFAULT true
        );
        "#,
    )
    .execute(pool)
    .await
    .expect("failed to create test schema");
}
