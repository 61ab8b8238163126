//! Postgres-backed `RuleStore`/`TemplateStore`/`SlotStore`.
//! Each query fetches the enabled candidate rows and defers to the existing
//! pure selection helpers (`select_rule`, `resolve_template`) instead of
//! re-expressing the tie-break logic in SQL.

use crate::domain::{ActionType, AutomationRule, Template, TriggerType};
use crate::pipeline::slot::SlotCandidate;
use crate::pipeline::stores::{RuleStore, SlotStore, TemplateStore};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresStores {
    pool: PgPool,
}

impl PostgresStores {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleStore for PostgresStores {
    async fn find_rule(
        &self,
        platform_account_id: Uuid,
        intent: &str,
    ) -> anyhow::Result<Option<AutomationRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform_account_id, intent, template_id, priority, is_enabled, created_at
            FROM automation_rules
            WHERE platform_account_id = $1 AND trigger_type = 'intent_match' AND intent = $2
            "#,
        )
        .bind(platform_account_id)
        .bind(intent)
        .fetch_all(&self.pool)
        .await?;

        let rules = rows
            .into_iter()
            .map(|row| {
                Ok(AutomationRule {
                    id: row.try_get("id")?,
                    platform_account_id: row.try_get("platform_account_id")?,
                    trigger_type: TriggerType::IntentMatch,
                    action_type: ActionType::SendReply,
                    intent: row.try_get("intent")?,
                    template_id: row.try_get("template_id")?,
                    priority: row.try_get("priority")?,
                    is_enabled: row.try_get("is_enabled")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(crate::domain::select_rule(&rules, intent).cloned())
    }
}

#[async_trait]
impl TemplateStore for PostgresStores {
    async fn find_template(
        &self,
        platform_account_id: Uuid,
        name: &str,
    ) -> anyhow::Result<Option<Template>> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform_account_id, name, locale, body, variables, is_active
            FROM templates
            WHERE name = $1 AND is_active = true
              AND (platform_account_id = $2 OR platform_account_id IS NULL)
            "#,
        )
        .bind(name)
        .bind(platform_account_id)
        .fetch_all(&self.pool)
        .await?;

        let templates = rows
            .into_iter()
            .map(|row| {
                Ok(Template {
                    id: row.try_get("id")?,
                    platform_account_id: row.try_get("platform_account_id")?,
                    name: row.try_get("name")?,
                    locale: row.try_get("locale")?,
                    body: row.try_get("body")?,
                    variables: row.try_get("variables")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(crate::domain::resolve_template(&templates, platform_account_id, name).cloned())
    }
}

#[async_trait]
impl SlotStore for PostgresStores {
    async fn fetch_candidates_for_agent(
        &self,
        unit_id: Uuid,
        agent_id: Uuid,
    ) -> anyhow::Result<Vec<SlotCandidate>> {
        let assignment = sqlx::query(
            "SELECT assignment_mode, priority FROM unit_agent_assignments WHERE unit_id = $1 AND agent_id = $2",
        )
        .bind(unit_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        if assignment.is_none() {
            return Ok(vec![]);
        }

        self.candidates_for(unit_id, Some(agent_id)).await
    }

    async fn fetch_candidates_for_unit(&self, unit_id: Uuid) -> anyhow::Result<Vec<SlotCandidate>> {
        self.candidates_for(unit_id, None).await
    }
}

impl PostgresStores {
    /// Intersects unit availability with agent availability, anti-joining
    /// out any agent window that has a carved-out `unavailable` sub-block
    /// overlapping it, matching `showing_postgres.rs`'s candidate query so
    /// the decision pipeline never offers a slot the booking path would
    /// itself reject.
    async fn candidates_for(
        &self,
        unit_id: Uuid,
        agent_id: Option<Uuid>,
    ) -> anyhow::Result<Vec<SlotCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT a.agent_id, ag.name AS agent_name, s.starts_at, s.ends_at, u.priority
            FROM availability_slots s
            JOIN unit_agent_assignments u ON u.unit_id = s.unit_id
            JOIN agent_availability_slots a
              ON a.agent_id = u.agent_id
             AND a.status = 'available'
             AND a.starts_at < s.ends_at AND s.starts_at < a.ends_at
            LEFT JOIN agents ag ON ag.id = a.agent_id
            WHERE s.unit_id = $1
              AND s.status = 'available'
              AND ($2::uuid IS NULL OR a.agent_id = $2)
              AND NOT EXISTS (
                  SELECT 1 FROM agent_availability_slots x
                  WHERE x.agent_id = a.agent_id AND x.status = 'unavailable'
                    AND x.starts_at < a.ends_at AND a.starts_at < x.ends_at
              )
            ORDER BY u.assignment_mode ASC, u.priority ASC, s.starts_at ASC
            "#,
        )
        .bind(unit_id)
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let starts_at: chrono::DateTime<chrono::Utc> = row.try_get("starts_at")?;
                let ends_at: chrono::DateTime<chrono::Utc> = row.try_get("ends_at")?;
                let agent_name: Option<String> = row.try_get("agent_name")?;
                Ok(SlotCandidate {
                    unit_id,
                    agent_id: row.try_get("agent_id")?,
                    agent_name: agent_name.clone(),
                    starts_at,
                    ends_at,
                    label: agent_name.unwrap_or_else(|| "agent".to_string()),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(anyhow::Error::from)
    }
}
