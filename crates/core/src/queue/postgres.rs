use super::{
    ClaimedMessage, DispatchBeginResult, IngestLinkage, InsertOutcome, OutboundInsert, QueueAdapter,
};
use crate::domain::{
    Conversation, ConversationStatus, DeliveryRecord, Direction, DispatchRecord, DispatchState,
    DlqReason, IntegrationMode, Message, PlatformAccount, RetryRecord, SendMode, WorkflowState,
};
use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use connectors::Platform;
use serde_json::json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// PostgreSQL-backed queue adapter: `FOR UPDATE SKIP LOCKED` claims, JSONB
/// compare-and-set for dispatch state, and uniqueness constraints doing the
/// real dedup work.
pub struct PostgresQueueAdapter {
    pool: PgPool,
}

impl PostgresQueueAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueAdapter for PostgresQueueAdapter {
    async fn claim_pending(
        &self,
        worker_id: &str,
        limit: i64,
        claim_ttl_ms: i64,
    ) -> Result<Vec<ClaimedMessage>, QueueError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| QueueError::Store(e.to_string()))?;

        let rows = sqlx::query(
            r#"
            SELECT
                m.id, m.conversation_id, m.direction, m.external_message_id, m.body,
                m.metadata, m.sent_at, m.created_at,
                c.id AS conv_id, c.platform_account_id, c.external_thread_id,
                c.assigned_agent_id, c.lead_name, c.status AS conv_status,
                c.workflow_state, c.workflow_outcome, c.showing_state, c.last_message_at,
                pa.id AS pa_id, pa.platform, pa.is_active, pa.send_mode,
                pa.integration_mode, pa.credentials
            FROM messages m
            JOIN conversations c ON c.id = m.conversation_id
            JOIN platform_accounts pa ON pa.id = c.platform_account_id
            WHERE m.direction = 'inbound'
              AND m.metadata -> 'aiProcessedAt' IS NULL
              AND (
                  m.metadata -> 'workerClaim' IS NULL
                  OR (m.metadata -> 'workerClaim' ->> 'claimExpiresAt')::timestamptz <= NOW()
              )
            ORDER BY m.sent_at ASC, m.created_at ASC
            LIMIT $1
            FOR UPDATE OF m SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| QueueError::ClaimFailed(e.to_string()))?;

        let mut claimed = Vec::with_capacity(rows.len());
        let claim_expires_at = Utc::now() + chrono::Duration::milliseconds(claim_ttl_ms);

        for row in &rows {
            let message_id: Uuid = row.try_get("id").map_err(store_err)?;
            let mut metadata: serde_json::Map<String, serde_json::Value> =
                row.try_get::<serde_json::Value, _>("metadata")
                    .map_err(store_err)?
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
            metadata.insert(
                "workerClaim".to_string(),
                json!({
                    "workerId": worker_id,
                    "claimedAt": Utc::now(),
                    "claimExpiresAt": claim_expires_at,
                }),
            );

            sqlx::query("UPDATE messages SET metadata = $1 WHERE id = $2")
                .bind(serde_json::Value::Object(metadata.clone()))
                .bind(message_id)
                .execute(&mut *tx)
                .await
                .map_err(store_err)?;

            claimed.push(ClaimedMessage {
                message: Message {
                    id: message_id,
                    conversation_id: row.try_get("conversation_id").map_err(store_err)?,
                    direction: Direction::Inbound,
                    external_message_id: row.try_get("external_message_id").map_err(store_err)?,
                    body: row.try_get("body").map_err(store_err)?,
                    metadata: serde_json::Value::Object(metadata)
                        .as_object()
                        .cloned()
                        .unwrap_or_default()
                        .into_iter()
                        .collect::<HashMap<_, _>>(),
                    sent_at: row.try_get("sent_at").map_err(store_err)?,
                    created_at: row.try_get("created_at").map_err(store_err)?,
                },
                conversation: Conversation {
                    id: row.try_get("conv_id").map_err(store_err)?,
                    platform_account_id: row.try_get("platform_account_id").map_err(store_err)?,
                    external_thread_id: row.try_get("external_thread_id").map_err(store_err)?,
                    assigned_agent_id: row.try_get("assigned_agent_id").map_err(store_err)?,
                    lead_name: row.try_get("lead_name").map_err(store_err)?,
                    status: parse_conversation_status(row.try_get("conv_status").map_err(store_err)?),
                    workflow_state: parse_workflow_state(row.try_get("workflow_state").map_err(store_err)?),
                    workflow_outcome: row
                        .try_get::<Option<String>, _>("workflow_outcome")
                        .map_err(store_err)?
                        .and_then(|s| serde_json::from_value(json!(s)).ok()),
                    showing_state: row.try_get("showing_state").map_err(store_err)?,
                    last_message_at: row.try_get("last_message_at").map_err(store_err)?,
                },
                platform_account: PlatformAccount {
                    id: row.try_get("pa_id").map_err(store_err)?,
                    platform: Platform::from_str(&row.try_get::<String, _>("platform").map_err(store_err)?)
                        .ok_or_else(|| QueueError::Store("unknown platform".to_string()))?,
                    is_active: row.try_get("is_active").map_err(store_err)?,
                    send_mode: parse_send_mode(row.try_get("send_mode").map_err(store_err)?),
                    integration_mode: parse_integration_mode(
                        row.try_get("integration_mode").map_err(store_err)?,
                    ),
                    credentials: row
                        .try_get::<serde_json::Value, _>("credentials")
                        .map_err(store_err)?
                        .as_object()
                        .map(|m| {
                            m.iter()
                                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                                .collect()
                        })
                        .unwrap_or_default(),
                },
            });
        }

        tx.commit().await.map_err(|e| QueueError::Store(e.to_string()))?;
        debug!(count = claimed.len(), worker_id, "claimed pending messages");
        Ok(claimed)
    }

    async fn begin_dispatch_attempt(
        &self,
        message_id: Uuid,
        dispatch_key: &str,
    ) -> Result<DispatchBeginResult, QueueError> {
        let row = sqlx::query("SELECT metadata FROM messages WHERE id = $1 FOR UPDATE")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| QueueError::Store(format!("message {message_id} not found")))?;

        let metadata: serde_json::Value = row.try_get("metadata").map_err(store_err)?;
        let existing = metadata
            .get("dispatch")
            .cloned()
            .and_then(|v| serde_json::from_value::<DispatchRecord>(v).ok());

        let should_dispatch = match &existing {
            Some(d) => d.key != dispatch_key && !matches!(d.state, DispatchState::InProgress | DispatchState::Completed),
            None => true,
        };

        if !should_dispatch {
            return Ok(DispatchBeginResult {
                should_dispatch: false,
                existing_delivery: existing.and_then(|d| d.delivery),
            });
        }

        let new_record = DispatchRecord {
            key: dispatch_key.to_string(),
            state: DispatchState::InProgress,
            attempts: existing.as_ref().map(|d| d.attempts + 1).unwrap_or(1),
            last_attempt_at: Utc::now(),
            completed_at: None,
            delivery: None,
            failed_stage: None,
            last_error: None,
            retry: None,
            dlq_reason: None,
        };

        let mut patched = metadata.as_object().cloned().unwrap_or_default();
        patched.insert(
            "dispatch".to_string(),
            serde_json::to_value(&new_record).map_err(store_err)?,
        );

        sqlx::query("UPDATE messages SET metadata = $1 WHERE id = $2")
            .bind(serde_json::Value::Object(patched))
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(DispatchBeginResult {
            should_dispatch: true,
            existing_delivery: None,
        })
    }

    async fn complete_dispatch_attempt(
        &self,
        message_id: Uuid,
        delivery: DeliveryRecord,
    ) -> Result<(), QueueError> {
        patch_dispatch(&self.pool, message_id, |record| {
            record.state = DispatchState::Completed;
            record.completed_at = Some(Utc::now());
            record.delivery = Some(delivery.clone());
        })
        .await
    }

    async fn fail_dispatch_attempt(
        &self,
        message_id: Uuid,
        failed_stage: &str,
        error: &str,
        retry: RetryRecord,
        dlq_reason: Option<DlqReason>,
    ) -> Result<(), QueueError> {
        let state = if retry.retry_exhausted {
            DispatchState::Dlq
        } else {
            DispatchState::Failed
        };
        patch_dispatch(&self.pool, message_id, |record| {
            record.state = state;
            record.failed_stage = Some(failed_stage.to_string());
            record.last_error = Some(error.to_string());
            record.retry = Some(retry.clone());
            record.dlq_reason = dlq_reason;
        })
        .await?;

        if state == DispatchState::Dlq {
            warn!(message_id = %message_id, ?dlq_reason, "message escalated to dlq");
        }
        Ok(())
    }

    async fn insert_outbound(&self, outbound: OutboundInsert) -> Result<InsertOutcome, QueueError> {
        let metadata = match outbound.review_status {
            Some(status) => json!({ "reviewStatus": status }),
            None => json!({}),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, direction, external_message_id, body, metadata, sent_at, created_at)
            VALUES ($1, $2, 'outbound', $3, $4, $5, $6, NOW())
            ON CONFLICT (conversation_id, external_message_id) WHERE external_message_id IS NOT NULL DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(outbound.conversation_id)
        .bind(&outbound.external_message_id)
        .bind(&outbound.body)
        .bind(metadata)
        .bind(outbound.sent_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Ok(InsertOutcome::Deduplicated);
        }

        sqlx::query("UPDATE conversations SET last_message_at = $1 WHERE id = $2")
            .bind(outbound.sent_at)
            .bind(outbound.conversation_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(InsertOutcome::Inserted)
    }

    async fn mark_inbound_processed(
        &self,
        message_id: Uuid,
        decision_metadata: serde_json::Value,
    ) -> Result<(), QueueError> {
        let row = sqlx::query("SELECT metadata FROM messages WHERE id = $1 FOR UPDATE")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or_else(|| QueueError::Store(format!("message {message_id} not found")))?;

        let mut metadata: serde_json::Map<String, serde_json::Value> = row
            .try_get::<serde_json::Value, _>("metadata")
            .map_err(store_err)?
            .as_object()
            .cloned()
            .unwrap_or_default();

        if let Some(decision) = decision_metadata.as_object() {
            for (k, v) in decision {
                metadata.insert(k.clone(), v.clone());
            }
        }
        metadata.insert("aiProcessedAt".to_string(), json!(Utc::now()));
        metadata.remove("workerClaim");

        sqlx::query("UPDATE messages SET metadata = $1 WHERE id = $2")
            .bind(serde_json::Value::Object(metadata))
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn ingest_inbound(
        &self,
        platform_account_id: Uuid,
        external_thread_id: &str,
        external_message_id: Option<&str>,
        body: &str,
        lead_name: Option<&str>,
        sent_at: DateTime<Utc>,
    ) -> Result<IngestLinkage, QueueError> {
        let existing_conversation = sqlx::query(
            "SELECT id, status, workflow_outcome FROM conversations WHERE platform_account_id = $1 AND external_thread_id = $2",
        )
        .bind(platform_account_id)
        .bind(external_thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let (conversation_id, resolved, reopened, was_no_reply) = match existing_conversation {
            Some(row) => {
                let id: Uuid = row.try_get("id").map_err(store_err)?;
                let status: String = row.try_get("status").map_err(store_err)?;
                let workflow_outcome: Option<String> =
                    row.try_get("workflow_outcome").map_err(store_err)?;
                let reopened = status == "archived";
                if reopened {
                    sqlx::query("UPDATE conversations SET status = 'open' WHERE id = $1")
                        .bind(id)
                        .execute(&self.pool)
                        .await
                        .map_err(store_err)?;
                }
                (id, true, reopened, workflow_outcome.as_deref() == Some("no_reply"))
            }
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO conversations
                        (id, platform_account_id, external_thread_id, lead_name, status, workflow_state, last_message_at)
                    VALUES ($1, $2, $3, $4, 'open', 'lead', $5)
                    "#,
                )
                .bind(id)
                .bind(platform_account_id)
                .bind(external_thread_id)
                .bind(lead_name)
                .bind(sent_at)
                .execute(&self.pool)
                .await
                .map_err(store_err)?;
                (id, false, false, false)
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, direction, external_message_id, body, metadata, sent_at, created_at)
            VALUES ($1, $2, 'inbound', $3, $4, '{}'::jsonb, $5, NOW())
            ON CONFLICT (conversation_id, external_message_id) WHERE external_message_id IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(external_message_id)
        .bind(body)
        .bind(sent_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let message_id = result.map(|r| r.try_get::<Uuid, _>("id")).transpose().map_err(store_err)?;

        let recovered_from_no_reply = message_id.is_some() && was_no_reply;
        if recovered_from_no_reply {
            sqlx::query(
                "UPDATE conversations SET workflow_state = 'lead', workflow_outcome = NULL WHERE id = $1",
            )
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        }

        Ok(IngestLinkage {
            conversation_id,
            message_id,
            resolved,
            reopened,
            recovered_from_no_reply,
        })
    }

    async fn update_conversation_workflow(
        &self,
        conversation_id: Uuid,
        workflow_state: crate::domain::WorkflowState,
        workflow_outcome: Option<crate::domain::WorkflowOutcome>,
        showing_state: Option<&str>,
    ) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE conversations SET workflow_state = $1, workflow_outcome = $2, showing_state = $3 WHERE id = $4",
        )
        .bind(workflow_state_str(workflow_state))
        .bind(workflow_outcome.map(workflow_outcome_str))
        .bind(showing_state)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn list_active_accounts(&self) -> Result<Vec<PlatformAccount>, QueueError> {
        let rows = sqlx::query(
            "SELECT id, platform, is_active, send_mode, integration_mode, credentials FROM platform_accounts WHERE is_active = true",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(PlatformAccount {
                    id: row.try_get("id").map_err(store_err)?,
                    platform: Platform::from_str(&row.try_get::<String, _>("platform").map_err(store_err)?)
                        .ok_or_else(|| QueueError::Store("unknown platform".to_string()))?,
                    is_active: row.try_get("is_active").map_err(store_err)?,
                    send_mode: parse_send_mode(row.try_get("send_mode").map_err(store_err)?),
                    integration_mode: parse_integration_mode(
                        row.try_get("integration_mode").map_err(store_err)?,
                    ),
                    credentials: row
                        .try_get::<serde_json::Value, _>("credentials")
                        .map_err(store_err)?
                        .as_object()
                        .map(|m| {
                            m.iter()
                                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                                .collect()
                        })
                        .unwrap_or_default(),
                })
            })
            .collect()
    }
}

async fn patch_dispatch(
    pool: &PgPool,
    message_id: Uuid,
    mutate: impl FnOnce(&mut DispatchRecord),
) -> Result<(), QueueError> {
    let row = sqlx::query("SELECT metadata FROM messages WHERE id = $1 FOR UPDATE")
        .bind(message_id)
        .fetch_optional(pool)
        .await
        .map_err(store_err)?
        .ok_or_else(|| QueueError::Store(format!("message {message_id} not found")))?;

    let metadata: serde_json::Value = row.try_get("metadata").map_err(store_err)?;
    let mut record: DispatchRecord = metadata
        .get("dispatch")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| QueueError::Store("no in-flight dispatch record to patch".to_string()))?;

    mutate(&mut record);

    let mut patched = metadata.as_object().cloned().unwrap_or_default();
    patched.insert(
        "dispatch".to_string(),
        serde_json::to_value(&record).map_err(store_err)?,
    );

    sqlx::query("UPDATE messages SET metadata = $1 WHERE id = $2")
        .bind(serde_json::Value::Object(patched))
        .bind(message_id)
        .execute(pool)
        .await
        .map_err(store_err)?;

    Ok(())
}

fn store_err(e: impl std::fmt::Display) -> QueueError {
    QueueError::Store(e.to_string())
}

fn parse_conversation_status(raw: String) -> ConversationStatus {
    match raw.as_str() {
        "archived" => ConversationStatus::Archived,
        _ => ConversationStatus::Open,
    }
}

fn parse_workflow_state(raw: String) -> WorkflowState {
    match raw.as_str() {
        "tour_requested" => WorkflowState::TourRequested,
        "showing_confirmed" => WorkflowState::ShowingConfirmed,
        "follow_up_1" => WorkflowState::FollowUp1,
        "follow_up_2" => WorkflowState::FollowUp2,
        "archived" => WorkflowState::Archived,
        _ => WorkflowState::Lead,
    }
}

fn parse_send_mode(raw: String) -> SendMode {
    match raw.as_str() {
        "auto_send" => SendMode::AutoSend,
        _ => SendMode::DraftOnly,
    }
}

fn parse_integration_mode(raw: String) -> IntegrationMode {
    match raw.as_str() {
        "api" => IntegrationMode::Api,
        _ => IntegrationMode::Rpa,
    }
}

fn workflow_state_str(state: WorkflowState) -> &'static str {
    match state {
        WorkflowState::Lead => "lead",
        WorkflowState::TourRequested => "tour_requested",
        WorkflowState::ShowingConfirmed => "showing_confirmed",
        WorkflowState::FollowUp1 => "follow_up_1",
        WorkflowState::FollowUp2 => "follow_up_2",
        WorkflowState::Archived => "archived",
    }
}

fn workflow_outcome_str(outcome: crate::domain::WorkflowOutcome) -> &'static str {
    use crate::domain::WorkflowOutcome::*;
    match outcome {
        GeneralQuestion => "general_question",
        HumanRequired => "human_required",
        NoReply => "no_reply",
        NotInterested => "not_interested",
        ShowingConfirmed => "showing_confirmed",
        WantsReschedule => "wants_reschedule",
    }
}
