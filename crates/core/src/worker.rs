//! The worker loop: `poll → claim batch → per-message process`, implementing
//! `Service` so the binary can hand it to `service::run_with_signal_shutdown`.

use crate::audit_log::{actions, build as audit};
use crate::classifier::Intent;
use crate::domain::{
    DeliveryRecord, DlqReason, RetryRecord, WorkflowOutcome, WorkflowState,
};
use crate::error::DispatchError;
use crate::kernel::Kernel;
use crate::pipeline::slot::SlotCandidate;
use crate::pipeline::{self, DecisionResult, PipelineInput};
use crate::queue::{ClaimedMessage, InsertOutcome, OutboundInsert};
use crate::service::Service;
use crate::showing_service::{self, Actor, BookingOutcome, BookingPayload};
use crate::workflow;
use async_trait::async_trait;
use connectors::{AccountRef, ConnectorError, OutboundPayload};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct Worker {
    kernel: Arc<Kernel>,
}

impl Worker {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    async fn run_cycle(&self) -> anyhow::Result<usize> {
        self.ingest_cycle().await;

        let claimed = self
            .kernel
            .queue
            .claim_pending(
                &self.kernel.config.worker_instance_id,
                self.kernel.config.worker_queue_batch_size,
                self.kernel.config.worker_claim_ttl.as_millis() as i64,
            )
            .await?;

        let count = claimed.len();
        for message in claimed {
            let message_id = message.message.id;
            if let Err(err) = self.process_message(message).await {
                error!(message_id = %message_id, error = ?err, "message processing failed");
                audit(
                    "system",
                    None,
                    "message",
                    &message_id.to_string(),
                    actions::AI_REPLY_ERROR,
                    details(&[("error", json!(err.to_string()))]),
                );
            }
        }
        Ok(count)
    }

    /// Ingest step of the data flow ("Ingest (adapters → queue adapter) →
    /// Worker Loop claims"): pulls pending inbound messages for every active
    /// account and dedups them into the queue. Failures are per-account and
    /// logged, not fatal to the cycle.
    async fn ingest_cycle(&self) {
        let accounts = match self.kernel.queue.list_active_accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!(error = ?err, "failed to list active accounts for ingest");
                return;
            }
        };

        for account in accounts {
            let account_ref = AccountRef {
                account_id: account.id,
                platform: account.platform,
            };
            let messages = match self
                .kernel
                .connectors
                .ingest_messages_for_account(&account_ref, &account.credentials)
                .await
            {
                Ok(messages) => messages,
                Err(exhausted) => {
                    warn!(account_id = %account.id, error = ?exhausted.last_error, "ingest failed for account");
                    continue;
                }
            };

            for message in messages {
                let linkage = match self
                    .kernel
                    .queue
                    .ingest_inbound(
                        account.id,
                        &message.external_thread_id,
                        message.external_message_id.as_deref(),
                        &message.body,
                        message.lead_name.as_deref(),
                        message.sent_at,
                    )
                    .await
                {
                    Ok(l) => l,
                    Err(err) => {
                        warn!(account_id = %account.id, error = ?err, "failed to record inbound message");
                        continue;
                    }
                };

                audit(
                    "system",
                    None,
                    "conversation",
                    &linkage.conversation_id.to_string(),
                    if linkage.resolved {
                        actions::INGEST_CONVERSATION_LINKAGE_RESOLVED
                    } else {
                        actions::INGEST_CONVERSATION_LINKAGE_UNRESOLVED
                    },
                    HashMap::new(),
                );
                if linkage.recovered_from_no_reply {
                    audit(
                        "system",
                        None,
                        "conversation",
                        &linkage.conversation_id.to_string(),
                        actions::WORKFLOW_NO_REPLY_RECOVERED,
                        HashMap::new(),
                    );
                }
            }
        }
    }

    async fn process_message(&self, claimed: ClaimedMessage) -> anyhow::Result<()> {
        let ClaimedMessage {
            message,
            conversation,
            platform_account,
        } = claimed;

        // 1. Policy check: inactive platform short-circuits.
        if !platform_account.is_active {
            audit(
                "system",
                None,
                "message",
                &message.id.to_string(),
                actions::AI_REPLY_POLICY_BLOCKED,
                details(&[("reason", json!("policy_platform_inactive"))]),
            );
            self.kernel
                .queue
                .mark_inbound_processed(message.id, json!({"outcome": "skipped"}))
                .await?;
            return Ok(());
        }

        // 2. Dev allowlist + message age check.
        if !self.kernel.config.autoreply_allow_lead_names.is_empty() {
            let allowed = conversation
                .lead_name
                .as_deref()
                .map(|name| {
                    self.kernel
                        .config
                        .autoreply_allow_lead_names
                        .iter()
                        .any(|allowed| allowed == name)
                })
                .unwrap_or(false);
            if !allowed {
                audit(
                    "system",
                    None,
                    "message",
                    &message.id.to_string(),
                    actions::AI_REPLY_TEST_ALLOWLIST_BLOCKED,
                    HashMap::new(),
                );
                self.kernel
                    .queue
                    .mark_inbound_processed(message.id, json!({"outcome": "skipped"}))
                    .await?;
                return Ok(());
            }
        }

        let age = chrono::Utc::now().signed_duration_since(message.sent_at);
        if age
            > chrono::Duration::from_std(self.kernel.config.autoreply_max_message_age).unwrap_or_default()
        {
            audit(
                "system",
                None,
                "message",
                &message.id.to_string(),
                actions::AI_REPLY_POLICY_BLOCKED,
                details(&[("reason", json!("message_too_old"))]),
            );
            self.kernel
                .queue
                .mark_inbound_processed(message.id, json!({"outcome": "skipped"}))
                .await?;
            return Ok(());
        }

        // 3 & 4. Slot fetch + pipeline run.
        let unit_id = resolve_unit_id(&message);
        let pending_slot = resolve_pending_slot(&message);
        let has_recent_outbound = conversation.workflow_state != WorkflowState::Lead;
        let fallback_intent = match conversation.workflow_state {
            WorkflowState::TourRequested | WorkflowState::FollowUp1 | WorkflowState::FollowUp2 => {
                Intent::TourRequest
            }
            _ => Intent::Unknown,
        };

        let mut template_context = HashMap::new();
        if let Some(name) = &conversation.lead_name {
            template_context.insert("lead_name".to_string(), name.clone());
        }

        let ai = self.kernel.classifier.as_deref();
        let input = PipelineInput {
            platform_account: &platform_account,
            unit_id,
            assigned_agent_id: conversation.assigned_agent_id,
            inbound_body: &message.body,
            has_recent_outbound,
            fallback_intent,
            pending_slot,
            template_context,
            max_slot_options: self.kernel.config.autoreply_slot_option_limit,
        };

        let decision = pipeline::run(
            input,
            self.kernel.rules.as_ref(),
            self.kernel.templates.as_ref(),
            self.kernel.slots.as_ref(),
            ai,
        )
        .await?;

        // 5. Workflow transition + showing sync.
        self.sync_workflow(&conversation, &decision).await?;

        // 6. ai_reply_decision.
        audit(
            "system",
            None,
            "message",
            &message.id.to_string(),
            actions::AI_REPLY_DECISION,
            details(&[
                ("intent", json!(format!("{:?}", decision.intent))),
                ("effectiveIntent", json!(format!("{:?}", decision.effective_intent))),
                ("outcome", json!(format!("{:?}", decision.outcome))),
                ("confidence", json!(decision.confidence)),
            ]),
        );

        // 7. Escalation / human-required emissions.
        if decision.outcome == crate::guardrails::Outcome::Escalate {
            audit(
                "system",
                None,
                "message",
                &message.id.to_string(),
                actions::AI_REPLY_ESCALATED,
                details(&[(
                    "reasonCode",
                    json!(decision.escalation_reason_code.unwrap_or("unknown")),
                )]),
            );
        }
        if decision.workflow_outcome == Some(WorkflowOutcome::HumanRequired) {
            audit(
                "system",
                None,
                "message",
                &message.id.to_string(),
                actions::AI_REPLY_HUMAN_REQUIRED_QUEUED,
                HashMap::new(),
            );
        }

        // 8. Dispatch.
        let dispatched = if decision.eligible {
            self.dispatch(&message.id, &conversation, &platform_account, &decision)
                .await?
        } else {
            false
        };

        // 9. markInboundProcessed.
        self.kernel
            .queue
            .mark_inbound_processed(
                message.id,
                json!({
                    "outcome": if dispatched { "created" } else { "skipped" },
                    "intent": format!("{:?}", decision.effective_intent),
                }),
            )
            .await?;

        // 10. Final emission.
        audit(
            "system",
            None,
            "message",
            &message.id.to_string(),
            if dispatched {
                actions::AI_REPLY_CREATED
            } else {
                actions::AI_REPLY_SKIPPED
            },
            HashMap::new(),
        );

        Ok(())
    }

    async fn sync_workflow(
        &self,
        conversation: &crate::domain::Conversation,
        decision: &DecisionResult,
    ) -> anyhow::Result<()> {
        let effects = decision
            .workflow_outcome
            .map(crate::workflow::effects_for_outcome);

        let next_state = next_workflow_state(
            conversation.workflow_state,
            decision.effective_intent,
            decision.workflow_outcome,
            decision.eligible,
            decision.outcome,
        );

        if next_state != conversation.workflow_state {
            let result = workflow::transition(conversation, next_state, false)?;
            self.kernel
                .queue
                .update_conversation_workflow(
                    conversation.id,
                    result.next_state,
                    decision.workflow_outcome,
                    effects.as_ref().and_then(|e| e.showing_state),
                )
                .await?;
            if result.recovered_from_no_reply {
                audit(
                    "system",
                    None,
                    "conversation",
                    &conversation.id.to_string(),
                    actions::WORKFLOW_NO_REPLY_RECOVERED,
                    HashMap::new(),
                );
            }
            audit(
                "system",
                None,
                "conversation",
                &conversation.id.to_string(),
                actions::WORKFLOW_STATE_TRANSITIONED,
                details(&[("to", json!(format!("{:?}", result.next_state)))]),
            );
        }

        if decision.workflow_outcome == Some(WorkflowOutcome::ShowingConfirmed) {
            if let Some(slot) = &decision.selected_slot {
                self.book_showing(conversation, slot).await?;
            }
        }

        Ok(())
    }

    async fn book_showing(
        &self,
        conversation: &crate::domain::Conversation,
        slot: &SlotCandidate,
    ) -> anyhow::Result<()> {
        let idempotency_key = format!("conv:{}:{}", conversation.id, slot.starts_at.timestamp());
        let payload = BookingPayload {
            idempotency_key,
            platform_account_id: conversation.platform_account_id,
            conversation_id: Some(conversation.id),
            unit_id: slot.unit_id,
            listing_id: None,
            agent_id: slot.agent_id,
            starts_at: slot.starts_at,
            ends_at: slot.ends_at,
            timezone: "UTC".to_string(),
            status: None,
        };

        let outcome = showing_service::book(self.kernel.bookings.as_ref(), Actor::System, payload).await?;
        let (action, details_map) = match &outcome {
            BookingOutcome::Created(appt) => (
                actions::SHOWING_BOOKING_CREATED,
                details(&[("appointmentId", json!(appt.id))]),
            ),
            BookingOutcome::Replayed(appt) => (
                actions::SHOWING_BOOKING_REPLAYED,
                details(&[("appointmentId", json!(appt.id))]),
            ),
            BookingOutcome::IdempotencyConflict { .. } => {
                (actions::SHOWING_BOOKING_IDEMPOTENCY_CONFLICT, HashMap::new())
            }
            BookingOutcome::SlotUnavailable { .. } => {
                (actions::SHOWING_BOOKING_SLOT_UNAVAILABLE, HashMap::new())
            }
            BookingOutcome::BookingConflict { .. } => (actions::SHOWING_BOOKING_CONFLICT, HashMap::new()),
            BookingOutcome::Forbidden { .. } | BookingOutcome::Failed(_) => {
                (actions::SHOWING_BOOKING_FAILED, HashMap::new())
            }
        };
        audit(
            "system",
            None,
            "conversation",
            &conversation.id.to_string(),
            action,
            details_map,
        );
        Ok(())
    }

    /// Step 8: computes the dispatch key, begins the attempt, calls the
    /// connector (or skips for a draft), and records the outcome. Returns
    /// whether an outbound message actually landed.
    async fn dispatch(
        &self,
        message_id: &Uuid,
        conversation: &crate::domain::Conversation,
        platform_account: &crate::domain::PlatformAccount,
        decision: &DecisionResult,
    ) -> anyhow::Result<bool> {
        let Some(body) = &decision.reply_body else {
            return Ok(false);
        };
        let status = match decision.outcome {
            crate::guardrails::Outcome::Send => "sent",
            crate::guardrails::Outcome::Draft => "draft",
            _ => return Ok(false),
        };

        let dispatch_key = compute_dispatch_key(
            message_id,
            &conversation.id,
            &conversation.external_thread_id,
            &platform_account.id,
            platform_account.platform.as_str(),
            status,
            body,
            &format!("{:?}", decision.intent),
            &format!("{:?}", decision.effective_intent),
        );

        let begin = self
            .kernel
            .queue
            .begin_dispatch_attempt(*message_id, &dispatch_key)
            .await?;
        if !begin.should_dispatch {
            audit(
                "system",
                None,
                "message",
                &message_id.to_string(),
                actions::AI_REPLY_DISPATCH_DUPLICATE_SUPPRESSED,
                HashMap::new(),
            );
            return Ok(false);
        }

        let delivery = if status == "sent" {
            audit(
                "system",
                None,
                "message",
                &message_id.to_string(),
                actions::AI_REPLY_SEND_ATTEMPTED,
                HashMap::new(),
            );
            match self.send_via_connector(platform_account, conversation, body).await {
                Ok(d) => d,
                Err(err) => {
                    self.record_dispatch_failure(*message_id, "dispatch_send", &err).await?;
                    return Err(err.into());
                }
            }
        } else {
            audit(
                "system",
                None,
                "message",
                &message_id.to_string(),
                actions::AI_REPLY_DRAFT_CREATED,
                HashMap::new(),
            );
            DeliveryRecord {
                external_message_id: format!("draft:{message_id}"),
                channel: platform_account.platform.as_str().to_string(),
                provider_status: "draft".to_string(),
            }
        };

        self.kernel
            .queue
            .complete_dispatch_attempt(*message_id, delivery.clone())
            .await?;

        let outcome = self
            .kernel
            .queue
            .insert_outbound(OutboundInsert {
                conversation_id: conversation.id,
                external_message_id: Some(delivery.external_message_id.clone()),
                body: body.clone(),
                sent_at: chrono::Utc::now(),
                review_status: if status == "draft" { Some("draft") } else { None },
            })
            .await?;

        Ok(outcome == InsertOutcome::Inserted)
    }

    async fn send_via_connector(
        &self,
        platform_account: &crate::domain::PlatformAccount,
        conversation: &crate::domain::Conversation,
        body: &str,
    ) -> Result<DeliveryRecord, DispatchError> {
        let account = AccountRef {
            account_id: platform_account.id,
            platform: platform_account.platform,
        };
        let outbound = OutboundPayload {
            external_thread_id: conversation.external_thread_id.clone(),
            body: body.to_string(),
        };

        let result = self
            .kernel
            .connectors
            .send_message_for_account(&account, &platform_account.credentials, &outbound)
            .await;

        match result {
            Ok(send_result) => Ok(DeliveryRecord {
                external_message_id: send_result.external_message_id,
                channel: send_result.channel,
                provider_status: send_result.provider_status,
            }),
            Err(exhausted) => Err(DispatchError::Connector(exhausted.last_error)),
        }
    }

    async fn record_dispatch_failure(
        &self,
        message_id: Uuid,
        failed_stage: &str,
        err: &DispatchError,
    ) -> anyhow::Result<()> {
        let (retry_exhausted, dlq_reason) = match err {
            DispatchError::Connector(ConnectorError::CircuitOpen { .. }) => {
                (true, Some(DlqReason::CircuitOpenExhausted))
            }
            DispatchError::Connector(ConnectorError::CaptchaRequired)
            | DispatchError::Connector(ConnectorError::BotChallenge) => {
                (true, Some(DlqReason::CaptchaExhausted))
            }
            _ => (false, None),
        };

        let retry = RetryRecord {
            attempts: 1,
            retry_exhausted,
            last_error: Some(err.to_string()),
        };
        self.kernel
            .queue
            .fail_dispatch_attempt(message_id, failed_stage, &err.to_string(), retry.clone(), dlq_reason)
            .await?;

        audit(
            "system",
            None,
            "message",
            &message_id.to_string(),
            actions::PLATFORM_DISPATCH_ERROR,
            details(&[("failedStage", json!(failed_stage))]),
        );

        if retry.retry_exhausted {
            audit(
                "system",
                None,
                "message",
                &message_id.to_string(),
                actions::PLATFORM_DISPATCH_DLQ,
                HashMap::new(),
            );
            audit(
                "system",
                None,
                "message",
                &message_id.to_string(),
                actions::AI_REPLY_DISPATCH_ESCALATED,
                HashMap::new(),
            );
        }

        Ok(())
    }
}

#[async_trait]
impl Service for Worker {
    fn name(&self) -> &'static str {
        "leasebot-worker"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> anyhow::Result<()> {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.run_cycle().await {
                Ok(count) => {
                    if count > 0 {
                        info!(count, "cycle completed");
                    }
                }
                Err(err) => error!(error = ?err, "cycle failed"),
            }

            if self.kernel.config.worker_run_once {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.kernel.config.worker_poll_interval) => {}
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, stopping after current cycle");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Resolves the next `workflowState`: outcomes with a hard landing state
/// win, otherwise a first tour-intent message advances `lead` only when a
/// reply actually went out (sent or drafted) for it, otherwise the state is
/// unchanged. A tour request guardrails escalated (no eligible reply) must
/// not leave `lead`, since no reply was sent or drafted on that thread and
/// the next inbound message is still a first touch. Forbidden combinations
/// are caught by `workflow::transition`'s guard.
fn next_workflow_state(
    current: WorkflowState,
    effective_intent: Intent,
    outcome: Option<WorkflowOutcome>,
    eligible: bool,
    decision_outcome: crate::guardrails::Outcome,
) -> WorkflowState {
    match outcome {
        Some(WorkflowOutcome::NotInterested) => WorkflowState::Archived,
        Some(WorkflowOutcome::ShowingConfirmed) => WorkflowState::ShowingConfirmed,
        Some(WorkflowOutcome::NoReply) => match current {
            WorkflowState::TourRequested => WorkflowState::FollowUp1,
            WorkflowState::FollowUp1 => WorkflowState::FollowUp2,
            other => other,
        },
        _ if effective_intent == Intent::TourRequest
            && current == WorkflowState::Lead
            && eligible
            && matches!(
                decision_outcome,
                crate::guardrails::Outcome::Send | crate::guardrails::Outcome::Draft
            ) =>
        {
            WorkflowState::TourRequested
        }
        _ => current,
    }
}

/// Unit linkage is an external capability (unit/listing CRUD lives outside
/// this crate); a message without a resolvable `unitId` in its ingest
/// metadata degrades to zero slot candidates, which guardrails already turn
/// into an escalation rather than a silent auto-send.
fn resolve_unit_id(message: &crate::domain::Message) -> Uuid {
    message
        .metadata
        .get("unitId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::nil)
}

fn resolve_pending_slot(message: &crate::domain::Message) -> Option<SlotCandidate> {
    message
        .metadata
        .get("pendingSlotConfirmation")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

fn details(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchKeyInput<'a> {
    message_id: &'a Uuid,
    conversation_id: &'a Uuid,
    external_thread_id: &'a str,
    platform_account_id: &'a Uuid,
    platform: &'a str,
    status: &'a str,
    body: &'a str,
    intent: &'a str,
    effective_intent: &'a str,
}

/// `dispatchKey = SHA-256(JSON{...})` with a fixed field order so the same
/// logical attempt always hashes to the same key.
#[allow(clippy::too_many_arguments)]
fn compute_dispatch_key(
    message_id: &Uuid,
    conversation_id: &Uuid,
    external_thread_id: &str,
    platform_account_id: &Uuid,
    platform: &str,
    status: &str,
    body: &str,
    intent: &str,
    effective_intent: &str,
) -> String {
    let payload = DispatchKeyInput {
        message_id,
        conversation_id,
        external_thread_id,
        platform_account_id,
        platform,
        status,
        body,
        intent,
        effective_intent,
    };
    let json = serde_json::to_vec(&payload).expect("dispatch key payload always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&json);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_key_is_deterministic() {
        let id = Uuid::new_v4();
        let key1 = compute_dispatch_key(&id, &id, "t", &id, "spareroom", "sent", "hi", "tour_request", "tour_request");
        let key2 = compute_dispatch_key(&id, &id, "t", &id, "spareroom", "sent", "hi", "tour_request", "tour_request");
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64);
    }

    #[test]
    fn dispatch_key_changes_with_body() {
        let id = Uuid::new_v4();
        let key1 = compute_dispatch_key(&id, &id, "t", &id, "spareroom", "sent", "hi", "tour_request", "tour_request");
        let key2 = compute_dispatch_key(&id, &id, "t", &id, "spareroom", "sent", "bye", "tour_request", "tour_request");
        assert_ne!(key1, key2);
    }

    #[test]
    fn tour_intent_advances_lead_to_tour_requested_when_a_reply_goes_out() {
        let next = next_workflow_state(
            WorkflowState::Lead,
            Intent::TourRequest,
            None,
            true,
            crate::guardrails::Outcome::Send,
        );
        assert_eq!(next, WorkflowState::TourRequested);

        let drafted = next_workflow_state(
            WorkflowState::Lead,
            Intent::TourRequest,
            None,
            true,
            crate::guardrails::Outcome::Draft,
        );
        assert_eq!(drafted, WorkflowState::TourRequested);
    }

    #[test]
    fn tour_intent_leaves_lead_unchanged_when_escalated() {
        let next = next_workflow_state(
            WorkflowState::Lead,
            Intent::TourRequest,
            None,
            false,
            crate::guardrails::Outcome::Escalate,
        );
        assert_eq!(next, WorkflowState::Lead);
    }

    #[test]
    fn not_interested_archives_regardless_of_state() {
        let next = next_workflow_state(
            WorkflowState::TourRequested,
            Intent::Unknown,
            Some(WorkflowOutcome::NotInterested),
            true,
            crate::guardrails::Outcome::Send,
        );
        assert_eq!(next, WorkflowState::Archived);
    }

    #[test]
    fn no_reply_advances_follow_up_chain() {
        let next = next_workflow_state(
            WorkflowState::TourRequested,
            Intent::Unknown,
            Some(WorkflowOutcome::NoReply),
            true,
            crate::guardrails::Outcome::Send,
        );
        assert_eq!(next, WorkflowState::FollowUp1);
    }
}
