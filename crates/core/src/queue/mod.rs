//! Queue adapter: claim-leased fetch of pending inbound
//! messages, atomic dispatch-state transitions, outbound insert with
//! external-id dedup, and ingest dedup/conversation linkage.
//!
//! The trait exposes capabilities, not shapes — deliberately not a dynamic
//! maps-as-records surface. `postgres` is the only implementation; the
//! compare-and-set predicates it runs are SQL-side, never emulated in
//! application memory.

mod postgres;

pub use postgres::PostgresQueueAdapter;

use crate::domain::{
    Conversation, DeliveryRecord, DlqReason, Message, PlatformAccount, RetryRecord, WorkflowOutcome,
    WorkflowState,
};
use crate::error::QueueError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Joined projection returned by the claim query: the inbound message plus
/// enough context (conversation, platform policy) for the pipeline to run
/// without a second round trip.
#[derive(Debug, Clone)]
pub struct ClaimedMessage {
    pub message: Message,
    pub conversation: Conversation,
    pub platform_account: PlatformAccount,
}

/// Result of `beginDispatchAttempt`: a false `should_dispatch` carries the
/// winner's delivery record, the duplicate-suppression primitive that keeps
/// concurrent dispatch attempts from double-sending.
#[derive(Debug, Clone)]
pub struct DispatchBeginResult {
    pub should_dispatch: bool,
    pub existing_delivery: Option<DeliveryRecord>,
}

#[derive(Debug, Clone)]
pub struct OutboundInsert {
    pub conversation_id: Uuid,
    pub external_message_id: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub review_status: Option<&'static str>,
}

/// Whether an outbound insert landed a new row or hit the uniqueness
/// constraint on `(conversationId, externalMessageId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Deduplicated,
}

#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Claims up to `limit` inbound messages lacking `aiProcessedAt` whose
    /// claim lease is absent or expired, via `FOR UPDATE SKIP LOCKED`
    /// ordered `sentAt ASC, createdAt ASC`.
    async fn claim_pending(
        &self,
        worker_id: &str,
        limit: i64,
        claim_ttl_ms: i64,
    ) -> Result<Vec<ClaimedMessage>, QueueError>;

    /// Atomically promotes `dispatch.state` to `in_progress` when the
    /// existing key differs or the state is not in `{in_progress, completed}`.
    async fn begin_dispatch_attempt(
        &self,
        message_id: Uuid,
        dispatch_key: &str,
    ) -> Result<DispatchBeginResult, QueueError>;

    async fn complete_dispatch_attempt(
        &self,
        message_id: Uuid,
        delivery: DeliveryRecord,
    ) -> Result<(), QueueError>;

    async fn fail_dispatch_attempt(
        &self,
        message_id: Uuid,
        failed_stage: &str,
        error: &str,
        retry: RetryRecord,
        dlq_reason: Option<DlqReason>,
    ) -> Result<(), QueueError>;

    /// Inserts an outbound message, deduplicating on
    /// `(conversationId, externalMessageId)`. A conflict inserts no row and
    /// bumps nothing; a fresh insert bumps `conversation.last_message_at`.
    async fn insert_outbound(
        &self,
        outbound: OutboundInsert,
    ) -> Result<InsertOutcome, QueueError>;

    /// Marks an inbound message fully processed: patches `aiProcessedAt` and
    /// decision fields, removes `workerClaim`.
    async fn mark_inbound_processed(
        &self,
        message_id: Uuid,
        decision_metadata: serde_json::Value,
    ) -> Result<(), QueueError>;

    /// Dedups an inbound message on `(conversationId, externalMessageId)`;
    /// re-opens an archived conversation observed again; returns the linked
    /// conversation id and whether linkage was resolved vs. newly created.
    async fn ingest_inbound(
        &self,
        platform_account_id: Uuid,
        external_thread_id: &str,
        external_message_id: Option<&str>,
        body: &str,
        lead_name: Option<&str>,
        sent_at: DateTime<Utc>,
    ) -> Result<IngestLinkage, QueueError>;

    /// Persists the result of `transitionConversationWorkflow` /
    /// `syncShowingFromWorkflowOutcome`.
    async fn update_conversation_workflow(
        &self,
        conversation_id: Uuid,
        workflow_state: WorkflowState,
        workflow_outcome: Option<WorkflowOutcome>,
        showing_state: Option<&str>,
    ) -> Result<(), QueueError>;

    /// Active accounts within the platform filter, for the ingest step
    /// upstream of `claim_pending` in the "Ingest (adapters → queue adapter)
    /// → Worker Loop claims" data flow.
    async fn list_active_accounts(&self) -> Result<Vec<PlatformAccount>, QueueError>;
}

#[derive(Debug, Clone)]
pub struct IngestLinkage {
    pub conversation_id: Uuid,
    pub message_id: Option<Uuid>,
    pub resolved: bool,
    pub reopened: bool,
    /// Set when the no_reply recovery trigger fired on this arrival: the
    /// conversation moves back to `lead`.
    pub recovered_from_no_reply: bool,
}
