use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "conversation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Archived,
}

/// Fine-grained lifecycle state, distinct from the coarse `WorkflowOutcome`
/// tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "workflow_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Lead,
    TourRequested,
    ShowingConfirmed,
    FollowUp1,
    FollowUp2,
    Archived,
}

impl WorkflowState {
    /// The allowed forward edges of the lifecycle. Anything not listed here,
    /// plus the explicit `no_reply` recovery edge handled separately in
    /// `workflow::transition`, is a forbidden transition.
    pub fn allowed_next(&self) -> &'static [WorkflowState] {
        use WorkflowState::*;
        match self {
            Lead => &[TourRequested, Archived],
            TourRequested => &[ShowingConfirmed, FollowUp1, Archived],
            ShowingConfirmed => &[FollowUp1, Archived],
            FollowUp1 => &[FollowUp2, ShowingConfirmed, Archived],
            FollowUp2 => &[Archived],
            Archived => &[],
        }
    }

    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        self.allowed_next().contains(&next)
    }
}

/// Coarse lifecycle marker separate from `WorkflowState`. Governs
/// downstream showing/follow-up side effects per the outcome-effects table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "workflow_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOutcome {
    GeneralQuestion,
    HumanRequired,
    NoReply,
    NotInterested,
    ShowingConfirmed,
    WantsReschedule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub platform_account_id: Uuid,
    pub external_thread_id: String,
    pub assigned_agent_id: Option<Uuid>,
    pub lead_name: Option<String>,
    pub status: ConversationStatus,
    pub workflow_state: WorkflowState,
    pub workflow_outcome: Option<WorkflowOutcome>,
    pub showing_state: Option<String>,
    pub last_message_at: DateTime<Utc>,
}
