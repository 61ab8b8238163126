//! Workflow state transitions and the explicit `no_reply → lead` recovery
//! edge.

use crate::domain::{Conversation, WorkflowOutcome, WorkflowState};
use crate::error::QueueError;

/// The workflow-outcome persistence map.
pub struct OutcomeEffects {
    pub workflow_outcome: Option<WorkflowOutcome>,
    pub showing_state: Option<&'static str>,
}

pub fn effects_for_outcome(outcome: WorkflowOutcome) -> OutcomeEffects {
    match outcome {
        WorkflowOutcome::HumanRequired => OutcomeEffects {
            workflow_outcome: Some(WorkflowOutcome::HumanRequired),
            showing_state: None,
        },
        WorkflowOutcome::ShowingConfirmed => OutcomeEffects {
            workflow_outcome: Some(WorkflowOutcome::ShowingConfirmed),
            showing_state: Some("confirmed"),
        },
        WorkflowOutcome::WantsReschedule => OutcomeEffects {
            workflow_outcome: Some(WorkflowOutcome::WantsReschedule),
            showing_state: Some("reschedule_requested"),
        },
        WorkflowOutcome::NoReply => OutcomeEffects {
            workflow_outcome: Some(WorkflowOutcome::NoReply),
            showing_state: None,
        },
        WorkflowOutcome::NotInterested => OutcomeEffects {
            workflow_outcome: Some(WorkflowOutcome::NotInterested),
            showing_state: Some("cancelled"),
        },
        WorkflowOutcome::GeneralQuestion => OutcomeEffects {
            workflow_outcome: None,
            showing_state: None,
        },
    }
}

/// Result of attempting a workflow transition: which state the conversation
/// ends up in, and whether the `no_reply` recovery edge fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub next_state: WorkflowState,
    pub recovered_from_no_reply: bool,
}

/// Applies the forbidden-transition guard, plus the explicit recovery
/// trigger: any new inbound on a conversation whose `workflowOutcome=no_reply`
/// moves it back to `lead` regardless of the guard table.
pub fn transition(
    conversation: &Conversation,
    next_state: WorkflowState,
    is_inbound_arrival: bool,
) -> Result<TransitionResult, QueueError> {
    if is_inbound_arrival && conversation.workflow_outcome == Some(WorkflowOutcome::NoReply) {
        return Ok(TransitionResult {
            next_state: WorkflowState::Lead,
            recovered_from_no_reply: true,
        });
    }

    if conversation.workflow_state == next_state || conversation.workflow_state.can_transition_to(next_state) {
        return Ok(TransitionResult {
            next_state,
            recovered_from_no_reply: false,
        });
    }

    Err(QueueError::ForbiddenTransition {
        from: format!("{:?}", conversation.workflow_state),
        to: format!("{next_state:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn conversation(state: WorkflowState, outcome: Option<WorkflowOutcome>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            platform_account_id: Uuid::new_v4(),
            external_thread_id: "thread-1".to_string(),
            assigned_agent_id: None,
            lead_name: None,
            status: crate::domain::ConversationStatus::Open,
            workflow_state: state,
            workflow_outcome: outcome,
            showing_state: None,
            last_message_at: Utc::now(),
        }
    }

    #[test]
    fn allowed_transition_succeeds() {
        let conv = conversation(WorkflowState::Lead, None);
        let result = transition(&conv, WorkflowState::TourRequested, false).unwrap();
        assert_eq!(result.next_state, WorkflowState::TourRequested);
        assert!(!result.recovered_from_no_reply);
    }

    #[test]
    fn forbidden_transition_is_rejected() {
        let conv = conversation(WorkflowState::ShowingConfirmed, None);
        let result = transition(&conv, WorkflowState::FollowUp2, false);
        assert!(result.is_err());
    }

    #[test]
    fn no_reply_recovers_to_lead_on_new_inbound() {
        let conv = conversation(WorkflowState::FollowUp2, Some(WorkflowOutcome::NoReply));
        let result = transition(&conv, WorkflowState::FollowUp2, true).unwrap();
        assert_eq!(result.next_state, WorkflowState::Lead);
        assert!(result.recovered_from_no_reply);
    }

    #[test]
    fn showing_confirmed_effects_map_to_confirmed_state() {
        let effects = effects_for_outcome(WorkflowOutcome::ShowingConfirmed);
        assert_eq!(effects.showing_state, Some("confirmed"));
    }
}
