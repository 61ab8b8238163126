//! Guardrails & policy gate. Stages run in order; the first
//! negative result determines eligibility.

use crate::classifier::{ClassificationResult, Intent, RiskLevel};
use crate::domain::{AutomationRule, SendMode, Template, WorkflowOutcome};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LEGAL_THREAT_REGEX: Regex =
        Regex::new(r"(?i)\b(lawyer|attorney|sue|lawsuit|legal action|file a complaint)\b").unwrap();
    static ref ABUSIVE_LANGUAGE_REGEX: Regex =
        Regex::new(r"(?i)\b(idiot|scam|fraud|f\*?u\*?c\*?k|asshole)\b").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Send,
    Draft,
    Escalate,
    Blocked,
}

#[derive(Debug, Clone)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct GuardrailDecision {
    pub outcome: Outcome,
    pub eligibility: Eligibility,
    pub escalation_reason_code: Option<&'static str>,
    pub workflow_outcome: Option<WorkflowOutcome>,
    pub review_status: Option<&'static str>,
    pub action_queue: Option<&'static str>,
    pub reasons: Vec<&'static str>,
}

/// Inputs the gate needs beyond the classification result itself.
pub struct GuardrailInputs<'a> {
    pub platform_is_active: bool,
    pub send_mode: SendMode,
    pub body: &'a str,
    pub rule: Option<&'a AutomationRule>,
    pub template: Option<&'a Template>,
    pub has_slot_candidates: bool,
}

/// Runs the 8-stage gate and returns the first matching outcome. Later
/// stages never run once an earlier one decides.
pub fn evaluate(classification: &ClassificationResult, inputs: &GuardrailInputs) -> GuardrailDecision {
    let mut reasons = Vec::new();

    // 1. Platform inactive.
    if !inputs.platform_is_active {
        reasons.push("policy_platform_inactive");
        return GuardrailDecision {
            outcome: Outcome::Blocked,
            eligibility: Eligibility {
                eligible: false,
                reason: Some("policy_platform_inactive"),
            },
            escalation_reason_code: None,
            workflow_outcome: None,
            review_status: None,
            action_queue: None,
            reasons,
        };
    }

    // 2. Unsubscribe intent.
    if classification.effective_intent == Intent::Unsubscribe {
        reasons.push("escalate_unsubscribe_requested");
        return GuardrailDecision {
            outcome: Outcome::Escalate,
            eligibility: Eligibility {
                eligible: false,
                reason: Some("escalate_unsubscribe_requested"),
            },
            escalation_reason_code: Some("escalate_unsubscribe_requested"),
            workflow_outcome: None,
            review_status: None,
            action_queue: None,
            reasons,
        };
    }

    // 3. Unsafe content patterns.
    if let Some(pattern) = unsafe_pattern(inputs.body) {
        reasons.push(pattern);
        return GuardrailDecision {
            outcome: Outcome::Escalate,
            eligibility: Eligibility {
                eligible: false,
                reason: Some(pattern),
            },
            escalation_reason_code: Some(pattern),
            workflow_outcome: None,
            review_status: Some("hold"),
            action_queue: Some("agent_action"),
            reasons,
        };
    }

    // 4. Non-tour intent without rule or template.
    if classification.effective_intent != Intent::TourRequest
        && (inputs.rule.is_none() || inputs.template.is_none())
    {
        reasons.push("escalate_non_tour_intent");
        return GuardrailDecision {
            outcome: Outcome::Escalate,
            eligibility: Eligibility {
                eligible: false,
                reason: Some("escalate_non_tour_intent"),
            },
            escalation_reason_code: Some("escalate_non_tour_intent"),
            workflow_outcome: None,
            review_status: None,
            action_queue: None,
            reasons,
        };
    }

    // 5. Tour intent without candidate slots.
    if classification.effective_intent == Intent::TourRequest && !inputs.has_slot_candidates {
        reasons.push("escalate_no_slot_candidates");
        return GuardrailDecision {
            outcome: Outcome::Escalate,
            eligibility: Eligibility {
                eligible: false,
                reason: Some("escalate_no_slot_candidates"),
            },
            escalation_reason_code: Some("escalate_no_slot_candidates"),
            workflow_outcome: None,
            review_status: None,
            action_queue: None,
            reasons,
        };
    }

    // 6. Human-required coercion.
    let human_required = classification.workflow_outcome == Some(WorkflowOutcome::HumanRequired)
        || classification.confidence < 0.5
        || matches!(classification.risk_level, RiskLevel::High | RiskLevel::Critical);
    if human_required {
        reasons.push("human_required");
        return GuardrailDecision {
            outcome: Outcome::Escalate,
            eligibility: Eligibility {
                eligible: false,
                reason: Some("human_required"),
            },
            escalation_reason_code: None,
            workflow_outcome: Some(WorkflowOutcome::HumanRequired),
            review_status: Some("hold"),
            action_queue: Some("agent_action"),
            reasons,
        };
    }

    // 7. Draft-only gate.
    let rule_disabled = inputs.rule.map(|r| !r.is_enabled).unwrap_or(false);
    if inputs.send_mode == SendMode::DraftOnly || rule_disabled {
        reasons.push("policy_draft_required");
        return GuardrailDecision {
            outcome: Outcome::Draft,
            eligibility: Eligibility {
                eligible: true,
                reason: Some("policy_draft_required"),
            },
            escalation_reason_code: None,
            workflow_outcome: classification.workflow_outcome,
            review_status: None,
            action_queue: None,
            reasons,
        };
    }

    // 8. Send.
    GuardrailDecision {
        outcome: Outcome::Send,
        eligibility: Eligibility {
            eligible: true,
            reason: None,
        },
        escalation_reason_code: None,
        workflow_outcome: classification.workflow_outcome,
        review_status: None,
        action_queue: None,
        reasons,
    }
}

fn unsafe_pattern(body: &str) -> Option<&'static str> {
    if LEGAL_THREAT_REGEX.is_match(body) {
        return Some("escalate_legal_threat");
    }
    if ABUSIVE_LANGUAGE_REGEX.is_match(body) {
        return Some("escalate_abusive_language");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn classification(intent: Intent, confidence: f32, risk: RiskLevel) -> ClassificationResult {
        ClassificationResult {
            intent,
            follow_up: false,
            effective_intent: intent,
            provider: "heuristic",
            ambiguity: None,
            suggested_reply: None,
            reason_code: None,
            workflow_outcome: None,
            confidence,
            risk_level: risk,
        }
    }

    fn rule(enabled: bool) -> AutomationRule {
        AutomationRule {
            id: Uuid::new_v4(),
            platform_account_id: Uuid::new_v4(),
            trigger_type: crate::domain::TriggerType::IntentMatch,
            action_type: crate::domain::ActionType::SendReply,
            intent: Some("tour_request".to_string()),
            template_id: Some(Uuid::new_v4()),
            priority: 1,
            is_enabled: enabled,
            created_at: Utc::now(),
        }
    }

    fn template() -> Template {
        Template {
            id: Uuid::new_v4(),
            platform_account_id: None,
            name: "tour_request".to_string(),
            locale: "en-US".to_string(),
            body: "Thanks {{lead_name}}".to_string(),
            variables: vec!["lead_name".to_string()],
            is_active: true,
        }
    }

    #[test]
    fn inactive_platform_blocks() {
        let c = classification(Intent::TourRequest, 0.9, RiskLevel::Low);
        let rule = rule(true);
        let tmpl = template();
        let inputs = GuardrailInputs {
            platform_is_active: false,
            send_mode: SendMode::AutoSend,
            body: "hi",
            rule: Some(&rule),
            template: Some(&tmpl),
            has_slot_candidates: true,
        };
        let decision = evaluate(&c, &inputs);
        assert_eq!(decision.outcome, Outcome::Blocked);
    }

    #[test]
    fn unsubscribe_escalates() {
        let c = classification(Intent::Unsubscribe, 0.9, RiskLevel::Low);
        let rule = rule(true);
        let tmpl = template();
        let inputs = GuardrailInputs {
            platform_is_active: true,
            send_mode: SendMode::AutoSend,
            body: "stop messaging me",
            rule: Some(&rule),
            template: Some(&tmpl),
            has_slot_candidates: true,
        };
        let decision = evaluate(&c, &inputs);
        assert_eq!(decision.outcome, Outcome::Escalate);
        assert_eq!(
            decision.escalation_reason_code,
            Some("escalate_unsubscribe_requested")
        );
    }

    #[test]
    fn tour_without_slots_escalates() {
        let c = classification(Intent::TourRequest, 0.9, RiskLevel::Low);
        let rule = rule(true);
        let tmpl = template();
        let inputs = GuardrailInputs {
            platform_is_active: true,
            send_mode: SendMode::AutoSend,
            body: "can I tour?",
            rule: Some(&rule),
            template: Some(&tmpl),
            has_slot_candidates: false,
        };
        let decision = evaluate(&c, &inputs);
        assert_eq!(
            decision.escalation_reason_code,
            Some("escalate_no_slot_candidates")
        );
    }

    #[test]
    fn low_confidence_coerces_human_required() {
        let c = classification(Intent::TourRequest, 0.2, RiskLevel::Low);
        let rule = rule(true);
        let tmpl = template();
        let inputs = GuardrailInputs {
            platform_is_active: true,
            send_mode: SendMode::AutoSend,
            body: "can I tour?",
            rule: Some(&rule),
            template: Some(&tmpl),
            has_slot_candidates: true,
        };
        let decision = evaluate(&c, &inputs);
        assert_eq!(decision.workflow_outcome, Some(WorkflowOutcome::HumanRequired));
    }

    #[test]
    fn draft_only_send_mode_produces_draft_outcome() {
        let c = classification(Intent::TourRequest, 0.9, RiskLevel::Low);
        let rule = rule(true);
        let tmpl = template();
        let inputs = GuardrailInputs {
            platform_is_active: true,
            send_mode: SendMode::DraftOnly,
            body: "can I tour?",
            rule: Some(&rule),
            template: Some(&tmpl),
            has_slot_candidates: true,
        };
        let decision = evaluate(&c, &inputs);
        assert_eq!(decision.outcome, Outcome::Draft);
        assert_eq!(decision.eligibility.reason, Some("policy_draft_required"));
    }

    #[test]
    fn eligible_send_path() {
        let c = classification(Intent::TourRequest, 0.9, RiskLevel::Low);
        let rule = rule(true);
        let tmpl = template();
        let inputs = GuardrailInputs {
            platform_is_active: true,
            send_mode: SendMode::AutoSend,
            body: "can I tour?",
            rule: Some(&rule),
            template: Some(&tmpl),
            has_slot_candidates: true,
        };
        let decision = evaluate(&c, &inputs);
        assert_eq!(decision.outcome, Outcome::Send);
        assert!(decision.eligibility.eligible);
    }
}
