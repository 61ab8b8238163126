//! Decision pipeline: orchestrates the classifier, guardrails,
//! and template renderer per claimed message.

pub mod machine;
pub mod slot;
pub mod stores;
pub mod stores_postgres;

use crate::classifier::{self, AiClassifier, AiClassifierInput, ClassificationResult, Intent};
use crate::domain::{AutomationRule, PlatformAccount, SendMode, Template, WorkflowOutcome};
use crate::guardrails::{self, GuardrailInputs, Outcome};
use crate::pipeline::machine::Machine;
use crate::pipeline::slot::{
    build_candidate_list, ArbitrationCommand, ArbitrationEvent, SlotArbitrationMachine, SlotCandidate,
};
use crate::pipeline::stores::{RuleStore, SlotStore, TemplateStore};
use crate::template_renderer;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DecisionResult {
    pub intent: Intent,
    pub effective_intent: Intent,
    pub follow_up: bool,
    pub outcome: Outcome,
    pub reply_body: Option<String>,
    pub workflow_outcome: Option<WorkflowOutcome>,
    pub confidence: f32,
    pub risk_level: crate::classifier::RiskLevel,
    pub escalation_reason_code: Option<&'static str>,
    pub selected_slot: Option<SlotCandidate>,
    pub pending_slot: Option<SlotCandidate>,
    pub guardrail_reasons: Vec<&'static str>,
    pub eligible: bool,
    pub eligibility_reason: Option<&'static str>,
}

pub struct PipelineInput<'a> {
    pub platform_account: &'a PlatformAccount,
    pub unit_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub inbound_body: &'a str,
    pub has_recent_outbound: bool,
    pub fallback_intent: Intent,
    pub pending_slot: Option<SlotCandidate>,
    pub template_context: HashMap<String, String>,
    pub max_slot_options: usize,
}

/// Runs classifier → policy → template for a single claimed message.
pub async fn run(
    input: PipelineInput<'_>,
    rule_store: &dyn RuleStore,
    template_store: &dyn TemplateStore,
    slot_store: &dyn SlotStore,
    ai: Option<&(dyn AiClassifier + Send + Sync)>,
) -> anyhow::Result<DecisionResult> {
    let candidates = load_candidates(input.unit_id, input.assigned_agent_id, slot_store).await?;
    let candidate_list = build_candidate_list(
        candidates,
        input.max_slot_options,
        input.pending_slot.clone(),
    );
    let has_slot_candidates = !candidate_list.is_empty();

    let classification = classifier::classify(
        input.inbound_body,
        input.has_recent_outbound,
        input.fallback_intent,
        ai,
        ai.map(|_| AiClassifierInput {
            inbound_body: input.inbound_body,
            has_recent_outbound: input.has_recent_outbound,
            conversation_context: &[],
            few_shot_examples: &[],
            playbook: "",
            gemini_model: "",
        }),
    )
    .await;

    let intent_key = intent_key(classification.effective_intent);
    let rule = rule_store
        .find_rule(input.platform_account.id, intent_key)
        .await?;
    let template = match &rule {
        Some(r) => {
            template_store
                .find_template(input.platform_account.id, &rule_template_name(r, intent_key))
                .await?
        }
        None => None,
    };

    let guardrail_inputs = GuardrailInputs {
        platform_is_active: input.platform_account.is_active,
        send_mode: input.platform_account.send_mode,
        body: input.inbound_body,
        rule: rule.as_ref(),
        template: template.as_ref(),
        has_slot_candidates,
    };
    let mut decision = guardrails::evaluate(&classification, &guardrail_inputs);

    let arbitration = SlotArbitrationMachine.decide(&ArbitrationEvent {
        pending_slot: input.pending_slot.clone(),
        reached_showing_confirmed: classification.workflow_outcome
            == Some(WorkflowOutcome::ShowingConfirmed),
        inbound_body: input.inbound_body.to_string(),
        candidates: candidate_list.clone(),
    });

    let (selected_slot, pending_slot, outcome_override) = match arbitration {
        Some(ArbitrationCommand::AcceptPendingSlot { slot }) => (Some(slot), None, None),
        Some(ArbitrationCommand::ProposeSingleSlot { slot }) => {
            (None, Some(slot), Some(WorkflowOutcome::GeneralQuestion))
        }
        None => (None, input.pending_slot.clone(), None),
    };

    if let Some(downgraded) = outcome_override {
        decision.workflow_outcome = Some(downgraded);
    }

    let reply_body = if matches!(decision.outcome, Outcome::Send | Outcome::Draft) {
        template.as_ref().map(|t| {
            let mut ctx = input.template_context.clone();
            ctx.insert(
                "slot_options".to_string(),
                render_slot_options(&candidate_list),
            );
            template_renderer::render(&t.body, &ctx)
        })
    } else {
        None
    };

    Ok(DecisionResult {
        intent: classification.intent,
        effective_intent: classification.effective_intent,
        follow_up: classification.follow_up,
        outcome: decision.outcome,
        reply_body,
        workflow_outcome: decision.workflow_outcome,
        confidence: classification.confidence,
        risk_level: classification.risk_level,
        escalation_reason_code: decision.escalation_reason_code,
        selected_slot,
        pending_slot,
        guardrail_reasons: decision.reasons,
        eligible: decision.eligibility.eligible,
        eligibility_reason: decision.eligibility.reason,
    })
}

async fn load_candidates(
    unit_id: Uuid,
    assigned_agent_id: Option<Uuid>,
    slot_store: &dyn SlotStore,
) -> anyhow::Result<Vec<SlotCandidate>> {
    if let Some(agent_id) = assigned_agent_id {
        let scoped = slot_store.fetch_candidates_for_agent(unit_id, agent_id).await?;
        if !scoped.is_empty() {
            return Ok(scoped);
        }
    }
    slot_store.fetch_candidates_for_unit(unit_id).await
}

fn intent_key(intent: Intent) -> &'static str {
    match intent {
        Intent::TourRequest => "tour_request",
        Intent::PricingQuestion => "pricing_question",
        Intent::AvailabilityQuestion => "availability_question",
        Intent::Unsubscribe => "unsubscribe",
        Intent::Unknown => "unknown",
    }
}

fn rule_template_name(rule: &AutomationRule, fallback: &str) -> String {
    rule.intent.clone().unwrap_or_else(|| fallback.to_string())
}

fn render_slot_options(candidates: &[SlotCandidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("{} ({})", c.label, c.starts_at.format("%Y-%m-%dT%H:%MZ")))
        .collect::<Vec<_>>()
        .join(", ")
}
