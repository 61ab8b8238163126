//! Intent and workflow classification.
//!
//! Heuristic pattern matching lives here as `lazy_static` regexes over token
//! patterns. The optional AI classifier is a pluggable contract; its absence
//! or failure always falls back to the heuristic.

mod ai;
mod heuristic;

pub use ai::{AiClassification, AiClassifier, AiClassifierInput, RiskLevel};
pub use heuristic::{classify_intent, detect_follow_up, Intent};

use crate::domain::WorkflowOutcome;

/// Result of running the full classifier stage (heuristic, or AI override),
/// before guardrails run over it.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub intent: Intent,
    pub follow_up: bool,
    pub effective_intent: Intent,
    pub provider: &'static str,
    pub ambiguity: Option<String>,
    pub suggested_reply: Option<String>,
    pub reason_code: Option<String>,
    pub workflow_outcome: Option<WorkflowOutcome>,
    pub confidence: f32,
    pub risk_level: RiskLevel,
}

/// Runs the heuristic classifier and, if an AI classifier is supplied and
/// enabled, layers its override on top: AI intent overrides heuristic when
/// enabled; generation failure falls back to heuristic with
/// `provider="heuristic"`.
pub async fn classify(
    body: &str,
    has_recent_outbound: bool,
    fallback_intent: Intent,
    ai: Option<&(dyn AiClassifier + Send + Sync)>,
    ai_input: Option<AiClassifierInput<'_>>,
) -> ClassificationResult {
    let heuristic_intent = classify_intent(body);
    let follow_up = detect_follow_up(body, has_recent_outbound);
    let effective_intent = if follow_up {
        fallback_intent
    } else {
        heuristic_intent
    };

    let mut result = ClassificationResult {
        intent: heuristic_intent,
        follow_up,
        effective_intent,
        provider: "heuristic",
        ambiguity: None,
        suggested_reply: None,
        reason_code: None,
        workflow_outcome: None,
        confidence: 1.0,
        risk_level: RiskLevel::Low,
    };

    if let (Some(classifier), Some(input)) = (ai, ai_input) {
        match classifier.classify(input).await {
            Ok(ai_result) => {
                result.intent = ai_result.intent;
                result.effective_intent = if follow_up {
                    fallback_intent
                } else {
                    ai_result.intent
                };
                result.provider = "gemini";
                result.ambiguity = ai_result.ambiguity;
                result.suggested_reply = ai_result.suggested_reply;
                result.reason_code = ai_result.reason_code;
                result.workflow_outcome = ai_result.workflow_outcome;
                result.confidence = ai_result.confidence;
                result.risk_level = ai_result.risk_level;
            }
            Err(_) => {
                result.provider = "heuristic";
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_heuristic_without_ai() {
        let result = classify(
            "Can I tour tomorrow?",
            false,
            Intent::TourRequest,
            None,
            None,
        )
        .await;
        assert_eq!(result.intent, Intent::TourRequest);
        assert_eq!(result.provider, "heuristic");
    }

    #[tokio::test]
    async fn follow_up_uses_fallback_intent() {
        let result = classify(
            "just checking in",
            true,
            Intent::TourRequest,
            None,
            None,
        )
        .await;
        assert!(result.follow_up);
        assert_eq!(result.effective_intent, Intent::TourRequest);
    }
}
