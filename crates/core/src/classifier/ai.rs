use super::Intent;
use crate::domain::WorkflowOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// The AI classifier contract input — `geminiModel` and the enable/disable
/// switch come from configuration, not this struct.
pub struct AiClassifierInput<'a> {
    pub inbound_body: &'a str,
    pub has_recent_outbound: bool,
    pub conversation_context: &'a [String],
    pub few_shot_examples: &'a [String],
    pub playbook: &'a str,
    pub gemini_model: &'a str,
}

#[derive(Debug, Clone)]
pub struct AiClassification {
    pub intent: Intent,
    pub ambiguity: Option<String>,
    pub suggested_reply: Option<String>,
    pub reason_code: Option<String>,
    pub workflow_outcome: Option<WorkflowOutcome>,
    pub confidence: f32,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("ai classification failed: {0}")]
pub struct AiClassifierError(pub String);

/// The pluggable AI classifier surface: only the wire shape is named here,
/// not the provider — this crate never depends on the provider's client
/// directly.
#[async_trait]
pub trait AiClassifier {
    async fn classify(
        &self,
        input: AiClassifierInput<'_>,
    ) -> Result<AiClassification, AiClassifierError>;
}
