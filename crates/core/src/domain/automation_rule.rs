use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    IntentMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendReply,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub platform_account_id: Uuid,
    pub trigger_type: TriggerType,
    pub action_type: ActionType,
    pub intent: Option<String>,
    pub template_id: Option<Uuid>,
    pub priority: i32,
    pub is_enabled: bool,
    /// Used only to break ties after `priority`; lowest priority wins, then
    /// oldest.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Picks the winning rule for an intent: lowest `priority` first, then
/// oldest `created_at`.
pub fn select_rule<'a>(rules: &'a [AutomationRule], intent: &str) -> Option<&'a AutomationRule> {
    rules
        .iter()
        .filter(|r| r.is_enabled && r.intent.as_deref() == Some(intent))
        .min_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        })
}
