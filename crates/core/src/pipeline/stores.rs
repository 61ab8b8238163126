//! Small capability interfaces the pipeline depends on, instead of dynamic
//! maps-as-records, for rules, templates, and slot options.

use crate::domain::{AutomationRule, Template};
use crate::pipeline::slot::SlotCandidate;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn find_rule(
        &self,
        platform_account_id: Uuid,
        intent: &str,
    ) -> anyhow::Result<Option<AutomationRule>>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn find_template(
        &self,
        platform_account_id: Uuid,
        name: &str,
    ) -> anyhow::Result<Option<Template>>;
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Fetches candidates scoped to the assigned agent first; callers fall
    /// back to the unit-only query when the agent-scoped one is empty.
    async fn fetch_candidates_for_agent(
        &self,
        unit_id: Uuid,
        agent_id: Uuid,
    ) -> anyhow::Result<Vec<SlotCandidate>>;

    async fn fetch_candidates_for_unit(&self, unit_id: Uuid) -> anyhow::Result<Vec<SlotCandidate>>;
}
