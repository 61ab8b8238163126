use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub platform_account_id: Option<Uuid>,
    pub name: String,
    pub locale: String,
    pub body: String,
    pub variables: Vec<String>,
    pub is_active: bool,
}

/// Resolves a template by name: platform-scoped templates shadow global ones
/// with the same name.
pub fn resolve_template<'a>(
    templates: &'a [Template],
    platform_account_id: Uuid,
    name: &str,
) -> Option<&'a Template> {
    templates
        .iter()
        .filter(|t| t.is_active && t.name == name)
        .find(|t| t.platform_account_id == Some(platform_account_id))
        .or_else(|| {
            templates
                .iter()
                .find(|t| t.is_active && t.name == name && t.platform_account_id.is_none())
        })
}
