use connectors::Platform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How an eligible reply is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "send_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    AutoSend,
    DraftOnly,
}

/// How the platform adapter is wired up for this account. Transport design
/// itself is out of scope here; carried only as an opaque label the
/// connector registry can branch on if it ever needs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMode {
    Rpa,
    Api,
}

/// A configured platform account. Credentials are symbolic references only
/// (`env:NAME` / `secret:NAME`); resolution happens in `connectors::credentials`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformAccount {
    pub id: Uuid,
    pub platform: Platform,
    pub is_active: bool,
    pub send_mode: SendMode,
    pub integration_mode: IntegrationMode,
    pub credentials: HashMap<String, String>,
}

impl PlatformAccount {
    /// Validate that every credential value is a symbolic reference. Inline
    /// literals must be rejected before the account is ever used.
    pub fn validate_credentials(&self) -> Result<(), String> {
        for (key, value) in &self.credentials {
            if !(value.starts_with("env:") || value.starts_with("secret:")) {
                return Err(format!(
                    "credential '{key}' must be an env:/secret: reference, got inline literal"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(creds: &[(&str, &str)]) -> PlatformAccount {
        PlatformAccount {
            id: Uuid::new_v4(),
            platform: Platform::Spareroom,
            is_active: true,
            send_mode: SendMode::AutoSend,
            integration_mode: IntegrationMode::Rpa,
            credentials: creds
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn accepts_symbolic_references() {
        let acct = account(&[("SPAREROOM_USERNAME", "env:SPAREROOM_USERNAME")]);
        assert!(acct.validate_credentials().is_ok());
    }

    #[test]
    fn rejects_inline_literal() {
        let acct = account(&[("SPAREROOM_USERNAME", "hunter2")]);
        assert!(acct.validate_credentials().is_err());
    }
}
