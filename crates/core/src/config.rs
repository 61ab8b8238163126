//! Process-wide configuration, loaded once at startup.
//!
//! Credential values are never read eagerly here — only the symbolic
//! reference strings flow through `PlatformAccount.credentials`; resolution
//! to `env:`/`secret:` happens in `connectors::credentials`.

use crate::error::ConfigError;
use connectors::Platform;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendModeDefault {
    AutoSend,
    DraftOnly,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub worker_poll_interval: Duration,
    pub worker_queue_batch_size: i64,
    pub worker_run_once: bool,
    pub worker_claim_ttl: Duration,
    pub worker_instance_id: String,

    pub platform_default_send_mode: SendModeDefault,
    pub autoreply_allow_lead_names: Vec<String>,
    pub autoreply_max_message_age: Duration,
    pub autoreply_slot_option_limit: usize,

    pub rpa_runtime: String,
}

impl Config {
    /// Loads from the environment via `dotenvy` + `std::env::var`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let worker_poll_interval_ms = parse_env_u64("WORKER_POLL_INTERVAL_MS", 15_000)?;
        let worker_claim_ttl_ms = parse_env_u64("WORKER_CLAIM_TTL_MS", 60_000)?;
        let worker_queue_batch_size = parse_env_i64("WORKER_QUEUE_BATCH_SIZE", 10)?;
        let worker_run_once = std::env::var("WORKER_RUN_ONCE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let worker_instance_id = std::env::var("WORKER_INSTANCE_ID")
            .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4()));

        let platform_default_send_mode = match std::env::var("PLATFORM_DEFAULT_SEND_MODE")
            .unwrap_or_else(|_| "draft_only".to_string())
            .as_str()
        {
            "auto_send" => SendModeDefault::AutoSend,
            "draft_only" => SendModeDefault::DraftOnly,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "PLATFORM_DEFAULT_SEND_MODE".to_string(),
                    value: other.to_string(),
                })
            }
        };

        let autoreply_allow_lead_names = std::env::var("WORKER_AUTOREPLY_ALLOW_LEAD_NAMES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let autoreply_max_message_age_minutes =
            parse_env_u64("WORKER_AUTOREPLY_MAX_MESSAGE_AGE_MINUTES", 1440)?;
        let autoreply_slot_option_limit =
            parse_env_u64("WORKER_AUTOREPLY_SLOT_OPTION_LIMIT", 4)? as usize;

        let rpa_runtime = std::env::var("LEASE_BOT_RPA_RUNTIME").unwrap_or_default();
        if cfg!(not(debug_assertions)) && rpa_runtime != "playwright" {
            return Err(ConfigError::RuntimeGuard(
                "LEASE_BOT_RPA_RUNTIME must be 'playwright' outside of debug builds".to_string(),
            ));
        }

        Ok(Self {
            worker_poll_interval: Duration::from_millis(worker_poll_interval_ms),
            worker_queue_batch_size,
            worker_run_once,
            worker_claim_ttl: Duration::from_millis(worker_claim_ttl_ms),
            worker_instance_id,
            platform_default_send_mode,
            autoreply_allow_lead_names,
            autoreply_max_message_age: Duration::from_secs(autoreply_max_message_age_minutes * 60),
            autoreply_slot_option_limit,
            rpa_runtime,
        })
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

/// Logs first-4-chars-then-mask for a credential-bearing env var.
pub fn log_masked_env(name: &str) {
    match std::env::var(name) {
        Ok(val) if val.is_empty() => tracing::info!("  {}: (empty)", name),
        Ok(val) => {
            let show = std::cmp::min(4, val.len());
            tracing::info!(
                "  {}: {}{}  ({} chars)",
                name,
                &val[..show],
                "*".repeat(val.len().saturating_sub(show)),
                val.len()
            );
        }
        Err(_) => tracing::warn!("  {}: NOT SET", name),
    }
}

/// Closed set of platforms this deployment ever fans out to. Used to fail
/// fast on an unrecognized platform string.
pub fn known_platforms() -> &'static [Platform] {
    &[
        Platform::Spareroom,
        Platform::Roomies,
        Platform::Leasebreak,
        Platform::Renthop,
        Platform::Furnishedfinder,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_platforms_has_five_entries() {
        assert_eq!(known_platforms().len(), 5);
    }
}
