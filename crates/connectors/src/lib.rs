//! Platform connector contract.
//!
//! This crate is the only surface the decision pipeline depends on for
//! talking to the five external listing platforms. It does not know about
//! messages, conversations, or showings — it only moves bytes in and out
//! through a normalized adapter contract, and layers resilience (anti-bot
//! pacing, circuit breaking, session refresh) around that contract.

pub mod adapters;
pub mod circuit_breaker;
pub mod credentials;
pub mod pacing;
pub mod registry;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The five supported listing platforms. Fixed and closed — an unknown
/// platform string must fail fast rather than silently no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Spareroom,
    Roomies,
    Leasebreak,
    Renthop,
    Furnishedfinder,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Spareroom => "spareroom",
            Platform::Roomies => "roomies",
            Platform::Leasebreak => "leasebreak",
            Platform::Renthop => "renthop",
            Platform::Furnishedfinder => "furnishedfinder",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "spareroom" => Some(Platform::Spareroom),
            "roomies" => Some(Platform::Roomies),
            "leasebreak" => Some(Platform::Leasebreak),
            "renthop" => Some(Platform::Renthop),
            "furnishedfinder" => Some(Platform::Furnishedfinder),
            _ => None,
        }
    }

    /// Required credential keys for this platform. Declared per platform so
    /// resolution can fail fast on a missing key before any network call.
    pub fn required_credential_keys(&self) -> &'static [&'static str] {
        match self {
            Platform::Spareroom => &["SPAREROOM_USERNAME", "SPAREROOM_PASSWORD"],
            Platform::Roomies => &["ROOMIES_USERNAME", "ROOMIES_PASSWORD"],
            Platform::Leasebreak => &["LEASEBREAK_API_KEY"],
            Platform::Renthop => &["RENTHOP_USERNAME", "RENTHOP_PASSWORD"],
            Platform::Furnishedfinder => &["FURNISHEDFINDER_API_KEY"],
        }
    }

    /// Default anti-bot pacing for this platform (min interval, jitter):
    /// minInterval 1100-1500ms, jitter 250-450ms.
    pub fn default_pacing(&self) -> pacing::PacingConfig {
        match self {
            Platform::Spareroom => pacing::PacingConfig::new(1100, 250),
            Platform::Roomies => pacing::PacingConfig::new(1300, 350),
            Platform::Leasebreak => pacing::PacingConfig::new(1200, 300),
            Platform::Renthop => pacing::PacingConfig::new(1500, 450),
            Platform::Furnishedfinder => pacing::PacingConfig::new(1400, 400),
        }
    }
}

/// A message as ingested from an external platform, before it is persisted
/// as a domain `Message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub external_thread_id: String,
    pub external_message_id: Option<String>,
    pub body: String,
    pub lead_name: Option<String>,
    pub lead_contact: Option<String>,
    pub channel: String,
    pub sent_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// An outbound reply to send through a platform channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub external_thread_id: String,
    pub body: String,
}

/// Result of a successful send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub external_message_id: String,
    pub channel: String,
    pub provider_status: String,
}

/// Credentials resolved for a single account. Adapters only ever see
/// resolved secret *values*; the symbolic-reference bookkeeping lives in
/// `credentials`.
#[derive(Clone)]
pub struct ResolvedCredentials(pub HashMap<String, String>);

impl ResolvedCredentials {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }
}

/// An account as presented to a connector: enough to ingest/send, nothing
/// about policy or send-mode (that lives with the queue/policy layers).
#[derive(Debug, Clone)]
pub struct AccountRef {
    pub account_id: uuid::Uuid,
    pub platform: Platform,
}

/// Normalized connector error codes.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("captcha required")]
    CaptchaRequired,
    #[error("bot challenge encountered")]
    BotChallenge,
    #[error("session expired")]
    SessionExpired,
    #[error("circuit open, retry after {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },
    #[error("credential missing: {0}")]
    CredentialMissing(String),
    #[error("credential plaintext forbidden: {0}")]
    CredentialPlaintextForbidden(String),
    #[error("transient platform error: {0}")]
    Transient(String),
    #[error("non-retryable platform error: {0}")]
    Permanent(String),
}

impl ConnectorError {
    /// Base retryability, before circuit-breaker/session-refresh composition
    /// in `registry::RetryPolicy`.
    pub fn is_base_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::SessionExpired | ConnectorError::Transient(_)
        )
    }

    /// Classify a raw adapter error message into a normalized error code by
    /// pattern-matching the message text and HTTP status.
    pub fn normalize(raw: &str, http_status: Option<u16>) -> Self {
        let lowered = raw.to_lowercase();
        if lowered.contains("captcha") || lowered.contains("challenge") {
            return ConnectorError::CaptchaRequired;
        }
        if lowered.contains("cloudflare") {
            return ConnectorError::BotChallenge;
        }
        if matches!(http_status, Some(401) | Some(419))
            || lowered.contains("session expired")
            || lowered.contains("not authenticated")
        {
            return ConnectorError::SessionExpired;
        }
        match http_status {
            Some(429) => ConnectorError::Transient(raw.to_string()),
            Some(s) if s >= 500 => ConnectorError::Transient(raw.to_string()),
            Some(s) if (400..500).contains(&s) => ConnectorError::Permanent(raw.to_string()),
            _ => ConnectorError::Transient(raw.to_string()),
        }
    }
}

/// The per-platform adapter contract. Adapters are pure I/O:
/// no pacing, no circuit breaking, no retrying — the registry wraps each
/// call with that resilience.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    async fn ingest(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
    ) -> Result<Vec<InboundMessage>, ConnectorError>;

    async fn send(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
        outbound: &OutboundPayload,
    ) -> Result<SendResult, ConnectorError>;
}

/// Session manager contract: called whenever the registry observes a
/// captcha/session-expired error, before the next retry attempt.
#[async_trait]
pub trait SessionManager: Send + Sync {
    async fn refresh(&self, account: &AccountRef, reason: &str) -> Result<(), ConnectorError>;
}
