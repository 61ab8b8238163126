//! Connector registry: loads per-platform adapters, resolves
//! credentials, and wraps every adapter call with anti-bot pacing, circuit
//! breaking, and session-refresh-on-challenge retry composition.

use crate::circuit_breaker::{Admission, CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::credentials::{resolve_credentials, SecretSource};
use crate::pacing::PacingRegistry;
use crate::retry::{retry, BackoffConfig, RetryExhausted};
use crate::{
    AccountRef, ConnectorError, InboundMessage, OutboundPayload, Platform, PlatformAdapter,
    SendResult, SessionManager,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Per-platform credential map as stored on `PlatformAccount` (symbolic
/// references only).
pub type CredentialRefs = HashMap<String, String>;

pub struct RegistryConfig {
    pub backoff: BackoffConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub max_captcha_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            max_captcha_retries: 1,
        }
    }
}

/// The connector registry. Holds one adapter per supported platform plus
/// the shared, per-replica resilience state (in-memory maps keyed by
/// `platform:account:action`).
pub struct ConnectorRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
    session_manager: Arc<dyn SessionManager>,
    secrets: Arc<dyn SecretSource>,
    circuit_breakers: CircuitBreakerRegistry,
    pacing: PacingRegistry,
    config: RegistryConfig,
}

impl ConnectorRegistry {
    pub fn new(
        adapters: Vec<Arc<dyn PlatformAdapter>>,
        session_manager: Arc<dyn SessionManager>,
        secrets: Arc<dyn SecretSource>,
        config: RegistryConfig,
    ) -> Self {
        let mut by_platform = HashMap::new();
        for adapter in adapters {
            by_platform.insert(adapter.platform(), adapter);
        }
        Self {
            adapters: by_platform,
            session_manager,
            secrets,
            circuit_breakers: CircuitBreakerRegistry::new(config.circuit_breaker),
            pacing: PacingRegistry::new(),
            config,
        }
    }

    fn key(account: &AccountRef, action: &str) -> String {
        format!("{}:{}:{}", account.platform.as_str(), account.account_id, action)
    }

    async fn resolve(
        &self,
        account: &AccountRef,
        credentials: &CredentialRefs,
    ) -> Result<crate::ResolvedCredentials, ConnectorError> {
        resolve_credentials(account.platform, credentials, self.secrets.as_ref())
    }

    fn adapter_for(&self, platform: Platform) -> Result<&Arc<dyn PlatformAdapter>, ConnectorError> {
        self.adapters
            .get(&platform)
            .ok_or_else(|| ConnectorError::Permanent(format!("unknown platform: {platform:?}")))
    }

    /// Run one resilience-wrapped adapter call: pacing sleep, circuit-breaker
    /// admission, retry-with-session-refresh composition.
    async fn call_with_resilience<T, Call, CallFut>(
        &self,
        account: &AccountRef,
        action: &str,
        call: Call,
    ) -> Result<T, RetryExhausted<ConnectorError>>
    where
        Call: Fn() -> CallFut,
        CallFut: std::future::Future<Output = Result<T, ConnectorError>>,
    {
        let key = Self::key(account, action);
        let mut captcha_retries: u32 = 0;
        let mut last_error_was_challenge = false;

        let result = retry(
            &self.config.backoff,
            |_attempt| async {
                tokio::time::sleep(self.pacing.reserve(&key, account.platform.default_pacing()))
                    .await;

                match self.circuit_breakers.admit(&key) {
                    Admission::Rejected { retry_after_ms } => {
                        return Err(ConnectorError::CircuitOpen { retry_after_ms });
                    }
                    Admission::Allowed | Admission::Probe => {}
                }

                if last_error_was_challenge {
                    if let Err(e) = self
                        .session_manager
                        .refresh(account, "captcha_or_session_expired")
                        .await
                    {
                        warn!(account_id = %account.account_id, error = ?e, "session refresh failed");
                    }
                    info!(account_id = %account.account_id, "rpa_session_refresh_requested");
                    last_error_was_challenge = false;
                }

                let outcome = call().await;
                match &outcome {
                    Ok(_) => self.circuit_breakers.on_success(&key),
                    Err(_) => self.circuit_breakers.on_failure(&key),
                }
                outcome
            },
            |err, attempt| {
                let base_retryable = err.is_base_retryable();
                match err {
                    ConnectorError::CaptchaRequired | ConnectorError::BotChallenge => {
                        captcha_retries < self.config.max_captcha_retries
                    }
                    ConnectorError::CircuitOpen { .. } => false,
                    ConnectorError::CredentialMissing(_)
                    | ConnectorError::CredentialPlaintextForbidden(_)
                    | ConnectorError::Permanent(_) => false,
                    _ => base_retryable && attempt <= u32::MAX,
                }
            },
            |err, attempt, delay| {
                if matches!(
                    err,
                    ConnectorError::CaptchaRequired | ConnectorError::BotChallenge
                ) {
                    captcha_retries += 1;
                }
                if matches!(
                    err,
                    ConnectorError::CaptchaRequired
                        | ConnectorError::BotChallenge
                        | ConnectorError::SessionExpired
                ) {
                    last_error_was_challenge = true;
                }
                info!(
                    account_id = %account.account_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = ?err,
                    "rpa_retry_scheduled"
                );
            },
            |d: Duration| tokio::time::sleep(d),
        )
        .await;

        if let Err(exhausted) = &result {
            if matches!(exhausted.last_error, ConnectorError::CircuitOpen { .. }) {
                info!(account_id = %account.account_id, "rpa_circuit_open_fail_fast");
            }
        }

        result
    }

    /// Ingest pending inbound messages for an account.
    pub async fn ingest_messages_for_account(
        &self,
        account: &AccountRef,
        credentials: &CredentialRefs,
    ) -> Result<Vec<InboundMessage>, RetryExhausted<ConnectorError>> {
        let adapter = match self.adapter_for(account.platform) {
            Ok(a) => a.clone(),
            Err(e) => {
                return Err(RetryExhausted {
                    last_error: e,
                    attempts: 0,
                    retry_exhausted: false,
                })
            }
        };
        let resolved = match self.resolve(account, credentials).await {
            Ok(r) => r,
            Err(e) => {
                return Err(RetryExhausted {
                    last_error: e,
                    attempts: 0,
                    retry_exhausted: false,
                })
            }
        };

        let started = std::time::Instant::now();
        let result = self
            .call_with_resilience(account, "ingest", || adapter.ingest(account, &resolved))
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let p95_target_ms: u64 = 5_000;
        info!(
            account_id = %account.account_id,
            elapsed_ms,
            p95_target_ms,
            target_exceeded = elapsed_ms > p95_target_ms,
            "rpa_ingest_latency_measured"
        );
        result
    }

    /// Send an outbound reply through an account's platform channel.
    pub async fn send_message_for_account(
        &self,
        account: &AccountRef,
        credentials: &CredentialRefs,
        outbound: &OutboundPayload,
    ) -> Result<SendResult, RetryExhausted<ConnectorError>> {
        let adapter = match self.adapter_for(account.platform) {
            Ok(a) => a.clone(),
            Err(e) => {
                return Err(RetryExhausted {
                    last_error: e,
                    attempts: 0,
                    retry_exhausted: false,
                })
            }
        };
        let resolved = match self.resolve(account, credentials).await {
            Ok(r) => r,
            Err(e) => {
                return Err(RetryExhausted {
                    last_error: e,
                    attempts: 0,
                    retry_exhausted: false,
                })
            }
        };

        self.call_with_resilience(account, "send", || adapter.send(account, &resolved, outbound))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountRef, Platform, ResolvedCredentials};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAdapter {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PlatformAdapter for FlakyAdapter {
        fn platform(&self) -> Platform {
            Platform::Spareroom
        }

        async fn ingest(
            &self,
            _account: &AccountRef,
            _credentials: &ResolvedCredentials,
        ) -> Result<Vec<InboundMessage>, ConnectorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(ConnectorError::Transient("timeout".to_string()))
            } else {
                Ok(vec![])
            }
        }

        async fn send(
            &self,
            _account: &AccountRef,
            _credentials: &ResolvedCredentials,
            _outbound: &OutboundPayload,
        ) -> Result<SendResult, ConnectorError> {
            Ok(SendResult {
                external_message_id: "ext-1".to_string(),
                channel: "spareroom".to_string(),
                provider_status: "sent".to_string(),
            })
        }
    }

    struct NoopSessionManager;
    #[async_trait]
    impl SessionManager for NoopSessionManager {
        async fn refresh(&self, _account: &AccountRef, _reason: &str) -> Result<(), ConnectorError> {
            Ok(())
        }
    }

    struct EnvSecrets;
    impl SecretSource for EnvSecrets {
        fn lookup(&self, _name: &str) -> Option<String> {
            None
        }
    }

    fn test_account() -> AccountRef {
        AccountRef {
            account_id: uuid::Uuid::new_v4(),
            platform: Platform::Spareroom,
        }
    }

    fn test_credentials() -> CredentialRefs {
        let mut c = HashMap::new();
        c.insert("SPAREROOM_USERNAME".to_string(), "env:TEST_SR_USER".to_string());
        c.insert("SPAREROOM_PASSWORD".to_string(), "env:TEST_SR_PASS".to_string());
        c
    }

    #[tokio::test]
    async fn ingest_retries_transient_failures_until_success() {
        std::env::set_var("TEST_SR_USER", "u");
        std::env::set_var("TEST_SR_PASS", "p");

        let adapter = Arc::new(FlakyAdapter {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        });
        let registry = ConnectorRegistry::new(
            vec![adapter],
            Arc::new(NoopSessionManager),
            Arc::new(EnvSecrets),
            RegistryConfig {
                backoff: BackoffConfig {
                    retries: 3,
                    base_delay_ms: 1,
                    max_delay_ms: 2,
                    factor: 1.0,
                    jitter_ratio: 0.0,
                },
                ..RegistryConfig::default()
            },
        );

        let account = test_account();
        let result = registry
            .ingest_messages_for_account(&account, &test_credentials())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast_without_calling_adapter() {
        let adapter = Arc::new(FlakyAdapter {
            failures_before_success: 0,
            calls: AtomicU32::new(0),
        });
        let registry = ConnectorRegistry::new(
            vec![adapter],
            Arc::new(NoopSessionManager),
            Arc::new(EnvSecrets),
            RegistryConfig::default(),
        );

        let account = test_account();
        let result = registry
            .ingest_messages_for_account(&account, &HashMap::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err.last_error, ConnectorError::CredentialMissing(_)));
    }
}
