//! Per-(platform, account, action) circuit breaker.
//!
//! A three-state breaker: closed → open on consecutive failures, open →
//! half-open after cooldown, half-open allows exactly one serialized probe.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a half-open probe.
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

struct BreakerEntry {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// True while a half-open probe is in flight, to serialize probes.
    probe_in_flight: bool,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Outcome of asking the breaker whether a call may proceed.
pub enum Admission {
    Allowed,
    /// A half-open probe was granted; the caller must report success/failure
    /// via `on_success`/`on_failure` when done.
    Probe,
    Rejected { retry_after_ms: u64 },
}

/// Per-key (`platform:account:action`) in-memory circuit breaker map. State
/// lives per process replica; it is not shared or persisted across restarts.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    entries: DashMap<String, Mutex<BreakerEntry>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    pub fn admit(&self, key: &str) -> Admission {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(BreakerEntry::new()));
        let mut guard = entry.lock().unwrap_or_else(|p| p.into_inner());

        match guard.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => {
                if guard.probe_in_flight {
                    Admission::Rejected { retry_after_ms: 0 }
                } else {
                    guard.probe_in_flight = true;
                    Admission::Probe
                }
            }
            CircuitState::Open => {
                let opened_at = guard.opened_at.unwrap_or_else(Instant::now);
                let elapsed = opened_at.elapsed();
                let cooldown = Duration::from_millis(self.config.cooldown_ms);
                if elapsed >= cooldown {
                    guard.state = CircuitState::HalfOpen;
                    guard.probe_in_flight = true;
                    Admission::Probe
                } else {
                    let retry_after_ms = (cooldown - elapsed).as_millis() as u64;
                    Admission::Rejected { retry_after_ms }
                }
            }
        }
    }

    pub fn on_success(&self, key: &str) {
        if let Some(entry) = self.entries.get(key) {
            let mut guard = entry.lock().unwrap_or_else(|p| p.into_inner());
            guard.consecutive_failures = 0;
            guard.state = CircuitState::Closed;
            guard.probe_in_flight = false;
            guard.opened_at = None;
        }
    }

    pub fn on_failure(&self, key: &str) {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(BreakerEntry::new()));
        let mut guard = entry.lock().unwrap_or_else(|p| p.into_inner());

        guard.probe_in_flight = false;

        match guard.state {
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
                guard.consecutive_failures = self.config.failure_threshold;
            }
            _ => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.config.failure_threshold {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                }
            }
        }
    }

    pub fn state(&self, key: &str) -> CircuitState {
        self.entries
            .get(key)
            .map(|e| e.lock().unwrap_or_else(|p| p.into_inner()).state)
            .unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: 3,
            cooldown_ms: 50,
        })
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let reg = test_registry();
        let key = "spareroom:acct-1:send";

        for _ in 0..3 {
            assert!(matches!(reg.admit(key), Admission::Allowed));
            reg.on_failure(key);
        }

        assert_eq!(reg.state(key), CircuitState::Open);
        assert!(matches!(
            reg.admit(key),
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn success_resets_failure_count() {
        let reg = test_registry();
        let key = "roomies:acct-2:ingest";

        reg.on_failure(key);
        reg.on_failure(key);
        reg.on_success(key);
        reg.on_failure(key);
        reg.on_failure(key);

        // Only 2 consecutive failures since the reset; threshold is 3.
        assert_eq!(reg.state(key), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_is_serialized() {
        let reg = test_registry();
        let key = "renthop:acct-3:send";

        for _ in 0..3 {
            reg.on_failure(key);
        }
        std::thread::sleep(Duration::from_millis(60));

        assert!(matches!(reg.admit(key), Admission::Probe));
        // A second caller must not also get a probe concurrently.
        assert!(matches!(reg.admit(key), Admission::Rejected { .. }));
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let reg = test_registry();
        let key = "leasebreak:acct-4:send";

        for _ in 0..3 {
            reg.on_failure(key);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(reg.admit(key), Admission::Probe));
        reg.on_success(key);

        assert_eq!(reg.state(key), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_circuit() {
        let reg = test_registry();
        let key = "furnishedfinder:acct-5:send";

        for _ in 0..3 {
            reg.on_failure(key);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(reg.admit(key), Admission::Probe));
        reg.on_failure(key);

        assert_eq!(reg.state(key), CircuitState::Open);
    }
}
