//! Anti-bot pacing: before each attempt, sleep until
//! `lastAttemptTs + minIntervalMs + jitter`, then record the new timestamp.
//! State is per `platform:account:action`, in-memory, per-replica.

use dashmap::DashMap;
use rand::Rng;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct PacingConfig {
    pub min_interval_ms: u64,
    pub jitter_ms: u64,
}

impl PacingConfig {
    pub fn new(min_interval_ms: u64, jitter_ms: u64) -> Self {
        Self {
            min_interval_ms,
            jitter_ms,
        }
    }
}

pub struct PacingRegistry {
    last_attempt: DashMap<String, Instant>,
}

impl PacingRegistry {
    pub fn new() -> Self {
        Self {
            last_attempt: DashMap::new(),
        }
    }

    /// Returns the duration to sleep before the next attempt may proceed,
    /// and immediately reserves the slot by recording `now` as the new
    /// last-attempt timestamp (so two concurrent callers don't both compute
    /// a zero wait).
    pub fn reserve(&self, key: &str, config: PacingConfig) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter = if config.jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=config.jitter_ms)
        };
        let required_gap = Duration::from_millis(config.min_interval_ms + jitter);

        let now = Instant::now();
        let wait = match self.last_attempt.get(key) {
            Some(last) => {
                let elapsed = now.saturating_duration_since(*last);
                required_gap.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        };

        self.last_attempt.insert(key.to_string(), now + wait);
        wait
    }
}

impl Default for PacingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_requires_no_wait() {
        let reg = PacingRegistry::new();
        let wait = reg.reserve("spareroom:acct-1:ingest", PacingConfig::new(1000, 0));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn back_to_back_calls_require_the_minimum_gap() {
        let reg = PacingRegistry::new();
        let key = "spareroom:acct-1:send";
        let config = PacingConfig::new(1000, 0);

        let first_wait = reg.reserve(key, config);
        assert_eq!(first_wait, Duration::ZERO);

        let second_wait = reg.reserve(key, config);
        assert!(second_wait > Duration::from_millis(900));
        assert!(second_wait <= Duration::from_millis(1000));
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let reg = PacingRegistry::new();
        let config = PacingConfig::new(1000, 0);

        reg.reserve("spareroom:acct-1:send", config);
        let wait = reg.reserve("spareroom:acct-2:send", config);
        assert_eq!(wait, Duration::ZERO);
    }
}
