//! Adaptive per-host timeout profiles. Network fetch and navigation
//! timeouts shrink after consecutive successes and grow after timeouts, so
//! a slow host doesn't keep eating the configured default forever in
//! either direction.

use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

pub const MIN_TIMEOUT_SECS: u64 = 5;
pub const MAX_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const BACKOFF_MULTIPLIER: f64 = 1.5;
const SUCCESS_REDUCTION: f64 = 0.9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutProfile {
    pub host: String,
    pub timeout_secs: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub avg_response_time_ms: f64,
}

impl TimeoutProfile {
    fn new(host: String) -> Self {
        Self {
            host,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            consecutive_successes: 0,
            consecutive_failures: 0,
            avg_response_time_ms: 0.0,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        (self.successful_requests as f64 / self.total_requests as f64) * 100.0
    }

    fn record_success(&mut self, elapsed: Duration) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;

        let ms = elapsed.as_millis() as f64;
        self.avg_response_time_ms = if self.avg_response_time_ms == 0.0 {
            ms
        } else {
            0.8 * self.avg_response_time_ms + 0.2 * ms
        };

        if self.consecutive_successes >= 3 {
            let reduced = (self.timeout_secs as f64 * SUCCESS_REDUCTION) as u64;
            self.timeout_secs = reduced.max(MIN_TIMEOUT_SECS);
            self.consecutive_successes = 0;
        }
    }

    fn record_timeout(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;

        let grown = (self.timeout_secs as f64 * BACKOFF_MULTIPLIER) as u64;
        self.timeout_secs = grown.min(MAX_TIMEOUT_SECS);
    }
}

/// Shared, lock-guarded per-host store (§5 "per-host mutable state behind
/// a lock"). `DashMap` sharding keeps per-host updates from serializing on
/// a single mutex across the whole fleet.
#[derive(Default)]
pub struct TimeoutProfileStore {
    profiles: DashMap<String, TimeoutProfile>,
}

impl TimeoutProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout_for(&self, host: &str) -> Duration {
        self.profiles
            .get(host)
            .map(|p| p.timeout())
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn record_success(&self, host: &str, elapsed: Duration) {
        self.profiles
            .entry(host.to_string())
            .or_insert_with(|| TimeoutProfile::new(host.to_string()))
            .record_success(elapsed);
    }

    pub fn record_timeout(&self, host: &str) {
        self.profiles
            .entry(host.to_string())
            .or_insert_with(|| TimeoutProfile::new(host.to_string()))
            .record_timeout();
    }

    pub fn profile(&self, host: &str) -> Option<TimeoutProfile> {
        self.profiles.get(host).map(|p| p.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_when_unseen() {
        let store = TimeoutProfileStore::new();
        assert_eq!(
            store.timeout_for("example.com"),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn consecutive_successes_shrink_timeout() {
        let store = TimeoutProfileStore::new();
        for _ in 0..4 {
            store.record_success("fast.example", Duration::from_millis(100));
        }
        assert!(store.timeout_for("fast.example") < Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn timeout_grows_and_is_bounded() {
        let store = TimeoutProfileStore::new();
        for _ in 0..20 {
            store.record_timeout("slow.example");
        }
        assert_eq!(
            store.timeout_for("slow.example"),
            Duration::from_secs(MAX_TIMEOUT_SECS)
        );
    }
}
