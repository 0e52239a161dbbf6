//! Per-host token bucket with randomized base delay and exponential backoff
//! on 429/503/timeout, per the dispatcher's rate limiting contract.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub base_delay_min: Duration,
    pub base_delay_max: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub max_retries: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay_min: Duration::from_millis(100),
            base_delay_max: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct HostState {
    /// Current backoff delay; resets to a fresh randomized base delay after
    /// a success.
    current_delay: Duration,
    consecutive_failures: u32,
    last_request: Instant,
}

/// What a caller should do after asking the limiter for permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// Proceed; the limiter already applied its pacing delay.
    Proceed,
    /// Retries against this host are exhausted; the crawl result should
    /// report `success=false, status_code=<last>`.
    RetriesExhausted { last_status_code: Option<u16> },
}

/// Lock-guarded per-host rate limiter state (§5: "the rate limiter uses
/// per-host mutable state behind a lock" — `DashMap` shards that lock by
/// host instead of a single global mutex).
pub struct HostRateLimiter {
    config: RateLimiterConfig,
    hosts: DashMap<String, HostState>,
}

impl HostRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            hosts: DashMap::new(),
        }
    }

    /// Waits out the host's base delay (or current backoff delay) before a
    /// request. Call once per attempt, before issuing it.
    pub async fn acquire(&self, host: &str) {
        let delay = {
            let mut entry = self.hosts.entry(host.to_string()).or_insert_with(|| {
                HostState {
                    current_delay: self.random_base_delay(),
                    consecutive_failures: 0,
                    last_request: Instant::now(),
                }
            });
            entry.last_request = Instant::now();
            entry.current_delay
        };
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }

    /// Resets the host to a fresh randomized base delay after a clean
    /// response.
    pub fn on_success(&self, host: &str) {
        let mut entry = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState {
                current_delay: self.random_base_delay(),
                consecutive_failures: 0,
                last_request: Instant::now(),
            });
        entry.current_delay = self.random_base_delay();
        entry.consecutive_failures = 0;
    }

    /// Records a 429/503/timeout. Returns whether the caller should retry
    /// (and at what delay, already applied on the *next* `acquire` call) or
    /// has exhausted `max_retries`.
    pub fn on_rate_limited(&self, host: &str, status_code: Option<u16>) -> RateLimitOutcome {
        let mut entry = self
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState {
                current_delay: self.random_base_delay(),
                consecutive_failures: 0,
                last_request: Instant::now(),
            });

        entry.consecutive_failures += 1;
        if entry.consecutive_failures > self.config.max_retries {
            return RateLimitOutcome::RetriesExhausted {
                last_status_code: status_code,
            };
        }

        let next_ms = (entry.current_delay.as_secs_f64() * self.config.backoff_factor * 1000.0)
            .min(self.config.max_delay.as_millis() as f64);
        entry.current_delay = Duration::from_millis(next_ms as u64);
        RateLimitOutcome::Proceed
    }

    fn random_base_delay(&self) -> Duration {
        let min = self.config.base_delay_min.as_millis() as u64;
        let max = self.config.base_delay_max.as_millis() as u64;
        if max <= min {
            return self.config.base_delay_min;
        }
        let ms = rand::thread_rng().gen_range(min..=max);
        Duration::from_millis(ms)
    }
}
