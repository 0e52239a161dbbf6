//! Retry policy: which `CrawlError` kinds are worth retrying, and the
//! backoff schedule to apply. The dispatcher retries only `NavigationError`
//! and `RateLimited` (§7); LLM extraction retries transient provider
//! errors with its own config-driven backoff (§4.4).

use std::time::Duration;

use crawlforge_types::CrawlError;

/// Mirrors `CrawlError::is_retryable()`, kept here as the dispatcher's
/// single point of truth for "should this be retried" so the policy can
/// diverge from the error taxonomy's own (slightly more permissive)
/// opinion without touching `crawlforge-types`.
pub fn is_retryable(err: &CrawlError) -> bool {
    matches!(err, CrawlError::NavigationError { .. } | CrawlError::RateLimited { .. })
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Browser launch policy from §4.1: two retries, 1s then 2s.
    pub fn browser_launch() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_attempts: 2,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.base_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }
}
