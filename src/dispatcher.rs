//! Dispatcher (§4.6): a memory-adaptive concurrency semaphore plus
//! per-host rate limiting, wired the way
//! `riptide-facade`'s `BackpressureManager` guards a fixed worker pool --
//! extended here with a retune tick that actually grows and shrinks
//! capacity instead of just reporting load against a fixed ceiling.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crawlforge_reliability::retry::{is_retryable, RetryPolicy};
use crawlforge_reliability::{HostRateLimiter, RateLimiterConfig};
use crawlforge_types::{CrawlError, CrawlResult, DispatchResult};
use sysinfo::System;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounds and watermarks for the adaptive semaphore (§4.6 "a semaphore
/// whose capacity is recomputed each tick as `min(max_concurrency,
/// f(free_memory))`").
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiterConfig {
    pub max_concurrency: usize,
    pub min_concurrency: usize,
    /// Percentage of total system memory in use above which capacity halves.
    pub high_watermark_pct: f32,
    /// Percentage of total system memory in use below which capacity grows
    /// by one step per tick.
    pub low_watermark_pct: f32,
}

impl Default for ConcurrencyLimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            min_concurrency: 1,
            high_watermark_pct: 85.0,
            low_watermark_pct: 60.0,
        }
    }
}

/// A `max_concurrency`-sized semaphore whose *effective* capacity can be
/// shrunk below `max_concurrency` by holding some of its permits in
/// reserve, and grown back by releasing them. The semaphore itself never
/// changes size; `retune` only moves permits between "available" and
/// "reserved".
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    reserved: AsyncMutex<Vec<OwnedSemaphorePermit>>,
    config: ConcurrencyLimiterConfig,
    capacity: AtomicUsize,
}

impl ConcurrencyLimiter {
    pub fn new(config: ConcurrencyLimiterConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrency)),
            reserved: AsyncMutex::new(Vec::new()),
            capacity: AtomicUsize::new(config.max_concurrency),
            config,
        }
    }

    /// Current effective capacity (`max_concurrency` minus reserved permits).
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Waits for a permit, honoring `cancel` (§4.6 "all suspension points
    /// must honor cancellation"). `Err` means the token fired first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<OwnedSemaphorePermit, ()> {
        tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => permit.map_err(|_| ()),
            _ = cancel.cancelled() => Err(()),
        }
    }

    /// One retune tick (§4.6): halves capacity when `memory_used_pct`
    /// exceeds `high_watermark_pct` (down to `min_concurrency`); grows
    /// capacity by one step when below `low_watermark_pct` (up to
    /// `max_concurrency`). No-op in between.
    pub async fn retune(&self, memory_used_pct: f32) {
        let mut reserved = self.reserved.lock().await;
        let current = self.config.max_concurrency - reserved.len();

        if memory_used_pct >= self.config.high_watermark_pct && current > self.config.min_concurrency {
            let target = (current / 2).max(self.config.min_concurrency);
            let to_reserve = current - target;
            for _ in 0..to_reserve {
                match self.semaphore.clone().try_acquire_owned() {
                    Ok(permit) => reserved.push(permit),
                    Err(_) => break,
                }
            }
        } else if memory_used_pct < self.config.low_watermark_pct && current < self.config.max_concurrency {
            if let Some(permit) = reserved.pop() {
                drop(permit);
            }
        }

        let new_capacity = self.config.max_concurrency - reserved.len();
        self.capacity.store(new_capacity, Ordering::Relaxed);
        debug!(memory_used_pct, capacity = new_capacity, "dispatcher retuned concurrency");
    }
}

/// Reads current system memory pressure as a percentage of total memory
/// in use, the way `ResourceTracker` samples `sysinfo` in the browser
/// fleet's host process.
pub fn read_memory_pressure() -> f32 {
    let mut system = System::new();
    system.refresh_all();
    let total = system.total_memory();
    if total == 0 {
        return 0.0;
    }
    (system.used_memory() as f32 / total as f32) * 100.0
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub concurrency: ConcurrencyLimiterConfig,
    pub rate_limiter: RateLimiterConfig,
    /// §4.6 "tasks must surrender within `cancel_timeout` ... or are
    /// abandoned and their browsers marked for eviction".
    pub cancel_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyLimiterConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            cancel_timeout: Duration::from_secs(5),
        }
    }
}

/// Schedules per-URL crawl tasks against an adaptive concurrency limit and
/// a per-host rate limiter, attaching a [`DispatchResult`] to every
/// outcome. One `Dispatcher` is shared across an entire `crawl_many` call;
/// `crawl` builds a throwaway one-task dispatcher around a single call.
pub struct Dispatcher {
    limiter: ConcurrencyLimiter,
    rate_limiter: HostRateLimiter,
    cancel: CancellationToken,
    cancel_timeout: Duration,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            limiter: ConcurrencyLimiter::new(config.concurrency),
            rate_limiter: HostRateLimiter::new(config.rate_limiter),
            cancel: CancellationToken::new(),
            cancel_timeout: config.cancel_timeout,
        }
    }

    /// A token callers can hold to cancel every in-flight and future task
    /// submitted to this dispatcher.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn current_load(&self) -> f32 {
        let max = self.limiter.config.max_concurrency.max(1) as f32;
        1.0 - (self.limiter.capacity() as f32 / max)
    }

    /// Samples memory pressure and retunes the concurrency limiter. Callers
    /// drive this on a periodic tick (e.g. once per `crawl_many` loop
    /// iteration); it is not spawned as a background task so behavior is
    /// identical under a single-threaded test runtime.
    pub async fn tick(&self) {
        let pct = read_memory_pressure();
        self.limiter.retune(pct).await;
    }

    pub fn on_success(&self, host: &str) {
        self.rate_limiter.on_success(host);
    }

    /// Runs `task` once a concurrency permit and the host's rate-limit
    /// pacing are both satisfied, attaching submission/start/finish
    /// timestamps as a [`DispatchResult`] on the returned `CrawlResult`.
    /// Cancellation at any suspension point surfaces as a failure result
    /// rather than propagating as an error, matching §7's "the crawl of
    /// other URLs is never affected by one URL's failure". A `NavigationError`
    /// or `RateLimited` outcome is retried under [`RetryPolicy::default`]
    /// (§7 "Propagation policy"), sleeping `delay_for_attempt` between tries
    /// and incrementing `dispatch.attempts` each time; `task` must therefore
    /// be re-runnable (`Fn`, not `FnOnce`).
    pub async fn submit<F, Fut>(&self, task_id: impl Into<String>, url: &str, host: &str, task: F) -> CrawlResult
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CrawlResult>,
    {
        let task_id = task_id.into();
        let submitted_at = Utc::now();
        let mut dispatch = DispatchResult::new(task_id, submitted_at);

        let _permit = match self.limiter.acquire(&self.cancel).await {
            Ok(permit) => permit,
            Err(()) => {
                let mut result = CrawlResult::failure(url, None, "cancelled before a concurrency permit was available");
                dispatch.finished_at = Some(Utc::now());
                result.dispatch = Some(dispatch);
                return result;
            }
        };

        tokio::select! {
            _ = self.rate_limiter.acquire(host) => {}
            _ = self.cancel.cancelled() => {
                let mut result = CrawlResult::failure(url, None, "cancelled while waiting on rate-limit pacing");
                dispatch.finished_at = Some(Utc::now());
                result.dispatch = Some(dispatch);
                return result;
            }
        }

        dispatch.started_at = Some(Utc::now());

        let policy = RetryPolicy::default();
        let mut attempt = 0u32;
        let mut result = loop {
            attempt += 1;
            dispatch.attempts = attempt;

            let outcome = tokio::select! {
                r = task() => r,
                _ = self.cancel.cancelled() => {
                    tokio::time::sleep(self.cancel_timeout).await;
                    break CrawlResult::failure(url, None, "cancelled mid-crawl, task abandoned");
                }
            };

            let should_retry = attempt < policy.max_attempts
                && outcome_error(&outcome).is_some_and(|e| is_retryable(&e));
            if !should_retry {
                break outcome;
            }

            tokio::time::sleep(policy.delay_for_attempt(attempt - 1)).await;
        };

        dispatch.finished_at = Some(Utc::now());
        result.dispatch = Some(dispatch);
        result
    }
}

/// Recovers enough of the original `CrawlError` from a failed `CrawlResult`
/// to consult `is_retryable` -- `Engine::crawl_one` never surfaces the
/// typed error to the dispatcher, only its folded `success=false` shell.
fn outcome_error(result: &CrawlResult) -> Option<CrawlError> {
    if result.success {
        return None;
    }
    let message = result.error_message.as_deref()?;
    if result.status_code == Some(429) {
        return Some(CrawlError::RateLimited { host: String::new() });
    }
    message
        .strip_prefix("navigation failed: ")
        .map(|rest| CrawlError::NavigationError { message: rest.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retune_halves_above_high_watermark_and_grows_back_below_low() {
        let limiter = ConcurrencyLimiter::new(ConcurrencyLimiterConfig {
            max_concurrency: 8,
            min_concurrency: 1,
            high_watermark_pct: 80.0,
            low_watermark_pct: 50.0,
        });
        assert_eq!(limiter.capacity(), 8);

        limiter.retune(90.0).await;
        assert_eq!(limiter.capacity(), 4);

        limiter.retune(90.0).await;
        assert_eq!(limiter.capacity(), 2);

        limiter.retune(40.0).await;
        assert_eq!(limiter.capacity(), 3);
    }

    #[tokio::test]
    async fn retune_never_shrinks_below_min_concurrency() {
        let limiter = ConcurrencyLimiter::new(ConcurrencyLimiterConfig {
            max_concurrency: 4,
            min_concurrency: 2,
            high_watermark_pct: 50.0,
            low_watermark_pct: 10.0,
        });
        for _ in 0..10 {
            limiter.retune(99.0).await;
        }
        assert_eq!(limiter.capacity(), 2);
    }

    #[tokio::test]
    async fn retune_never_grows_past_max_concurrency() {
        let limiter = ConcurrencyLimiter::new(ConcurrencyLimiterConfig {
            max_concurrency: 4,
            min_concurrency: 1,
            high_watermark_pct: 99.0,
            low_watermark_pct: 90.0,
        });
        for _ in 0..10 {
            limiter.retune(0.0).await;
        }
        assert_eq!(limiter.capacity(), 4);
    }

    #[tokio::test]
    async fn submit_runs_task_and_attaches_dispatch_result() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let result = dispatcher
            .submit("t1", "https://example.com", "example.com", || async { CrawlResult::raw_html_shell() })
            .await;
        assert!(result.success);
        let dispatch = result.dispatch.expect("dispatch result attached");
        assert_eq!(dispatch.task_id, "t1");
        assert_eq!(dispatch.attempts, 1);
        assert!(dispatch.started_at.is_some());
        assert!(dispatch.finished_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_errors_are_retried_until_success() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let calls = AtomicUsize::new(0);
        let result = dispatcher
            .submit("t1", "https://example.com", "example.com", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    CrawlResult::failure(
                        "https://example.com",
                        None,
                        "navigation failed: connection reset",
                    )
                } else {
                    CrawlResult::raw_html_shell()
                }
            })
            .await;
        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.dispatch.unwrap().attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_errors_stop_retrying_at_max_attempts() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let calls = AtomicUsize::new(0);
        let result = dispatcher
            .submit("t1", "https://example.com", "example.com", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                CrawlResult::failure("https://example.com", None, "navigation failed: still down")
            })
            .await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), RetryPolicy::default().max_attempts as usize);
        assert_eq!(result.dispatch.unwrap().attempts, RetryPolicy::default().max_attempts);
    }

    #[tokio::test]
    async fn extraction_errors_are_not_retried() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let calls = AtomicUsize::new(0);
        let result = dispatcher
            .submit("t1", "https://example.com", "example.com", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                CrawlResult::failure("https://example.com", None, "extraction failed: bad schema")
            })
            .await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.dispatch.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn cancelling_before_submit_yields_a_failure_result_not_a_panic() {
        // Zero permits so the semaphore branch never becomes ready and the
        // already-cancelled token branch deterministically wins the select.
        let dispatcher = Dispatcher::new(DispatcherConfig {
            concurrency: ConcurrencyLimiterConfig {
                max_concurrency: 0,
                min_concurrency: 0,
                ..ConcurrencyLimiterConfig::default()
            },
            ..DispatcherConfig::default()
        });
        dispatcher.cancel();
        let result = dispatcher
            .submit("t1", "https://example.com", "example.com", || async { CrawlResult::raw_html_shell() })
            .await;
        assert!(!result.success);
        assert!(result.dispatch.is_some());
    }
}
