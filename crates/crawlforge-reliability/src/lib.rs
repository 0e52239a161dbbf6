//! Fault-tolerance primitives shared by the browser fleet and the dispatcher:
//! a lock-free circuit breaker, per-host adaptive timeout profiles, a
//! per-host rate limiter with token-bucket pacing and backoff, and the
//! retry policy that decides which `CrawlError` kinds are worth retrying.

pub mod circuit;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

pub use circuit::{CircuitBreaker, CircuitConfig, Clock, RealClock, State as CircuitState};
pub use rate_limiter::{HostRateLimiter, RateLimiterConfig, RateLimitOutcome};
pub use retry::{is_retryable, RetryPolicy};
pub use timeout::{TimeoutProfile, TimeoutProfileStore};
