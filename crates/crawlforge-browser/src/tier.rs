//! Tier and per-browser bookkeeping for the fleet manager (§4.1).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crawlforge_types::ports::BrowserDriver;
use crawlforge_types::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Permanent,
    Hot,
    Cold,
}

#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Uses within `usage_window` before a cold fingerprint is promoted to hot.
    pub hot_promote_uses: u32,
    pub usage_window: Duration,
    pub hot_idle_timeout: Duration,
    pub cold_idle_timeout: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            hot_promote_uses: 3,
            usage_window: Duration::from_secs(300),
            hot_idle_timeout: Duration::from_secs(600),
            cold_idle_timeout: Duration::from_secs(300),
        }
    }
}

/// A tier-assigned browser instance. `idle_since` is `None` while any page
/// is checked out (`active_pages > 0`); `LAUNCHING` doesn't need its own
/// variant here because the single-flight lock in `FleetManager` already
/// keeps concurrent callers from observing a half-launched browser.
pub struct ManagedBrowser {
    pub id: String,
    pub tier: Tier,
    pub fingerprint: Fingerprint,
    pub driver: Arc<dyn BrowserDriver>,
    active_pages: AtomicU32,
    total_requests: AtomicU64,
    idle_since_ms: AtomicU64,
    launched_at: Instant,
}

impl ManagedBrowser {
    pub fn new(id: String, tier: Tier, fingerprint: Fingerprint, driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            id,
            tier,
            fingerprint,
            driver,
            active_pages: AtomicU32::new(0),
            total_requests: AtomicU64::new(0),
            idle_since_ms: AtomicU64::new(0),
            launched_at: Instant::now(),
        }
    }

    pub fn checkout_page(&self) {
        self.active_pages.fetch_add(1, Ordering::SeqCst);
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        self.idle_since_ms.store(0, Ordering::SeqCst);
    }

    /// Returns the browser to its tier per Invariant (f): only once its
    /// active page count reaches zero does it become eligible for
    /// idle-timeout eviction.
    pub fn return_page(&self) {
        let remaining = self.active_pages.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.idle_since_ms
                .store(self.launched_at.elapsed().as_millis() as u64, Ordering::SeqCst);
        }
    }

    pub fn active_pages(&self) -> u32 {
        self.active_pages.load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.active_pages() == 0 && self.idle_since_ms.load(Ordering::SeqCst) > 0
    }

    pub fn idle_duration(&self) -> Option<Duration> {
        let marker = self.idle_since_ms.load(Ordering::SeqCst);
        if marker == 0 {
            return None;
        }
        let elapsed = self.launched_at.elapsed().as_millis() as u64;
        Some(Duration::from_millis(elapsed.saturating_sub(marker)))
    }

    pub fn idle_timeout(&self, config: &FleetConfig) -> Duration {
        match self.tier {
            Tier::Permanent => Duration::MAX,
            Tier::Hot => config.hot_idle_timeout,
            Tier::Cold => config.cold_idle_timeout,
        }
    }

    pub fn is_evictable(&self, config: &FleetConfig) -> bool {
        match self.idle_duration() {
            Some(idle) => idle >= self.idle_timeout(config),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlforge_types::ports::PageHandle;
    use async_trait::async_trait;
    use crawlforge_types::CrawlError;

    struct NoopDriver;

    #[async_trait]
    impl BrowserDriver for NoopDriver {
        async fn new_page(&self) -> Result<Box<dyn PageHandle>, CrawlError> {
            unimplemented!()
        }
        async fn close(&self) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    #[test]
    fn becomes_idle_only_after_all_pages_returned() {
        let browser = ManagedBrowser::new(
            "b1".into(),
            Tier::Cold,
            Fingerprint::default_config(),
            Arc::new(NoopDriver),
        );
        browser.checkout_page();
        browser.checkout_page();
        assert!(!browser.is_idle());
        browser.return_page();
        assert!(!browser.is_idle());
        browser.return_page();
        assert!(browser.is_idle());
    }

    #[test]
    fn permanent_tier_never_evictable() {
        let browser = ManagedBrowser::new(
            "b1".into(),
            Tier::Permanent,
            Fingerprint::default_config(),
            Arc::new(NoopDriver),
        );
        browser.checkout_page();
        browser.return_page();
        assert!(!browser.is_evictable(&FleetConfig::default()));
    }
}
