//! The Browser Fleet Manager (§4.1): checkout/return/kill_session/cleanup
//! against a permanent/hot/cold tier map keyed by fingerprint. Single
//! access pattern: `DashMap` shards per-fingerprint locking so distinct
//! fingerprints never contend, matching §5's "fingerprint-scoped lock plus
//! a global lock for tier-level mutations" — the `DashMap` shard lock
//! plays the fingerprint-scoped role, `launch_locks` plays the
//! single-flight role for the race window the spec calls out explicitly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use crawlforge_events::{HookContext, HookRegistry};
use crawlforge_reliability::retry::RetryPolicy;
use crawlforge_reliability::{CircuitBreaker, CircuitConfig};
use crawlforge_types::config::HookPoint;
use crawlforge_types::ports::{BrowserDriver, BrowserLauncher, PageHandle};
use crawlforge_types::{BrowserConfig, CrawlError, Fingerprint};
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::tier::{FleetConfig, ManagedBrowser, Tier};

/// A checked-out page plus enough fleet context to return it.
pub struct Checkout {
    pub browser_id: String,
    pub fingerprint: Fingerprint,
    pub page: Box<dyn PageHandle>,
}

pub struct FleetManager {
    config: FleetConfig,
    launcher: Arc<dyn BrowserLauncher>,
    permanent: AsyncMutex<Option<Arc<ManagedBrowser>>>,
    hot: DashMap<Fingerprint, Arc<ManagedBrowser>>,
    cold: DashMap<Fingerprint, Arc<ManagedBrowser>>,
    /// Recent checkout timestamps per fingerprint, used to decide whether a
    /// *new* launch should start directly in the hot tier (§4.1 tier
    /// selection rule (b)).
    usage_history: DashMap<Fingerprint, VecDeque<Instant>>,
    launch_locks: DashMap<Fingerprint, Arc<AsyncMutex<()>>>,
    /// Circuit breaker per fingerprint (distinct browser configs fail
    /// independently), guarding against hammering a launcher that is
    /// failing across the retry policy's own attempts.
    launch_breakers: DashMap<Fingerprint, Arc<CircuitBreaker>>,
    /// Sessions pinned to a specific browser *and page* for reuse (§4.2
    /// session reuse): the page itself must survive, not just the browser
    /// process, since JS state like `window.__x` lives on the page.
    sessions: DashMap<String, PinnedSession>,
}

struct PinnedSession {
    browser_id: String,
    fingerprint: Fingerprint,
    page: Box<dyn PageHandle>,
}

impl FleetManager {
    pub fn new(config: FleetConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            config,
            launcher,
            permanent: AsyncMutex::new(None),
            hot: DashMap::new(),
            cold: DashMap::new(),
            usage_history: DashMap::new(),
            launch_locks: DashMap::new(),
            launch_breakers: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    fn launch_breaker(&self, fingerprint: Fingerprint) -> Arc<CircuitBreaker> {
        self.launch_breakers
            .entry(fingerprint)
            .or_insert_with(|| CircuitBreaker::with_default_clock(CircuitConfig::default()))
            .clone()
    }

    /// `checkout(config, session_id) -> (Browser, Page)` (§4.1, §4.2
    /// session reuse). When `session_id` is pinned to a still-live browser,
    /// returns that exact page back to the caller instead of spawning a
    /// new one, so JS state set by an earlier crawl in the same session is
    /// still visible. Returns the browser id alongside the page so the
    /// caller can `return_page`/`kill_session` later without re-deriving
    /// the fingerprint. Fires `OnBrowserCreated` (only for a fresh launch),
    /// `OnPageContextCreated`, and -- when `config.user_agent` is set --
    /// `OnUserAgentUpdated` (§4.11); a pinned-session reattach fires none of
    /// these, since no browser or page is actually created.
    pub async fn checkout(
        &self,
        config: &BrowserConfig,
        session_id: Option<&str>,
        hooks: &HookRegistry,
        critical: &[HookPoint],
    ) -> Result<Checkout, CrawlError> {
        if let Some(session_id) = session_id {
            if let Some((_, pinned)) = self.sessions.remove(session_id) {
                if let Some(browser) = self.find_browser(&pinned.fingerprint, &pinned.browser_id).await {
                    browser.checkout_page();
                    return Ok(Checkout {
                        browser_id: pinned.browser_id,
                        fingerprint: pinned.fingerprint,
                        page: pinned.page,
                    });
                }
                // The pinned browser was evicted or closed since the pin
                // was made; fall through and check out a fresh page below.
            }
        }

        let fingerprint = config.fingerprint();

        if fingerprint == Fingerprint::default_config() {
            let (browser, is_new) = self.checkout_permanent(config).await?;
            return self.spawn_page(browser, fingerprint, config, is_new, hooks, critical).await;
        }

        if let Some(browser) = self.hot.get(&fingerprint).map(|e| e.clone()) {
            self.record_usage(fingerprint);
            return self.spawn_page(browser, fingerprint, config, false, hooks, critical).await;
        }
        if let Some(browser) = self.cold.get(&fingerprint).map(|e| e.clone()) {
            self.record_usage(fingerprint);
            return self.spawn_page(browser, fingerprint, config, false, hooks, critical).await;
        }

        // Single-flight: only one caller actually launches per fingerprint;
        // later callers block on the same lock and then re-check the maps.
        let lock = self
            .launch_locks
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(browser) = self.hot.get(&fingerprint).map(|e| e.clone()) {
            self.record_usage(fingerprint);
            return self.spawn_page(browser, fingerprint, config, false, hooks, critical).await;
        }
        if let Some(browser) = self.cold.get(&fingerprint).map(|e| e.clone()) {
            self.record_usage(fingerprint);
            return self.spawn_page(browser, fingerprint, config, false, hooks, critical).await;
        }

        let tier = if self.recent_usage_count(fingerprint) >= self.config.hot_promote_uses {
            Tier::Hot
        } else {
            Tier::Cold
        };
        let browser = self.launch(config, fingerprint, tier).await?;
        self.record_usage(fingerprint);

        match tier {
            Tier::Hot => {
                self.hot.insert(fingerprint, browser.clone());
            }
            Tier::Cold => {
                self.cold.insert(fingerprint, browser.clone());
            }
            Tier::Permanent => unreachable!("default fingerprint handled above"),
        }

        self.spawn_page(browser, fingerprint, config, true, hooks, critical).await
    }

    /// Returns the permanent browser plus whether this call just launched it.
    async fn checkout_permanent(&self, config: &BrowserConfig) -> Result<(Arc<ManagedBrowser>, bool), CrawlError> {
        let mut slot = self.permanent.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok((browser.clone(), false));
        }
        let browser = self
            .launch(config, Fingerprint::default_config(), Tier::Permanent)
            .await?;
        *slot = Some(browser.clone());
        Ok((browser, true))
    }

    /// Launches a browser for `fingerprint`/`tier`, retrying per
    /// `RetryPolicy::browser_launch` (§4.1 "2 retries, 1s/2s backoff"). The
    /// whole retry sequence is guarded by a per-fingerprint circuit breaker:
    /// an already-open circuit fails fast without even trying the launcher,
    /// and the breaker only sees one success/failure per call here, not one
    /// per retry attempt.
    async fn launch(
        &self,
        config: &BrowserConfig,
        fingerprint: Fingerprint,
        tier: Tier,
    ) -> Result<Arc<ManagedBrowser>, CrawlError> {
        let breaker = self.launch_breaker(fingerprint);
        let _permit = breaker.try_acquire().map_err(|reason| CrawlError::BrowserLaunchError {
            message: format!("circuit open for fingerprint {fingerprint}: {reason}"),
        })?;

        let policy = RetryPolicy::browser_launch();
        let mut last_err = None;

        for attempt in 0..=policy.max_attempts {
            if attempt > 0 {
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(?tier, attempt, ?delay, "retrying browser launch");
                tokio::time::sleep(delay).await;
            }
            match self.launcher.launch(config).await {
                Ok(driver) => {
                    let id = Uuid::new_v4().to_string();
                    info!(browser_id = %id, ?tier, fingerprint = %fingerprint, "browser launched");
                    breaker.on_success();
                    return Ok(Arc::new(ManagedBrowser::new(id, tier, fingerprint, Arc::from(driver))));
                }
                Err(e) => last_err = Some(e),
            }
        }

        breaker.on_failure();
        Err(last_err.unwrap_or_else(|| CrawlError::BrowserLaunchError {
            message: "launch failed with no error captured".into(),
        }))
    }

    /// Spawns a fresh page on `browser` and fires the creation-time hooks
    /// (§4.11): `OnBrowserCreated` only when `is_new_browser` (this call's
    /// launch, not a tier reuse), `OnPageContextCreated` always, and
    /// `OnUserAgentUpdated` when `config.user_agent` is set -- applied via
    /// `set_extra_headers` before the hook fires. Each fire may return a
    /// replacement page handle (`ctx.replacement`), which becomes the
    /// checkout's page for any hook that fires after it.
    async fn spawn_page(
        &self,
        browser: Arc<ManagedBrowser>,
        fingerprint: Fingerprint,
        config: &BrowserConfig,
        is_new_browser: bool,
        hooks: &HookRegistry,
        critical: &[HookPoint],
    ) -> Result<Checkout, CrawlError> {
        browser.checkout_page();
        let page = match browser.driver.new_page().await {
            Ok(page) => page,
            Err(e) => {
                browser.return_page();
                return Err(e);
            }
        };

        let mut current: Box<dyn PageHandle> = page;

        let stealth_script = crate::stealth::evasion_script(crate::stealth::StealthPreset::from_enabled(config.stealth));
        if !stealth_script.is_empty() {
            if let Err(e) = current.evaluate(&stealth_script).await {
                warn!(browser_id = %browser.id, error = %e, "failed to apply stealth countermeasures to new page");
            }
        }

        if let Some(ua) = &config.user_agent {
            if let Err(e) = current.set_extra_headers(&[("User-Agent".to_string(), ua.clone())]).await {
                warn!(browser_id = %browser.id, error = %e, "failed to apply user agent to new page");
            }
        }

        if is_new_browser {
            if let Some(replacement) = self.fire_checkout_hook(HookPoint::OnBrowserCreated, current.as_ref(), hooks, critical).await? {
                current = replacement;
            }
        }

        if let Some(replacement) = self.fire_checkout_hook(HookPoint::OnPageContextCreated, current.as_ref(), hooks, critical).await? {
            current = replacement;
        }

        if config.user_agent.is_some() {
            if let Some(replacement) = self.fire_checkout_hook(HookPoint::OnUserAgentUpdated, current.as_ref(), hooks, critical).await? {
                current = replacement;
            }
        }

        Ok(Checkout {
            browser_id: browser.id.clone(),
            fingerprint,
            page: current,
        })
    }

    async fn fire_checkout_hook(
        &self,
        point: HookPoint,
        page: &dyn PageHandle,
        hooks: &HookRegistry,
        critical: &[HookPoint],
    ) -> Result<Option<Box<dyn PageHandle>>, CrawlError> {
        let mut ctx = HookContext::new(page);
        hooks.fire(point, &mut ctx, critical).await?;
        Ok(ctx.replacement.take())
    }

    /// Looks up a still-tracked browser by fingerprint+id across all three
    /// tiers, for reattaching a pinned session's page.
    async fn find_browser(&self, fingerprint: &Fingerprint, browser_id: &str) -> Option<Arc<ManagedBrowser>> {
        if let Some(b) = self.hot.get(fingerprint) {
            if b.id == browser_id {
                return Some(b.clone());
            }
        }
        if let Some(b) = self.cold.get(fingerprint) {
            if b.id == browser_id {
                return Some(b.clone());
            }
        }
        let permanent = self.permanent.lock().await;
        if let Some(b) = permanent.as_ref() {
            if b.id == browser_id {
                return Some(b.clone());
            }
        }
        None
    }

    fn record_usage(&self, fingerprint: Fingerprint) {
        let mut history = self.usage_history.entry(fingerprint).or_default();
        history.push_back(Instant::now());
        let cutoff = Instant::now() - self.config.usage_window;
        while history.front().is_some_and(|t| *t < cutoff) {
            history.pop_front();
        }
    }

    fn recent_usage_count(&self, fingerprint: Fingerprint) -> u32 {
        self.usage_history
            .get(&fingerprint)
            .map(|h| h.len() as u32)
            .unwrap_or(0)
    }

    /// `return(browser, page, keep_session?)` (§4.1). Closes the page
    /// unless `keep_session` is set, in which case the session id is
    /// pinned to this browser for reuse.
    pub async fn return_page(
        &self,
        checkout: Checkout,
        keep_session: Option<&str>,
    ) -> Result<(), CrawlError> {
        let Checkout { browser_id, fingerprint, page } = checkout;

        if let Some(session_id) = keep_session {
            self.sessions.insert(
                session_id.to_string(),
                PinnedSession { browser_id: browser_id.clone(), fingerprint, page },
            );
        } else {
            page.close().await?;
        }

        let browser = self
            .hot
            .get(&fingerprint)
            .map(|e| e.clone())
            .or_else(|| self.cold.get(&fingerprint).map(|e| e.clone()));
        if let Some(browser) = browser {
            browser.return_page();
        } else {
            let permanent = self.permanent.lock().await;
            if let Some(browser) = permanent.as_ref() {
                if browser.id == browser_id {
                    browser.return_page();
                }
            }
        }
        Ok(())
    }

    /// `kill_session(session_id)`: drops the session pin and closes its
    /// held page, since this manager owns the page handle directly once
    /// it's pinned (unlike a plain checked-out page, which the page
    /// session runner closes itself). The browser's active-page count was
    /// already returned to zero when the session was pinned (`return_page`
    /// decrements unconditionally), so this doesn't touch it again.
    pub async fn kill_session(&self, session_id: &str) -> Result<(), CrawlError> {
        if let Some((_, pinned)) = self.sessions.remove(session_id) {
            pinned.page.close().await?;
        }
        Ok(())
    }

    pub fn session_browser(&self, session_id: &str) -> Option<String> {
        self.sessions.get(session_id).map(|e| e.browser_id.clone())
    }

    /// `cleanup()`: evicts idle-beyond-threshold browsers from hot/cold
    /// tiers (the permanent browser is never evicted) and emits a janitor
    /// log line per eviction.
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let mut evicted = 0usize;

        for tier_map in [&self.hot, &self.cold] {
            let stale: Vec<Fingerprint> = tier_map
                .iter()
                .filter(|e| e.value().is_evictable(&self.config))
                .map(|e| *e.key())
                .collect();

            for fingerprint in stale {
                if let Some((_, browser)) = tier_map.remove(&fingerprint) {
                    if let Err(e) = browser.driver.close().await {
                        warn!(browser_id = %browser.id, error = %e, "error closing evicted browser");
                    }
                    evicted += 1;
                    debug!(browser_id = %browser.id, tier = ?browser.tier, at = %now, "janitor evicted idle browser");
                }
            }
        }

        if evicted > 0 {
            info!(evicted, "fleet cleanup evicted idle browsers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopPage;

    #[async_trait]
    impl PageHandle for NoopPage {
        async fn goto(&self, _url: &str, _timeout: std::time::Duration) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, CrawlError> {
            Ok(serde_json::Value::Null)
        }
        async fn content(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn wait_for_selector(&self, _s: &str, _t: std::time::Duration) -> Result<bool, CrawlError> {
            Ok(true)
        }
        async fn screenshot_png_base64(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn pdf_base64(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn set_extra_headers(&self, _h: &[(String, String)]) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    struct CountingDriver(Arc<AtomicUsize>);

    #[async_trait]
    impl BrowserDriver for CountingDriver {
        async fn new_page(&self) -> Result<Box<dyn PageHandle>, CrawlError> {
            Ok(Box::new(NoopPage))
        }
        async fn close(&self) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    struct CountingLauncher {
        launches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserLauncher for CountingLauncher {
        async fn launch(&self, _config: &BrowserConfig) -> Result<Box<dyn BrowserDriver>, CrawlError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingDriver(self.launches.clone())))
        }
    }

    #[tokio::test]
    async fn default_fingerprint_uses_permanent_tier_once() {
        let launches = Arc::new(AtomicUsize::new(0));
        let fleet = FleetManager::new(
            FleetConfig::default(),
            Arc::new(CountingLauncher { launches: launches.clone() }),
        );

        let c1 = fleet.checkout(&BrowserConfig::default(), None, &HookRegistry::new(), &[]).await.unwrap();
        fleet.return_page(c1, None).await.unwrap();
        let c2 = fleet.checkout(&BrowserConfig::default(), None, &HookRegistry::new(), &[]).await.unwrap();
        fleet.return_page(c2, None).await.unwrap();

        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_fingerprint_launches_cold_then_reuses() {
        let launches = Arc::new(AtomicUsize::new(0));
        let fleet = FleetManager::new(
            FleetConfig::default(),
            Arc::new(CountingLauncher { launches: launches.clone() }),
        );
        let mut cfg = BrowserConfig::default();
        cfg.user_agent = Some("custom".into());

        let c1 = fleet.checkout(&cfg, None, &HookRegistry::new(), &[]).await.unwrap();
        fleet.return_page(c1, None).await.unwrap();
        let c2 = fleet.checkout(&cfg, None, &HookRegistry::new(), &[]).await.unwrap();
        fleet.return_page(c2, None).await.unwrap();

        assert_eq!(launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_pin_survives_return() {
        let launches = Arc::new(AtomicUsize::new(0));
        let fleet = FleetManager::new(
            FleetConfig::default(),
            Arc::new(CountingLauncher { launches }),
        );
        let cfg = BrowserConfig::default();
        let checkout = fleet.checkout(&cfg, None, &HookRegistry::new(), &[]).await.unwrap();
        let browser_id = checkout.browser_id.clone();
        fleet.return_page(checkout, Some("sess-1")).await.unwrap();

        assert_eq!(fleet.session_browser("sess-1"), Some(browser_id));
        fleet.kill_session("sess-1").await.unwrap();
        assert_eq!(fleet.session_browser("sess-1"), None);
    }

    struct StatefulPage {
        state: std::sync::Mutex<Option<serde_json::Value>>,
    }

    #[async_trait]
    impl PageHandle for StatefulPage {
        async fn goto(&self, _url: &str, _timeout: std::time::Duration) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn current_url(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn evaluate(&self, script: &str) -> Result<serde_json::Value, CrawlError> {
            if let Some(value) = script.strip_prefix("SET:") {
                let mut state = self.state.lock().unwrap();
                *state = Some(serde_json::json!(value.parse::<i64>().unwrap()));
                return Ok(serde_json::Value::Null);
            }
            Ok(self.state.lock().unwrap().clone().unwrap_or(serde_json::Value::Null))
        }
        async fn content(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn wait_for_selector(&self, _s: &str, _t: std::time::Duration) -> Result<bool, CrawlError> {
            Ok(true)
        }
        async fn screenshot_png_base64(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn pdf_base64(&self) -> Result<String, CrawlError> {
            Ok(String::new())
        }
        async fn set_extra_headers(&self, _h: &[(String, String)]) -> Result<(), CrawlError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    struct StatefulDriver;

    #[async_trait]
    impl BrowserDriver for StatefulDriver {
        async fn new_page(&self) -> Result<Box<dyn PageHandle>, CrawlError> {
            Ok(Box::new(StatefulPage { state: std::sync::Mutex::new(None) }))
        }
        async fn close(&self) -> Result<(), CrawlError> {
            Ok(())
        }
    }

    struct StatefulLauncher;

    #[async_trait]
    impl BrowserLauncher for StatefulLauncher {
        async fn launch(&self, _config: &BrowserConfig) -> Result<Box<dyn BrowserDriver>, CrawlError> {
            Ok(Box::new(StatefulDriver))
        }
    }

    #[tokio::test]
    async fn checking_out_a_pinned_session_returns_the_same_page_not_a_fresh_one() {
        let fleet = FleetManager::new(FleetConfig::default(), Arc::new(StatefulLauncher));
        let cfg = BrowserConfig::default();

        let checkout = fleet.checkout(&cfg, None, &HookRegistry::new(), &[]).await.unwrap();
        checkout.page.evaluate("SET:42").await.unwrap();
        fleet.return_page(checkout, Some("sess-js")).await.unwrap();

        let checkout2 = fleet.checkout(&cfg, Some("sess-js"), &HookRegistry::new(), &[]).await.unwrap();
        let value = checkout2.page.evaluate("GET").await.unwrap();
        assert_eq!(value, serde_json::json!(42));
        fleet.return_page(checkout2, None).await.unwrap();
    }
}
