//! Page Session (§4.2): the fixed interaction pipeline realized against one
//! checked-out page. Steps are conditional on `CrawlerRunConfig` but their
//! *order* is fixed: preflight, navigate, post-nav waits, user JS, scroll
//! behaviors, image readiness, captures, DOM extraction, hooks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crawlforge_events::{HookContext, HookRegistry};
use crawlforge_reliability::{CircuitBreaker, CircuitConfig, TimeoutProfileStore};
use crawlforge_types::config::{HookPoint, ScrollBy, VirtualScrollConfig, WaitFor};
use crawlforge_types::ports::{CapturedConsoleMessage, CapturedRequest, CertificateInfo, PageHandle};
use crawlforge_types::{CrawlError, CrawlerRunConfig};
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::robots::RobotsCache;

/// Polling interval for `wait_for` and image-readiness checks (§4.2 step 3:
/// "polled at >=50ms intervals").
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything a `PageSession` run produces, independent of the content
/// pipeline that consumes `html` afterward.
#[derive(Debug, Clone, Default)]
pub struct PageSessionOutcome {
    pub url: String,
    pub redirected_url: Option<String>,
    pub success: bool,
    pub status_code: Option<u16>,
    pub html: Option<String>,
    pub js_execution_result: Option<serde_json::Value>,
    pub screenshot: Option<String>,
    pub pdf: Option<String>,
    pub mhtml: Option<String>,
    pub network_requests: Option<Vec<CapturedRequest>>,
    pub console_messages: Option<Vec<CapturedConsoleMessage>>,
    pub ssl_certificate: Option<CertificateInfo>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

impl PageSessionOutcome {
    fn failure(url: impl Into<String>, status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            status_code,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Realizes the §4.2 pipeline against one checked-out page. Serializes
/// concurrent `run` calls on the same session via an internal lock so "at
/// most one concurrent navigation per `PageSession`" (Invariant b) and the
/// session ordering guarantee both hold regardless of caller discipline.
pub struct PageSession {
    lock: AsyncMutex<()>,
    user_agent: String,
    /// Per-host circuit breakers guarding navigation (§4.1 "Failure policy"
    /// extended to per-host nav failures, grounded alongside the fleet's own
    /// launch breaker).
    nav_breakers: DashMap<String, Arc<CircuitBreaker>>,
    /// Adaptive per-host navigation timeouts, replacing the static
    /// `page_timeout` for the `goto` call only; other waits in the pipeline
    /// still use `page_timeout` directly.
    timeouts: TimeoutProfileStore,
}

impl PageSession {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            lock: AsyncMutex::new(()),
            user_agent: user_agent.into(),
            nav_breakers: DashMap::new(),
            timeouts: TimeoutProfileStore::new(),
        }
    }

    fn nav_breaker(&self, host: &str) -> Arc<CircuitBreaker> {
        self.nav_breakers
            .entry(host.to_string())
            .or_insert_with(|| CircuitBreaker::with_default_clock(CircuitConfig::default()))
            .clone()
    }

    /// Runs the full pipeline for one `url`/`config` pair against `page`.
    /// `robots` is consulted only when `config.check_robots_txt` is set.
    pub async fn run(
        &self,
        page: &dyn PageHandle,
        url: &str,
        config: &CrawlerRunConfig,
        robots: Option<&RobotsCache>,
        hooks: &HookRegistry,
    ) -> PageSessionOutcome {
        let _guard = self.lock.lock().await;

        if let Some(stripped) = url.strip_prefix("raw:") {
            return PageSessionOutcome {
                url: "Raw HTML".to_string(),
                redirected_url: None,
                success: true,
                status_code: Some(200),
                html: Some(stripped.to_string()),
                ..Default::default()
            };
        }

        if let Some(path) = url.strip_prefix("file://") {
            return match tokio::fs::read_to_string(path).await {
                Ok(html) => PageSessionOutcome {
                    url: url.to_string(),
                    redirected_url: Some(url.to_string()),
                    success: true,
                    status_code: Some(200),
                    html: Some(html),
                    ..Default::default()
                },
                Err(e) => PageSessionOutcome::failure(url, None, format!("failed to read {path}: {e}")),
            };
        }

        if config.check_robots_txt {
            if let Some(robots) = robots {
                match self.check_robots(robots, url).await {
                    Ok(true) => {}
                    Ok(false) => {
                        return PageSessionOutcome::failure(url, Some(403), "robots.txt disallow");
                    }
                    Err(e) => {
                        warn!(url, error = %e, "robots.txt check failed, proceeding");
                    }
                }
            }
        }

        self.run_live(page, url, config, hooks).await
    }

    async fn check_robots(&self, robots: &RobotsCache, url: &str) -> Result<bool, CrawlError> {
        let parsed = url::Url::parse(url).map_err(|e| CrawlError::InputError { message: e.to_string() })?;
        let host = parsed.host_str().unwrap_or("").to_string();
        let path = if parsed.path().is_empty() { "/".to_string() } else { parsed.path().to_string() };
        robots.is_allowed(&host, &path, &self.user_agent).await
    }

    async fn run_live(
        &self,
        page: &dyn PageHandle,
        url: &str,
        config: &CrawlerRunConfig,
        hooks: &HookRegistry,
    ) -> PageSessionOutcome {
        let mut warnings = Vec::new();
        let mut owned_replacement: Option<Box<dyn PageHandle>> = None;
        let mut current: &dyn PageHandle = page;

        // Fires `hooks` at `$point` against the current working page and, if
        // a hook returned a replacement, rebinds `current` to it for every
        // subsequent step (§4.11 "a hook may return a replacement page
        // handle"). Early-returns a failure outcome on a critical-hook error.
        macro_rules! fire_hook {
            ($point:expr) => {{
                let mut ctx = HookContext::new(current);
                ctx.url = Some(url.to_string());
                ctx.session_id = config.session_id.clone();
                match hooks.fire($point, &mut ctx, &config.hooks.critical).await {
                    Ok(w) => {
                        if let Some(replacement) = ctx.replacement.take() {
                            owned_replacement = Some(replacement);
                            current = owned_replacement.as_deref().unwrap();
                        }
                        w
                    }
                    Err(e) => return PageSessionOutcome::failure(url, None, e.to_string()),
                }
            }};
        }

        if !config.js_only {
            fire_hook!(HookPoint::BeforeGoto);

            let host = host_of(url);
            let breaker = self.nav_breaker(&host);
            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(reason) => {
                    return PageSessionOutcome::failure(
                        url,
                        None,
                        CrawlError::NavigationError { message: format!("circuit open for {host}: {reason}") }.to_string(),
                    );
                }
            };

            let nav_timeout = self.timeouts.timeout_for(&host);
            debug!(url, timeout = ?nav_timeout, "navigating");
            let started = Instant::now();
            match current.goto(url, nav_timeout).await {
                Ok(()) => {
                    self.timeouts.record_success(&host, started.elapsed());
                    breaker.on_success();
                }
                Err(e) => {
                    self.timeouts.record_timeout(&host);
                    breaker.on_failure();
                    return PageSessionOutcome::failure(url, None, e.to_string());
                }
            }
            drop(permit);

            warnings.extend(fire_hook!(HookPoint::AfterGoto));
        }

        let redirected_url = match current.current_url().await {
            Ok(u) => u,
            Err(e) => return PageSessionOutcome::failure(url, None, e.to_string()),
        };

        if let Some(wait_for) = &config.wait_for {
            if let Err(e) = self.poll_wait_for(current, wait_for, config.page_timeout).await {
                return PageSessionOutcome {
                    url: url.to_string(),
                    redirected_url: Some(redirected_url),
                    success: false,
                    status_code: None,
                    error_message: Some(e.to_string()),
                    warnings,
                    ..Default::default()
                };
            }
        }

        fire_hook!(HookPoint::OnExecutionStarted);

        let mut js_execution_result = None;
        for code in &config.js_code {
            match current.evaluate(code).await {
                Ok(value) => js_execution_result = Some(value),
                Err(e) => {
                    return PageSessionOutcome {
                        url: url.to_string(),
                        redirected_url: Some(redirected_url),
                        success: false,
                        error_message: Some(
                            CrawlError::ScriptError {
                                expression: code.clone(),
                                message: e.to_string(),
                            }
                            .to_string(),
                        ),
                        warnings,
                        ..Default::default()
                    };
                }
            }
        }

        if config.scan_full_page {
            self.scroll_full_page(current, config.scroll_delay).await;
        }

        if let Some(virtual_scroll) = &config.virtual_scroll {
            self.run_virtual_scroll(current, virtual_scroll).await;
        }

        if config.wait_for_images {
            if let Err(e) = self.wait_for_images(current, config.page_timeout).await {
                warnings.push(e.to_string());
            }
        }

        let screenshot = if config.screenshot {
            match current.screenshot_png_base64().await {
                Ok(data) => Some(data),
                Err(e) => {
                    warnings.push(format!("screenshot failed: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let pdf = if config.pdf {
            match current.pdf_base64().await {
                Ok(data) => Some(data),
                Err(e) => {
                    warnings.push(format!("pdf capture failed: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let mhtml = current.mhtml_base64().await.unwrap_or_else(|e| {
            warnings.push(format!("mhtml capture failed: {e}"));
            None
        });

        let network_requests = if config.capture_network {
            match current.network_requests().await {
                Ok(reqs) => Some(reqs),
                Err(e) => {
                    warnings.push(format!("network capture failed: {e}"));
                    None
                }
            }
        } else {
            None
        };

        let console_messages = if config.capture_console {
            match current.console_messages().await {
                Ok(msgs) => Some(msgs),
                Err(e) => {
                    warnings.push(format!("console capture failed: {e}"));
                    None
                }
            }
        } else {
            None
        };

        if !config.delay_before_return_html.is_zero() {
            tokio::time::sleep(config.delay_before_return_html).await;
        }

        warnings.extend(fire_hook!(HookPoint::BeforeRetrieveHtml));

        let html = match current.content().await {
            Ok(html) => html,
            Err(e) => return PageSessionOutcome::failure(url, None, e.to_string()),
        };

        let ssl_certificate = current.ssl_certificate().await.unwrap_or_else(|e| {
            warnings.push(format!("ssl certificate fetch failed: {e}"));
            None
        });

        warnings.extend(fire_hook!(HookPoint::BeforeReturnHtml));

        PageSessionOutcome {
            url: url.to_string(),
            redirected_url: Some(redirected_url),
            success: true,
            status_code: Some(200),
            html: Some(html),
            js_execution_result,
            screenshot,
            pdf,
            mhtml,
            network_requests,
            console_messages,
            ssl_certificate,
            error_message: None,
            warnings,
        }
    }

    async fn poll_wait_for(&self, page: &dyn PageHandle, wait_for: &WaitFor, timeout: Duration) -> Result<(), CrawlError> {
        let deadline = Instant::now() + timeout;
        let describe = || match wait_for {
            WaitFor::Css(s) => format!("css:{s}"),
            WaitFor::XPath(s) => format!("xpath:{s}"),
            WaitFor::Js(s) => format!("js:{s}"),
        };

        loop {
            let satisfied = match wait_for {
                WaitFor::Css(selector) => page.wait_for_selector(selector, POLL_INTERVAL).await.unwrap_or(false),
                WaitFor::XPath(expr) => {
                    let script = format!(
                        "!!document.evaluate({expr:?}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
                    );
                    matches!(page.evaluate(&script).await, Ok(serde_json::Value::Bool(true)))
                }
                WaitFor::Js(predicate) => matches!(page.evaluate(predicate).await, Ok(serde_json::Value::Bool(true))),
            };

            if satisfied {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CrawlError::WaitTimeout { what: describe() });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn scroll_full_page(&self, page: &dyn PageHandle, scroll_delay: Duration) {
        let height: u64 = match page.evaluate("document.body.scrollHeight").await {
            Ok(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
            _ => 0,
        };
        let viewport: u64 = match page.evaluate("window.innerHeight").await {
            Ok(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(800).max(1),
            _ => 800,
        };

        let mut scrolled = 0u64;
        while scrolled < height {
            let _ = page.evaluate(&format!("window.scrollBy(0, {viewport})")).await;
            scrolled += viewport;
            if !scroll_delay.is_zero() {
                tokio::time::sleep(scroll_delay).await;
            }
        }
    }

    async fn run_virtual_scroll(&self, page: &dyn PageHandle, cfg: &VirtualScrollConfig) {
        let scroll_script = match (&cfg.container_selector, &cfg.scroll_by) {
            (Some(sel), ScrollBy::ContainerHeight) => {
                format!("(function(){{var e=document.querySelector({sel:?});if(e)e.scrollTop+=e.clientHeight;}})()")
            }
            (None, ScrollBy::ContainerHeight) | (None, ScrollBy::PageHeight) => {
                "window.scrollBy(0, window.innerHeight)".to_string()
            }
            (Some(sel), ScrollBy::PageHeight) => {
                format!("(function(){{var e=document.querySelector({sel:?});if(e)e.scrollTop+=window.innerHeight;}})()")
            }
            (Some(sel), ScrollBy::Pixels(px)) => {
                format!("(function(){{var e=document.querySelector({sel:?});if(e)e.scrollTop+={px};}})()")
            }
            (None, ScrollBy::Pixels(px)) => format!("window.scrollBy(0, {px})"),
        };

        let mut last_len = 0usize;
        for _ in 0..cfg.max_scrolls {
            let _ = page.evaluate(&scroll_script).await;
            if !cfg.scroll_delay.is_zero() {
                tokio::time::sleep(cfg.scroll_delay).await;
            }
            let content_len = page.content().await.map(|c| c.len()).unwrap_or(last_len);
            if content_len <= last_len {
                break;
            }
            last_len = content_len;
        }
    }

    async fn wait_for_images(&self, page: &dyn PageHandle, timeout: Duration) -> Result<(), CrawlError> {
        const SCRIPT: &str = "Array.from(document.images).every(img => img.complete && img.naturalWidth > 0)";
        let deadline = Instant::now() + timeout;
        loop {
            if matches!(page.evaluate(SCRIPT).await, Ok(serde_json::Value::Bool(true))) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CrawlError::WaitTimeout { what: "image readiness".to_string() });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Extracts the host for per-host circuit breaker / timeout profile keying;
/// falls back to the whole URL when it doesn't parse as one (matching the
/// facade's own `host_of` in `src/lib.rs`).
fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
