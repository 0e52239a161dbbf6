//! End-to-end facade tests (spec §8): scenarios that need the full
//! fleet/session/cache wiring rather than one crate in isolation.
//! Scenario A (raw HTML) and B (robots disallow) are already exercised
//! against `PageSession::run` directly in `crawlforge-browser`; scenario C
//! (CSS schema) and D (BFS depth cap) live in `crawlforge-extraction` and
//! `crawlforge-spider` respectively. This file covers E (session reuse)
//! and F (cache bypass), plus the dispatcher's ordering guarantees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crawlforge::{CrawlConfig, Dispatcher, DispatcherConfig, Engine};
use crawlforge_browser::{FleetConfig, FleetManager};
use crawlforge_cache::{Cache, FilesystemCacheBackend};
use crawlforge_events::HookRegistry;
use crawlforge_types::ports::{BrowserDriver, BrowserLauncher, PageHandle};
use crawlforge_types::{BrowserConfig, CacheMode, CrawlError, CrawlResult};

struct StatefulPage {
    state: std::sync::Mutex<Option<serde_json::Value>>,
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl PageHandle for StatefulPage {
    async fn goto(&self, _url: &str, _timeout: Duration) -> Result<(), CrawlError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    async fn current_url(&self) -> Result<String, CrawlError> {
        Ok("https://example.com".to_string())
    }
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, CrawlError> {
        if let Some(rest) = script.strip_prefix("window.__x=") {
            let value: i64 = rest.trim_end_matches(';').parse().unwrap_or(0);
            *self.state.lock().unwrap() = Some(serde_json::json!(value));
            return Ok(serde_json::Value::Null);
        }
        Ok(self.state.lock().unwrap().clone().unwrap_or(serde_json::Value::Null))
    }
    async fn content(&self) -> Result<String, CrawlError> {
        Ok("<html><body>ok</body></html>".to_string())
    }
    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool, CrawlError> {
        Ok(true)
    }
    async fn screenshot_png_base64(&self) -> Result<String, CrawlError> {
        Ok(String::new())
    }
    async fn pdf_base64(&self) -> Result<String, CrawlError> {
        Ok(String::new())
    }
    async fn set_extra_headers(&self, _headers: &[(String, String)]) -> Result<(), CrawlError> {
        Ok(())
    }
    async fn close(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

struct StatefulDriver {
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserDriver for StatefulDriver {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, CrawlError> {
        Ok(Box::new(StatefulPage { state: std::sync::Mutex::new(None), fetches: self.fetches.clone() }))
    }
    async fn close(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

struct CountingLauncher {
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserLauncher for CountingLauncher {
    async fn launch(&self, _config: &BrowserConfig) -> Result<Box<dyn BrowserDriver>, CrawlError> {
        Ok(Box::new(StatefulDriver { fetches: self.fetches.clone() }))
    }
}

fn engine_with(fetches: Arc<AtomicUsize>, cache: Option<Cache>) -> Engine {
    let fleet = FleetManager::new(FleetConfig::default(), Arc::new(CountingLauncher { fetches }));
    Engine::new(fleet, HookRegistry::new(), None, cache, None)
}

/// Scenario E: a second crawl under the same `session_id` sees JS state
/// set by the first crawl, because the facade reuses the same page.
#[tokio::test]
async fn session_reuse_carries_js_state_across_crawls() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(fetches, None);

    let mut first = CrawlConfig::default();
    first.run.session_id = Some("s".to_string());
    first.run.js_code = vec!["window.__x=42;".to_string()];
    let r1 = engine.crawl_one("https://example.com", &first).await;
    assert!(r1.success, "first crawl failed: {:?}", r1.error_message);

    let mut second = CrawlConfig::default();
    second.run.session_id = Some("s".to_string());
    second.run.js_code = vec!["return window.__x;".to_string()];
    let r2 = engine.crawl_one("https://example.com", &second).await;

    assert!(r2.success, "second crawl failed: {:?}", r2.error_message);
    assert_eq!(r2.js_execution_result, Some(serde_json::json!(42)));
}

/// Scenario F: bypass mode never reads or writes the cache file, so a
/// second crawl re-fetches and the file's mtime never moves.
#[tokio::test]
async fn cache_bypass_refetches_and_never_touches_the_cache_file() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FilesystemCacheBackend::new(dir.path()));
    let cache = Cache::new(backend, 3600);
    let fetches = Arc::new(AtomicUsize::new(0));
    let engine = engine_with(fetches.clone(), Some(cache));

    let mut enabled = CrawlConfig::default();
    enabled.run.cache_mode = CacheMode::Enabled;
    let r1 = engine.crawl_one("https://example.com", &enabled).await;
    assert!(r1.success);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    let entries_after_first: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries_after_first.len(), 1, "expected exactly one cache file written");
    let mtime_before = entries_after_first[0].as_ref().unwrap().metadata().unwrap().modified().unwrap();

    let mut bypass = CrawlConfig::default();
    bypass.run.cache_mode = CacheMode::Bypass;
    let r2 = engine.crawl_one("https://example.com", &bypass).await;
    assert!(r2.success);
    assert_eq!(fetches.load(Ordering::SeqCst), 2, "bypass mode must issue its own network fetch");

    let entries_after_second: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries_after_second.len(), 1, "bypass mode must not write a new cache file");
    let mtime_after = entries_after_second[0].as_ref().unwrap().metadata().unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after, "bypass mode must not touch the existing cache file");
}

/// §4.6 Ordering guarantee (c): retries and concurrency never reorder
/// results in non-stream mode -- results come back in submission order.
#[tokio::test]
async fn dispatcher_preserves_submission_order_in_non_stream_mode() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default());
    let mut results = Vec::new();
    for i in 0..5 {
        let url = format!("https://example.com/{i}");
        let delay = Duration::from_millis((5 - i) * 2);
        let result = dispatcher
            .submit(format!("task-{i}"), &url, "example.com", move || async move {
                tokio::time::sleep(delay).await;
                CrawlResult::raw_html_shell()
            })
            .await;
        results.push((url, result));
    }

    for (i, (url, _)) in results.iter().enumerate() {
        assert_eq!(*url, format!("https://example.com/{i}"));
    }
}
