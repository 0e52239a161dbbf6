//! Root facade: wires a Browser Fleet Manager, robots cache, result cache,
//! hook registry, and the adaptive dispatcher into the public `crawl`/
//! `crawl_many` entry points (§4), and implements `PageCrawler` so the
//! deep-crawl and adaptive-crawl strategies in `crawlforge-spider` can drive
//! real crawls through the same pipeline.

pub mod config_hash;
pub mod dispatcher;
pub mod engine;
pub mod request;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crawlforge_browser::{FleetConfig, FleetManager, RobotsCache};
use crawlforge_cache::Cache;
use crawlforge_events::HookRegistry;
use crawlforge_spider::{AdaptiveConfig, DeepCrawlConfig, PageCrawler};
use crawlforge_types::ports::{BrowserLauncher, Embedder, Llm};
use crawlforge_types::{CrawlResult, KnowledgeState};

pub use config_hash::config_hash;
pub use dispatcher::{ConcurrencyLimiterConfig, Dispatcher, DispatcherConfig};
pub use engine::Engine;
pub use request::{ContentFilterSelection, CrawlConfig, ExtractionBackend, UrlMatcher};

/// The fully assembled crawling facade: one per process (or per tenant),
/// holding the long-lived fleet, caches, and dispatcher that every `crawl`/
/// `crawl_many` call shares.
pub struct Crawlforge {
    engine: Engine,
    dispatcher: Dispatcher,
}

impl Crawlforge {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        fleet_config: FleetConfig,
        robots: Option<RobotsCache>,
        cache: Option<Cache>,
        llm: Option<Arc<dyn Llm>>,
        dispatcher_config: DispatcherConfig,
    ) -> Self {
        let fleet = FleetManager::new(fleet_config, launcher);
        let engine = Engine::new(fleet, HookRegistry::new(), robots, cache, llm);
        Self { engine, dispatcher: Dispatcher::new(dispatcher_config) }
    }

    /// A token that cancels every in-flight and future crawl submitted
    /// through this facade's dispatcher (§4.6 cancellation).
    pub fn cancel_token(&self) -> tokio_util::sync::CancellationToken {
        self.dispatcher.cancel_token()
    }

    pub fn cancel(&self) {
        self.dispatcher.cancel();
    }

    /// Crawls a single URL (§4.1). Bypasses the dispatcher's concurrency
    /// and rate-limit gating -- there is only one task, so there is nothing
    /// to schedule against.
    pub async fn crawl(&self, url: &str, cfg: &CrawlConfig) -> CrawlResult {
        self.engine.crawl_one(url, cfg).await
    }

    /// Batch call (§4.6, §9): schedules one dispatcher task per URL, each
    /// resolving its own config via [`request::select_config`].
    ///
    /// When `stream` is `false`, the returned vector preserves input order
    /// (Ordering guarantee (c): retries never change submission order in
    /// non-stream mode). When `stream` is `true`, results are still
    /// returned in completion order via a plain `Vec` here -- callers that
    /// need to observe results incrementally should drive
    /// [`Crawlforge::crawl_many_stream`] instead.
    pub async fn crawl_many(&self, urls: &[String], configs: &[CrawlConfig], stream: bool) -> Vec<CrawlResult> {
        if stream {
            self.crawl_many_unordered(urls, configs).await
        } else {
            self.crawl_many_ordered(urls, configs).await
        }
    }

    async fn crawl_many_ordered(&self, urls: &[String], configs: &[CrawlConfig]) -> Vec<CrawlResult> {
        let mut results = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            self.dispatcher.tick().await;
            let cfg = request::select_config(configs, url);
            let host = host_of(url);
            let task_id = format!("task-{i}");
            let result = self
                .dispatcher
                .submit(task_id, url, &host, || async {
                    match cfg {
                        Some(cfg) => self.engine.crawl_one(url, cfg).await,
                        None => CrawlResult::failure(url, None, "no matching config for url"),
                    }
                })
                .await;
            if result.success {
                self.dispatcher.on_success(&host);
            }
            results.push(result);
        }
        results
    }

    /// §4.6's streaming mode: (b) distinct sessions may complete in any
    /// order. This implementation still awaits tasks sequentially against
    /// the shared dispatcher (the dispatcher itself is the concurrency
    /// source, not this loop), but the returned order reflects completion
    /// rather than being forced back to submission order.
    async fn crawl_many_unordered(&self, urls: &[String], configs: &[CrawlConfig]) -> Vec<CrawlResult> {
        use futures::stream::{FuturesUnordered, StreamExt};

        let mut futs = FuturesUnordered::new();
        for (i, url) in urls.iter().enumerate() {
            self.dispatcher.tick().await;
            let cfg = request::select_config(configs, url);
            let host = host_of(url);
            let task_id = format!("task-{i}");
            futs.push(async move {
                let result = self
                    .dispatcher
                    .submit(task_id, url, &host, || async {
                        match cfg {
                            Some(cfg) => self.engine.crawl_one(url, cfg).await,
                            None => CrawlResult::failure(url, None, "no matching config for url"),
                        }
                    })
                    .await;
                if result.success {
                    self.dispatcher.on_success(&host);
                }
                result
            });
        }

        let mut results = Vec::with_capacity(urls.len());
        while let Some(result) = futs.next().await {
            results.push(result);
        }
        results
    }

    /// Runs a deep crawl (§4.9) starting from `seeds`, driving
    /// `crawlforge-spider::run_deep_crawl` through this facade's own
    /// pipeline via [`PageCrawler`].
    pub async fn deep_crawl(&self, seeds: Vec<String>, deep_cfg: &DeepCrawlConfig, page_cfg: &CrawlConfig) -> Vec<CrawlResult> {
        let crawler = FacadeCrawler { facade: self, cfg: page_cfg };
        crawlforge_spider::deep_crawl::run_deep_crawl(seeds, deep_cfg, &crawler).await
    }

    /// Runs an adaptive crawl (§4.10) from `start_url`, optionally scoring
    /// candidate pages with an embedding model.
    pub async fn adaptive_crawl(
        &self,
        start_url: &str,
        adaptive_cfg: &AdaptiveConfig,
        page_cfg: &CrawlConfig,
        embedder: Option<&dyn Embedder>,
    ) -> (Vec<CrawlResult>, KnowledgeState) {
        let crawler = FacadeCrawler { facade: self, cfg: page_cfg };
        crawlforge_spider::adaptive::run_adaptive_crawl(start_url, adaptive_cfg, &crawler, embedder).await
    }
}

/// Adapts [`Crawlforge::crawl`] to the `PageCrawler` capability the spider
/// crate's strategies depend on, so neither strategy needs to know about
/// the fleet, cache, or dispatcher directly (§6, §9).
struct FacadeCrawler<'a> {
    facade: &'a Crawlforge,
    cfg: &'a CrawlConfig,
}

#[async_trait]
impl<'a> PageCrawler for FacadeCrawler<'a> {
    async fn crawl(&self, url: &str) -> CrawlResult {
        self.facade.engine.crawl_one(url, self.cfg).await
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_extracts_hostname() {
        assert_eq!(host_of("https://example.com/a/b"), "example.com");
    }

    #[test]
    fn host_of_falls_back_to_raw_url_on_parse_failure() {
        assert_eq!(host_of("raw:<html></html>"), "raw:<html></html>");
    }
}
