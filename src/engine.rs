//! Wires the Browser Fleet Manager, Page Session, Content Pipeline,
//! an extraction strategy, and the cache into one per-URL crawl (§4,
//! `URL + Config -> Dispatcher -> Browser Fleet.checkout -> Page Session.run
//! -> Raw HTML -> Content Pipeline -> Extraction -> Cache.write -> Result`).
//! The dispatcher sits one layer above this, in `crate::dispatcher`.

use std::sync::Arc;

use crawlforge_browser::{FleetManager, PageSession, PageSessionOutcome, RobotsCache};
use crawlforge_cache::Cache;
use crawlforge_content::filter::{ContentFilter, LlmFilterConfig, PruningConfig, ThresholdMode};
use crawlforge_content::{run_content_pipeline, ContentPipelineConfig, MarkdownConfig};
use crawlforge_content::scrape::ScrapeConfig;
use crawlforge_events::HookRegistry;
use crawlforge_extraction::{ExtractionContext, ExtractionStrategy, JsonCssExtractor, JsonXPathExtractor, LlmExtractor, RegexExtractor};
use crawlforge_types::ports::{CapturedConsoleMessage, CapturedRequest, CertificateInfo, Llm};
use crawlforge_types::result::{ConsoleMessage, NetworkRequest, ResultMetadata, SslCertificate};
use crawlforge_types::{CrawlError, CrawlResult};

use crate::config_hash::config_hash;
use crate::request::{ContentFilterSelection, CrawlConfig, ExtractionBackend};

/// Everything one crawl call needs, owned for the lifetime of the facade.
/// Construction (which concrete browser launcher, robots fetcher, cache
/// backend, LLM client to use) is the caller's concern -- this struct only
/// orchestrates the already-injected capabilities.
pub struct Engine {
    fleet: FleetManager,
    hooks: HookRegistry,
    robots: Option<RobotsCache>,
    cache: Option<Cache>,
    llm: Option<Arc<dyn Llm>>,
}

impl Engine {
    pub fn new(
        fleet: FleetManager,
        hooks: HookRegistry,
        robots: Option<RobotsCache>,
        cache: Option<Cache>,
        llm: Option<Arc<dyn Llm>>,
    ) -> Self {
        Self { fleet, hooks, robots, cache, llm }
    }

    /// Crawls one URL end to end. Never returns `Err`: any failure along
    /// the way is folded into a `success=false` `CrawlResult` (§7
    /// "the crawl of other URLs is never affected by one URL's failure").
    pub async fn crawl_one(&self, url: &str, cfg: &CrawlConfig) -> CrawlResult {
        match self.crawl_one_inner(url, cfg).await {
            Ok(result) => result,
            Err(e) => CrawlResult::failure(url, e.status_code(), e.to_string()),
        }
    }

    async fn crawl_one_inner(&self, url: &str, cfg: &CrawlConfig) -> Result<CrawlResult, CrawlError> {
        let engine_name = format!("{:?}", cfg.browser.engine).to_lowercase();
        let user_agent = cfg.browser.user_agent.clone().unwrap_or_default();
        let fingerprint = cfg.browser.fingerprint();
        let hash = config_hash(&cfg.run);

        if let Some(cache) = &self.cache {
            cache
                .resolve(
                    &fingerprint.as_hex(),
                    url,
                    &hash,
                    &engine_name,
                    &user_agent,
                    cfg.run.cache_mode,
                    || self.fetch_and_build(url, cfg),
                )
                .await
        } else {
            self.fetch_and_build(url, cfg).await
        }
    }

    async fn fetch_and_build(&self, url: &str, cfg: &CrawlConfig) -> Result<CrawlResult, CrawlError> {
        let checkout = self
            .fleet
            .checkout(&cfg.browser, cfg.run.session_id.as_deref(), &self.hooks, &cfg.run.hooks.critical)
            .await?;
        let session = PageSession::new(cfg.browser.user_agent.clone().unwrap_or_default());
        let outcome = session
            .run(checkout.page.as_ref(), url, &cfg.run, self.robots.as_ref(), &self.hooks)
            .await;
        self.fleet.return_page(checkout, cfg.run.session_id.as_deref()).await?;

        self.build_result(outcome, cfg).await
    }

    async fn build_result(&self, outcome: PageSessionOutcome, cfg: &CrawlConfig) -> Result<CrawlResult, CrawlError> {
        let mut result = CrawlResult {
            url: outcome.url.clone(),
            redirected_url: outcome.redirected_url.clone(),
            success: outcome.success,
            status_code: outcome.status_code,
            html: outcome.html.clone(),
            cleaned_html: None,
            markdown: None,
            js_execution_result: outcome.js_execution_result.clone(),
            extracted_content: None,
            media: Default::default(),
            links: Default::default(),
            screenshot: outcome.screenshot.clone(),
            pdf: outcome.pdf.clone(),
            mhtml: outcome.mhtml.clone(),
            network_requests: outcome.network_requests.as_ref().map(|reqs| reqs.iter().map(map_network_request).collect()),
            console_messages: outcome.console_messages.as_ref().map(|msgs| msgs.iter().map(map_console_message).collect()),
            ssl_certificate: outcome.ssl_certificate.as_ref().map(map_ssl_certificate),
            error_message: outcome.error_message.clone(),
            metadata: ResultMetadata::new(),
            session_id: cfg.run.session_id.clone(),
            dispatch: None,
            warnings: outcome.warnings.clone(),
        };

        let Some(html) = outcome.html.as_deref() else {
            return Ok(result);
        };

        let base_url = result.redirected_url.as_deref().unwrap_or(&result.url);
        let content_cfg = ContentPipelineConfig {
            scrape: ScrapeConfig {
                excluded_tags: &cfg.run.excluded_tags,
                exclude_external_links: cfg.run.exclude_external_links,
                exclude_external_images: cfg.run.exclude_external_images,
                base_url,
            },
            css_selector: cfg.run.css_selector.as_deref(),
            target_elements: &cfg.run.target_elements,
            filter: self.build_content_filter(cfg),
            markdown: clone_markdown_config(&cfg.markdown),
        };

        let pipeline_out = run_content_pipeline(html, content_cfg).await?;
        result.media = pipeline_out.media;
        result.links = pipeline_out.links;
        result.markdown = Some(pipeline_out.markdown);

        if let Some(backend) = &cfg.extraction {
            let extraction_input = pipeline_out.fit_html.as_deref().unwrap_or(&pipeline_out.cleaned_html);
            let ctx = ExtractionContext { url: &result.url };
            match self.build_extractor(backend) {
                Some(extractor) => match extractor.extract(extraction_input, &ctx).await {
                    Ok(value) => result.extracted_content = Some(value.to_string()),
                    Err(e) => {
                        result.warnings.push(format!("extraction failed: {e}"));
                        result.extracted_content = Some(serde_json::json!({ "error": e.to_string() }).to_string());
                        result.success = false;
                        result.error_message = Some(e.to_string());
                    }
                },
                None => {
                    let msg = "llm extraction configured without an Llm capability".to_string();
                    result.warnings.push(msg.clone());
                    result.extracted_content = Some(serde_json::json!({ "error": msg.clone() }).to_string());
                    result.success = false;
                    result.error_message = Some(msg);
                }
            }
        }

        result.cleaned_html = Some(pipeline_out.cleaned_html);
        Ok(result)
    }

    /// Resolves `cfg.content_filter`; when unset but `word_count_threshold`
    /// is positive, falls back to a pruning filter keyed on that threshold
    /// (§3 "word_count_threshold" has no filter of its own in the data
    /// model otherwise -- see DESIGN.md).
    fn build_content_filter<'a>(&'a self, cfg: &'a CrawlConfig) -> Option<ContentFilter<'a>> {
        match &cfg.content_filter {
            Some(ContentFilterSelection::Pruning(pruning)) => Some(ContentFilter::Pruning(pruning.clone())),
            Some(ContentFilterSelection::Bm25(bm25)) => Some(ContentFilter::Bm25(bm25.clone())),
            Some(ContentFilterSelection::Llm { instruction }) => self.llm.as_deref().map(|llm| {
                ContentFilter::Llm(LlmFilterConfig { instruction: instruction.clone(), llm })
            }),
            None if cfg.run.word_count_threshold > 0 => Some(ContentFilter::Pruning(PruningConfig {
                threshold: 0.48,
                threshold_mode: ThresholdMode::Dynamic,
                min_word_count: cfg.run.word_count_threshold,
            })),
            None => None,
        }
    }

    /// Builds the configured extraction strategy. Returns `None` only for
    /// the `Llm` backend when no `Llm` capability was injected; the other
    /// three backends are always constructible from their own config.
    fn build_extractor<'a>(&'a self, backend: &'a ExtractionBackend) -> Option<Box<dyn ExtractionStrategy + 'a>> {
        match backend {
            ExtractionBackend::JsonCss(schema) => Some(Box::new(JsonCssExtractor::new(schema.clone()))),
            ExtractionBackend::JsonXPath(schema) => Some(Box::new(JsonXPathExtractor::new(schema.clone()))),
            ExtractionBackend::Regex(patterns) => Some(Box::new(RegexExtractor::new(patterns.clone()))),
            ExtractionBackend::Llm { instruction, schema, merge_strategy } => {
                let llm = self.llm.as_deref()?;
                let mut extractor = LlmExtractor::new(llm, instruction.clone()).with_merge_strategy(*merge_strategy);
                if let Some(schema) = schema {
                    extractor = extractor.with_schema(schema.clone());
                }
                Some(Box::new(extractor))
            }
        }
    }
}

fn clone_markdown_config(cfg: &MarkdownConfig) -> MarkdownConfig {
    MarkdownConfig { content_source: cfg.content_source, citations: cfg.citations }
}

fn map_network_request(req: &CapturedRequest) -> NetworkRequest {
    NetworkRequest {
        url: req.url.clone(),
        method: req.method.clone(),
        status_code: req.status_code,
        resource_type: req.resource_type.clone(),
    }
}

fn map_console_message(msg: &CapturedConsoleMessage) -> ConsoleMessage {
    ConsoleMessage { level: msg.level.clone(), text: msg.text.clone() }
}

fn map_ssl_certificate(cert: &CertificateInfo) -> SslCertificate {
    SslCertificate {
        subject: cert.subject.clone(),
        issuer: cert.issuer.clone(),
        valid_from: cert.valid_from,
        valid_to: cert.valid_to,
    }
}
