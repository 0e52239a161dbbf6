//! The facade-level request shape: `CrawlerRunConfig` plus the
//! higher-level selections (extraction strategy, content filter, markdown
//! source, per-URL matching, deep-crawl strategy) that spec's per-call
//! config table names but that `crawlforge-types` can't carry directly --
//! doing so would make the foundational crate depend on
//! `crawlforge-content`/`crawlforge-extraction`/`crawlforge-spider`, which
//! depend on it. `CrawlConfig` lives in the root crate instead, the one
//! place already free to depend on everything.

use std::sync::Arc;

use regex::Regex;

use crawlforge_content::MarkdownConfig;
use crawlforge_content::{Bm25FilterConfig, PruningConfig};
use crawlforge_extraction::regex_strategy::NamedPattern;
use crawlforge_extraction::MergeStrategy;
use crawlforge_spider::DeepCrawlConfig;
use crawlforge_types::schema::ExtractionSchema;
use crawlforge_types::{BrowserConfig, CrawlerRunConfig};

/// Which extraction strategy (§4.4) to run over `cleaned_html`/`fit_html`,
/// and its config. `None` on [`CrawlConfig`] means no structured
/// extraction runs even if `run.extraction_schema` happens to be set --
/// the schema alone doesn't say which backend to parse it with, so the
/// backend must be chosen explicitly here (see DESIGN.md).
pub enum ExtractionBackend {
    JsonCss(ExtractionSchema),
    JsonXPath(ExtractionSchema),
    Regex(Vec<NamedPattern>),
    Llm {
        instruction: String,
        schema: Option<serde_json::Value>,
        merge_strategy: MergeStrategy,
    },
}

/// Which content filter (§4.3 step 3) to run before markdown generation.
/// The `Llm` variant only carries the instruction; the `&dyn Llm`
/// reference is supplied by the engine at call time since a stored config
/// value can't hold a borrow.
pub enum ContentFilterSelection {
    Pruning(PruningConfig),
    Bm25(Bm25FilterConfig),
    Llm { instruction: String },
}

/// `url_matcher` (§4.6, §9): a glob list, a predicate, or a boolean
/// combination of either, matched against the candidate URL in
/// `crawl_many`'s per-URL config selection.
pub enum UrlMatcher {
    Glob(String),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
    And(Box<UrlMatcher>, Box<UrlMatcher>),
    Or(Box<UrlMatcher>, Box<UrlMatcher>),
}

impl UrlMatcher {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatcher::Glob(pattern) => glob_match(pattern, url),
            UrlMatcher::Predicate(f) => f(url),
            UrlMatcher::And(a, b) => a.matches(url) && b.matches(url),
            UrlMatcher::Or(a, b) => a.matches(url) || b.matches(url),
        }
    }
}

fn glob_match(pattern: &str, url: &str) -> bool {
    let mut regex_str = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            c => regex_str.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex_str.push('$');
    Regex::new(&regex_str).map(|re| re.is_match(url)).unwrap_or(false)
}

/// One fully-resolved per-crawl request: the browser environment, the
/// fixed page-session behavior, and the facade-level selections layered
/// on top of it. `matcher` is only consulted by `crawl_many`'s per-URL
/// config selection (§4.6, §9); `crawl` ignores it.
pub struct CrawlConfig {
    pub browser: BrowserConfig,
    pub run: CrawlerRunConfig,
    pub extraction: Option<ExtractionBackend>,
    pub content_filter: Option<ContentFilterSelection>,
    pub markdown: MarkdownConfig,
    pub matcher: Option<UrlMatcher>,
    pub deep_crawl: Option<DeepCrawlConfig>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            run: CrawlerRunConfig::default(),
            extraction: None,
            content_filter: None,
            markdown: MarkdownConfig::default(),
            matcher: None,
            deep_crawl: None,
        }
    }
}

/// Picks the first config in `configs` whose `matcher` accepts `url`, or,
/// failing that, the first trailing config with no matcher at all --
/// §4.6/§9's "first match wins; unmatched URLs use a trailing config
/// without a matcher as the default".
pub fn select_config<'a>(configs: &'a [CrawlConfig], url: &str) -> Option<&'a CrawlConfig> {
    for cfg in configs {
        match &cfg.matcher {
            Some(matcher) if matcher.matches(url) => return Some(cfg),
            Some(_) => continue,
            None => return Some(cfg),
        }
    }
    None
}
