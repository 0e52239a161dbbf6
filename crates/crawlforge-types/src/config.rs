//! Immutable configuration values: [`BrowserConfig`] (the environment a
//! browser is launched with) and [`CrawlerRunConfig`] (per-crawl behavior).
//!
//! Both are plain value types. Neither is ever mutated once a crawl begins —
//! callers clone with overrides instead (see `CrawlerRunConfig::with_overrides`).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::schema::ExtractionSchema;

/// Browser engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    Chromium,
    Firefox,
    Webkit,
}

impl Default for BrowserEngine {
    fn default() -> Self {
        Self::Chromium
    }
}

/// The environment a browser instance is launched with.
///
/// Immutable value; hashed to a [`Fingerprint`] that keys the fleet's tier
/// maps. Two `BrowserConfig`s that hash to the same fingerprint are treated
/// as interchangeable by the fleet manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub cookies: Vec<Cookie>,
    pub headers: HashMap<String, String>,
    /// If true, the browser keeps a persistent on-disk profile at
    /// `user_data_dir` rather than an ephemeral one.
    pub persistent: bool,
    pub user_data_dir: Option<String>,
    pub stealth: bool,
    pub extra_args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::default(),
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            proxy: None,
            user_agent: None,
            cookies: Vec::new(),
            headers: HashMap::new(),
            persistent: false,
            user_data_dir: None,
            stealth: false,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Deterministic hash of every field that affects how the browser is
    /// launched. Two configs with the same fingerprint are served by the
    /// same fleet tier slot.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_browser_config(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

/// A `wait_for` specification: poll until true or until timeout (§4.2 step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WaitFor {
    Css(String),
    XPath(String),
    /// A boolean-returning function-form JS predicate.
    Js(String),
}

/// Cache interaction mode (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheMode {
    Enabled,
    Bypass,
    ReadOnly,
    WriteOnly,
    Disabled,
}

impl Default for CacheMode {
    fn default() -> Self {
        Self::Enabled
    }
}

/// Virtual-scroll container strategy for infinite-scroll pages (§4.2 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualScrollConfig {
    pub container_selector: Option<String>,
    pub scroll_by: ScrollBy,
    pub max_scrolls: u32,
    pub scroll_delay: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScrollBy {
    ContainerHeight,
    PageHeight,
    Pixels(u32),
}

/// Lifecycle points a hook may be registered against (§4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookPoint {
    OnBrowserCreated,
    OnPageContextCreated,
    OnUserAgentUpdated,
    BeforeGoto,
    AfterGoto,
    OnExecutionStarted,
    BeforeRetrieveHtml,
    BeforeReturnHtml,
}

/// Per-crawl hook registration, keyed by lifecycle point, run in registration
/// order (§4.11). The actual callback type lives in `crawlforge-events`; this
/// crate only carries the declarative shape so `CrawlerRunConfig` doesn't
/// need to depend on the hook runtime crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    pub critical: Vec<HookPoint>,
}

/// Per-crawl behavior. Never mutated after a crawl begins (Invariant a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerRunConfig {
    pub cache_mode: CacheMode,
    pub wait_for: Option<WaitFor>,
    pub js_code: Vec<String>,
    pub session_id: Option<String>,
    pub extraction_schema: Option<ExtractionSchema>,
    pub word_count_threshold: usize,
    pub excluded_tags: Vec<String>,
    pub exclude_external_links: bool,
    pub exclude_external_images: bool,
    pub screenshot: bool,
    pub pdf: bool,
    pub capture_network: bool,
    pub capture_console: bool,
    pub page_timeout: Duration,
    pub delay_before_return_html: Duration,
    pub scan_full_page: bool,
    pub scroll_delay: Duration,
    pub wait_for_images: bool,
    pub virtual_scroll: Option<VirtualScrollConfig>,
    pub hooks: HooksConfig,
    pub css_selector: Option<String>,
    pub target_elements: Vec<String>,
    pub check_robots_txt: bool,
    pub js_only: bool,
}

impl Default for CrawlerRunConfig {
    fn default() -> Self {
        Self {
            cache_mode: CacheMode::default(),
            wait_for: None,
            js_code: Vec::new(),
            session_id: None,
            extraction_schema: None,
            word_count_threshold: 0,
            excluded_tags: vec!["script".into(), "style".into()],
            exclude_external_links: false,
            exclude_external_images: false,
            screenshot: false,
            pdf: false,
            capture_network: false,
            capture_console: false,
            page_timeout: Duration::from_secs(60),
            delay_before_return_html: Duration::ZERO,
            scan_full_page: false,
            scroll_delay: Duration::from_millis(500),
            wait_for_images: false,
            virtual_scroll: None,
            hooks: HooksConfig::default(),
            css_selector: None,
            target_elements: Vec::new(),
            check_robots_txt: false,
            js_only: false,
        }
    }
}

impl CrawlerRunConfig {
    /// Clone this config with a session id attached, for reuse across a
    /// sequence of crawls sharing page state.
    pub fn with_session(&self, session_id: impl Into<String>) -> Self {
        let mut cfg = self.clone();
        cfg.session_id = Some(session_id.into());
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_config_default_is_headless_chromium() {
        let cfg = BrowserConfig::default();
        assert_eq!(cfg.engine, BrowserEngine::Chromium);
        assert!(cfg.headless);
        assert_eq!(cfg.viewport_width, 1920);
    }

    #[test]
    fn run_config_default_excludes_script_and_style() {
        let cfg = CrawlerRunConfig::default();
        assert!(cfg.excluded_tags.contains(&"script".to_string()));
        assert!(cfg.excluded_tags.contains(&"style".to_string()));
    }

    #[test]
    fn with_session_does_not_mutate_original() {
        let base = CrawlerRunConfig::default();
        let with_session = base.with_session("abc");
        assert!(base.session_id.is_none());
        assert_eq!(with_session.session_id.as_deref(), Some("abc"));
    }
}
