//! Browser driver capability: the minimal surface the fleet manager and
//! page session need from a concrete automation engine (§6).

use async_trait::async_trait;
use std::time::Duration;

use crate::config::BrowserConfig;
use crate::error::CrawlError;

/// One captured network request/response pair (§4.2 step 7, `capture_network`).
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub status_code: Option<u16>,
    pub resource_type: Option<String>,
}

/// One captured `console.*` call (§4.2 step 7, `capture_console`).
#[derive(Debug, Clone)]
pub struct CapturedConsoleMessage {
    pub level: String,
    pub text: String,
}

/// TLS certificate metadata for the final URL, when fetchable (§4.2 step 8).
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub valid_from: chrono::DateTime<chrono::Utc>,
    pub valid_to: chrono::DateTime<chrono::Utc>,
}

/// A handle to one live page within a launched browser. Implementations wrap
/// a concrete CDP/WebDriver page object.
///
/// The capture-related methods (`mhtml_base64`, `network_requests`,
/// `console_messages`, `ssl_certificate`) have default bodies that report
/// "not supported" so a minimal driver implementation only needs the core
/// navigate/evaluate surface; a full CDP driver overrides them.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), CrawlError>;
    async fn current_url(&self) -> Result<String, CrawlError>;
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, CrawlError>;
    async fn content(&self) -> Result<String, CrawlError>;
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, CrawlError>;
    async fn screenshot_png_base64(&self) -> Result<String, CrawlError>;
    async fn pdf_base64(&self) -> Result<String, CrawlError>;
    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<(), CrawlError>;
    async fn close(&self) -> Result<(), CrawlError>;

    async fn mhtml_base64(&self) -> Result<Option<String>, CrawlError> {
        Ok(None)
    }

    async fn network_requests(&self) -> Result<Vec<CapturedRequest>, CrawlError> {
        Ok(Vec::new())
    }

    async fn console_messages(&self) -> Result<Vec<CapturedConsoleMessage>, CrawlError> {
        Ok(Vec::new())
    }

    async fn ssl_certificate(&self) -> Result<Option<CertificateInfo>, CrawlError> {
        Ok(None)
    }
}

/// A launched browser instance capable of spawning pages. Implementations
/// wrap a concrete `Browser` handle (e.g. a CDP connection). Object-safe so
/// the fleet manager can hold `Arc<dyn BrowserDriver>` regardless of engine.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PageHandle>, CrawlError>;

    async fn close(&self) -> Result<(), CrawlError>;
}

/// Launches browser processes for a given engine. Kept separate from
/// [`BrowserDriver`] because construction is not object-safe (it returns
/// `Self`); the fleet manager depends on this trait only at the single
/// call site where a new browser is actually spawned.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserDriver>, CrawlError>;
}
