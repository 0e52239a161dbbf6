//! The immutable per-URL outcome of a crawl, and the stages that feed it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text view of a page, produced once per crawl (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownResult {
    pub raw_markdown: String,
    pub markdown_with_citations: Option<String>,
    pub references_markdown: Option<String>,
    pub fit_markdown: Option<String>,
    pub fit_html: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: Option<String>,
    pub title: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Links {
    pub internal: Vec<Link>,
    pub external: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMedia {
    pub src: String,
    pub alt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMedia {
    pub src: String,
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMedia {
    pub src: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub caption: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Media {
    pub images: Vec<ImageMedia>,
    pub videos: Vec<VideoMedia>,
    pub audio: Vec<AudioMedia>,
    pub tables: Vec<TableData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequest {
    pub url: String,
    pub method: String,
    pub status_code: Option<u16>,
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslCertificate {
    pub subject: String,
    pub issuer: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
}

/// Concurrency accounting attached to every `CrawlResult` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub task_id: String,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub memory_delta_mb: i64,
    pub attempts: u32,
}

impl DispatchResult {
    pub fn new(task_id: impl Into<String>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            submitted_at,
            started_at: None,
            finished_at: None,
            memory_delta_mb: 0,
            attempts: 0,
        }
    }
}

/// Free-form per-result metadata (depth, score, and similar traversal
/// context §9 "carry only depth and score as metadata").
pub type ResultMetadata = HashMap<String, serde_json::Value>;

/// The final, immutable per-URL outcome (§3, §4.12).
///
/// Constructed once by the dispatcher pipeline and never mutated afterward.
/// `url` always equals the input URL (Invariant c); any redirect chain ends
/// in `redirected_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub redirected_url: Option<String>,
    pub success: bool,
    pub status_code: Option<u16>,
    pub html: Option<String>,
    pub cleaned_html: Option<String>,
    pub markdown: Option<MarkdownResult>,
    /// Value of the last expression in `js_code`, when any script ran (§4.2
    /// step 4, §8 scenario E).
    pub js_execution_result: Option<serde_json::Value>,
    /// Either valid JSON text or an error-annotated empty payload; never
    /// left undefined when an extraction strategy was configured and the
    /// page succeeded (Invariant d).
    pub extracted_content: Option<String>,
    pub media: Media,
    pub links: Links,
    pub screenshot: Option<String>,
    pub pdf: Option<String>,
    pub mhtml: Option<String>,
    pub network_requests: Option<Vec<NetworkRequest>>,
    pub console_messages: Option<Vec<ConsoleMessage>>,
    pub ssl_certificate: Option<SslCertificate>,
    pub error_message: Option<String>,
    pub metadata: ResultMetadata,
    pub session_id: Option<String>,
    pub dispatch: Option<DispatchResult>,
    /// Non-fatal warnings accumulated along the pipeline (hook failures,
    /// cache misses due to corruption, per-block extraction errors).
    pub warnings: Vec<String>,
}

impl CrawlResult {
    /// The canonical `"Raw HTML"` result shell for the `raw:` URL scheme
    /// (§6 "URL schemes accepted", §9 resolves the `redirected_url` open
    /// question as `None`).
    pub fn raw_html_shell() -> Self {
        Self {
            url: "Raw HTML".to_string(),
            redirected_url: None,
            success: true,
            status_code: Some(200),
            html: None,
            cleaned_html: None,
            markdown: None,
            js_execution_result: None,
            extracted_content: None,
            media: Media::default(),
            links: Links::default(),
            screenshot: None,
            pdf: None,
            mhtml: None,
            network_requests: None,
            console_messages: None,
            ssl_certificate: None,
            error_message: None,
            metadata: ResultMetadata::new(),
            session_id: None,
            dispatch: None,
            warnings: Vec::new(),
        }
    }

    /// A failure shell carrying only the fields §7 guarantees are always
    /// present on failure: `success=false`, a status code when known, and
    /// `error_message`.
    pub fn failure(url: impl Into<String>, status_code: Option<u16>, error_message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            redirected_url: None,
            success: false,
            status_code,
            html: None,
            cleaned_html: None,
            markdown: None,
            js_execution_result: None,
            extracted_content: None,
            media: Media::default(),
            links: Links::default(),
            screenshot: None,
            pdf: None,
            mhtml: None,
            network_requests: None,
            console_messages: None,
            ssl_certificate: None,
            error_message: Some(error_message.into()),
            metadata: ResultMetadata::new(),
            session_id: None,
            dispatch: None,
            warnings: Vec::new(),
        }
    }
}

/// A persistent prior result keyed by fingerprint + URL + config hash (§3, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub url: String,
    pub config_hash: String,
    pub stored_result: CrawlResult,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_seconds() >= 0 && (age.num_seconds() as u64) < self.ttl_secs
    }
}
