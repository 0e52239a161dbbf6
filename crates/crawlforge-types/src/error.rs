//! The error taxonomy (§7): kinds, not type names. Each kind is surfaced on
//! `CrawlResult` with `success=false`; the crawl of other URLs is never
//! affected by one URL's failure.

use thiserror::Error;

/// Core error kinds for the crawling engine.
#[derive(Error, Debug, Clone)]
pub enum CrawlError {
    #[error("invalid input: {message}")]
    InputError { message: String },

    #[error("robots.txt disallow: {url}")]
    RobotsDisallow { url: String },

    #[error("browser launch failed: {message}")]
    BrowserLaunchError { message: String },

    #[error("navigation failed: {message}")]
    NavigationError { message: String },

    #[error("wait_for timed out: {what}")]
    WaitTimeout { what: String },

    #[error("script error evaluating `{expression}`: {message}")]
    ScriptError { expression: String, message: String },

    #[error("extraction failed: {message}")]
    ExtractionError { message: String },

    #[error("rate limited: {host}")]
    RateLimited { host: String },

    #[error("cache error: {message}")]
    CacheError { message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error in {component}: {message}")]
    Internal { component: String, message: String },
}

impl CrawlError {
    /// Only `NavigationError` and `RateLimited` are retried by the
    /// dispatcher (§7 "Propagation policy").
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NavigationError { .. } | Self::RateLimited { .. })
    }

    /// The HTTP-ish status code this error kind implies, when one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RobotsDisallow { .. } => Some(403),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn internal(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;
