//! Core data model, error taxonomy, and capability port traits for the
//! crawlforge crawling engine.
//!
//! This crate has no knowledge of browsers, HTML parsers, or LLM SDKs — it
//! defines the shapes everything else agrees on (§3 of the design) and the
//! trait boundaries (§6) that let the engine consume those capabilities
//! without depending on a concrete provider.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod knowledge;
pub mod ports;
pub mod result;
pub mod schema;

pub use config::{
    BrowserConfig, BrowserEngine, CacheMode, CrawlerRunConfig, HooksConfig, VirtualScrollConfig,
    WaitFor,
};
pub use error::{CrawlError, CrawlResult as Fallible};
pub use fingerprint::Fingerprint;
pub use knowledge::{KnowledgeState, ScoredDocument};
pub use result::{
    CacheEntry, ConsoleMessage, CrawlResult, DispatchResult, Link, Links, Media, MarkdownResult,
    NetworkRequest, SslCertificate, TableData,
};
pub use schema::{ExtractionField, ExtractionSchema, FieldTransform, FieldType};
