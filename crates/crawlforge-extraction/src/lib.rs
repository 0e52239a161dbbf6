//! Extraction strategies (§4.4): a polymorphic capability over
//! `{extract(input, context) -> JSON}`, with `JsonCss`/`JsonXPath`/`Regex`/
//! `Llm` implementations.

pub mod json_css;
pub mod json_xpath;
pub mod llm;
pub mod regex_strategy;
pub mod transform;

use async_trait::async_trait;
use serde_json::Value;

use crawlforge_types::error::CrawlError;

/// Page context an extraction strategy may need beyond the raw input text
/// (currently just the URL, for resolving relative hrefs inside a `html`
/// field type).
pub struct ExtractionContext<'a> {
    pub url: &'a str,
}

/// The capability every extraction strategy implements (§4.4). Object-safe
/// so the facade can hold `Box<dyn ExtractionStrategy>` chosen by config.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    async fn extract(&self, input: &str, ctx: &ExtractionContext<'_>) -> Result<Value, CrawlError>;

    fn name(&self) -> &str;
}

pub use json_css::JsonCssExtractor;
pub use json_xpath::JsonXPathExtractor;
pub use llm::{LlmExtractor, MergeStrategy};
pub use regex_strategy::RegexExtractor;
