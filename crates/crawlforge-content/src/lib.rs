//! Content Pipeline (§4.3): structural clean, target focus, an optional
//! filter pass, markdown generation, and link scoring shared with
//! `crawlforge-spider`'s deep-crawl scorers.

pub mod bm25;
pub mod filter;
pub mod link_score;
pub mod markdown;
pub mod scrape;
pub mod table;

use crawlforge_types::error::CrawlError;
use crawlforge_types::result::{Links, Media, MarkdownResult};

pub use filter::{Bm25FilterConfig, ContentFilter, LlmFilterConfig, PruningConfig, ThresholdMode};
pub use markdown::{ContentSource, MarkdownConfig, MarkdownInput};
pub use scrape::{ScrapeConfig, ScrapeOutput};

/// The non-extraction half of §4.3: everything up through markdown
/// generation, steps 1-4. Structured extraction (step 5) is
/// `crawlforge-extraction`'s concern and runs against this output's
/// `cleaned_html`/`fit_html`.
pub struct ContentPipelineOutput {
    pub cleaned_html: String,
    pub fit_html: Option<String>,
    pub media: Media,
    pub links: Links,
    pub markdown: MarkdownResult,
}

pub struct ContentPipelineConfig<'a> {
    pub scrape: ScrapeConfig<'a>,
    pub css_selector: Option<&'a str>,
    pub target_elements: &'a [String],
    pub filter: Option<ContentFilter<'a>>,
    pub markdown: MarkdownConfig,
}

/// Runs §4.3 steps 1-4 over one page's `raw_html`. Deterministic given
/// identical input and config, per §4.3 "Determinism".
pub async fn run_content_pipeline(
    raw_html: &str,
    cfg: ContentPipelineConfig<'_>,
) -> Result<ContentPipelineOutput, CrawlError> {
    tracing::debug!(base_url = %cfg.scrape.base_url, raw_html_len = raw_html.len(), "content pipeline: scrape");
    let scraped = scrape::scrape(raw_html, &cfg.scrape);

    let mut cleaned_html = scraped.cleaned_html;
    if let Some(css_selector) = cfg.css_selector {
        cleaned_html = scrape::apply_css_selector(&cleaned_html, css_selector);
    }

    let extraction_input_html = if cfg.target_elements.is_empty() {
        cleaned_html.clone()
    } else {
        scrape::apply_target_elements(&cleaned_html, cfg.target_elements)
    };

    let fit_html = match cfg.filter {
        Some(ContentFilter::Pruning(pruning_cfg)) => {
            tracing::debug!(mode = ?pruning_cfg.threshold_mode, "content pipeline: pruning filter");
            Some(filter::apply_pruning_filter(&extraction_input_html, &pruning_cfg))
        }
        Some(ContentFilter::Bm25(bm25_cfg)) => {
            tracing::debug!(query = %bm25_cfg.query, "content pipeline: bm25 filter");
            Some(filter::apply_bm25_filter(&extraction_input_html, &bm25_cfg))
        }
        Some(ContentFilter::Llm(llm_cfg)) => {
            tracing::debug!("content pipeline: llm filter");
            Some(filter::apply_llm_filter(&extraction_input_html, &llm_cfg).await?)
        }
        None => None,
    };

    let markdown_input = MarkdownInput {
        cleaned_html: &extraction_input_html,
        raw_html,
        fit_html: fit_html.as_deref(),
    };
    let markdown = markdown::generate(&markdown_input, &cfg.markdown);

    Ok(ContentPipelineOutput { cleaned_html, fit_html, media: scraped.media, links: scraped.links, markdown })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipeline_runs_scrape_through_markdown_without_a_filter() {
        let html = r#"<html><body><script>x()</script><article><p>Some real content about Rust programming.</p></article><a href="/other">Other</a></body></html>"#;
        let cfg = ContentPipelineConfig {
            scrape: ScrapeConfig {
                excluded_tags: &[],
                exclude_external_links: false,
                exclude_external_images: false,
                base_url: "https://example.com",
            },
            css_selector: None,
            target_elements: &[],
            filter: None,
            markdown: MarkdownConfig::default(),
        };

        let out = run_content_pipeline(html, cfg).await.unwrap();
        assert!(!out.cleaned_html.contains("<script"));
        assert!(out.markdown.raw_markdown.contains("Rust programming"));
        assert_eq!(out.links.internal.len(), 1);
        assert!(out.fit_html.is_none());
    }

    #[tokio::test]
    async fn pipeline_with_pruning_filter_produces_fit_html_and_fit_markdown() {
        let html = r#"<html><body>
            <nav><a href="/a">a</a><a href="/b">b</a></nav>
            <article><p>A long paragraph about the Rust ownership model and borrowing rules explained in depth.</p></article>
        </body></html>"#;
        let cfg = ContentPipelineConfig {
            scrape: ScrapeConfig {
                excluded_tags: &[],
                exclude_external_links: false,
                exclude_external_images: false,
                base_url: "https://example.com",
            },
            css_selector: None,
            target_elements: &[],
            filter: Some(ContentFilter::Pruning(PruningConfig::default())),
            markdown: MarkdownConfig::default(),
        };

        let out = run_content_pipeline(html, cfg).await.unwrap();
        let fit_html = out.fit_html.expect("fit_html present when a filter runs");
        assert!(fit_html.contains("ownership"));
        assert!(out.markdown.fit_markdown.unwrap().contains("ownership"));
    }
}
