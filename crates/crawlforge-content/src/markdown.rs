//! Markdown generation (§4.3 step 4): converts the selected HTML view into
//! `raw_markdown`, and optionally `markdown_with_citations` +
//! `references_markdown`.

use scraper::{Html, Selector};

use crawlforge_types::result::MarkdownResult;

/// Which HTML view feeds the generator, per §4.3 step 4's
/// `content_source ∈ {cleaned_html, raw_html, fit_html}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    CleanedHtml,
    RawHtml,
    FitHtml,
}

#[derive(Debug, Clone)]
pub struct MarkdownConfig {
    pub content_source: ContentSource,
    pub citations: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self { content_source: ContentSource::CleanedHtml, citations: false }
    }
}

pub struct MarkdownInput<'a> {
    pub cleaned_html: &'a str,
    pub raw_html: &'a str,
    pub fit_html: Option<&'a str>,
}

fn html_to_markdown(html: &str) -> String {
    htmd::convert(html).unwrap_or_else(|_| {
        let document = Html::parse_document(html);
        document.root_element().text().collect::<String>()
    })
}

/// Rewrites `[n]` markers over outbound links and returns
/// `(markdown_with_citations, references_markdown)`. Each unique `href`
/// gets one number, assigned in first-seen order.
fn with_citations(html: &str, markdown: &str) -> (String, String) {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");

    let mut seen = Vec::new();
    let mut numbered = markdown.to_string();

    for el in document.select(&selector) {
        let Some(href) = el.value().attr("href") else { continue };
        let text = el.text().collect::<Vec<_>>().join(" ").trim().to_string();
        if text.is_empty() {
            continue;
        }

        let index = match seen.iter().position(|(h, _): &(String, String)| h == href) {
            Some(i) => i,
            None => {
                seen.push((href.to_string(), text.clone()));
                seen.len() - 1
            }
        };
        let marker = format!("[{}]", index + 1);

        if let Some(pos) = numbered.find(text.as_str()) {
            let after = pos + text.len();
            if !numbered[after..].starts_with(&marker) {
                numbered.insert_str(after, &marker);
            }
        }
    }

    let references = seen
        .iter()
        .enumerate()
        .map(|(i, (href, _))| format!("[{}]: {}", i + 1, href))
        .collect::<Vec<_>>()
        .join("\n");

    (numbered, references)
}

/// Builds the full `MarkdownResult` for one pipeline run. Pure: the same
/// `(input, cfg)` always yields the same markdown.
pub fn generate(input: &MarkdownInput<'_>, cfg: &MarkdownConfig) -> MarkdownResult {
    let source_html = match cfg.content_source {
        ContentSource::CleanedHtml => input.cleaned_html,
        ContentSource::RawHtml => input.raw_html,
        ContentSource::FitHtml => input.fit_html.unwrap_or(input.cleaned_html),
    };

    let raw_markdown = html_to_markdown(source_html);

    let (markdown_with_citations, references_markdown) = if cfg.citations {
        let (md, refs) = with_citations(source_html, &raw_markdown);
        (Some(md), Some(refs))
    } else {
        (None, None)
    };

    let fit_markdown = input.fit_html.map(html_to_markdown);

    MarkdownResult {
        raw_markdown,
        markdown_with_citations,
        references_markdown,
        fit_markdown,
        fit_html: input.fit_html.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_basic_html_to_markdown() {
        let input = MarkdownInput {
            cleaned_html: "<h1>Title</h1><p>Hello world</p>",
            raw_html: "<h1>Title</h1><p>Hello world</p>",
            fit_html: None,
        };
        let result = generate(&input, &MarkdownConfig::default());
        assert!(result.raw_markdown.contains("Title"));
        assert!(result.raw_markdown.contains("Hello world"));
        assert!(result.markdown_with_citations.is_none());
    }

    #[test]
    fn citations_produce_numbered_markers_and_a_references_section() {
        let html = r#"<p>See <a href="https://a.example">source A</a> and <a href="https://b.example">source B</a>.</p>"#;
        let input = MarkdownInput { cleaned_html: html, raw_html: html, fit_html: None };
        let result = generate(&input, &MarkdownConfig { content_source: ContentSource::CleanedHtml, citations: true });

        let refs = result.references_markdown.expect("references present");
        assert!(refs.contains("https://a.example"));
        assert!(refs.contains("https://b.example"));
    }

    #[test]
    fn fit_html_source_uses_filtered_content() {
        let input = MarkdownInput {
            cleaned_html: "<p>full page</p>",
            raw_html: "<p>full page</p>",
            fit_html: Some("<p>filtered content</p>"),
        };
        let result = generate(&input, &MarkdownConfig { content_source: ContentSource::FitHtml, citations: false });
        assert!(result.raw_markdown.contains("filtered content"));
        assert!(result.fit_markdown.unwrap().contains("filtered content"));
    }
}
