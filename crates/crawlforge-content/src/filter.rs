//! Filter step (§4.3 step 3): narrow `cleaned_html` down to `fit_html` by
//! one of three strategies before markdown generation runs over it.

use scraper::{ElementRef, Html, Selector};

use crawlforge_types::error::CrawlError;
use crawlforge_types::ports::Llm;

use crate::bm25::Bm25Corpus;

const BLOCK_SELECTOR: &str =
    "article,section,p,li,blockquote,td,h1,h2,h3,h4,h5,h6,figcaption";

/// Per-tag weight in the pruning composite score. Block tags that are
/// almost always prose (`article`, `p`) score higher than tags that are
/// frequently boilerplate (`li`, `td`).
fn tag_weight(tag: &str) -> f64 {
    match tag {
        "article" | "section" => 1.0,
        "p" | "blockquote" | "figcaption" => 0.9,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => 0.7,
        "li" => 0.5,
        "td" => 0.3,
        _ => 0.4,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    Fixed,
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct PruningConfig {
    pub threshold: f64,
    pub threshold_mode: ThresholdMode,
    pub min_word_count: usize,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self { threshold: 0.48, threshold_mode: ThresholdMode::Dynamic, min_word_count: 5 }
    }
}

#[derive(Debug, Clone)]
pub struct Bm25FilterConfig {
    pub query: String,
    pub threshold: f64,
}

pub struct LlmFilterConfig<'a> {
    pub instruction: String,
    pub llm: &'a dyn Llm,
}

pub enum ContentFilter<'a> {
    Pruning(PruningConfig),
    Bm25(Bm25FilterConfig),
    Llm(LlmFilterConfig<'a>),
}

struct ScoredBlock<'a> {
    element: ElementRef<'a>,
    text: String,
    score: f64,
}

fn block_density_score(el: &ElementRef<'_>, cfg: &PruningConfig) -> Option<(String, f64)> {
    let text: String = el.text().collect::<Vec<_>>().join(" ").trim().to_string();
    let word_count = text.split_whitespace().count();
    if word_count < cfg.min_word_count {
        return None;
    }

    let html_len = el.html().len().max(1) as f64;
    let text_len = text.len() as f64;
    let text_density = (text_len / html_len).min(1.0);

    let link_selector = Selector::parse("a").expect("static selector");
    let link_text_len: usize = el
        .select(&link_selector)
        .map(|a| a.text().collect::<Vec<_>>().join(" ").len())
        .sum();
    let link_density = if text_len > 0.0 { link_text_len as f64 / text_len } else { 0.0 };

    let weight = tag_weight(el.value().name());
    let word_count_factor = ((word_count as f64) + 1.0).ln() / 5.0;

    let score = text_density * 0.4 + (1.0 - link_density).max(0.0) * 0.3
        + weight * 0.2
        + word_count_factor.min(1.0) * 0.1;

    Some((text, score))
}

fn select_blocks<'a>(document: &'a Html) -> Vec<ElementRef<'a>> {
    let selector = Selector::parse(BLOCK_SELECTOR).expect("static selector");
    let mut accepted: Vec<ElementRef<'a>> = Vec::new();
    'outer: for el in document.select(&selector) {
        for seen in &accepted {
            if seen.id() != el.id() && is_ancestor(*seen, el) {
                continue 'outer;
            }
        }
        accepted.push(el);
    }
    accepted
}

fn is_ancestor(maybe_ancestor: ElementRef<'_>, node: ElementRef<'_>) -> bool {
    node.ancestors().any(|a| a.id() == maybe_ancestor.id())
}

fn reassemble(blocks: &[ElementRef<'_>]) -> String {
    blocks.iter().map(|el| el.html()).collect::<Vec<_>>().join("\n")
}

/// Pruning filter: composite density/weight score per block, `fixed` keeps
/// blocks above `cfg.threshold`; `dynamic` derives the cutoff from the mean
/// score of this page's own blocks (crawl4ai's `PruningContentFilter`
/// default of 0.48 is the fixed fallback, reused here as the dynamic base).
pub fn apply_pruning_filter(html: &str, cfg: &PruningConfig) -> String {
    let document = Html::parse_document(html);
    let blocks = select_blocks(&document);

    let scored: Vec<ScoredBlock<'_>> = blocks
        .into_iter()
        .filter_map(|el| block_density_score(&el, cfg).map(|(text, score)| ScoredBlock { element: el, text, score }))
        .collect();

    if scored.is_empty() {
        return String::new();
    }

    let effective_threshold = match cfg.threshold_mode {
        ThresholdMode::Fixed => cfg.threshold,
        ThresholdMode::Dynamic => {
            let mean = scored.iter().map(|b| b.score).sum::<f64>() / scored.len() as f64;
            mean * cfg.threshold
        }
    };

    let kept: Vec<ElementRef<'_>> =
        scored.iter().filter(|b| b.score >= effective_threshold).map(|b| b.element).collect();

    reassemble(&kept)
}

/// BM25 filter: ranks blocks by relevance to `cfg.query`, keeps those whose
/// normalized score clears `cfg.threshold`.
pub fn apply_bm25_filter(html: &str, cfg: &Bm25FilterConfig) -> String {
    let document = Html::parse_document(html);
    let blocks = select_blocks(&document);

    let texts: Vec<String> =
        blocks.iter().map(|el| el.text().collect::<Vec<_>>().join(" ").trim().to_string()).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let corpus = Bm25Corpus::new(&text_refs);
    let scores = corpus.scores(&cfg.query);

    let kept: Vec<ElementRef<'_>> = blocks
        .into_iter()
        .zip(scores)
        .filter(|(_, raw)| crate::bm25::normalize(*raw) >= cfg.threshold)
        .map(|(el, _)| el)
        .collect();

    reassemble(&kept)
}

/// LLM filter: asks the injected capability to judge each block's
/// relevance to `cfg.instruction`, keeping blocks it marks relevant.
/// A malformed response drops the block rather than failing the whole
/// filter pass (per-block tolerance mirrors extraction's per-block failure
/// semantics).
pub async fn apply_llm_filter(html: &str, cfg: &LlmFilterConfig<'_>) -> Result<String, CrawlError> {
    let document = Html::parse_document(html);
    let blocks = select_blocks(&document);

    let mut kept = Vec::new();
    for el in blocks {
        let text = el.text().collect::<Vec<_>>().join(" ").trim().to_string();
        if text.is_empty() {
            continue;
        }
        let prompt = format!(
            "Instruction: {}\n\nBlock:\n{}\n\nReply with exactly \"yes\" or \"no\": is this block relevant?",
            cfg.instruction, text
        );
        let response = cfg.llm.complete(&prompt, &Default::default()).await?;
        if response.to_lowercase().trim_start().starts_with("yes") {
            kept.push(el);
        }
    }

    Ok(reassemble(&kept))
}
