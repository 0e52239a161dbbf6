//! Adaptive Crawler (§4.10): an information-foraging loop that crawls and
//! scores pages against a natural-language query until the knowledge base's
//! confidence (coverage/consistency/saturation) clears a threshold or the
//! page/depth budget runs out.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use crawlforge_content::bm25::{normalize, score_one};
use crawlforge_content::link_score::{score_link, LinkScoringConfig, ScorableLink};
use crawlforge_types::knowledge::{KnowledgeState, ScoredDocument};
use crawlforge_types::ports::Embedder;
use crawlforge_types::result::CrawlResult;

use crate::deep_crawl::PageCrawler;
use crate::seeder::normalize_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringBackend {
    Statistical,
    Embedding,
}

#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    pub query: String,
    pub max_pages: usize,
    pub max_depth: usize,
    /// Links pursued per iteration (§4.10 "pick top-k next links").
    pub top_k: usize,
    pub confidence_threshold: f64,
    pub w_cov: f64,
    pub w_con: f64,
    pub w_sat: f64,
    pub backend: ScoringBackend,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            max_pages: 20,
            max_depth: 3,
            top_k: 3,
            confidence_threshold: 0.7,
            w_cov: 0.4,
            w_con: 0.3,
            w_sat: 0.3,
            backend: ScoringBackend::Statistical,
        }
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

fn page_text(result: &CrawlResult) -> String {
    if let Some(md) = &result.markdown {
        if !md.raw_markdown.is_empty() {
            return md.raw_markdown.clone();
        }
    }
    result.html.clone().unwrap_or_default()
}

/// Count of tokens in `new_doc` not already present anywhere in
/// `knowledge_base` — the "new information" a page contributes.
fn vocabulary_gain(knowledge_base: &[ScoredDocument], new_doc: &str) -> usize {
    let mut existing = HashSet::new();
    for doc in knowledge_base {
        existing.extend(tokenize(&doc.doc));
    }
    tokenize(new_doc).difference(&existing).count()
}

/// Fraction of unique query terms present anywhere in the knowledge base.
fn statistical_coverage(query: &str, knowledge_base: &[ScoredDocument]) -> f64 {
    let query_terms = tokenize(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let mut corpus = HashSet::new();
    for doc in knowledge_base {
        corpus.extend(tokenize(&doc.doc));
    }
    let covered = query_terms.iter().filter(|t| corpus.contains(*t)).count();
    covered as f64 / query_terms.len() as f64
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let dot: f64 = (0..len).map(|i| a[i] as f64 * b[i] as f64).sum();
    let norm_a: f64 = a.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Fraction of the query embedding's dimensions that have a same-signed,
/// non-negligible counterpart in at least one knowledge-base embedding.
fn embedding_coverage(query_embedding: &[f32], doc_embeddings: &[Vec<f32>]) -> f64 {
    if query_embedding.is_empty() {
        return 0.0;
    }
    const EPS: f32 = 0.01;
    let covered = query_embedding
        .iter()
        .enumerate()
        .filter(|(i, &q)| {
            doc_embeddings
                .iter()
                .any(|d| d.get(*i).is_some_and(|v| v.abs() > EPS && v.signum() == q.signum()))
        })
        .count();
    covered as f64 / query_embedding.len() as f64
}

/// Mean pairwise similarity across the most recent `top_k` knowledge-base
/// documents — agreement among what's been retrieved so far. Fewer than two
/// documents trivially agree with themselves (`1.0`).
fn statistical_consistency(knowledge_base: &[ScoredDocument], top_k: usize) -> f64 {
    let recent: Vec<&ScoredDocument> = knowledge_base.iter().rev().take(top_k).collect();
    if recent.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0;
    for i in 0..recent.len() {
        for j in (i + 1)..recent.len() {
            total += score_one(&recent[i].doc, &recent[j].doc).min(1.0);
            pairs += 1;
        }
    }
    if pairs == 0 {
        1.0
    } else {
        total / pairs as f64
    }
}

fn embedding_consistency(embeddings: &[Vec<f32>], top_k: usize) -> f64 {
    let recent: Vec<&Vec<f32>> = embeddings.iter().rev().take(top_k).collect();
    if recent.len() < 2 {
        return 1.0;
    }
    let mut total = 0.0;
    let mut pairs = 0;
    for i in 0..recent.len() {
        for j in (i + 1)..recent.len() {
            total += (cosine_similarity(recent[i], recent[j]) + 1.0) / 2.0;
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// `1 - (gain of the last page / average gain so far)`, clamped to `[0,1]`;
/// `0.0` until there's a prior page to compare against.
fn saturation(gain_history: &[usize]) -> f64 {
    if gain_history.len() < 2 {
        return 0.0;
    }
    let (last, rest) = gain_history.split_last().unwrap();
    let avg = rest.iter().sum::<usize>() as f64 / rest.len() as f64;
    if avg == 0.0 {
        1.0
    } else {
        (1.0 - *last as f64 / avg).clamp(0.0, 1.0)
    }
}

/// Runs the adaptive loop to completion, returning every crawled result plus
/// the final knowledge state (confidence, coverage, consistency, saturation).
pub async fn run_adaptive_crawl(
    start_url: &str,
    cfg: &AdaptiveConfig,
    crawler: &dyn PageCrawler,
    embedder: Option<&dyn Embedder>,
) -> (Vec<CrawlResult>, KnowledgeState) {
    let mut state = KnowledgeState::default();
    let mut results = Vec::new();
    let mut seen = HashSet::new();
    let mut frontier: VecDeque<(String, usize)> = VecDeque::new();
    let mut gain_history = Vec::new();
    let mut doc_embeddings: Vec<Vec<f32>> = Vec::new();

    if let Some(canon) = normalize_url(start_url) {
        seen.insert(canon.clone());
        frontier.push_back((canon, 0));
    }

    let query_embedding = if cfg.backend == ScoringBackend::Embedding {
        if let Some(embedder) = embedder {
            embedder.embed(&[cfg.query.clone()]).await.ok().and_then(|mut v| v.pop())
        } else {
            None
        }
    } else {
        None
    };

    while results.len() < cfg.max_pages {
        let Some((url, depth)) = frontier.pop_front() else { break };
        if depth > cfg.max_depth {
            continue;
        }

        let result = crawler.crawl(&url).await;
        state.crawled_urls.push(url.clone());

        if result.success {
            let text = page_text(&result);
            let gain = vocabulary_gain(&state.knowledge_base, &text);
            gain_history.push(gain);

            let score = match cfg.backend {
                ScoringBackend::Statistical => normalize(score_one(&text, &cfg.query)),
                ScoringBackend::Embedding => {
                    if let (Some(embedder), Some(q)) = (embedder, &query_embedding) {
                        match embedder.embed(&[text.clone()]).await {
                            Ok(mut embeddings) => {
                                let doc_emb = embeddings.pop().unwrap_or_default();
                                let sim = (cosine_similarity(q, &doc_emb) + 1.0) / 2.0;
                                doc_embeddings.push(doc_emb);
                                sim
                            }
                            Err(_) => normalize(score_one(&text, &cfg.query)),
                        }
                    } else {
                        normalize(score_one(&text, &cfg.query))
                    }
                }
            };

            state.knowledge_base.push(ScoredDocument { url: url.clone(), doc: text, score });

            state.coverage = match cfg.backend {
                ScoringBackend::Statistical => statistical_coverage(&cfg.query, &state.knowledge_base),
                ScoringBackend::Embedding => query_embedding
                    .as_ref()
                    .map(|q| embedding_coverage(q, &doc_embeddings))
                    .unwrap_or_else(|| statistical_coverage(&cfg.query, &state.knowledge_base)),
            };
            state.consistency = match cfg.backend {
                ScoringBackend::Statistical => statistical_consistency(&state.knowledge_base, cfg.top_k),
                ScoringBackend::Embedding => {
                    if doc_embeddings.is_empty() {
                        statistical_consistency(&state.knowledge_base, cfg.top_k)
                    } else {
                        embedding_consistency(&doc_embeddings, cfg.top_k)
                    }
                }
            };
            state.saturation = saturation(&gain_history);
            state.recompute_confidence(cfg.w_cov, cfg.w_con, cfg.w_sat);

            if depth < cfg.max_depth {
                let scoring_cfg = LinkScoringConfig { query: cfg.query.clone(), ..LinkScoringConfig::default() };
                let total = result.links.internal.len();
                let mut ranked: Vec<(f64, String)> = result
                    .links
                    .internal
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, link)| {
                        let canon = normalize_url(&link.href)?;
                        if seen.contains(&canon) {
                            return None;
                        }
                        let scorable = ScorableLink {
                            href: &canon,
                            anchor_text: link.text.as_deref().unwrap_or(""),
                            title: link.title.as_deref(),
                            meta_description: None,
                            position: idx,
                            total_links: total,
                        };
                        Some((score_link(&scorable, &scoring_cfg).total_score, canon))
                    })
                    .collect();
                ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

                for (_, next_url) in ranked.into_iter().take(cfg.top_k) {
                    if seen.insert(next_url.clone()) {
                        frontier.push_back((next_url, depth + 1));
                    }
                }
            }
        }

        let mut result = result;
        result.metadata.insert("depth".to_string(), serde_json::Value::from(depth as u64));
        result.metadata.insert(
            "confidence".to_string(),
            serde_json::Value::from(state.confidence),
        );
        results.push(result);

        if state.confidence >= cfg.confidence_threshold {
            break;
        }
    }

    (results, state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use crawlforge_types::result::{Link, Links, MarkdownResult};

    use super::*;

    struct FakeSite {
        pages: HashMap<String, (String, Vec<String>)>,
        visited: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageCrawler for FakeSite {
        async fn crawl(&self, url: &str) -> CrawlResult {
            self.visited.lock().unwrap().push(url.to_string());
            let (text, links) = self.pages.get(url).cloned().unwrap_or_default();
            let mut result = CrawlResult::raw_html_shell();
            result.url = url.to_string();
            result.markdown = Some(MarkdownResult { raw_markdown: text, ..Default::default() });
            result.links = Links {
                internal: links.into_iter().map(|href| Link { href, text: None, title: None, score: None }).collect(),
                external: Vec::new(),
            };
            result
        }
    }

    #[tokio::test]
    async fn terminates_on_max_pages_when_confidence_never_clears() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://example.com/".to_string(),
            ("rust ownership borrowing".to_string(), vec!["https://example.com/a".to_string()]),
        );
        pages.insert("https://example.com/a".to_string(), ("unrelated filler text".to_string(), vec![]));
        let site = FakeSite { pages, visited: Mutex::new(Vec::new()) };

        let cfg = AdaptiveConfig {
            query: "rust ownership".to_string(),
            max_pages: 2,
            confidence_threshold: 1.1,
            ..AdaptiveConfig::default()
        };
        let (results, state) = run_adaptive_crawl("https://example.com/", &cfg, &site, None).await;

        assert_eq!(results.len(), 2);
        assert!(state.confidence < 1.1);
        assert_eq!(state.crawled_urls.len(), 2);
    }

    #[tokio::test]
    async fn knowledge_base_accumulates_one_document_per_successful_page() {
        let mut pages = HashMap::new();
        pages.insert("https://example.com/".to_string(), ("alpha beta".to_string(), vec![]));
        let site = FakeSite { pages, visited: Mutex::new(Vec::new()) };

        let cfg = AdaptiveConfig { query: "alpha".to_string(), max_pages: 1, ..AdaptiveConfig::default() };
        let (_, state) = run_adaptive_crawl("https://example.com/", &cfg, &site, None).await;

        assert_eq!(state.knowledge_base.len(), 1);
        assert_eq!(state.knowledge_base[0].doc, "alpha beta");
    }

    #[test]
    fn saturation_is_zero_until_a_second_page_exists() {
        assert_eq!(saturation(&[]), 0.0);
        assert_eq!(saturation(&[5]), 0.0);
    }

    #[test]
    fn saturation_rewards_diminishing_new_information() {
        let s = saturation(&[10, 10, 1]);
        assert!(s > 0.5);
    }
}
