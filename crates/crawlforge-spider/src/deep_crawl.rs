//! Deep Crawl Strategy (§4.9): BFS, DFS, and Best-First traversal over a
//! pluggable filter chain and scorer, driven through an injected
//! [`PageCrawler`] capability rather than a concrete dispatcher — the root
//! facade wires this to the actual fleet/cache pipeline.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;

use crawlforge_content::link_score::{score_link, LinkScoringConfig, ScorableLink};
use crawlforge_types::result::CrawlResult;

use crate::seeder::normalize_url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Bfs,
    Dfs,
    BestFirst,
}

/// What a [`UrlFilter`] sees about the link being considered for enqueue.
pub struct FilterContext<'a> {
    pub depth: usize,
    pub source_url: &'a str,
}

/// `accept(url, context) -> bool` (§4.9); synchronous and object-safe so a
/// filter chain can be a plain `Vec<Box<dyn UrlFilter>>`.
pub trait UrlFilter: Send + Sync {
    fn accept(&self, url: &str, ctx: &FilterContext<'_>) -> bool;
}

/// Crawls one URL end to end (fleet checkout, content pipeline, extraction,
/// cache) and returns its result. Implemented by the root facade around the
/// dispatcher; this crate only consumes the capability.
#[async_trait]
pub trait PageCrawler: Send + Sync {
    async fn crawl(&self, url: &str) -> CrawlResult;
}

pub struct DeepCrawlConfig {
    pub strategy: Strategy,
    pub max_depth: usize,
    pub max_pages: usize,
    pub filters: Vec<Box<dyn UrlFilter>>,
    /// Only consulted for [`Strategy::BestFirst`].
    pub scorer: LinkScoringConfig,
}

impl Default for DeepCrawlConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Bfs,
            max_depth: 1,
            max_pages: 50,
            filters: Vec::new(),
            scorer: LinkScoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
struct QueueItem {
    url: String,
    depth: usize,
    score: f64,
}

fn pop_next(strategy: Strategy, frontier: &mut VecDeque<QueueItem>) -> Option<QueueItem> {
    match strategy {
        Strategy::Bfs => frontier.pop_front(),
        Strategy::Dfs => frontier.pop_back(),
        Strategy::BestFirst => {
            let (idx, _) = frontier
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.score.partial_cmp(&b.1.score).unwrap_or(Ordering::Equal))?;
            frontier.remove(idx)
        }
    }
}

fn apply_filters(filters: &[Box<dyn UrlFilter>], url: &str, ctx: &FilterContext<'_>) -> bool {
    filters.iter().all(|f| f.accept(url, ctx))
}

/// Runs the traversal to completion (or `max_pages`/cancellation), yielding
/// results in the order they complete. Maintains a canonicalized `seen` set
/// so no URL is queued twice (§4.9 "prevent revisits").
pub async fn run_deep_crawl(
    seeds: Vec<String>,
    cfg: &DeepCrawlConfig,
    crawler: &dyn PageCrawler,
) -> Vec<CrawlResult> {
    let mut seen = HashSet::new();
    let mut frontier: VecDeque<QueueItem> = VecDeque::new();
    for seed in seeds {
        if let Some(canon) = normalize_url(&seed) {
            if seen.insert(canon.clone()) {
                frontier.push_back(QueueItem { url: canon, depth: 0, score: 0.0 });
            }
        }
    }

    let mut results = Vec::new();
    while results.len() < cfg.max_pages {
        let Some(item) = pop_next(cfg.strategy, &mut frontier) else {
            break;
        };

        let mut result = crawler.crawl(&item.url).await;
        let depth = item.depth;

        if result.success && depth < cfg.max_depth {
            let total = result.links.internal.len();
            for (idx, link) in result.links.internal.iter().enumerate() {
                let Some(canon) = normalize_url(&link.href) else { continue };
                if seen.contains(&canon) {
                    continue;
                }

                let ctx = FilterContext { depth: depth + 1, source_url: &item.url };
                if !apply_filters(&cfg.filters, &canon, &ctx) {
                    continue;
                }

                let score = if cfg.strategy == Strategy::BestFirst {
                    let scorable = ScorableLink {
                        href: &canon,
                        anchor_text: link.text.as_deref().unwrap_or(""),
                        title: link.title.as_deref(),
                        meta_description: None,
                        position: idx,
                        total_links: total,
                    };
                    score_link(&scorable, &cfg.scorer).total_score
                } else {
                    0.0
                };

                seen.insert(canon.clone());
                frontier.push_back(QueueItem { url: canon, depth: depth + 1, score });
            }
        }

        result.metadata.insert("depth".to_string(), serde_json::Value::from(depth as u64));
        results.push(result);
    }

    results
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crawlforge_types::result::{Link, Links};

    use super::*;

    struct FakeSite {
        /// url -> internal links
        graph: HashMap<String, Vec<String>>,
        visited: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageCrawler for FakeSite {
        async fn crawl(&self, url: &str) -> CrawlResult {
            self.visited.lock().unwrap().push(url.to_string());
            let links = self.graph.get(url).cloned().unwrap_or_default();
            let mut result = CrawlResult::raw_html_shell();
            result.url = url.to_string();
            result.links = Links {
                internal: links
                    .into_iter()
                    .map(|href| Link { href, text: None, title: None, score: None })
                    .collect(),
                external: Vec::new(),
            };
            result
        }
    }

    #[tokio::test]
    async fn bfs_respects_max_depth_and_excludes_grandchildren() {
        let mut graph = HashMap::new();
        graph.insert(
            "https://example.com/".to_string(),
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
                "https://example.com/c".to_string(),
            ],
        );
        graph.insert("https://example.com/a".to_string(), vec!["https://example.com/d".to_string()]);
        let site = FakeSite { graph, visited: Mutex::new(Vec::new()) };

        let cfg = DeepCrawlConfig { strategy: Strategy::Bfs, max_depth: 1, max_pages: 10, ..Default::default() };
        let results = run_deep_crawl(vec!["https://example.com/".to_string()], &cfg, &site).await;

        let urls: HashSet<String> = results.iter().map(|r| r.url.clone()).collect();
        assert_eq!(urls.len(), 4);
        assert!(!urls.contains("https://example.com/d"));
        for r in &results {
            let depth = r.metadata["depth"].as_u64().unwrap();
            assert!(depth == 0 || depth == 1);
        }
    }

    #[tokio::test]
    async fn seen_set_prevents_revisits_on_cyclic_graphs() {
        let mut graph = HashMap::new();
        graph.insert("https://example.com/".to_string(), vec!["https://example.com/a".to_string()]);
        graph.insert("https://example.com/a".to_string(), vec!["https://example.com/".to_string()]);
        let site = FakeSite { graph, visited: Mutex::new(Vec::new()) };

        let cfg = DeepCrawlConfig { strategy: Strategy::Bfs, max_depth: 5, max_pages: 10, ..Default::default() };
        let results = run_deep_crawl(vec!["https://example.com/".to_string()], &cfg, &site).await;

        assert_eq!(results.len(), 2);
    }

    struct RejectUrl(&'static str);
    impl UrlFilter for RejectUrl {
        fn accept(&self, url: &str, _ctx: &FilterContext<'_>) -> bool {
            !url.contains(self.0)
        }
    }

    #[tokio::test]
    async fn filter_chain_excludes_matching_links() {
        let mut graph = HashMap::new();
        graph.insert(
            "https://example.com/".to_string(),
            vec!["https://example.com/keep".to_string(), "https://example.com/drop".to_string()],
        );
        let site = FakeSite { graph, visited: Mutex::new(Vec::new()) };

        let cfg = DeepCrawlConfig {
            strategy: Strategy::Bfs,
            max_depth: 1,
            max_pages: 10,
            filters: vec![Box::new(RejectUrl("drop"))],
            ..Default::default()
        };
        let results = run_deep_crawl(vec!["https://example.com/".to_string()], &cfg, &site).await;

        let urls: HashSet<String> = results.iter().map(|r| r.url.clone()).collect();
        assert!(urls.contains("https://example.com/keep"));
        assert!(!urls.iter().any(|u| u.contains("drop")));
    }
}
