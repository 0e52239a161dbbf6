//! Link scoring (§4.5): intrinsic + contextual BM25 signals combined into
//! one `total_score`, shared by the content pipeline's `links.*[].score`
//! and `crawlforge-spider`'s deep-crawl/seeder scorers.

use url::Url;

use crate::bm25::{normalize, score_one};

#[derive(Debug, Clone)]
pub struct LinkScoringConfig {
    pub query: String,
    pub intrinsic_weight: f64,
    pub contextual_weight: f64,
    pub score_threshold: f64,
}

impl Default for LinkScoringConfig {
    fn default() -> Self {
        Self { query: String::new(), intrinsic_weight: 0.5, contextual_weight: 0.5, score_threshold: 0.0 }
    }
}

/// One link as seen by the scorer, independent of the `Link` result type so
/// callers (deep crawl, seeder) can score candidates before they have a
/// fully-formed `Link`.
pub struct ScorableLink<'a> {
    pub href: &'a str,
    pub anchor_text: &'a str,
    pub title: Option<&'a str>,
    pub meta_description: Option<&'a str>,
    /// 0-based position among the page's links; lower is earlier.
    pub position: usize,
    pub total_links: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkScore {
    pub intrinsic_score: f64,
    pub contextual_score: f64,
    pub total_score: f64,
}

/// Structural signal in `[0,10]`: earlier position, shorter/readable URL
/// path, and richer anchor text all push the score up.
fn intrinsic_score(link: &ScorableLink<'_>) -> f64 {
    let position_score = if link.total_links <= 1 {
        10.0
    } else {
        10.0 * (1.0 - link.position as f64 / (link.total_links - 1).max(1) as f64)
    };

    let anchor_len = link.anchor_text.trim().len();
    let anchor_score = match anchor_len {
        0 => 0.0,
        1..=3 => 2.0,
        4..=60 => 8.0,
        _ => 5.0,
    };

    let depth_score = match Url::parse(link.href) {
        Ok(url) => {
            let depth = url.path().split('/').filter(|s| !s.is_empty()).count();
            (10.0 - depth as f64 * 1.5).max(0.0)
        }
        Err(_) => 3.0,
    };

    (position_score * 0.3 + anchor_score * 0.4 + depth_score * 0.3).clamp(0.0, 10.0)
}

/// BM25 of anchor + title + meta description preview against `query`,
/// squashed into `[0,1]`.
fn contextual_score(link: &ScorableLink<'_>, query: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let mut preview = link.anchor_text.to_string();
    if let Some(title) = link.title {
        preview.push(' ');
        preview.push_str(title);
    }
    if let Some(desc) = link.meta_description {
        preview.push(' ');
        preview.push_str(desc);
    }
    normalize(score_one(&preview, query))
}

/// Scores one link; caller drops it if `total_score < cfg.score_threshold`.
pub fn score_link(link: &ScorableLink<'_>, cfg: &LinkScoringConfig) -> LinkScore {
    let intrinsic = intrinsic_score(link);
    let contextual = contextual_score(link, &cfg.query);
    let total = (intrinsic / 10.0) * cfg.intrinsic_weight + contextual * cfg.contextual_weight;

    LinkScore { intrinsic_score: intrinsic, contextual_score: contextual, total_score: total }
}

/// Scores a batch of links, drops any below `cfg.score_threshold`, and
/// returns them sorted descending by `total_score`.
pub fn score_and_rank(links: &[ScorableLink<'_>], cfg: &LinkScoringConfig) -> Vec<(usize, LinkScore)> {
    let mut scored: Vec<(usize, LinkScore)> =
        links.iter().enumerate().map(|(i, link)| (i, score_link(link, cfg))).collect();

    scored.retain(|(_, score)| score.total_score >= cfg.score_threshold);
    scored.sort_by(|a, b| b.1.total_score.partial_cmp(&a.1.total_score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_position_and_rich_anchor_scores_higher() {
        let strong = ScorableLink {
            href: "https://example.com/article",
            anchor_text: "Deep dive into Rust ownership",
            title: None,
            meta_description: None,
            position: 0,
            total_links: 10,
        };
        let weak = ScorableLink {
            href: "https://example.com/a/b/c/d/e",
            anchor_text: "x",
            title: None,
            meta_description: None,
            position: 9,
            total_links: 10,
        };
        assert!(intrinsic_score(&strong) > intrinsic_score(&weak));
    }

    #[test]
    fn contextual_score_rewards_query_overlap() {
        let relevant = ScorableLink {
            href: "https://example.com/rust-ownership",
            anchor_text: "Rust ownership and borrowing explained",
            title: None,
            meta_description: None,
            position: 0,
            total_links: 1,
        };
        let unrelated = ScorableLink {
            href: "https://example.com/cooking",
            anchor_text: "Best pasta recipes",
            title: None,
            meta_description: None,
            position: 0,
            total_links: 1,
        };
        let cfg = LinkScoringConfig { query: "rust ownership".to_string(), ..Default::default() };
        assert!(contextual_score(&relevant, &cfg.query) > contextual_score(&unrelated, &cfg.query));
    }

    #[test]
    fn score_and_rank_drops_below_threshold_and_sorts_descending() {
        let links = vec![
            ScorableLink {
                href: "https://example.com/a".into(),
                anchor_text: "rust programming".into(),
                title: None,
                meta_description: None,
                position: 0,
                total_links: 2,
            },
            ScorableLink {
                href: "https://example.com/b".into(),
                anchor_text: "unrelated".into(),
                title: None,
                meta_description: None,
                position: 1,
                total_links: 2,
            },
        ];
        let cfg = LinkScoringConfig { query: "rust programming".to_string(), score_threshold: 0.1, ..Default::default() };
        let ranked = score_and_rank(&links, &cfg);
        assert!(ranked.iter().all(|(_, s)| s.total_score >= 0.1));
        if ranked.len() == 2 {
            assert!(ranked[0].1.total_score >= ranked[1].1.total_score);
        }
    }
}
