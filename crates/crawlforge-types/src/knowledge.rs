//! Progress state for the adaptive crawler's information-foraging loop (§4.10).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub url: String,
    pub doc: String,
    pub score: f64,
}

/// Mutated once per adaptive-crawler iteration. Not returned directly to
/// callers — the adaptive crawler folds it into the stream of `CrawlResult`s
/// it yields plus a final confidence summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeState {
    pub crawled_urls: Vec<String>,
    pub knowledge_base: Vec<ScoredDocument>,
    pub confidence: f64,
    pub coverage: f64,
    pub consistency: f64,
    pub saturation: f64,
}

impl KnowledgeState {
    /// `confidence = w_cov*coverage + w_con*consistency + w_sat*saturation`
    /// (§4.10). Weights are expected to sum to 1; callers that pass weights
    /// which don't are not rejected — the resulting confidence is simply
    /// off-scale, which is the caller's problem to notice.
    pub fn recompute_confidence(&mut self, w_cov: f64, w_con: f64, w_sat: f64) {
        self.confidence = w_cov * self.coverage + w_con * self.consistency + w_sat * self.saturation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_combines_weighted_metrics() {
        let mut state = KnowledgeState {
            coverage: 0.8,
            consistency: 0.6,
            saturation: 0.5,
            ..Default::default()
        };
        state.recompute_confidence(0.4, 0.3, 0.3);
        let expected = 0.4 * 0.8 + 0.3 * 0.6 + 0.3 * 0.5;
        assert!((state.confidence - expected).abs() < 1e-9);
    }
}
