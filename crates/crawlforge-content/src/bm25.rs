//! Okapi BM25 scoring shared by the content filter, link scorer, and (via
//! `crawlforge-spider`) the adaptive crawler's statistical backend.
//!
//! This is a small, self-contained scorer over a fixed document set rather
//! than an inverted-index engine: every caller already has the handful of
//! candidate blocks/links/pages in hand and just needs them ranked against
//! one query.

const K1: f64 = 1.2;
const B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// A document ranked against a query; `score` is the raw BM25 score (not
/// normalized to [0,1] — callers that need a bounded score should divide by
/// the top score in the candidate set).
pub struct Bm25Corpus {
    docs: Vec<Vec<String>>,
    avg_len: f64,
    doc_freq: std::collections::HashMap<String, usize>,
}

impl Bm25Corpus {
    pub fn new(documents: &[&str]) -> Self {
        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(|d| d.len()).sum::<usize>() as f64 / docs.len() as f64
        };

        let mut doc_freq = std::collections::HashMap::new();
        for doc in &docs {
            let unique: std::collections::HashSet<&String> = doc.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        Self { docs, avg_len, doc_freq }
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_doc(&self, doc_index: usize, query_terms: &[String]) -> f64 {
        let doc = &self.docs[doc_index];
        let doc_len = doc.len() as f64;
        let mut term_freq: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for term in doc {
            *term_freq.entry(term.as_str()).or_insert(0) += 1;
        }

        query_terms
            .iter()
            .map(|term| {
                let tf = *term_freq.get(term.as_str()).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.idf(term);
                let denom = tf + K1 * (1.0 - B + B * doc_len / self.avg_len.max(1.0));
                idf * (tf * (K1 + 1.0)) / denom
            })
            .sum()
    }

    /// Raw BM25 scores for every document against `query`, in input order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let query_terms = tokenize(query);
        (0..self.docs.len()).map(|i| self.score_doc(i, &query_terms)).collect()
    }
}

/// Scores a single `text` against `query`, treating `text` as the sole
/// document in its corpus (used where callers score one block/link at a
/// time rather than batching).
pub fn score_one(text: &str, query: &str) -> f64 {
    let corpus = Bm25Corpus::new(&[text]);
    corpus.scores(query).into_iter().next().unwrap_or(0.0)
}

/// Normalizes a raw BM25 score into `[0,1]` via `score / (score + 1)`, a
/// standard squashing transform that keeps ordering and never needs a
/// corpus-wide max.
pub fn normalize(raw_score: f64) -> f64 {
    if raw_score <= 0.0 {
        0.0
    } else {
        raw_score / (raw_score + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_term_match_scores_higher_than_unrelated_text() {
        let relevant = score_one("rust programming language tutorial", "rust programming");
        let unrelated = score_one("cooking recipes for dinner", "rust programming");
        assert!(relevant > unrelated);
    }

    #[test]
    fn normalize_stays_within_unit_interval() {
        assert_eq!(normalize(0.0), 0.0);
        assert!(normalize(10.0) > 0.0 && normalize(10.0) < 1.0);
    }

    #[test]
    fn corpus_ranks_documents_by_relevance() {
        let corpus = Bm25Corpus::new(&[
            "the quick brown fox",
            "rust is a systems programming language",
            "rust rust rust programming programming",
        ]);
        let scores = corpus.scores("rust programming");
        assert!(scores[2] > scores[1]);
        assert!(scores[1] > scores[0]);
    }
}
