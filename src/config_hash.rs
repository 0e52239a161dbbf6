//! Deterministic hash of the per-crawl behavior config, for the cache key
//! (§4.7: `H(url, config_hash, engine, user_agent)`).

use sha2::{Digest, Sha256};

use crawlforge_types::CrawlerRunConfig;

/// Hashes every field of `cfg` that affects *what gets produced*, the same
/// way `Fingerprint::of_browser_config` hashes the fields that affect *how
/// the browser is launched*. `session_id` is deliberately excluded: it
/// selects page reuse, not crawl behavior, so two calls that differ only
/// in session id should still share a cache entry.
pub fn config_hash(cfg: &CrawlerRunConfig) -> String {
    let mut normalized = cfg.clone();
    normalized.session_id = None;

    let mut hasher = Sha256::new();
    match serde_json::to_vec(&normalized) {
        Ok(bytes) => hasher.update(&bytes),
        Err(_) => hasher.update(format!("{normalized:?}").as_bytes()),
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_configs_hash_identically() {
        let a = CrawlerRunConfig::default();
        let b = CrawlerRunConfig::default();
        assert_eq!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn session_id_does_not_affect_hash() {
        let base = CrawlerRunConfig::default();
        let with_session = base.with_session("abc");
        assert_eq!(config_hash(&base), config_hash(&with_session));
    }

    #[test]
    fn differing_behavior_changes_hash() {
        let a = CrawlerRunConfig::default();
        let mut b = CrawlerRunConfig::default();
        b.word_count_threshold = 50;
        assert_ne!(config_hash(&a), config_hash(&b));
    }
}
