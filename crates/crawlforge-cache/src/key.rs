//! Cache key derivation: `H(url, config_hash, engine, user_agent)` (§4.7).

use sha2::{Digest, Sha256};

pub fn cache_key(url: &str, config_hash: &str, engine: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0u8]);
    hasher.update(config_hash.as_bytes());
    hasher.update([0u8]);
    hasher.update(engine.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_agent.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}
