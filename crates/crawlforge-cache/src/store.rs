//! Cache orchestration: mode dispatch, freshness, and the "never cache a
//! failure" invariant (§4.7).

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use crawlforge_types::ports::Storage;
use crawlforge_types::{CacheEntry, CacheMode, CrawlError, CrawlResult};
use tracing::{debug, warn};

use crate::key::cache_key;

pub struct Cache {
    backend: Arc<dyn Storage>,
    default_ttl_secs: u64,
}

impl Cache {
    pub fn new(backend: Arc<dyn Storage>, default_ttl_secs: u64) -> Self {
        Self {
            backend,
            default_ttl_secs,
        }
    }

    async fn read(&self, key: &str) -> Option<CacheEntry> {
        let bytes = match self.backend.read_bytes(key).await {
            Ok(Some(b)) => b,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.is_fresh(Utc::now()) => Some(entry),
            Ok(_) => None,
            Err(e) => {
                warn!(key, error = %e, "cache entry corrupt, treating as miss");
                None
            }
        }
    }

    async fn write(&self, key: &str, entry: &CacheEntry) {
        if !entry.stored_result.success {
            return;
        }
        match serde_json::to_vec(entry) {
            Ok(bytes) => {
                if let Err(e) = self.backend.write_bytes(key, &bytes).await {
                    warn!(key, error = %e, "cache write failed");
                }
            }
            Err(e) => warn!(key, error = %e, "failed to serialize cache entry"),
        }
    }

    /// Drives `mode` against a `fetch` closure that performs the real
    /// crawl. `fetch` runs at most once; its result is cached according to
    /// `mode` (§4.7's five modes).
    pub async fn resolve<F, Fut>(
        &self,
        fingerprint: &str,
        url: &str,
        config_hash: &str,
        engine: &str,
        user_agent: &str,
        mode: CacheMode,
        fetch: F,
    ) -> Result<CrawlResult, CrawlError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CrawlResult, CrawlError>>,
    {
        let key = cache_key(url, config_hash, engine, user_agent);

        match mode {
            CacheMode::Enabled => {
                if let Some(entry) = self.read(&key).await {
                    debug!(url, "cache hit");
                    return Ok(entry.stored_result);
                }
                let result = fetch().await?;
                self.write(
                    &key,
                    &CacheEntry {
                        fingerprint: fingerprint.to_string(),
                        url: url.to_string(),
                        config_hash: config_hash.to_string(),
                        stored_result: result.clone(),
                        created_at: Utc::now(),
                        ttl_secs: self.default_ttl_secs,
                    },
                )
                .await;
                Ok(result)
            }
            CacheMode::Bypass => fetch().await,
            CacheMode::ReadOnly => {
                if let Some(entry) = self.read(&key).await {
                    return Ok(entry.stored_result);
                }
                fetch().await
            }
            CacheMode::WriteOnly => {
                let result = fetch().await?;
                self.write(
                    &key,
                    &CacheEntry {
                        fingerprint: fingerprint.to_string(),
                        url: url.to_string(),
                        config_hash: config_hash.to_string(),
                        stored_result: result.clone(),
                        created_at: Utc::now(),
                        ttl_secs: self.default_ttl_secs,
                    },
                )
                .await;
                Ok(result)
            }
            CacheMode::Disabled => fetch().await,
        }
    }
}
