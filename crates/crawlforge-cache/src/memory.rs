//! In-memory backend for tests and ephemeral single-process runs.

use async_trait::async_trait;
use crawlforge_types::ports::Storage;
use crawlforge_types::CrawlError;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryCacheBackend {
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CrawlError> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), CrawlError> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CrawlError> {
        Ok(self.entries.contains_key(key))
    }

    async fn remove(&self, key: &str) -> Result<(), CrawlError> {
        self.entries.remove(key);
        Ok(())
    }
}
