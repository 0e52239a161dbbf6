//! Byte storage capability backing the cache and downloaded artifacts (§6).

use async_trait::async_trait;

use crate::error::CrawlError;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CrawlError>;
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), CrawlError>;
    async fn exists(&self, key: &str) -> Result<bool, CrawlError>;
    async fn remove(&self, key: &str) -> Result<(), CrawlError>;
}
