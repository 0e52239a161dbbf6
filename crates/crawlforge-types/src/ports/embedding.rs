//! Embedding capability, used only by the adaptive crawler's `embedding`
//! scoring backend (§4.10).

use async_trait::async_trait;

use crate::error::CrawlError;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CrawlError>;
}
