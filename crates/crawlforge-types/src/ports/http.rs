//! HTTP client capability used by the URL seeder's HEAD/meta fetch and the
//! link-preview scorer (§6).

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::CrawlError;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, CrawlError>;
    async fn head(&self, url: &str, timeout: Duration) -> Result<HttpResponse, CrawlError>;
}
