//! Content-addressed cache for `CrawlResult`s (§4.7). The key is
//! `H(url, config_hash, engine, user_agent)`; storage is pluggable behind
//! `crawlforge_types::ports::Storage` (§6), with a filesystem
//! implementation as the default and an in-memory one for tests.

pub mod filesystem;
pub mod key;
pub mod memory;
pub mod store;

pub use filesystem::FilesystemCacheBackend;
pub use key::cache_key;
pub use memory::InMemoryCacheBackend;
pub use store::Cache;
