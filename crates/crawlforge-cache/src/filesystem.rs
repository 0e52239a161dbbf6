//! Filesystem-backed cache. Each entry is one file named by its key under
//! `root`; writes land in a sibling temp file first and are renamed into
//! place so a reader never sees a partially written entry, mirroring the
//! save/load-to-disk pattern the CLI's cache storage uses for its entries
//! and stats files, generalized to one file per key instead of two
//! shared files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use crawlforge_types::ports::Storage;
use crawlforge_types::CrawlError;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub struct FilesystemCacheBackend {
    root: PathBuf,
}

impl FilesystemCacheBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

#[async_trait]
impl Storage for FilesystemCacheBackend {
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, CrawlError> {
        let path = self.entry_path(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CrawlError::CacheError { message: e.to_string() }),
        }
    }

    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<(), CrawlError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CrawlError::CacheError { message: e.to_string() })?;

        let tmp_path = self.root.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| CrawlError::CacheError { message: e.to_string() })?;

        let final_path = self.entry_path(key);
        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| CrawlError::CacheError { message: e.to_string() })?;

        debug!(key, bytes = bytes.len(), "wrote cache entry");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CrawlError> {
        Ok(fs::try_exists(self.entry_path(key))
            .await
            .map_err(|e| CrawlError::CacheError { message: e.to_string() })?)
    }

    async fn remove(&self, key: &str) -> Result<(), CrawlError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CrawlError::CacheError { message: e.to_string() }),
        }
    }
}
