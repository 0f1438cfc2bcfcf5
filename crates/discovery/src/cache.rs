//! On-disk preview cache.
//!
//! Each source identifier maps to one file named by the SHA-256 of the
//! identifier, so any identifier is safe as a path and repeated runs reuse
//! earlier downloads. Downloads land in a `.part` file first and are
//! renamed into place once complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use montage_core::{AssetCache, CapabilityFailure};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Retrieves the bytes behind a remote URL.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CapabilityFailure>;
}

/// HTTP fetcher backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CapabilityFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                CapabilityFailure::Timeout(format!("{url}: {e}"))
            } else {
                CapabilityFailure::Network(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityFailure::Backend(format!("GET {url} returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CapabilityFailure::Network(format!("{url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Content-addressed preview cache rooted at a directory.
pub struct FileAssetCache {
    dir: PathBuf,
    fetcher: Arc<dyn AssetFetcher>,
}

impl FileAssetCache {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
        }
    }

    /// A cache that downloads over HTTP.
    pub fn http(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, Arc::new(HttpFetcher::default()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the preview for `id` lives, whether or not it is cached yet.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(hex::encode(Sha256::digest(id.as_bytes())))
    }
}

#[async_trait]
impl AssetCache for FileAssetCache {
    async fn get_or_fetch(&self, id: &str, remote_url: &str) -> Result<PathBuf, CapabilityFailure> {
        let path = self.path_for(id);
        if tokio::fs::try_exists(&path).await? {
            debug!(id, "Preview cache hit");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = self.fetcher.fetch(remote_url).await?;

        let partial = path.with_extension("part");
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        debug!(id, bytes = bytes.len(), "Preview cached");
        Ok(path)
    }
}
