//! Storage Client: a uniform file-operations interface over the two
//! supported remote backends, Alist and WebDAV.
//!
//! The trait is the seam the rest of the system (Scanner, Materializer)
//! depends on; [`alist`] and [`webdav`] provide the two implementations,
//! [`cache`] the directory LRU and the process-wide client interning
//! cache, [`rate_limiter`] the single-token request gate.

pub mod alist;
pub mod cache;
pub mod rate_limiter;
pub mod webdav;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use cache::{StorageClientCache, StorageClientKey};

/// One entry returned by [`StorageClient::list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    pub modified: Option<String>,
}

/// Error kinds surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },
    #[error("transient transport error: {0}")]
    Transient(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Which wire protocol a [`StorageClient`] speaks; used for cache keys and
/// for the orchestrator's `storage_config`/`strm_target_config` deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Alist,
    WebDav,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alist => "alist",
            Self::WebDav => "webdav",
        })
    }
}

/// Credentials used to connect to, and to intern, a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Uniform file operations over a remote storage backend.
///
/// Implementors own their own HTTP client, auth token, rate-limit gate and
/// directory cache. All operations except [`upload_batch`](StorageClient::upload_batch)
/// pass through the rate gate; `upload_batch` uses its own concurrency
/// semaphore instead, since batch uploads need bounded parallelism rather
/// than a single-token throttle.
#[async_trait]
pub trait StorageClient: Send + Sync {
    fn backend(&self) -> Backend;

    async fn list(&self, path: &str) -> Result<Vec<FileInfo>>;

    async fn get_content(&self, path: &str) -> Result<Option<Vec<u8>>>;

    async fn put_content(&self, path: &str, bytes: &[u8]) -> Result<bool>;

    async fn mkdir(&self, path: &str) -> Result<bool>;

    async fn move_file(&self, source: &str, destination: &str) -> Result<bool>;

    async fn copy(&self, source: &str, destination: &str) -> Result<bool>;

    async fn delete(&self, path: &str) -> Result<bool>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Direct URL a media player can fetch bytes from without further API
    /// indirection. `None` if the backend cannot produce one.
    async fn direct_url(&self, path: &str) -> Result<Option<String>>;

    /// Re-list `path` bypassing the directory cache and evict the cached
    /// entry. On Alist this additionally forces a server-side refresh.
    async fn refresh_dir(&self, path: &str) -> Result<bool>;

    /// Batch upload: pre-creates every ancestor directory (serially,
    /// shallowest first, through the rate gate), then uploads file bodies
    /// in parallel gated by `concurrency`. Never returns `Err`; failures
    /// are reported in the third tuple element.
    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
        concurrency: usize,
    ) -> (usize, usize, Vec<String>);
}

/// Probe a server to decide which backend it is.
///
/// `GET {url}/api/public/settings` returning JSON with a `code` field means
/// Alist; anything else (including a connection error) is treated as
/// WebDAV, since a bare WebDAV server has no such endpoint.
pub async fn detect_backend(client: &reqwest::Client, url: &str) -> Backend {
    let probe_url = format!("{}/api/public/settings", url.trim_end_matches('/'));
    match client.get(&probe_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            match resp.json::<serde_json::Value>().await {
                Ok(body) if body.get("code").is_some() => Backend::Alist,
                _ => Backend::WebDav,
            }
        }
        _ => Backend::WebDav,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_display() {
        assert_eq!(Backend::Alist.to_string(), "alist");
        assert_eq!(Backend::WebDav.to_string(), "webdav");
    }
}
