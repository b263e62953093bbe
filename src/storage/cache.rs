//! Directory listing LRU and the process-wide storage-client interning
//! cache. Both are owned objects held by the application context, not
//! module-level statics.

use super::{Backend, StorageClient, StorageCredentials};
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry<T> {
    value: T,
    inserted_at: Instant,
}

/// TTL'd LRU for directory listings, keyed by `list:<absolute_path>`.
pub struct DirectoryCache<T> {
    ttl: Duration,
    inner: Mutex<LruCache<String, Entry<T>>>,
}

impl<T: Clone> DirectoryCache<T> {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.get(key) {
            if entry.inserted_at.elapsed() <= self.ttl {
                return Some(entry.value.clone());
            }
        }
        inner.pop(key);
        None
    }

    pub async fn set(&self, key: String, value: T) {
        let mut inner = self.inner.lock().await;
        inner.put(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.lock().await.pop(key);
    }

    /// Invalidate every cached listing whose path is a parent of `path`,
    /// since a write under that path changes what that listing would show.
    pub async fn invalidate_parents_of(&self, path: &str) {
        let mut inner = self.inner.lock().await;
        let keys: Vec<String> = inner
            .iter()
            .map(|(k, _)| k.clone())
            .filter(|k| {
                k.strip_prefix("list:")
                    .is_some_and(|parent| path.starts_with(parent))
            })
            .collect();
        for key in keys {
            inner.pop(&key);
        }
    }
}

fn credentials_hash(creds: &StorageCredentials) -> u64 {
    let mut hasher = DefaultHasher::new();
    creds.hash(&mut hasher);
    hasher.finish()
}

/// Key used to intern a storage client: a hash of `(url, username, password)`
/// plus the backend, since the same credentials could in principle speak
/// either protocol depending on caller choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageClientKey {
    backend: Backend,
    credentials_hash: u64,
}

impl StorageClientKey {
    #[must_use]
    pub fn new(backend: Backend, creds: &StorageCredentials) -> Self {
        Self {
            backend,
            credentials_hash: credentials_hash(creds),
        }
    }
}

/// Process-wide cache of storage client instances, interned by credentials
/// hash so that repeated `connect_*` calls with the same credentials reuse
/// the same login token rather than re-authenticating.
#[derive(Default)]
pub struct StorageClientCache {
    inner: Mutex<std::collections::HashMap<StorageClientKey, Arc<dyn StorageClient>>>,
}

impl StorageClientCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_insert_with<F>(
        &self,
        key: StorageClientKey,
        build: F,
    ) -> Arc<dyn StorageClient>
    where
        F: FnOnce() -> Arc<dyn StorageClient>,
    {
        let mut inner = self.inner.lock().await;
        inner.entry(key).or_insert_with(build).clone()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_cache_expires_after_ttl() {
        let cache: DirectoryCache<Vec<u8>> = DirectoryCache::new(10, Duration::from_millis(20));
        cache.set("list:/a".to_string(), vec![1, 2, 3]).await;
        assert_eq!(cache.get("list:/a").await, Some(vec![1, 2, 3]));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("list:/a").await, None);
    }

    #[tokio::test]
    async fn directory_cache_invalidate_parents() {
        let cache: DirectoryCache<Vec<u8>> = DirectoryCache::new(10, Duration::from_secs(60));
        cache.set("list:/a".to_string(), vec![1]).await;
        cache.set("list:/a/b".to_string(), vec![2]).await;
        cache.set("list:/other".to_string(), vec![3]).await;
        cache.invalidate_parents_of("/a/b/c.mkv").await;
        assert_eq!(cache.get("list:/a").await, None);
        assert_eq!(cache.get("list:/a/b").await, None);
        assert_eq!(cache.get("list:/other").await, Some(vec![3]));
    }
}
