//! Disk cache implementation
//!
//! Content-addressed persistent store: each entry lives at
//! `<root>/<hash[0]>/<hash>`, where hash is the SHA-256 of the cache key.
//! There is no in-memory index (existence is a filesystem probe) and no
//! expiry or eviction: entries persist until externally purged.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::entry::{CacheEntry, CacheKey};
use super::error::CacheError;
use super::traits::Cache;

/// Filesystem-backed cache tier
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Sharded path for a key: `<root>/<hex[0]>/<hex>`
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hash = key.content_hash();
        let shard = &hash[0..1];
        self.root.join(shard).join(&hash)
    }

    /// Read and decode an entry. Any I/O or decode failure is treated as
    /// absent; disk problems must never fail a client request.
    pub async fn get_entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Disk cache read failed");
                }
                return None;
            }
        };

        match CacheEntry::from_bytes(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupt disk cache entry, treating as miss"
                );
                None
            }
        }
    }

    /// Encode and write an entry. Failures are logged and swallowed; the
    /// write is best-effort and never retried.
    pub async fn set_entry(&self, key: &CacheKey, entry: &CacheEntry) {
        let path = self.entry_path(key);
        let bytes = match entry.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode cache entry");
                return;
            }
        };

        if let Some(shard_dir) = path.parent() {
            // create_dir_all tolerates the concurrent "already exists" race
            if let Err(e) = tokio::fs::create_dir_all(shard_dir).await {
                tracing::warn!(dir = %shard_dir.display(), error = %e, "Failed to create cache shard dir");
                return;
            }
        }

        if let Err(e) = tokio::fs::write(&path, bytes).await {
            tracing::warn!(path = %path.display(), error = %e, "Disk cache write failed");
        }
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.get_entry(key).await)
    }

    async fn set(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.set_entry(&key, &entry).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn key(path: &str) -> CacheKey {
        CacheKey::new("origin", 80, "GET", path, "example.com")
    }

    #[tokio::test]
    async fn test_get_absent_key_returns_none() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());
        assert!(cache.get_entry(&key("/missing")).await.is_none());
    }

    #[tokio::test]
    async fn test_roundtrip_binary_exact() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());

        let body = Bytes::from(vec![0u8, 255, 128, 7, 0, 200]);
        let entry = CacheEntry::new(
            200,
            vec![("content-type".to_string(), "application/octet-stream".to_string())],
            body.clone(),
        );
        cache.set_entry(&key("/bin"), &entry).await;

        let got = cache.get_entry(&key("/bin")).await.unwrap();
        assert_eq!(got.body, body);
        assert_eq!(got.status_code, 200);
        assert_eq!(got.timestamp, entry.timestamp);
    }

    #[tokio::test]
    async fn test_entries_are_sharded_by_first_hash_char() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());

        let k = key("/sharded");
        cache
            .set_entry(&k, &CacheEntry::new(200, vec![], Bytes::from("x")))
            .await;

        let hash = k.content_hash();
        let expected = dir.path().join(&hash[0..1]).join(&hash);
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());

        let k = key("/corrupt");
        let hash = k.content_hash();
        let shard = dir.path().join(&hash[0..1]);
        std::fs::create_dir_all(&shard).unwrap();
        std::fs::write(shard.join(&hash), b"garbage bytes").unwrap();

        assert!(cache.get_entry(&k).await.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_stored_entry() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());

        let k = key("/a");
        cache
            .set_entry(&k, &CacheEntry::new(200, vec![], Bytes::from("old")))
            .await;
        cache
            .set_entry(&k, &CacheEntry::new(200, vec![], Bytes::from("new")))
            .await;

        let got = cache.get_entry(&k).await.unwrap();
        assert_eq!(got.body, Bytes::from("new"));
    }

    #[tokio::test]
    async fn test_write_failure_does_not_propagate() {
        // Root is an unwritable location (a file, not a directory)
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let cache = DiskCache::new(&blocker);
        // Must not panic or error
        cache
            .set_entry(&key("/x"), &CacheEntry::new(200, vec![], Bytes::from("x")))
            .await;
        assert!(cache.get_entry(&key("/x")).await.is_none());
    }
}
