//! Response cache for NWP requests
//!
//! Entries never expire: the same (endpoint, query) pair always maps to the
//! body first stored for it. The cache is owned by the NWP client and shared
//! across requests; stores serialize their own writes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Arc<str>>;
    async fn put(&self, key: &str, body: &str) -> Result<()>;
}

/// Process-local cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Arc<str>>>,
}

impl MemoryCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Arc<str>> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: &str, body: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::from(body));
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    body: String,
}

/// Cache persisted under a directory, one file per key, with an in-memory
/// layer in front so repeated hits skip the filesystem.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    hot: MemoryCache,
}

impl DiskCache {
    /// Cache rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            hot: MemoryCache::new(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes());
        self.dir.join(format!("{name}.json"))
    }

    async fn read_entry(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        let entry: DiskEntry = serde_json::from_slice(&raw)
            .with_context(|| format!("decoding {}", path.display()))?;
        // file names are hashes; guard against a collision
        Ok((entry.key == key).then_some(entry.body))
    }
}

#[async_trait]
impl ResponseCache for DiskCache {
    async fn get(&self, key: &str) -> Option<Arc<str>> {
        if let Some(body) = self.hot.get(key).await {
            return Some(body);
        }

        match self.read_entry(key).await {
            Ok(Some(body)) => {
                debug!(key, "disk cache hit");
                if let Err(e) = self.hot.put(key, &body).await {
                    warn!(error = %e, "failed to promote cache entry");
                }
                self.hot.get(key).await
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    async fn put(&self, key: &str, body: &str) -> Result<()> {
        self.hot.put(key, body).await?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating cache dir {}", self.dir.display()))?;

        let entry = DiskEntry {
            key: key.to_string(),
            body: body.to_string(),
        };
        let path = self.path_for(key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(key, "disk cache entry already present");
            return Ok(());
        }
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, serde_json::to_vec(&entry)?)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("moving cache entry to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("solar-forecast-cache-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_memory_cache_first_write_wins() {
        let cache = MemoryCache::new();
        assert!(cache.get("k").await.is_none());

        cache.put("k", "first").await.unwrap();
        cache.put("k", "second").await.unwrap();

        assert_eq!(cache.get("k").await.as_deref(), Some("first"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_disk_cache_first_write_wins_across_instances() {
        let dir = scratch_dir();
        let key = "https://api.open-meteo.com/v1/dwd-icon?latitude=48.1";

        DiskCache::new(&dir).put(key, "first").await.unwrap();
        DiskCache::new(&dir).put(key, "second").await.unwrap();

        let reopened = DiskCache::new(&dir);
        assert_eq!(reopened.get(key).await.as_deref(), Some("first"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_disk_cache_survives_new_instance() {
        let dir = scratch_dir();
        let key = "https://api.open-meteo.com/v1/gfs?latitude=51.5";

        DiskCache::new(&dir).put(key, r#"{"ok":true}"#).await.unwrap();

        let reopened = DiskCache::new(&dir);
        assert_eq!(reopened.get(key).await.as_deref(), Some(r#"{"ok":true}"#));
        assert!(reopened.get("other").await.is_none());

        let _ = std::fs::remove_dir_all(dir);
    }
}
