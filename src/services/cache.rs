// src/services/cache.rs

//! Content-addressed HTTP response cache.
//!
//! Entries are keyed by the SHA-256 of the URL plus the request body and
//! expire after a fixed timeout.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    fetched_at: DateTime<Utc>,
    body: String,
}

/// On-disk response cache.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    timeout: TimeDelta,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            dir: dir.into(),
            timeout: TimeDelta::seconds(timeout_secs.min(i64::MAX as u64) as i64),
        }
    }

    /// Cache key of a request.
    pub fn key(url: &str, post: Option<&[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        if let Some(post) = post {
            hasher.update(post);
        }
        hex::encode(hasher.finalize())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(&key[..2]).join(format!("{key}.json"))
    }

    /// Cached body of a request, if present and fresh.
    pub async fn get(&self, url: &str, post: Option<&[u8]>) -> Result<Option<String>> {
        let path = self.path(&Self::key(url, post));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };
        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Dropping unreadable cache entry {:?}: {}", path, e);
                let _ = tokio::fs::remove_file(&path).await;
                return Ok(None);
            }
        };
        if Utc::now() - entry.fetched_at > self.timeout {
            return Ok(None);
        }
        Ok(Some(entry.body))
    }

    /// Store a successful response body.
    pub async fn put(&self, url: &str, post: Option<&[u8]>, body: &str) -> Result<()> {
        let path = self.path(&Self::key(url, post));
        let entry = CacheEntry {
            url: url.to_string(),
            fetched_at: Utc::now(),
            body: body.to_string(),
        };
        write_atomic(&path, &serde_json::to_vec(&entry)?).await
    }
}

/// Write bytes atomically (write to temp, then rename).
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
