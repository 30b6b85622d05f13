use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// On-disk response cache keyed by a hash of the URL.
///
/// Freshness is judged by file mtime against the TTL.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Deterministic cache key for a URL
    pub fn key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.html", Self::key(url)))
    }

    /// Cached body if present and younger than the TTL
    pub fn get(&self, url: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let path = self.path_for(url);
        if !self.is_fresh(&path) {
            return None;
        }
        match fs::read(&path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(path = %path.display(), "Cache read failed: {}", e);
                None
            }
        }
    }

    pub fn put(&self, url: &str, body: &str) {
        if !self.enabled {
            return;
        }
        let path = self.path_for(url);
        let result = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, body));
        if let Err(e) = result {
            warn!(url, path = %path.display(), "Failed to write cache entry: {}", e);
        }
    }

    fn is_fresh(&self, path: &Path) -> bool {
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age < self.ttl)
            // mtime in the future: treat as fresh
            .unwrap_or(true)
    }
}
