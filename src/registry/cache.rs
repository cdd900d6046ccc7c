use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::types::RegistryEntry;

/// How long a cached registry lookup stays valid.
const CACHE_TTL_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    timestamp: DateTime<Utc>,
    data: RegistryEntry,
}

/// Time-expiring on-disk cache of registry lookups, one JSON file per key
/// under `<cacheRoot>/model_info/`.
///
/// The cache is a pure optimization layer: reads fail closed (any error is
/// a miss) and writes are best-effort. Expiry is enforced lazily on access;
/// records that are never queried again simply stay on disk.
#[derive(Debug, Clone)]
pub struct ModelInfoCache {
    dir: PathBuf,
}

impl ModelInfoCache {
    pub fn new(cache_root: &Path) -> Self {
        Self {
            dir: cache_root.join("model_info"),
        }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    /// Returns the cached entry for `key`, or None on miss, read error,
    /// deserialization error, or expiry. Expired records are deleted.
    pub fn get(&self, key: &str) -> Option<RegistryEntry> {
        let path = self.record_path(key);
        let content = std::fs::read_to_string(&path).ok()?;
        let record: CacheRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                debug!("unreadable cache record for {}: {}", key, e);
                return None;
            }
        };

        if Utc::now() - record.timestamp > Duration::days(CACHE_TTL_DAYS) {
            debug!("cache record for {} expired", key);
            let _ = std::fs::remove_file(&path);
            return None;
        }

        Some(record.data)
    }

    /// Stores `entry` under `key`. Failures are logged and swallowed.
    pub fn put(&self, key: &str, entry: &RegistryEntry) {
        let record = CacheRecord {
            timestamp: Utc::now(),
            data: entry.clone(),
        };

        let write = std::fs::create_dir_all(&self.dir)
            .and_then(|_| {
                let payload = serde_json::to_string(&record)?;
                std::fs::write(self.record_path(key), payload)
            });
        if let Err(e) = write {
            warn!("failed to cache registry lookup for {}: {}", key, e);
        }
    }
}
