//! File-backed response cache with per-entry expiry.
//!
//! One JSON file per key under the cache directory. Reads are
//! lazy-expiring: a stale entry is deleted and reported as a miss, so no
//! background sweep is needed for correctness. `clear_expired` exists to
//! reclaim space proactively (the daemon runs it at startup and on an
//! interval).
//!
//! Writes are best-effort: a cache miss is never a correctness failure
//! for any caller, so `set` swallows I/O errors after one eviction
//! attempt instead of propagating them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const FILE_PREFIX: &str = "jetstream_api_cache_";

/// Wire shape of a stored entry. `timestamp` is creation time,
/// `expires_at` absolute expiry, both unix milliseconds.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry<T> {
    data: T,
    timestamp: i64,
    expires_at: i64,
}

/// Expiry metadata alone, for sweeps that must not deserialize payloads.
#[derive(Debug, Deserialize)]
struct EntryMeta {
    expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub count: usize,
    /// UTF-16-equivalent estimate (2 bytes per stored character), kept
    /// for parity with the browser-storage accounting this replaces.
    pub approx_bytes: usize,
}

pub struct ResponseCache {
    dir: PathBuf,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, default_ttl: Duration) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("cache: failed to create {:?}: {}", dir, e);
        }
        Self { dir, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a cached value, evicting it transparently if expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, now_ms())
    }

    pub(crate) fn get_at<T: DeserializeOwned>(&self, key: &str, now_ms: i64) -> Option<T> {
        let path = self.entry_path(key);
        let content = std::fs::read_to_string(&path).ok()?;

        let entry: StoredEntry<T> = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                // Unreadable entry: drop it and miss.
                debug!("cache: invalid entry for '{}': {}", key, e);
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };

        if now_ms > entry.expires_at {
            let _ = std::fs::remove_file(&path);
            return None;
        }

        debug!("cache: hit '{}'", key);
        Some(entry.data)
    }

    /// Store a value with the default TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        self.set_at(key, value, ttl, now_ms());
    }

    pub(crate) fn set_at<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, now_ms: i64) {
        let entry = StoredEntry {
            data: value,
            timestamp: now_ms,
            expires_at: now_ms + ttl.as_millis() as i64,
        };
        let body = match serde_json::to_string(&entry) {
            Ok(b) => b,
            Err(e) => {
                warn!("cache: serialize failed for '{}': {}", key, e);
                return;
            }
        };

        let path = self.entry_path(key);
        if let Err(e) = std::fs::write(&path, &body) {
            // Storage may be full; reclaim what we can and drop the write.
            warn!("cache: write failed for '{}': {}", key, e);
            self.clear_expired();
        } else {
            debug!("cache: stored '{}' (ttl {}s)", key, ttl.as_secs());
        }
    }

    pub fn delete(&self, key: &str) {
        let _ = std::fs::remove_file(self.entry_path(key));
    }

    /// Remove every expired (or unreadable) entry. Returns how many were
    /// removed.
    pub fn clear_expired(&self) -> usize {
        self.clear_expired_at(now_ms())
    }

    pub(crate) fn clear_expired_at(&self, now_ms: i64) -> usize {
        let mut cleared = 0;
        for path in self.entry_files() {
            let stale = match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<EntryMeta>(&content) {
                    Ok(meta) => now_ms > meta.expires_at,
                    Err(_) => true,
                },
                Err(_) => true,
            };
            if stale && std::fs::remove_file(&path).is_ok() {
                cleared += 1;
            }
        }
        if cleared > 0 {
            debug!("cache: cleared {} expired entries", cleared);
        }
        cleared
    }

    /// Remove all entries regardless of expiry. Returns how many were
    /// removed.
    pub fn clear_all(&self) -> usize {
        let mut cleared = 0;
        for path in self.entry_files() {
            if std::fs::remove_file(&path).is_ok() {
                cleared += 1;
            }
        }
        cleared
    }

    pub fn stats(&self) -> CacheStats {
        let mut count = 0;
        let mut approx_bytes = 0;
        for path in self.entry_files() {
            count += 1;
            if let Ok(meta) = std::fs::metadata(&path) {
                approx_bytes += meta.len() as usize * 2;
            }
        }
        CacheStats { count, approx_bytes }
    }

    // ── key → file mapping ───────────────────────────────────────────────

    /// Keys are deterministic strings built from operation name and
    /// arguments. The slug keeps the filename readable; the hash suffix
    /// keeps distinct keys distinct even when slugging collapses them.
    fn entry_path(&self, key: &str) -> PathBuf {
        let mut slug: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        slug.truncate(64);
        self.dir
            .join(format!("{}{}_{}.json", FILE_PREFIX, slug, hash_key(key)))
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn hash_key(key: &str) -> String {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut h);
    format!("{:016x}", h.finish())
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache() -> (TempDir, ResponseCache) {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path(), Duration::from_secs(60));
        (dir, cache)
    }

    #[test]
    fn test_set_then_get() {
        let (_dir, cache) = cache();
        cache.set("track_42", &vec!["a".to_string(), "b".to_string()]);
        let got: Option<Vec<String>> = cache.get("track_42");
        assert_eq!(got.unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_expiry_evicts_and_misses() {
        let (_dir, cache) = cache();
        let t0 = 1_000_000;
        cache.set_at("chart_tracks_20", &7u32, Duration::from_secs(10), t0);

        // Still valid exactly at the boundary.
        let hit: Option<u32> = cache.get_at("chart_tracks_20", t0 + 10_000);
        assert_eq!(hit, Some(7));
        assert_eq!(cache.stats().count, 1);

        // One past the boundary: miss, and the entry is gone.
        let miss: Option<u32> = cache.get_at("chart_tracks_20", t0 + 10_001);
        assert!(miss.is_none());
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn test_distinct_keys_never_collide() {
        let (_dir, cache) = cache();
        // These slug to the same filename stem; the hash suffix must keep
        // them apart.
        cache.set("search_track_a b_20", &1u32);
        cache.set("search_track_a_b_20", &2u32);
        assert_eq!(cache.get::<u32>("search_track_a b_20"), Some(1));
        assert_eq!(cache.get::<u32>("search_track_a_b_20"), Some(2));
        assert_eq!(cache.stats().count, 2);
    }

    #[test]
    fn test_clear_expired_keeps_fresh_entries() {
        let (_dir, cache) = cache();
        let t0 = 5_000;
        cache.set_at("old", &1u32, Duration::from_secs(1), t0);
        cache.set_at("fresh", &2u32, Duration::from_secs(3600), t0);

        let cleared = cache.clear_expired_at(t0 + 2_000);
        assert_eq!(cleared, 1);
        assert_eq!(cache.get_at::<u32>("fresh", t0 + 2_000), Some(2));
        assert!(cache.get_at::<u32>("old", t0 + 2_000).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_dropped() {
        let (dir, cache) = cache();
        cache.set("k", &1u32);
        // Overwrite the single entry file with junk.
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            std::fs::write(entry.unwrap().path(), "not json").unwrap();
        }
        assert!(cache.get::<u32>("k").is_none());
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn test_delete_and_clear_all() {
        let (_dir, cache) = cache();
        cache.set("a", &1u32);
        cache.set("b", &2u32);
        cache.delete("a");
        assert!(cache.get::<u32>("a").is_none());
        assert_eq!(cache.stats().count, 1);
        assert_eq!(cache.clear_all(), 1);
        assert_eq!(cache.stats().count, 0);
    }

    #[test]
    fn test_stats_approximates_utf16_size() {
        let (_dir, cache) = cache();
        cache.set("sized", &"x".repeat(100));
        let stats = cache.stats();
        assert_eq!(stats.count, 1);
        // Entry body is payload plus envelope; twice the on-disk length.
        assert!(stats.approx_bytes > 200);
    }
}
