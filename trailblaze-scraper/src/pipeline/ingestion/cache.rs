use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use trailblaze_core::common::error::{Result, ScraperError};

/// Canonical form used for cache keys: lowercased scheme and host come
/// from the URL parser; query pairs are sorted and the path loses any
/// trailing slash so equivalent spellings share an entry.
pub fn canonicalize_url(raw: &str) -> Result<String> {
    let mut parsed = Url::parse(raw)
        .map_err(|e| ScraperError::Validation(format!("invalid URL '{raw}': {e}")))?;

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let query = pairs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&query));
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }
    parsed.set_fragment(None);

    Ok(parsed.to_string())
}

pub fn cache_key(canonical_url: &str) -> String {
    hex::encode(Sha256::digest(canonical_url.as_bytes()))
}

/// Predicate applied to cached payloads before they are served; failure
/// evicts the entry so the next fetch goes to the network.
pub type Validator<'a> = &'a (dyn Fn(&[u8]) -> bool + Send + Sync);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub content_hash: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub validator_fails: u64,
}

/// Content-addressed disk cache. Entries are immutable; `put` replaces
/// the whole entry. Safe for concurrent readers; writers race benignly
/// (last write wins, both are valid).
pub struct ContentCache {
    dir: PathBuf,
    force_refresh: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    validator_fails: AtomicU64,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>, force_refresh: bool) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            force_refresh,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            validator_fails: AtomicU64::new(0),
        })
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.body"))
    }

    fn evict(&self, key: &str) {
        let _ = fs::remove_file(self.meta_path(key));
        let _ = fs::remove_file(self.body_path(key));
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Fresh entry for `url`, or None. Freshness requires an unexpired
    /// entry whose payload passes the caller's validator.
    pub fn get(&self, url: &str, validator: Option<Validator<'_>>) -> Option<(FetchRecord, Vec<u8>)> {
        if self.force_refresh {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let canonical = canonicalize_url(url).ok()?;
        let key = cache_key(&canonical);

        let record: FetchRecord = match fs::read(self.meta_path(&key))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        {
            Some(record) => record,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if Utc::now() >= record.expires_at {
            debug!(url, "cache entry expired");
            self.evict(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let payload = match fs::read(self.body_path(&key)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(url, "cache body unreadable: {e}");
                self.evict(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if let Some(validator) = validator {
            if !validator(&payload) {
                debug!(url, "cache entry failed validation, evicting");
                self.validator_fails.fetch_add(1, Ordering::Relaxed);
                self.evict(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some((record, payload))
    }

    /// Write-through store with `expires_at = now + ttl`.
    pub fn put(&self, url: &str, payload: &[u8], etag: Option<String>, ttl: Duration) -> Result<FetchRecord> {
        let canonical = canonicalize_url(url)?;
        let key = cache_key(&canonical);
        let now = Utc::now();
        let record = FetchRecord {
            url: canonical,
            fetched_at: now,
            expires_at: now
                + ChronoDuration::from_std(ttl)
                    .unwrap_or_else(|_| ChronoDuration::seconds(3600)),
            etag,
            content_hash: hex::encode(Sha256::digest(payload)),
        };

        fs::write(self.body_path(&key), payload)?;
        fs::write(self.meta_path(&key), serde_json::to_vec(&record)?)?;
        Ok(record)
    }

    pub fn counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            validator_fails: self.validator_fails.load(Ordering::Relaxed),
        }
    }
}

/// Small typed cache for geocode lookups, sharing the disk layout of
/// `ContentCache`. Negative results carry their own (shorter) TTL.
pub struct GeocodeCache {
    dir: PathBuf,
    ttl_success: Duration,
    ttl_negative: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeocodeEntry {
    query: String,
    result: Option<(f64, f64)>,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl GeocodeCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_success: Duration, ttl_negative: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            ttl_success,
            ttl_negative,
        })
    }

    fn path(&self, query: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", hex::encode(Sha256::digest(query.as_bytes()))))
    }

    /// `Some(Some(point))` cached hit, `Some(None)` cached negative,
    /// `None` nothing cached (or expired).
    pub fn get(&self, query: &str) -> Option<Option<(f64, f64)>> {
        let entry: GeocodeEntry = fs::read(self.path(query))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())?;
        if Utc::now() >= entry.expires_at {
            let _ = fs::remove_file(self.path(query));
            return None;
        }
        Some(entry.result)
    }

    pub fn put(&self, query: &str, result: Option<(f64, f64)>) -> Result<()> {
        let ttl = if result.is_some() {
            self.ttl_success
        } else {
            self.ttl_negative
        };
        let now = Utc::now();
        let entry = GeocodeEntry {
            query: query.to_string(),
            result,
            cached_at: now,
            expires_at: now
                + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1)),
        };
        fs::write(self.path(query), serde_json::to_vec(&entry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn canonicalization_orders_query_and_lowercases_host() {
        let a = canonicalize_url("https://AERC.org/Calendar/?b=2&a=1").unwrap();
        let b = canonicalize_url("https://aerc.org/Calendar?a=1&b=2").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("https://aerc.org/"));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let once = canonicalize_url("HTTPS://Example.com/a/b/?z=9&y=8").unwrap();
        let twice = canonicalize_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn read_after_write_round_trips() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), false).unwrap();
        let payload = b"<html><body>calendar</body></html>";

        cache
            .put("https://aerc.org/calendar", payload, None, Duration::from_secs(60))
            .unwrap();
        let (record, bytes) = cache.get("https://aerc.org/calendar", None).unwrap();
        assert_eq!(bytes, payload);
        assert_eq!(record.content_hash, hex::encode(Sha256::digest(payload)));
        assert_eq!(cache.counters().hits, 1);
    }

    #[test]
    fn expired_entries_are_evicted() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), false).unwrap();
        cache
            .put("https://aerc.org/old", b"stale", None, Duration::from_secs(0))
            .unwrap();

        assert!(cache.get("https://aerc.org/old", None).is_none());
        let counters = cache.counters();
        assert_eq!(counters.evictions, 1);
        assert_eq!(counters.misses, 1);
    }

    #[test]
    fn validator_failure_evicts() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), false).unwrap();
        cache
            .put("https://aerc.org/empty", b"", None, Duration::from_secs(60))
            .unwrap();

        let non_empty: Validator<'_> = &|bytes: &[u8]| !bytes.is_empty();
        assert!(cache.get("https://aerc.org/empty", Some(non_empty)).is_none());
        assert_eq!(cache.counters().validator_fails, 1);
        // entry is gone even without the validator
        assert!(cache.get("https://aerc.org/empty", None).is_none());
    }

    #[test]
    fn force_refresh_bypasses_reads() {
        let dir = tempdir().unwrap();
        let cache = ContentCache::new(dir.path(), true).unwrap();
        cache
            .put("https://aerc.org/x", b"fresh", None, Duration::from_secs(60))
            .unwrap();
        assert!(cache.get("https://aerc.org/x", None).is_none());
    }

    #[test]
    fn geocode_cache_distinguishes_negative_results() {
        let dir = tempdir().unwrap();
        let cache = GeocodeCache::new(
            dir.path(),
            Duration::from_secs(600),
            Duration::from_secs(600),
        )
        .unwrap();

        cache.put("sonoita az usa", Some((31.68, -110.65))).unwrap();
        cache.put("nowhere zz", None).unwrap();

        assert_eq!(cache.get("sonoita az usa"), Some(Some((31.68, -110.65))));
        assert_eq!(cache.get("nowhere zz"), Some(None));
        assert_eq!(cache.get("unseen"), None);
    }

    #[test]
    fn geocode_negative_ttl_expires() {
        let dir = tempdir().unwrap();
        let cache = GeocodeCache::new(
            dir.path(),
            Duration::from_secs(600),
            Duration::from_secs(0),
        )
        .unwrap();
        cache.put("nowhere zz", None).unwrap();
        assert_eq!(cache.get("nowhere zz"), None);
    }
}
