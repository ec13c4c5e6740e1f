//! Decision cache contract and its in-memory implementation.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache key is empty")]
    InvalidKey,
    #[error("failed to encode value for `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode value for `{key}`: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache is closed")]
    Closed,
}

/// Byte-level key/value store. Implementations must be safe for
/// concurrent use.
pub trait DecisionStore: Send + Sync {
    fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn close(&self) -> Result<(), StoreError>;
}

/// Typed access on top of any [`DecisionStore`], JSON encoded.
pub trait DecisionStoreExt: DecisionStore {
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let data = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, data)
    }

    /// Decode the value under `key` into `out`. Returns whether it was found;
    /// `out` is untouched on a miss.
    fn get<T: DeserializeOwned>(&self, key: &str, out: &mut T) -> Result<bool, StoreError> {
        match self.get_raw(key)? {
            Some(data) => {
                *out = serde_json::from_slice(&data).map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                })?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<S: DecisionStore + ?Sized> DecisionStoreExt for S {}

struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub delete_hits: u64,
    pub delete_misses: u64,
}

/// In-memory store with a fixed time-to-live per entry.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    delete_hits: AtomicU64,
    delete_misses: AtomicU64,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            delete_hits: AtomicU64::new(0),
            delete_misses: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            delete_hits: self.delete_hits.load(Ordering::Relaxed),
            delete_misses: self.delete_misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }

    fn check(&self, key: &str) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        if key.is_empty() {
            return Err(StoreError::InvalidKey);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl DecisionStore for MemoryStore {
    fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.check(key)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                data: value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check(key)?;
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.data.clone());

        match found {
            Some(data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(data))
            }
            None => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check(key)?;
        if self.entries.remove(key).is_some() {
            self.delete_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.delete_misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let stats = self.stats();
        tracing::info!(
            entries = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            delete_hits = stats.delete_hits,
            delete_misses = stats.delete_misses,
            "Decision cache closed"
        );
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::AccessReviewStatus;

    #[test]
    fn typed_round_trip_and_miss() {
        let store = MemoryStore::default();
        store.set("k", &AccessReviewStatus::denied("nope")).unwrap();

        let mut out = AccessReviewStatus::default();
        assert!(store.get("k", &mut out).unwrap());
        assert_eq!(out.reason, "nope");

        let mut untouched = AccessReviewStatus::denied("sentinel");
        assert!(!store.get("other", &mut untouched).unwrap());
        assert_eq!(untouched.reason, "sentinel");

        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn empty_key_is_rejected() {
        let store = MemoryStore::default();
        assert!(matches!(store.set_raw("", vec![1]), Err(StoreError::InvalidKey)));
        assert!(matches!(store.get_raw(""), Err(StoreError::InvalidKey)));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let store = MemoryStore::new(Duration::from_millis(20));
        store.set_raw("k", b"v".to_vec()).unwrap();
        assert!(store.get_raw("k").unwrap().is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(store.get_raw("k").unwrap().is_none());
        assert_eq!(store.stats().entries, 0);
    }

    #[test]
    fn decode_failure_is_reported() {
        let store = MemoryStore::default();
        store.set_raw("k", b"not json".to_vec()).unwrap();
        let mut out = AccessReviewStatus::default();
        assert!(matches!(store.get("k", &mut out), Err(StoreError::Decode { .. })));
    }

    #[test]
    fn delete_and_close() {
        let store = MemoryStore::default();
        store.set_raw("k", b"v".to_vec()).unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.stats().delete_hits, 1);
        assert_eq!(store.stats().delete_misses, 1);

        store.close().unwrap();
        assert!(matches!(store.get_raw("k"), Err(StoreError::Closed)));
        assert!(store.close().is_ok());
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let store = MemoryStore::new(Duration::from_millis(20));
        store.set_raw("old", b"v".to_vec()).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        store.set_raw("new", b"v".to_vec()).unwrap();
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.stats().entries, 1);
    }

    #[test]
    fn purge_counts_only_removals_while_writers_insert() {
        let store = MemoryStore::default();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0u64.. {
                    store.set_raw(&format!("key-{}", i), b"v".to_vec()).unwrap();
                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                }
            });

            for _ in 0..20_000 {
                assert_eq!(store.purge_expired(), 0);
            }
            done.store(true, Ordering::Relaxed);
        });

        assert!(store.stats().entries > 0);
    }
}
