//! In-process mirror of remote cache reads.
//!
//! A TTL-aware LRU holding encoded payloads. Entries expire independently of
//! the remote store; the strategy engine caps their lifetime at the
//! configured local TTL ceiling so the mirror never outlives a policy's
//! freshness window by much.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;

use crate::lock::{rw_read, rw_write};

const SOURCE: &str = "inkwave_cache::local";

struct Entry {
    payload: Bytes,
    expires_at: Instant,
}

/// Fixed-capacity local payload cache with per-entry TTL.
pub struct LocalStore {
    entries: RwLock<LruCache<String, Entry>>,
}

impl LocalStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Returns the live payload for `key`, evicting it if expired.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: &str, payload: Bytes, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = Entry {
            payload,
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "insert").put(key.to_string(), entry);
    }

    pub fn remove(&self, key: &str) {
        rw_write(&self.entries, SOURCE, "remove").pop(key);
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    /// Number of entries, including any not yet evicted after expiry.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
