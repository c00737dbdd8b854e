//! In-process [`RemoteCache`] implementation.
//!
//! Backs deployments that run without a remote store and every test in this
//! crate. Semantics track the redis-backed client: real TTLs, `Nil` on
//! absence, counters stored as decimal strings.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::remote::RemoteCache;

struct Stored {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Stored {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|at| at > Instant::now())
    }
}

/// Volatile in-process key-value store with the full client surface.
#[derive(Default)]
pub struct MemoryRemote {
    entries: RwLock<HashMap<String, Stored>>,
    hashes: RwLock<HashMap<String, HashMap<String, Bytes>>>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live scalar entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|stored| stored.live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn add_counter(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let mut entries = self.entries.write().await;
        let live = entries.get(key).filter(|stored| stored.live());
        let current = match live {
            Some(stored) => std::str::from_utf8(&stored.value)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or(CacheError::Driver {
                    op: "incr_by",
                    detail: "value is not an integer".to_string(),
                })?,
            None => 0,
        };
        // An expired counter restarts from zero with no expiry.
        let expires_at = live.and_then(|stored| stored.expires_at);
        let next = current + delta;
        entries.insert(
            key.to_string(),
            Stored {
                value: Bytes::from(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }
}

#[async_trait]
impl RemoteCache for MemoryRemote {
    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(stored) if stored.live() => Ok(stored.value.clone()),
            _ => Err(CacheError::Nil),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Stored {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let mut hashes = self.hashes.write().await;
        let mut sets = self.sets.write().await;
        for key in keys {
            entries.remove(key);
            hashes.remove(key);
            sets.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        if self
            .entries
            .read()
            .await
            .get(key)
            .is_some_and(Stored::live)
        {
            return Ok(true);
        }
        if self.hashes.read().await.contains_key(key) {
            return Ok(true);
        }
        Ok(self.sets.read().await.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(stored) if stored.live() => {
                stored.expires_at = Some(Instant::now() + ttl);
                Ok(())
            }
            _ => Err(CacheError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(stored) if stored.live() => Ok(stored
                .expires_at
                .map(|at| at.saturating_duration_since(Instant::now()))),
            _ => Err(CacheError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|stored| stored.live())
                    .map(|stored| stored.value.clone())
            })
            .collect())
    }

    async fn mset(&self, items: &[(String, Bytes, Duration)]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        for (key, value, ttl) in items {
            entries.insert(
                key.clone(),
                Stored {
                    value: value.clone(),
                    expires_at: Some(Instant::now() + *ttl),
                },
            );
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Bytes, CacheError> {
        let hashes = self.hashes.read().await;
        hashes
            .get(key)
            .and_then(|fields| fields.get(field))
            .cloned()
            .ok_or(CacheError::Nil)
    }

    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<(), CacheError> {
        let mut hashes = self.hashes.write().await;
        hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>, CacheError> {
        let hashes = self.hashes.read().await;
        Ok(hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<(), CacheError> {
        let mut hashes = self.hashes.write().await;
        if let Some(stored) = hashes.get_mut(key) {
            for field in fields {
                stored.remove(field);
            }
            if stored.is_empty() {
                hashes.remove(key);
            }
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        let mut sets = self.sets.write().await;
        let stored = sets.entry(key.to_string()).or_default();
        for member in members {
            stored.insert(member.clone());
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let sets = self.sets.read().await;
        Ok(sets
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        let mut sets = self.sets.write().await;
        if let Some(stored) = sets.get_mut(key) {
            for member in members {
                stored.remove(member);
            }
            if stored.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.add_counter(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64, CacheError> {
        self.add_counter(key, -1).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.add_counter(key, delta).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.add_counter(key, -delta).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_after_set_round_trips() {
        let remote = MemoryRemote::new();
        remote
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(remote.get("k1").await.expect("get"), Bytes::from_static(b"v1"));
        assert!(matches!(remote.get("absent").await, Err(CacheError::Nil)));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_nil() {
        let remote = MemoryRemote::new();
        remote
            .set("k1", Bytes::from_static(b"v1"), Duration::from_millis(1))
            .await
            .expect("set");

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(matches!(remote.get("k1").await, Err(CacheError::Nil)));
        assert!(!remote.exists("k1").await.expect("exists"));
    }

    #[tokio::test]
    async fn delete_covers_all_structures() {
        let remote = MemoryRemote::new();
        remote
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await
            .expect("set");
        remote
            .hset("k1", "f", Bytes::from_static(b"hv"))
            .await
            .expect("hset");
        remote
            .sadd("k1", &["m".to_string()])
            .await
            .expect("sadd");

        remote.delete(&["k1".to_string()]).await.expect("delete");

        assert!(matches!(remote.get("k1").await, Err(CacheError::Nil)));
        assert!(matches!(remote.hget("k1", "f").await, Err(CacheError::Nil)));
        assert!(remote.smembers("k1").await.expect("smembers").is_empty());
    }

    #[tokio::test]
    async fn mget_aligns_with_keys() {
        let remote = MemoryRemote::new();
        remote
            .mset(&[
                ("a".to_string(), Bytes::from_static(b"1"), Duration::from_secs(60)),
                ("c".to_string(), Bytes::from_static(b"3"), Duration::from_secs(60)),
            ])
            .await
            .expect("mset");

        let values = remote
            .mget(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .expect("mget");

        assert_eq!(values[0], Some(Bytes::from_static(b"1")));
        assert_eq!(values[1], None);
        assert_eq!(values[2], Some(Bytes::from_static(b"3")));
    }

    #[tokio::test]
    async fn counters_increment_and_decrement() {
        let remote = MemoryRemote::new();

        assert_eq!(remote.incr("hits").await.expect("incr"), 1);
        assert_eq!(remote.incr_by("hits", 5).await.expect("incr_by"), 6);
        assert_eq!(remote.decr("hits").await.expect("decr"), 5);
        assert_eq!(remote.decr_by("hits", 2).await.expect("decr_by"), 3);
    }

    #[tokio::test]
    async fn counter_rejects_non_numeric_value() {
        let remote = MemoryRemote::new();
        remote
            .set("k1", Bytes::from_static(b"text"), Duration::from_secs(60))
            .await
            .expect("set");

        assert!(matches!(
            remote.incr("k1").await,
            Err(CacheError::Driver { .. })
        ));
    }

    #[tokio::test]
    async fn ttl_and_expire_behave_like_redis() {
        let remote = MemoryRemote::new();
        remote
            .set("k1", Bytes::from_static(b"v1"), Duration::from_secs(60))
            .await
            .expect("set");

        let remaining = remote.ttl("k1").await.expect("ttl").expect("has expiry");
        assert!(remaining <= Duration::from_secs(60));

        remote
            .expire("k1", Duration::from_secs(120))
            .await
            .expect("expire");
        let remaining = remote.ttl("k1").await.expect("ttl").expect("has expiry");
        assert!(remaining > Duration::from_secs(60));

        assert!(matches!(
            remote.ttl("absent").await,
            Err(CacheError::KeyNotFound { .. })
        ));
        assert!(matches!(
            remote.expire("absent", Duration::from_secs(1)).await,
            Err(CacheError::KeyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn hash_and_set_operations() {
        let remote = MemoryRemote::new();

        remote
            .hset("h", "f1", Bytes::from_static(b"v1"))
            .await
            .expect("hset");
        remote
            .hset("h", "f2", Bytes::from_static(b"v2"))
            .await
            .expect("hset");

        assert_eq!(remote.hget("h", "f1").await.expect("hget"), Bytes::from_static(b"v1"));
        assert_eq!(remote.hgetall("h").await.expect("hgetall").len(), 2);

        remote.hdel("h", &["f1".to_string()]).await.expect("hdel");
        assert!(matches!(remote.hget("h", "f1").await, Err(CacheError::Nil)));

        remote
            .sadd("s", &["a".to_string(), "b".to_string()])
            .await
            .expect("sadd");
        let mut members = remote.smembers("s").await.expect("smembers");
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        remote.srem("s", &["a".to_string()]).await.expect("srem");
        assert_eq!(remote.smembers("s").await.expect("smembers"), vec!["b".to_string()]);
    }
}
