//! Two-level cache read/write path.
//!
//! [`CacheStrategy`] fronts a [`RemoteCache`] with an optional in-process
//! mirror. Every key is governed by the policy its prefix resolves to: the
//! policy picks the codec, compression, and the jittered remote TTL, while
//! the mirror's lifetime is the policy TTL capped at the configured local
//! ceiling. `get_or_load` adds per-key single-flight coalescing so a miss
//! storm reaches the backing store once.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::warn;

use crate::codec::{Compressor, NoopCompressor};
use crate::config::CacheSettings;
use crate::error::CacheError;
use crate::local::LocalStore;
use crate::policy::{CachePolicy, PolicyRegistry};
use crate::remote::RemoteCache;
use crate::telemetry;

/// Policy-driven two-level cache engine.
pub struct CacheStrategy {
    remote: Arc<dyn RemoteCache>,
    registry: Arc<PolicyRegistry>,
    local: Option<LocalStore>,
    local_ttl_cap: Duration,
    compressor: Arc<dyn Compressor>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl CacheStrategy {
    pub fn new(
        remote: Arc<dyn RemoteCache>,
        registry: Arc<PolicyRegistry>,
        settings: &CacheSettings,
    ) -> Self {
        telemetry::describe_metrics();
        let local = settings
            .enable_local
            .then(|| LocalStore::new(settings.local_capacity_non_zero()));
        Self {
            remote,
            registry,
            local,
            local_ttl_cap: settings.local_ttl_cap(),
            compressor: Arc::new(NoopCompressor),
            inflight: DashMap::new(),
        }
    }

    /// Replace the payload compressor used by policies that opt in.
    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// The registry governing this engine's keys.
    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Fetch and decode a value. Absence is `Err(CacheError::Nil)`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
        let policy = self.registry.resolve(key);

        if let Some(local) = &self.local {
            if let Some(payload) = local.get(key) {
                counter!(telemetry::LOCAL_HIT_TOTAL).increment(1);
                return self.decode(key, payload, &policy);
            }
            counter!(telemetry::LOCAL_MISS_TOTAL).increment(1);
        }

        let payload = match self.remote.get(key).await {
            Ok(payload) => {
                counter!(telemetry::REMOTE_HIT_TOTAL).increment(1);
                payload
            }
            Err(err) => {
                if err.is_miss() {
                    counter!(telemetry::REMOTE_MISS_TOTAL).increment(1);
                }
                return Err(err);
            }
        };

        if let Some(local) = &self.local {
            local.insert(key, payload.clone(), self.local_ttl(&policy));
        }
        self.decode(key, payload, &policy)
    }

    /// Encode and write a value to both levels with the policy's TTL.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let policy = self.registry.resolve(key);
        let payload = self.encode(key, value, &policy)?;

        self.remote
            .set(key, payload.clone(), policy.effective_ttl())
            .await?;

        if let Some(local) = &self.local {
            local.insert(key, payload, self.local_ttl(&policy));
        }
        Ok(())
    }

    /// Remove keys from the remote store and the local mirror.
    pub async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.remote.delete(keys).await?;
        if let Some(local) = &self.local {
            for key in keys {
                local.remove(key);
            }
        }
        Ok(())
    }

    /// Fetch, or load from the backing store and cache.
    ///
    /// Concurrent callers for the same key are coalesced: one runs the
    /// loader, the rest wait and re-read the cache. A failed cache write is
    /// logged and swallowed, the loaded value is still returned. Loader
    /// errors propagate unchanged.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.get(key).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_miss() => {
                warn!(
                    target_module = "inkwave_cache::strategy",
                    op = "get_or_load",
                    key,
                    error = %err,
                    "cache read failed, falling through to loader"
                );
            }
            Err(_) => {}
        }

        let gate = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _held = gate.lock().await;

        // A coalesced waiter usually finds the leader's write here.
        match self.get(key).await {
            Ok(value) => {
                drop(_held);
                self.inflight.remove(key);
                return Ok(value);
            }
            Err(err) if !err.is_miss() => {
                warn!(
                    target_module = "inkwave_cache::strategy",
                    op = "get_or_load",
                    key,
                    error = %err,
                    "cache re-check failed, loading from source"
                );
            }
            Err(_) => {}
        }

        counter!(telemetry::LOAD_TOTAL).increment(1);
        let value = match loader().await {
            Ok(value) => value,
            Err(err) => {
                drop(_held);
                self.inflight.remove(key);
                return Err(err);
            }
        };

        if let Err(err) = self.set(key, &value).await {
            warn!(
                target_module = "inkwave_cache::strategy",
                op = "get_or_load",
                key,
                error = %err,
                "failed to cache loaded value"
            );
        }

        drop(_held);
        self.inflight.remove(key);
        Ok(value)
    }

    /// Batched fetch; absent and undecodable keys are omitted.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        keys: &[String],
    ) -> Result<Vec<(String, T)>, CacheError> {
        let mut found = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();

        for key in keys {
            let payload = self.local.as_ref().and_then(|local| local.get(key));
            match payload {
                Some(payload) => {
                    counter!(telemetry::LOCAL_HIT_TOTAL).increment(1);
                    found.push((key.clone(), payload));
                }
                None => missing.push(key.clone()),
            }
        }

        if !missing.is_empty() {
            let payloads = self.remote.mget(&missing).await?;
            for (key, payload) in missing.into_iter().zip(payloads) {
                let Some(payload) = payload else { continue };
                counter!(telemetry::REMOTE_HIT_TOTAL).increment(1);
                if let Some(local) = &self.local {
                    let policy = self.registry.resolve(&key);
                    local.insert(&key, payload.clone(), self.local_ttl(&policy));
                }
                found.push((key, payload));
            }
        }

        let mut values = Vec::with_capacity(found.len());
        for (key, payload) in found {
            let policy = self.registry.resolve(&key);
            match self.decode::<T>(&key, payload, &policy) {
                Ok(value) => values.push((key, value)),
                Err(err) => {
                    warn!(
                        target_module = "inkwave_cache::strategy",
                        op = "mget",
                        key,
                        error = %err,
                        "dropping undecodable cached value"
                    );
                }
            }
        }
        Ok(values)
    }

    /// Batched write; each key gets its own policy TTL, one remote round trip.
    pub async fn mset<T: Serialize>(&self, items: &[(String, T)]) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut encoded = Vec::with_capacity(items.len());
        for (key, value) in items {
            let policy = self.registry.resolve(key);
            let payload = self.encode(key, value, &policy)?;
            encoded.push((key.clone(), payload, policy));
        }

        let batch: Vec<(String, Bytes, Duration)> = encoded
            .iter()
            .map(|(key, payload, policy)| (key.clone(), payload.clone(), policy.effective_ttl()))
            .collect();
        self.remote.mset(&batch).await?;

        if let Some(local) = &self.local {
            for (key, payload, policy) in encoded {
                local.insert(&key, payload, self.local_ttl(&policy));
            }
        }
        Ok(())
    }

    /// Drop every entry in the local mirror. The remote store is untouched.
    pub fn clear_local(&self) {
        if let Some(local) = &self.local {
            local.clear();
        }
    }

    fn local_ttl(&self, policy: &CachePolicy) -> Duration {
        policy.base_ttl.min(self.local_ttl_cap)
    }

    fn encode<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        policy: &CachePolicy,
    ) -> Result<Bytes, CacheError> {
        let raw = match &policy.codec {
            Some(codec) => {
                let json = serde_json::to_value(value).map_err(|err| CacheError::Encode {
                    key: key.to_string(),
                    detail: err.to_string(),
                })?;
                codec.encode(&json).map_err(|err| CacheError::Encode {
                    key: key.to_string(),
                    detail: err.to_string(),
                })?
            }
            None => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|err| CacheError::Encode {
                    key: key.to_string(),
                    detail: err.to_string(),
                })?,
        };

        if policy.compress {
            self.compressor
                .compress(raw)
                .map_err(|err| CacheError::Encode {
                    key: key.to_string(),
                    detail: err.to_string(),
                })
        } else {
            Ok(raw)
        }
    }

    fn decode<T: DeserializeOwned>(
        &self,
        key: &str,
        payload: Bytes,
        policy: &CachePolicy,
    ) -> Result<T, CacheError> {
        let raw = if policy.compress {
            self.compressor
                .decompress(payload)
                .map_err(|err| CacheError::Decode {
                    key: key.to_string(),
                    detail: err.to_string(),
                })?
        } else {
            payload
        };

        match &policy.codec {
            Some(codec) => {
                let json = codec.decode(&raw).map_err(|err| CacheError::Decode {
                    key: key.to_string(),
                    detail: err.to_string(),
                })?;
                serde_json::from_value(json).map_err(|err| CacheError::Decode {
                    key: key.to_string(),
                    detail: err.to_string(),
                })
            }
            None => serde_json::from_slice(&raw).map_err(|err| CacheError::Decode {
                key: key.to_string(),
                detail: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde::Deserialize;

    use super::*;
    use crate::error::SourceError;
    use crate::memory::MemoryRemote;
    use crate::policy::{CachePolicy, Strategy};
    use crate::testing::FlakyRemote;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct BookCard {
        id: String,
        title: String,
        rating: f64,
    }

    fn sample_book() -> BookCard {
        BookCard {
            id: "b1".to_string(),
            title: "The Tide Atlas".to_string(),
            rating: 4.5,
        }
    }

    fn engine(remote: Arc<dyn RemoteCache>) -> CacheStrategy {
        CacheStrategy::new(
            remote,
            Arc::new(PolicyRegistry::with_builtin()),
            &CacheSettings::default(),
        )
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let strategy = engine(Arc::new(MemoryRemote::new()));
        let book = sample_book();

        strategy.set("book:detail:b1", &book).await.expect("set");
        let cached: BookCard = strategy.get("book:detail:b1").await.expect("get");

        assert_eq!(cached, book);
    }

    #[tokio::test]
    async fn miss_surfaces_as_nil() {
        let strategy = engine(Arc::new(MemoryRemote::new()));
        let result = strategy.get::<BookCard>("book:detail:absent").await;
        assert!(matches!(result, Err(CacheError::Nil)));
    }

    #[tokio::test]
    async fn local_mirror_serves_after_remote_eviction() {
        let remote = Arc::new(MemoryRemote::new());
        let strategy = engine(remote.clone());
        let book = sample_book();

        strategy.set("book:detail:b1", &book).await.expect("set");
        remote
            .delete(&["book:detail:b1".to_string()])
            .await
            .expect("remote delete");

        let cached: BookCard = strategy.get("book:detail:b1").await.expect("local hit");
        assert_eq!(cached, book);
    }

    #[tokio::test]
    async fn disabled_local_always_reads_remote() {
        let remote = Arc::new(MemoryRemote::new());
        let settings = CacheSettings {
            enable_local: false,
            ..Default::default()
        };
        let strategy = CacheStrategy::new(
            remote.clone(),
            Arc::new(PolicyRegistry::with_builtin()),
            &settings,
        );

        strategy.set("book:detail:b1", &sample_book()).await.expect("set");
        remote
            .delete(&["book:detail:b1".to_string()])
            .await
            .expect("remote delete");

        assert!(matches!(
            strategy.get::<BookCard>("book:detail:b1").await,
            Err(CacheError::Nil)
        ));
    }

    #[tokio::test]
    async fn delete_evicts_both_levels() {
        let strategy = engine(Arc::new(MemoryRemote::new()));
        strategy.set("book:detail:b1", &sample_book()).await.expect("set");

        strategy
            .delete(&["book:detail:b1".to_string()])
            .await
            .expect("delete");

        assert!(matches!(
            strategy.get::<BookCard>("book:detail:b1").await,
            Err(CacheError::Nil)
        ));
    }

    #[tokio::test]
    async fn get_or_load_caches_loaded_value() {
        let strategy = Arc::new(engine(Arc::new(MemoryRemote::new())));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let book: BookCard = strategy
                .get_or_load("book:detail:b1", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, SourceError>(sample_book())
                })
                .await
                .expect("load");
            assert_eq!(book, sample_book());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "later calls are cache hits");
    }

    #[tokio::test]
    async fn get_or_load_propagates_loader_error() {
        let strategy = engine(Arc::new(MemoryRemote::new()));

        let result = strategy
            .get_or_load::<BookCard, _, _, _>("book:detail:b1", || async {
                Err(SourceError::Backend("source down".to_string()))
            })
            .await;

        assert!(matches!(result, Err(SourceError::Backend(_))));
    }

    #[tokio::test]
    async fn concurrent_misses_run_the_loader_once() {
        let strategy = Arc::new(engine(Arc::new(MemoryRemote::new())));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let strategy = strategy.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                strategy
                    .get_or_load("book:detail:b1", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, SourceError>(sample_book())
                    })
                    .await
                    .expect("load")
            }));
        }

        for task in tasks {
            assert_eq!(task.await.expect("join"), sample_book());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_or_load_survives_failing_cache_write() {
        let remote = Arc::new(FlakyRemote::new());
        remote.fail_writes(true);
        let settings = CacheSettings {
            enable_local: false,
            ..Default::default()
        };
        let strategy = CacheStrategy::new(
            remote,
            Arc::new(PolicyRegistry::with_builtin()),
            &settings,
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let loader_calls = calls.clone();
        let book: BookCard = strategy
            .get_or_load("book:detail:b1", move || async move {
                loader_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SourceError>(sample_book())
            })
            .await
            .expect("value survives set failure");

        assert_eq!(book, sample_book());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mset_then_mget_returns_only_found_keys() {
        let strategy = engine(Arc::new(MemoryRemote::new()));

        let items = vec![
            ("book:detail:b1".to_string(), sample_book()),
            (
                "book:detail:b2".to_string(),
                BookCard {
                    id: "b2".to_string(),
                    title: "Inkwell Harbor".to_string(),
                    rating: 3.9,
                },
            ),
        ];
        strategy.mset(&items).await.expect("mset");

        let keys = vec![
            "book:detail:b1".to_string(),
            "book:detail:absent".to_string(),
            "book:detail:b2".to_string(),
        ];
        let found: Vec<(String, BookCard)> = strategy.mget(&keys).await.expect("mget");

        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|(key, _)| key == "book:detail:b1"));
        assert!(found.iter().any(|(key, _)| key == "book:detail:b2"));
    }

    #[tokio::test]
    async fn compressed_policy_round_trips_through_compressor() {
        let remote: Arc<dyn RemoteCache> = Arc::new(MemoryRemote::new());
        let registry = PolicyRegistry::new(CachePolicy::new(
            Duration::from_secs(60),
            Duration::ZERO,
            Strategy::CacheAside,
        ));
        registry
            .register(
                "chapter:content",
                CachePolicy::new(Duration::from_secs(60), Duration::ZERO, Strategy::CacheAside)
                    .with_compression(),
            )
            .expect("register");
        let strategy = CacheStrategy::new(
            remote,
            Arc::new(registry),
            &CacheSettings::default(),
        );

        let body = "chapter text".to_string();
        strategy.set("chapter:content:c1", &body).await.expect("set");
        let cached: String = strategy.get("chapter:content:c1").await.expect("get");
        assert_eq!(cached, body);
    }
}
