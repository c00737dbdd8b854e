//! Shared test doubles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CacheError;
use crate::memory::MemoryRemote;
use crate::remote::RemoteCache;

/// A [`MemoryRemote`] wrapper with switchable failure injection and call
/// counters for the operations the cache path exercises.
#[derive(Default)]
pub struct FlakyRemote {
    inner: MemoryRemote,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FlakyRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check_read(&self, op: &'static str) -> Result<(), CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(CacheError::ConnectionFailed {
                op,
                detail: "injected read failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn check_write(&self, op: &'static str) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(CacheError::ConnectionFailed {
                op,
                detail: "injected write failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteCache for FlakyRemote {
    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_read("get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write("set")?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write("delete")?;
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.check_read("exists")?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check_write("expire")?;
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.check_read("ttl")?;
        self.inner.ttl(key).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError> {
        self.check_read("mget")?;
        self.inner.mget(keys).await
    }

    async fn mset(&self, items: &[(String, Bytes, Duration)]) -> Result<(), CacheError> {
        self.check_write("mset")?;
        self.inner.mset(items).await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Bytes, CacheError> {
        self.check_read("hget")?;
        self.inner.hget(key, field).await
    }

    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<(), CacheError> {
        self.check_write("hset")?;
        self.inner.hset(key, field, value).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>, CacheError> {
        self.check_read("hgetall")?;
        self.inner.hgetall(key).await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<(), CacheError> {
        self.check_write("hdel")?;
        self.inner.hdel(key, fields).await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        self.check_write("sadd")?;
        self.inner.sadd(key, members).await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.check_read("smembers")?;
        self.inner.smembers(key).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        self.check_write("srem")?;
        self.inner.srem(key, members).await
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.check_write("incr")?;
        self.inner.incr(key).await
    }

    async fn decr(&self, key: &str) -> Result<i64, CacheError> {
        self.check_write("decr")?;
        self.inner.decr(key).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.check_write("incr_by")?;
        self.inner.incr_by(key, delta).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.check_write("decr_by")?;
        self.inner.decr_by(key, delta).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check_read("ping")?;
        self.inner.ping().await
    }
}
