//! Remote key-value store client.
//!
//! [`RemoteCache`] is the uniform operation surface the rest of the layer is
//! written against; [`RedisRemote`] implements it over a pooled redis
//! connection manager. Driver errors never cross this boundary; they are
//! normalized into [`CacheError`] kinds.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::time::timeout;
use tracing::info;

use crate::config::RemoteSettings;
use crate::error::CacheError;

/// Uniform operation surface over a remote key-value store.
///
/// Values are opaque bytes; TTLs are durations. Callers bound latency via
/// the implementation's configured deadline and may drop the future to
/// cancel.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Fetch a value. Absence is `Err(CacheError::Nil)`.
    async fn get(&self, key: &str) -> Result<Bytes, CacheError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Reset a key's TTL. `Err(KeyNotFound)` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;
    /// Remaining TTL; `Ok(None)` for keys without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Batched fetch; the result aligns with `keys`, absent keys are `None`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError>;
    /// Batched write, one round trip, each entry with its own TTL.
    async fn mset(&self, items: &[(String, Bytes, Duration)]) -> Result<(), CacheError>;

    /// Fetch a hash field. Absence is `Err(CacheError::Nil)`.
    async fn hget(&self, key: &str, field: &str) -> Result<Bytes, CacheError>;
    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<(), CacheError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>, CacheError>;
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<(), CacheError>;

    async fn sadd(&self, key: &str, members: &[String]) -> Result<(), CacheError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError>;
    async fn srem(&self, key: &str, members: &[String]) -> Result<(), CacheError>;

    async fn incr(&self, key: &str) -> Result<i64, CacheError>;
    async fn decr(&self, key: &str) -> Result<i64, CacheError>;
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError>;
    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Redis-backed [`RemoteCache`] over a multiplexed connection manager.
///
/// The manager handles pooling and reconnection; this type adds the
/// per-operation deadline and error normalization.
pub struct RedisRemote {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisRemote {
    /// Connect and verify reachability.
    ///
    /// Fails fast: construction pings the server within the configured
    /// connect timeout so a misconfigured endpoint surfaces at startup, not
    /// on the first request.
    pub async fn connect(settings: &RemoteSettings) -> Result<Self, CacheError> {
        let client = redis::Client::open(settings.url.as_str())
            .map_err(|err| CacheError::from_redis("connect", err))?;

        let conn = timeout(settings.connect_timeout(), ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout { op: "connect" })?
            .map_err(|err| CacheError::from_redis("connect", err))?;

        let remote = Self {
            conn,
            op_timeout: settings.op_timeout(),
        };

        let mut probe = remote.conn.clone();
        timeout(
            settings.connect_timeout(),
            redis::cmd("PING").query_async::<String>(&mut probe),
        )
        .await
        .map_err(|_| CacheError::Timeout { op: "ping" })?
        .map_err(|err| CacheError::from_redis("ping", err))?;

        info!(
            target_module = "inkwave_cache::remote",
            url = %settings.url,
            "remote cache connected"
        );

        Ok(remote)
    }

    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, CacheError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.conn.clone();
        match timeout(self.op_timeout, f(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(CacheError::from_redis(op, err)),
            Err(_) => Err(CacheError::Timeout { op }),
        }
    }
}

/// Redis SET EX rejects zero; clamp to the smallest expirable unit.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl RemoteCache for RedisRemote {
    async fn get(&self, key: &str) -> Result<Bytes, CacheError> {
        let value = self
            .run("get", |mut conn| async move {
                conn.get::<_, Option<Vec<u8>>>(key).await
            })
            .await?;
        value.map(Bytes::from).ok_or(CacheError::Nil)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.run("set", |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, value.as_ref(), ttl_secs(ttl))
                .await
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        self.run("delete", |mut conn| async move {
            conn.del::<_, ()>(keys).await
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.run("exists", |mut conn| async move {
            conn.exists::<_, bool>(key).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let applied = self
            .run("expire", |mut conn| async move {
                conn.expire::<_, bool>(key, ttl_secs(ttl) as i64).await
            })
            .await?;
        if applied {
            Ok(())
        } else {
            Err(CacheError::KeyNotFound {
                key: key.to_string(),
            })
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let remaining = self
            .run("ttl", |mut conn| async move {
                conn.ttl::<_, i64>(key).await
            })
            .await?;
        match remaining {
            -2 => Err(CacheError::KeyNotFound {
                key: key.to_string(),
            }),
            -1 => Ok(None),
            secs => Ok(Some(Duration::from_secs(secs.max(0) as u64))),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values = self
            .run("mget", |mut conn| async move {
                conn.mget::<_, Vec<Option<Vec<u8>>>>(keys).await
            })
            .await?;
        Ok(values
            .into_iter()
            .map(|value| value.map(Bytes::from))
            .collect())
    }

    async fn mset(&self, items: &[(String, Bytes, Duration)]) -> Result<(), CacheError> {
        if items.is_empty() {
            return Ok(());
        }
        // MSET carries no TTL, so batch SET EX commands through one pipeline.
        let items = items.to_vec();
        self.run("mset", |mut conn| async move {
            let mut pipe = redis::pipe();
            for (key, value, ttl) in &items {
                pipe.cmd("SET")
                    .arg(key)
                    .arg(value.as_ref())
                    .arg("EX")
                    .arg(ttl_secs(*ttl))
                    .ignore();
            }
            pipe.query_async::<()>(&mut conn).await
        })
        .await
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Bytes, CacheError> {
        let value = self
            .run("hget", |mut conn| async move {
                conn.hget::<_, _, Option<Vec<u8>>>(key, field).await
            })
            .await?;
        value.map(Bytes::from).ok_or(CacheError::Nil)
    }

    async fn hset(&self, key: &str, field: &str, value: Bytes) -> Result<(), CacheError> {
        self.run("hset", |mut conn| async move {
            conn.hset::<_, _, _, ()>(key, field, value.as_ref()).await
        })
        .await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Bytes>, CacheError> {
        let fields = self
            .run("hgetall", |mut conn| async move {
                conn.hgetall::<_, HashMap<String, Vec<u8>>>(key).await
            })
            .await?;
        Ok(fields
            .into_iter()
            .map(|(field, value)| (field, Bytes::from(value)))
            .collect())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> Result<(), CacheError> {
        if fields.is_empty() {
            return Ok(());
        }
        self.run("hdel", |mut conn| async move {
            conn.hdel::<_, _, ()>(key, fields).await
        })
        .await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        if members.is_empty() {
            return Ok(());
        }
        self.run("sadd", |mut conn| async move {
            conn.sadd::<_, _, ()>(key, members).await
        })
        .await
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.run("smembers", |mut conn| async move {
            conn.smembers::<_, Vec<String>>(key).await
        })
        .await
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<(), CacheError> {
        if members.is_empty() {
            return Ok(());
        }
        self.run("srem", |mut conn| async move {
            conn.srem::<_, _, ()>(key, members).await
        })
        .await
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        self.incr_by(key, 1).await
    }

    async fn decr(&self, key: &str) -> Result<i64, CacheError> {
        self.decr_by(key, 1).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.run("incr_by", |mut conn| async move {
            conn.incr::<_, _, i64>(key, delta).await
        })
        .await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        self.run("decr_by", |mut conn| async move {
            conn.decr::<_, _, i64>(key, delta).await
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.run("ping", |mut conn| async move {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await
        .map(|_| ())
    }
}
