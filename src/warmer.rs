//! Startup cache warm-up.
//!
//! Pre-populates the remote store with the entities most likely to be
//! requested right after boot. Strictly best-effort: a source outage or a
//! failed write is logged and skipped, never surfaced, so a cold or
//! half-warm cache can never block startup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SourceError;
use crate::remote::RemoteCache;
use crate::telemetry;

// Warm-up writes bypass the policy registry; TTLs are fixed per entity type.
const BOOK_WARM_TTL: Duration = Duration::from_secs(60 * 60);
const USER_WARM_TTL: Duration = Duration::from_secs(30 * 60);

/// Book row as warmed into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotBookRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub average_rating: f64,
    pub read_count: i64,
}

/// User row as warmed into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveUserRecord {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub level: u32,
}

/// Ranked hot-book lookup on the source-of-truth store.
#[async_trait]
pub trait BookSource: Send + Sync {
    async fn hot_books(&self, limit: usize, offset: usize) -> Result<Vec<HotBookRecord>, SourceError>;
}

/// Ranked active-user lookup on the source-of-truth store.
#[async_trait]
pub trait UserSource: Send + Sync {
    async fn active_users(&self, limit: usize) -> Result<Vec<ActiveUserRecord>, SourceError>;
}

/// Best-effort warmer over the remote cache.
pub struct CacheWarmer {
    remote: Arc<dyn RemoteCache>,
    books: Arc<dyn BookSource>,
    users: Arc<dyn UserSource>,
    hot_book_limit: usize,
    active_user_limit: usize,
}

impl CacheWarmer {
    pub fn new(
        remote: Arc<dyn RemoteCache>,
        books: Arc<dyn BookSource>,
        users: Arc<dyn UserSource>,
        hot_book_limit: usize,
        active_user_limit: usize,
    ) -> Self {
        telemetry::describe_metrics();
        Self {
            remote,
            books,
            users,
            hot_book_limit,
            active_user_limit,
        }
    }

    /// Warm hot books and active users. Never fails.
    pub async fn warm_up(&self) {
        let books = self.warm_books().await;
        let users = self.warm_users().await;
        info!(
            target_module = "inkwave_cache::warmer",
            op = "warm_up",
            books,
            users,
            "cache warm-up finished"
        );
    }

    async fn warm_books(&self) -> usize {
        let records = match self.books.hot_books(self.hot_book_limit, 0).await {
            Ok(records) => records,
            Err(err) => {
                counter!(telemetry::WARM_FAILED_TOTAL).increment(1);
                warn!(
                    target_module = "inkwave_cache::warmer",
                    op = "warm_books",
                    error = %err,
                    "hot book lookup failed, skipping"
                );
                return 0;
            }
        };

        let mut warmed = 0;
        for record in records {
            let key = format!("book:detail:{}", record.id);
            if self.write(&key, &record, BOOK_WARM_TTL).await {
                warmed += 1;
            }
        }
        warmed
    }

    async fn warm_users(&self) -> usize {
        let records = match self.users.active_users(self.active_user_limit).await {
            Ok(records) => records,
            Err(err) => {
                counter!(telemetry::WARM_FAILED_TOTAL).increment(1);
                warn!(
                    target_module = "inkwave_cache::warmer",
                    op = "warm_users",
                    error = %err,
                    "active user lookup failed, skipping"
                );
                return 0;
            }
        };

        let mut warmed = 0;
        for record in records {
            let key = format!("user:info:{}", record.id);
            if self.write(&key, &record, USER_WARM_TTL).await {
                warmed += 1;
            }
        }
        warmed
    }

    async fn write<T: Serialize>(&self, key: &str, record: &T, ttl: Duration) -> bool {
        let payload = match serde_json::to_vec(record) {
            Ok(payload) => payload,
            Err(err) => {
                counter!(telemetry::WARM_FAILED_TOTAL).increment(1);
                warn!(
                    target_module = "inkwave_cache::warmer",
                    op = "warm_write",
                    key,
                    error = %err,
                    "failed to serialize warm record, skipping"
                );
                return false;
            }
        };

        match self.remote.set(key, payload.into(), ttl).await {
            Ok(()) => {
                counter!(telemetry::WARMED_TOTAL).increment(1);
                true
            }
            Err(err) => {
                counter!(telemetry::WARM_FAILED_TOTAL).increment(1);
                warn!(
                    target_module = "inkwave_cache::warmer",
                    op = "warm_write",
                    key,
                    error = %err,
                    "failed to warm key, skipping"
                );
                false
            }
        }
    }
}
