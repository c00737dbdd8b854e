//! Cache-aside rating aggregation.
//!
//! Ratings live on comments and reviews in the source-of-truth store; this
//! service aggregates them into [`RatingStats`] and caches the result under
//! `rating:stats:{type}:{id}`. Two protections apply on the cache path:
//! a short-lived `NOT_FOUND` marker is installed when aggregation finds
//! nothing (so absent targets cannot hammer the store), and successful
//! entries get a jittered TTL (so popular targets do not mass-expire).
//!
//! Built without a remote client, the service degrades to straight
//! aggregation and invalidation becomes a no-op.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::{RatingError, SourceError};
use crate::policy::jittered_ttl;
use crate::remote::RemoteCache;

const SOURCE: &str = "inkwave_cache::rating";

/// Sentinel cached in place of stats when aggregation found nothing.
const NOT_FOUND_MARKER: &[u8] = b"NOT_FOUND";
const NEGATIVE_TTL: Duration = Duration::from_secs(30);

const STATS_BASE_TTL: Duration = Duration::from_secs(5 * 60);
const STATS_JITTER: Duration = Duration::from_secs(60);

const USER_RATING_PAGE_SIZE: usize = 100;

/// Aggregated rating data for one target, as cached.
///
/// Field names are camelCase on the wire, matching the payloads already in
/// production caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    pub target_id: String,
    pub target_type: String,
    pub average_rating: f64,
    pub total_ratings: i64,
    /// Star value (1..=5) to count.
    pub distribution: BTreeMap<u8, i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A comment row, as far as rating aggregation cares.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub rating: u8,
}

/// A review row, as far as rating aggregation cares.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub id: String,
    pub user_id: String,
    pub book_id: String,
    pub rating: u8,
}

/// Pre-aggregated per-book rating figures from the source store.
#[derive(Debug, Clone, PartialEq)]
pub struct BookRatingSummary {
    pub average_rating: f64,
    pub total_ratings: i64,
    pub distribution: BTreeMap<u8, i64>,
}

/// Comment lookups on the source-of-truth store.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn comment_by_id(&self, id: &str) -> Result<CommentRecord, SourceError>;
    /// One page of a book's comments plus the total count. Pages are 1-based.
    async fn comments_by_book(
        &self,
        book_id: &str,
        page: usize,
        size: usize,
    ) -> Result<(Vec<CommentRecord>, usize), SourceError>;
    async fn book_rating_summary(&self, book_id: &str) -> Result<BookRatingSummary, SourceError>;
}

/// Review lookups on the source-of-truth store.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn review_by_id(&self, id: &str) -> Result<ReviewRecord, SourceError>;
}

/// Rating aggregation with a cache-aside remote cache in front.
pub struct RatingService {
    remote: Option<Arc<dyn RemoteCache>>,
    comments: Arc<dyn CommentStore>,
    reviews: Arc<dyn ReviewStore>,
}

fn stats_key(target_type: &str, target_id: &str) -> String {
    format!("rating:stats:{target_type}:{target_id}")
}

fn one_sample(target_type: &str, target_id: &str, rating: u8) -> RatingStats {
    let mut distribution = BTreeMap::new();
    distribution.insert(rating, 1);
    RatingStats {
        target_id: target_id.to_string(),
        target_type: target_type.to_string(),
        average_rating: f64::from(rating),
        total_ratings: 1,
        distribution,
        updated_at: OffsetDateTime::now_utc(),
    }
}

impl RatingService {
    /// `remote: None` disables caching entirely.
    pub fn new(
        remote: Option<Arc<dyn RemoteCache>>,
        comments: Arc<dyn CommentStore>,
        reviews: Arc<dyn ReviewStore>,
    ) -> Self {
        Self {
            remote,
            comments,
            reviews,
        }
    }

    /// Cached rating stats for a target, aggregating on miss.
    ///
    /// A cached `NOT_FOUND` marker short-circuits to `Err(NotFound)` without
    /// touching the source store. An undecodable cached payload is discarded
    /// and re-aggregated, not surfaced.
    pub async fn get_rating_stats(
        &self,
        target_type: &str,
        target_id: &str,
    ) -> Result<RatingStats, RatingError> {
        let Some(remote) = &self.remote else {
            return self.aggregate_ratings(target_type, target_id).await;
        };
        let key = stats_key(target_type, target_id);

        match remote.get(&key).await {
            Ok(payload) => {
                if payload.as_ref() == NOT_FOUND_MARKER {
                    return Err(RatingError::NotFound);
                }
                match serde_json::from_slice::<RatingStats>(&payload) {
                    Ok(stats) => return Ok(stats),
                    Err(err) => {
                        warn!(
                            target_module = SOURCE,
                            op = "get_rating_stats",
                            key,
                            error = %err,
                            "discarding undecodable cached stats"
                        );
                    }
                }
            }
            Err(err) if err.is_miss() => {}
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    op = "get_rating_stats",
                    key,
                    error = %err,
                    "rating cache read failed, aggregating from source"
                );
            }
        }

        let stats = match self.aggregate_ratings(target_type, target_id).await {
            Ok(stats) => stats,
            Err(err) => {
                if let Err(write_err) = remote
                    .set(&key, Bytes::from_static(NOT_FOUND_MARKER), NEGATIVE_TTL)
                    .await
                {
                    warn!(
                        target_module = SOURCE,
                        op = "get_rating_stats",
                        key,
                        error = %write_err,
                        "failed to install negative cache marker"
                    );
                }
                return Err(err);
            }
        };

        match serde_json::to_vec(&stats) {
            Ok(payload) => {
                let ttl = jittered_ttl(STATS_BASE_TTL, STATS_JITTER);
                if let Err(err) = remote.set(&key, Bytes::from(payload), ttl).await {
                    warn!(
                        target_module = SOURCE,
                        op = "get_rating_stats",
                        key,
                        error = %err,
                        "failed to cache aggregated stats"
                    );
                } else {
                    debug!(
                        target_module = SOURCE,
                        op = "get_rating_stats",
                        key,
                        "cached aggregated stats"
                    );
                }
            }
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    op = "get_rating_stats",
                    key,
                    error = %err,
                    "failed to serialize aggregated stats"
                );
            }
        }

        Ok(stats)
    }

    /// Aggregate rating stats straight from the source store.
    pub async fn aggregate_ratings(
        &self,
        target_type: &str,
        target_id: &str,
    ) -> Result<RatingStats, RatingError> {
        match target_type {
            "comment" => {
                let comment = self
                    .comments
                    .comment_by_id(target_id)
                    .await
                    .map_err(RatingError::from_source)?;
                Ok(one_sample(target_type, target_id, comment.rating))
            }
            "review" => {
                let review = self
                    .reviews
                    .review_by_id(target_id)
                    .await
                    .map_err(RatingError::from_source)?;
                Ok(one_sample(target_type, target_id, review.rating))
            }
            "book" => {
                let summary = self
                    .comments
                    .book_rating_summary(target_id)
                    .await
                    .map_err(RatingError::from_source)?;
                Ok(RatingStats {
                    target_id: target_id.to_string(),
                    target_type: target_type.to_string(),
                    average_rating: summary.average_rating,
                    total_ratings: summary.total_ratings,
                    distribution: summary.distribution,
                    updated_at: OffsetDateTime::now_utc(),
                })
            }
            other => Err(RatingError::UnsupportedTarget(other.to_string())),
        }
    }

    /// The rating a user gave a target, or 0 if they have not rated it.
    pub async fn get_user_rating(
        &self,
        user_id: &str,
        target_type: &str,
        target_id: &str,
    ) -> Result<u8, RatingError> {
        match target_type {
            "book" => {
                let mut page = 1;
                loop {
                    let (comments, total) = match self
                        .comments
                        .comments_by_book(target_id, page, USER_RATING_PAGE_SIZE)
                        .await
                    {
                        Ok(result) => result,
                        Err(SourceError::NotFound) => return Ok(0),
                        Err(err) => return Err(RatingError::from_source(err)),
                    };

                    if let Some(comment) = comments
                        .iter()
                        .find(|comment| comment.user_id == user_id && comment.rating > 0)
                    {
                        return Ok(comment.rating);
                    }

                    if comments.is_empty() || page * USER_RATING_PAGE_SIZE >= total {
                        return Ok(0);
                    }
                    page += 1;
                }
            }
            "review" => match self.reviews.review_by_id(target_id).await {
                Ok(review) if review.user_id == user_id => Ok(review.rating),
                Ok(_) => Ok(0),
                Err(SourceError::NotFound) => Ok(0),
                Err(err) => Err(RatingError::from_source(err)),
            },
            "comment" => match self.comments.comment_by_id(target_id).await {
                Ok(comment) if comment.user_id == user_id => Ok(comment.rating),
                Ok(_) => Ok(0),
                Err(SourceError::NotFound) => Ok(0),
                Err(err) => Err(RatingError::from_source(err)),
            },
            other => Err(RatingError::UnsupportedTarget(other.to_string())),
        }
    }

    /// Drop the cached stats for a target. No-op success without a remote
    /// client.
    pub async fn invalidate_cache(
        &self,
        target_type: &str,
        target_id: &str,
    ) -> Result<(), RatingError> {
        let Some(remote) = &self.remote else {
            return Ok(());
        };
        let key = stats_key(target_type, target_id);
        remote.delete(std::slice::from_ref(&key)).await?;
        debug!(
            target_module = SOURCE,
            op = "invalidate_cache",
            key,
            "invalidated cached stats"
        );
        Ok(())
    }
}
