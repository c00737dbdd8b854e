//! Error taxonomy for the cache layer.
//!
//! Remote driver errors are normalized into a small set of kinds so callers
//! can distinguish absence (`Nil`, `KeyNotFound`) from connectivity failures
//! (`ConnectionFailed`, `Timeout`) without depending on driver types.

use thiserror::Error;

/// Errors surfaced across the cache boundary.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key holds no value. Absence, not failure.
    #[error("cache key not present")]
    Nil,
    /// The key does not exist for an operation that requires it (TTL, expire).
    #[error("cache key not found: `{key}`")]
    KeyNotFound { key: String },
    /// The remote store is unreachable.
    #[error("remote cache connection failed during {op}: {detail}")]
    ConnectionFailed { op: &'static str, detail: String },
    /// The operation exceeded its deadline.
    #[error("remote cache operation {op} timed out")]
    Timeout { op: &'static str },
    /// A value could not be serialized for caching.
    #[error("failed to encode cache value for `{key}`: {detail}")]
    Encode { key: String, detail: String },
    /// A cached payload could not be decoded.
    #[error("failed to decode cache value for `{key}`: {detail}")]
    Decode { key: String, detail: String },
    /// Any other driver error, passed through with context.
    #[error("remote cache driver error during {op}: {detail}")]
    Driver { op: &'static str, detail: String },
}

impl CacheError {
    /// True when the error means "nothing cached", not "the cache is broken".
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Nil | Self::KeyNotFound { .. })
    }

    /// Normalize a redis driver error into the cache taxonomy.
    pub(crate) fn from_redis(op: &'static str, err: redis::RedisError) -> Self {
        if err.is_timeout() {
            Self::Timeout { op }
        } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            Self::ConnectionFailed {
                op,
                detail: err.to_string(),
            }
        } else {
            Self::Driver {
                op,
                detail: err.to_string(),
            }
        }
    }
}

/// Errors from source-of-truth collaborators (document-store repositories).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("record not found")]
    NotFound,
    #[error("backing store error: {0}")]
    Backend(String),
}

/// Errors from the policy registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// Registering `new` would make lookup order-dependent: one of the two
    /// prefixes is a literal prefix of the other.
    #[error("cache policy prefix `{new}` overlaps registered prefix `{existing}`")]
    Overlap { new: String, existing: String },
}

/// Errors from the rating aggregation service.
#[derive(Debug, Error)]
pub enum RatingError {
    /// The target has no rating data (including negative-cached absence).
    #[error("rating target not found")]
    NotFound,
    #[error("unsupported rating target type: `{0}`")]
    UnsupportedTarget(String),
    #[error("rating source error: {0}")]
    Source(String),
    #[error("rating cache error: {0}")]
    Cache(#[from] CacheError),
}

impl RatingError {
    /// Fold a collaborator error into the rating taxonomy, keeping absence
    /// distinguishable from backend failure.
    pub(crate) fn from_source(err: SourceError) -> Self {
        match err {
            SourceError::NotFound => Self::NotFound,
            SourceError::Backend(detail) => Self::Source(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_kinds_are_misses() {
        assert!(CacheError::Nil.is_miss());
        assert!(
            CacheError::KeyNotFound {
                key: "k".to_string()
            }
            .is_miss()
        );
        assert!(
            !CacheError::Timeout { op: "get" }.is_miss(),
            "timeouts are failures, not misses"
        );
    }

    #[test]
    fn source_not_found_maps_to_rating_not_found() {
        assert!(matches!(
            RatingError::from_source(SourceError::NotFound),
            RatingError::NotFound
        ));
        assert!(matches!(
            RatingError::from_source(SourceError::Backend("down".to_string())),
            RatingError::Source(_)
        ));
    }
}
