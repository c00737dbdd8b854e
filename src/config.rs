//! Cache layer configuration.
//!
//! Settings arrive from the host application's configuration file; everything
//! here is deserializable with sensible defaults so a bare `[cache]` section
//! (or none at all) yields a working layer.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_REMOTE_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_OP_TIMEOUT_MS: u64 = 2000;
const DEFAULT_LOCAL_CAPACITY: usize = 4096;
const DEFAULT_LOCAL_TTL_CAP_SECS: u64 = 300;
const DEFAULT_HOT_BOOK_LIMIT: usize = 100;
const DEFAULT_ACTIVE_USER_LIMIT: usize = 50;

/// Connection settings for the remote key-value store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Connection URL, e.g. `redis://host:6379/0`.
    pub url: String,
    /// Budget for the construction-time connectivity check (ms).
    pub connect_timeout_ms: u64,
    /// Per-operation deadline (ms).
    pub op_timeout_ms: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_REMOTE_URL.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            op_timeout_ms: DEFAULT_OP_TIMEOUT_MS,
        }
    }
}

impl RemoteSettings {
    /// Connectivity-check budget as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Per-operation deadline as a `Duration`.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Settings for the two-level cache path and the warmer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Enable the in-process mirror in front of the remote store.
    pub enable_local: bool,
    /// Maximum entries in the local LRU mirror.
    pub local_capacity: usize,
    /// Upper bound on a local entry's lifetime (seconds). The mirror uses
    /// the key's policy TTL capped at this value.
    pub local_ttl_cap_secs: u64,
    /// Hot books fetched per warm-up run.
    pub hot_book_limit: usize,
    /// Active users fetched per warm-up run.
    pub active_user_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enable_local: true,
            local_capacity: DEFAULT_LOCAL_CAPACITY,
            local_ttl_cap_secs: DEFAULT_LOCAL_TTL_CAP_SECS,
            hot_book_limit: DEFAULT_HOT_BOOK_LIMIT,
            active_user_limit: DEFAULT_ACTIVE_USER_LIMIT,
        }
    }
}

impl CacheSettings {
    /// Returns the local capacity as `NonZeroUsize`, clamping to 1 if zero.
    pub fn local_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.local_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Local TTL cap as a `Duration`.
    pub fn local_ttl_cap(&self) -> Duration {
        Duration::from_secs(self.local_ttl_cap_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let remote = RemoteSettings::default();
        assert_eq!(remote.url, "redis://127.0.0.1:6379");
        assert_eq!(remote.connect_timeout(), Duration::from_secs(5));
        assert_eq!(remote.op_timeout(), Duration::from_secs(2));

        let cache = CacheSettings::default();
        assert!(cache.enable_local);
        assert_eq!(cache.local_capacity, 4096);
        assert_eq!(cache.local_ttl_cap(), Duration::from_secs(300));
        assert_eq!(cache.hot_book_limit, 100);
        assert_eq!(cache.active_user_limit, 50);
    }

    #[test]
    fn capacity_clamps_to_min() {
        let cache = CacheSettings {
            local_capacity: 0,
            ..Default::default()
        };
        assert_eq!(cache.local_capacity_non_zero().get(), 1);
    }

    #[test]
    fn partial_section_deserializes() {
        let cache: CacheSettings =
            serde_json::from_str(r#"{"local_capacity": 16}"#).expect("settings should parse");
        assert_eq!(cache.local_capacity, 16);
        assert!(cache.enable_local);
    }
}
