//! Cache policies and the prefix registry that selects them.
//!
//! A [`CachePolicy`] bundles the TTL, jitter window, strategy tag, and
//! serialization choices for a family of keys sharing a prefix. The
//! [`PolicyRegistry`] is an explicit, constructed-once object handed to the
//! strategy engine; lookup is longest-prefix-first and registration rejects
//! overlapping prefixes, so the policy governing any key is deterministic.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;

use crate::codec::Codec;
use crate::error::PolicyError;
use crate::lock::{rw_read, rw_write};

const SOURCE: &str = "inkwave_cache::policy";

// Default policy for keys with no registered prefix
const DEFAULT_BASE_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_JITTER: Duration = Duration::from_secs(60);

/// How writes propagate to the backing store.
///
/// Only `CacheAside` has a distinct code path today; the other tags are part
/// of the policy data model for callers that implement their own write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheAside,
    WriteThrough,
    WriteBehind,
}

/// Immutable per-prefix cache policy.
#[derive(Clone)]
pub struct CachePolicy {
    /// TTL before jitter.
    pub base_ttl: Duration,
    /// Width of the random expiry offset; see [`jittered_ttl`].
    pub jitter: Duration,
    pub strategy: Strategy,
    /// Ask the strategy engine to run payloads through its compressor.
    pub compress: bool,
    /// Custom payload codec; `None` means plain JSON.
    pub codec: Option<Arc<dyn Codec>>,
}

impl CachePolicy {
    pub fn new(base_ttl: Duration, jitter: Duration, strategy: Strategy) -> Self {
        Self {
            base_ttl,
            jitter,
            strategy,
            compress: false,
            codec: None,
        }
    }

    pub fn with_compression(mut self) -> Self {
        self.compress = true;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// TTL to write with: base plus a fresh random offset.
    pub fn effective_ttl(&self) -> Duration {
        jittered_ttl(self.base_ttl, self.jitter)
    }
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("base_ttl", &self.base_ttl)
            .field("jitter", &self.jitter)
            .field("strategy", &self.strategy)
            .field("compress", &self.compress)
            .field("codec", &self.codec.as_ref().map(|codec| codec.name()))
            .finish()
    }
}

/// Base TTL plus a uniformly random offset in `[0, jitter)`.
///
/// Desynchronizes expiry across keys sharing a policy so a popular prefix
/// does not mass-expire and stampede the backing store. The result never
/// exceeds `base + jitter`.
pub fn jittered_ttl(base: Duration, jitter: Duration) -> Duration {
    let window_ms = jitter.as_millis() as u64;
    if window_ms == 0 {
        return base;
    }
    let offset = rand::thread_rng().gen_range(0..window_ms);
    base + Duration::from_millis(offset)
}

/// Maps key prefixes to the policy governing them.
///
/// Prefixes are kept sorted longest-first and must be pairwise
/// non-overlapping, so at most one registered prefix can match any key.
/// Keys with no matching prefix fall back to the default policy.
pub struct PolicyRegistry {
    entries: RwLock<Vec<(String, CachePolicy)>>,
    default: CachePolicy,
}

impl PolicyRegistry {
    /// Create an empty registry with the given fallback policy.
    pub fn new(default: CachePolicy) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            default,
        }
    }

    /// Registry pre-populated with the platform's built-in key families.
    pub fn with_builtin() -> Self {
        let registry = Self::new(CachePolicy::new(
            DEFAULT_BASE_TTL,
            DEFAULT_JITTER,
            Strategy::CacheAside,
        ));

        let minutes = |m: u64| Duration::from_secs(m * 60);
        let builtin: [(&str, u64, u64, Strategy); 12] = [
            ("session", 30, 5, Strategy::WriteThrough),
            ("user:info", 30, 5, Strategy::CacheAside),
            ("book:detail", 60, 10, Strategy::CacheAside),
            ("chapter:content", 120, 15, Strategy::CacheAside),
            ("catalog", 60, 10, Strategy::CacheAside),
            ("hot:list", 10, 2, Strategy::CacheAside),
            ("recommend:list", 15, 3, Strategy::CacheAside),
            ("search:result", 5, 1, Strategy::CacheAside),
            ("stats", 5, 1, Strategy::CacheAside),
            ("reading:progress", 10, 2, Strategy::WriteThrough),
            ("comment:list", 5, 1, Strategy::CacheAside),
            ("config", 60, 10, Strategy::CacheAside),
        ];

        {
            // The built-in table is pairwise non-overlapping, so entries can
            // be inserted directly without the register() overlap scan.
            let mut entries = rw_write(&registry.entries, SOURCE, "with_builtin");
            for (prefix, base_min, jitter_min, strategy) in builtin {
                entries.push((
                    prefix.to_string(),
                    CachePolicy::new(minutes(base_min), minutes(jitter_min), strategy),
                ));
            }
            entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        }

        registry
    }

    /// Register a policy for a key prefix.
    ///
    /// Rejects prefixes that overlap an existing registration (either is a
    /// literal prefix of the other), which would make lookup order-dependent.
    pub fn register(
        &self,
        prefix: impl Into<String>,
        policy: CachePolicy,
    ) -> Result<(), PolicyError> {
        let prefix = prefix.into();
        let mut entries = rw_write(&self.entries, SOURCE, "register");

        if let Some((existing, _)) = entries
            .iter()
            .find(|(existing, _)| existing.starts_with(&prefix) || prefix.starts_with(existing))
        {
            return Err(PolicyError::Overlap {
                new: prefix,
                existing: existing.clone(),
            });
        }

        entries.push((prefix, policy));
        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(())
    }

    /// The policy whose prefix matches `key`, if one is registered.
    pub fn lookup(&self, key: &str) -> Option<CachePolicy> {
        let entries = rw_read(&self.entries, SOURCE, "lookup");
        entries
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix.as_str()))
            .map(|(_, policy)| policy.clone())
    }

    /// The policy governing `key`: a registered match or the default.
    pub fn resolve(&self, key: &str) -> CachePolicy {
        self.lookup(key).unwrap_or_else(|| self.default.clone())
    }

    /// The fallback policy for unmatched keys.
    pub fn default_policy(&self) -> CachePolicy {
        self.default.clone()
    }

    /// Number of registered prefixes.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
