//! Policy-driven two-level caching for the Inkwave reading platform.
//!
//! A [`strategy::CacheStrategy`] fronts a remote key-value store
//! ([`remote::RemoteCache`], usually [`remote::RedisRemote`]) with an
//! in-process TTL'd LRU mirror. Per-prefix [`policy::CachePolicy`] entries
//! decide TTL, jitter, serialization, and compression for each key family.
//! On top of that sit the startup [`warmer::CacheWarmer`] and the
//! [`rating::RatingService`], the cache-aside consumer that adds negative
//! caching and explicit invalidation.

pub mod codec;
pub mod config;
pub mod error;
pub mod local;
mod lock;
pub mod memory;
pub mod policy;
pub mod rating;
pub mod remote;
pub mod strategy;
pub mod telemetry;
pub mod warmer;

#[cfg(test)]
mod testing;

pub use codec::{Codec, Compressor, JsonCodec, NoopCompressor};
pub use config::{CacheSettings, RemoteSettings};
pub use error::{CacheError, PolicyError, RatingError, SourceError};
pub use memory::MemoryRemote;
pub use policy::{CachePolicy, PolicyRegistry, Strategy};
pub use rating::{RatingService, RatingStats};
pub use remote::{RedisRemote, RemoteCache};
pub use strategy::CacheStrategy;
pub use warmer::CacheWarmer;
