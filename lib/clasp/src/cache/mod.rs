//! Response cache storage.
//!
//! A [`Cacher`] is a string-keyed byte store with per-entry TTL. Three backends
//! are provided:
//!
//! | Backend | Feature | Expiry |
//! |---------|---------|--------|
//! | [`MemoryCache`] | `memory-cache` (default) | per-entry, swept by `moka` |
//! | [`FileCache`] | always | checked lazily on read, expired files deleted |
//! | [`RedisCache`] | `redis-cache` | delegated to Redis (`PX`) |
//!
//! All backends report an absent or expired key as [`CacheError::NotFound`].

use std::time::Duration;

use bytes::Bytes;
use derive_more::{Display, Error, From};
use futures_util::future::BoxFuture;

mod codec;
mod file;
#[cfg(feature = "memory-cache")]
mod memory;
#[cfg(feature = "redis-cache")]
mod redis;

pub use codec::{JsonCodec, Transaction, TransactionCodec};
pub use file::FileCache;
#[cfg(feature = "memory-cache")]
pub use memory::MemoryCache;
#[cfg(feature = "redis-cache")]
pub use redis::RedisCache;

/// Errors raised by cache storage backends.
///
/// These never reach the caller of the client: the cache interceptor treats
/// every read failure as a miss and only logs write failures.
#[derive(Debug, Display, Error, From)]
pub enum CacheError {
    /// The key is absent or its entry expired.
    #[display("cache entry not found")]
    #[from(skip)]
    NotFound,

    /// Filesystem error.
    #[display("cache I/O error: {_0}")]
    Io(std::io::Error),

    /// A stored record could not be encoded or decoded.
    #[display("cache record error: {_0}")]
    Codec(serde_json::Error),

    /// Any other backend failure.
    #[display("cache backend error: {_0}")]
    #[from(skip)]
    Backend(#[error(not(source))] String),
}

impl CacheError {
    /// Returns `true` for a missing or expired entry.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Key/value storage with per-entry time-to-live.
///
/// A zero TTL means the entry never expires.
pub trait Cacher: Send + Sync {
    /// Fetch the value stored under `key`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Bytes, CacheError>>;

    /// Store `value` under `key` for `ttl`.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>>;
}
