//! In-process cache backed by `moka`.

use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use moka::Expiry;
use moka::future::Cache;

use super::{CacheError, Cacher};

#[derive(Clone)]
struct Entry {
    value: Bytes,
    ttl: Option<Duration>,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// Concurrent in-memory cache with per-entry expiry.
///
/// Expired entries are never returned and are swept by `moka`'s housekeeping.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Entry>,
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.entries.entry_count())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Create an unbounded cache: entries leave only when their TTL runs out.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a cache holding up to `max_capacity` entries.
    ///
    /// Once full, `moka` evicts the least useful entries, which may be dropped
    /// before their TTL runs out.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::build(Some(max_capacity))
    }

    fn build(max_capacity: Option<u64>) -> Self {
        let mut builder = Cache::builder().expire_after(EntryExpiry);
        if let Some(max_capacity) = max_capacity {
            builder = builder.max_capacity(max_capacity);
        }
        Self {
            entries: builder.build(),
        }
    }
}

impl Cacher for MemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Bytes, CacheError>> {
        Box::pin(async move {
            self.entries
                .get(key)
                .await
                .map(|entry| entry.value)
                .ok_or(CacheError::NotFound)
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let ttl = (!ttl.is_zero()).then_some(ttl);
            self.entries
                .insert(key.to_string(), Entry { value, ttl })
                .await;
            Ok(())
        })
    }
}
