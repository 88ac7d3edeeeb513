//! Redis cache backend.

use std::fmt;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisError};
use bytes::Bytes;
use futures_util::future::BoxFuture;

use super::{CacheError, Cacher};

/// Cache stored in Redis; expiry is left to Redis (`SET ... PX`).
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    prefix: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(backend)?;
        let connection = ConnectionManager::new(client).await.map_err(backend)?;
        Ok(Self::new(connection))
    }

    /// Use an existing connection manager.
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            prefix: String::new(),
        }
    }

    /// Prefix every key, e.g. `"http-cache:"`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

impl Cacher for RedisCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Bytes, CacheError>> {
        Box::pin(async move {
            let mut connection = self.connection.clone();
            let value: Option<Vec<u8>> = ::redis::cmd("GET")
                .arg(prefixed_key(&self.prefix, key))
                .query_async(&mut connection)
                .await
                .map_err(backend)?;
            value.map(Bytes::from).ok_or(CacheError::NotFound)
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let mut connection = self.connection.clone();
            let mut cmd = ::redis::cmd("SET");
            cmd.arg(prefixed_key(&self.prefix, key)).arg(&value[..]);
            if let Some(millis) = expiry_millis(ttl) {
                cmd.arg("PX").arg(millis);
            }
            let () = cmd.query_async(&mut connection).await.map_err(backend)?;
            Ok(())
        })
    }
}

fn prefixed_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

// `PX` rejects 0; sub-millisecond TTLs round up.
fn expiry_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

#[allow(clippy::needless_pass_by_value)]
fn backend(err: RedisError) -> CacheError {
    CacheError::Backend(err.to_string())
}
