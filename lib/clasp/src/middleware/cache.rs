//! Response cache interceptor.
//!
//! Fingerprints the request, replays a stored transaction on a hit without
//! touching the inner pipeline, and stores cacheable results on a miss.
//!
//! Storage failures never fail the request: read errors and undecodable entries
//! count as misses, write errors are logged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{Cacher, JsonCodec, TransactionCodec};
use crate::{Interceptor, Method, Next, Request, Response, Result};

/// Default time-to-live of a stored transaction.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Computes the cache key of a request; `None` disables caching for it.
pub type RequestHash = Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>;

/// Decides whether a completed exchange is stored.
pub type ShouldCache = Arc<dyn Fn(&Request, &Result<Response>) -> bool + Send + Sync>;

/// Time-to-live of a completed exchange.
pub type CacheTtl = Arc<dyn Fn(&Request, &Result<Response>) -> Duration + Send + Sync>;

/// Fingerprint GET requests: SHA-256 of the absolute URL, base64 URL-safe.
#[must_use]
pub fn default_request_hash(request: &Request) -> Option<String> {
    if request.method() != Method::Get {
        return None;
    }
    let digest = Sha256::digest(request.url().as_str().as_bytes());
    Some(URL_SAFE.encode(digest))
}

/// Store successful GET exchanges answered with `200`.
#[must_use]
pub fn default_should_cache(request: &Request, result: &Result<Response>) -> bool {
    request.method() == Method::Get && matches!(result, Ok(response) if response.status() == 200)
}

/// Cache configuration. Disabled until a [`Cacher`] is set.
#[derive(Clone)]
pub struct CacheOption {
    /// Storage backend.
    pub cacher: Option<Arc<dyn Cacher>>,
    /// Transaction codec.
    pub codec: Arc<dyn TransactionCodec>,
    /// Key derivation.
    pub request_hash: RequestHash,
    /// Storage predicate.
    pub should_cache: ShouldCache,
    /// Entry lifetime.
    pub ttl: CacheTtl,
}

impl Default for CacheOption {
    fn default() -> Self {
        Self {
            cacher: None,
            codec: Arc::new(JsonCodec),
            request_hash: Arc::new(default_request_hash),
            should_cache: Arc::new(default_should_cache),
            ttl: Arc::new(|_, _| DEFAULT_CACHE_TTL),
        }
    }
}

impl fmt::Debug for CacheOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOption")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl CacheOption {
    /// Cache through `cacher` with the default hooks.
    #[must_use]
    pub fn new(cacher: impl Cacher + 'static) -> Self {
        Self {
            cacher: Some(Arc::new(cacher)),
            ..Self::default()
        }
    }

    /// Replace the transaction codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl TransactionCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Replace the key derivation.
    #[must_use]
    pub fn with_request_hash(
        mut self,
        request_hash: impl Fn(&Request) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.request_hash = Arc::new(request_hash);
        self
    }

    /// Replace the storage predicate.
    #[must_use]
    pub fn with_should_cache(
        mut self,
        should_cache: impl Fn(&Request, &Result<Response>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_cache = Arc::new(should_cache);
        self
    }

    /// Use a fixed time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Arc::new(move |_, _| ttl);
        self
    }

    /// Compute the time-to-live per exchange.
    #[must_use]
    pub fn with_ttl_fn(
        mut self,
        ttl: impl Fn(&Request, &Result<Response>) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.ttl = Arc::new(ttl);
        self
    }

    /// Whether the client should install the cache interceptor.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.cacher.is_some()
    }
}

/// Interceptor serving and storing cached responses. See [`CacheOption`].
#[derive(Debug, Clone)]
pub struct CacheInterceptor {
    option: CacheOption,
}

impl CacheInterceptor {
    /// Create a cache interceptor.
    #[must_use]
    pub fn new(option: CacheOption) -> Self {
        Self { option }
    }

    async fn lookup(&self, cacher: &dyn Cacher, key: &str) -> Option<Result<Response>> {
        let stored = match cacher.get(key).await {
            Ok(stored) => stored,
            Err(err) if err.is_not_found() => {
                debug!(key, "cache miss");
                return None;
            }
            Err(err) => {
                debug!(key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        match self.option.codec.decode(&stored) {
            Ok(transaction) => {
                let replayed = transaction.replay();
                debug!(key, hit = replayed.is_some(), "cache lookup");
                replayed
            }
            Err(err) => {
                debug!(key, error = %err, "undecodable cache entry, treating as miss");
                None
            }
        }
    }

    async fn run(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let Some(cacher) = self.option.cacher.as_deref() else {
            return next.run(request).await;
        };

        let key = (self.option.request_hash)(&request);
        if let Some(key) = key.as_deref() {
            if let Some(replayed) = self.lookup(cacher, key).await {
                return replayed;
            }
        }

        let result = next.run(request.clone()).await;
        if !(self.option.should_cache)(&request, &result) {
            return result;
        }
        let Some(key) = key.filter(|key| !key.is_empty()) else {
            return result;
        };

        let encoded = self.option.codec.encode(&request, &result)?;
        let ttl = (self.option.ttl)(&request, &result);
        match cacher.set(&key, encoded, ttl).await {
            Ok(()) => debug!(key = %key, ttl = ?ttl, "cached response"),
            Err(err) => warn!(key = %key, error = %err, "failed to store response in cache"),
        }

        result
    }
}

impl Interceptor for CacheInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.run(request, next))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use assert2::{check, let_assert};
    use bytes::Bytes;

    use super::*;
    use crate::cache::{CacheError, FileCache};
    use crate::testing::{MockTransport, get, request};
    use crate::{Error, Transport};

    /// In-test store with a controllable clock and failure switches.
    #[derive(Default)]
    struct TestStore {
        entries: Mutex<HashMap<String, (Bytes, Duration)>>,
        fail_reads: bool,
        fail_writes: bool,
    }

    impl Cacher for TestStore {
        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, std::result::Result<Bytes, CacheError>> {
            Box::pin(async move {
                if self.fail_reads {
                    return Err(CacheError::Backend("read failed".to_string()));
                }
                self.entries
                    .lock()
                    .expect("lock")
                    .get(key)
                    .map(|(value, _)| value.clone())
                    .ok_or(CacheError::NotFound)
            })
        }

        fn set<'a>(
            &'a self,
            key: &'a str,
            value: Bytes,
            ttl: Duration,
        ) -> BoxFuture<'a, std::result::Result<(), CacheError>> {
            Box::pin(async move {
                if self.fail_writes {
                    return Err(CacheError::Backend("write failed".to_string()));
                }
                self.entries
                    .lock()
                    .expect("lock")
                    .insert(key.to_string(), (value, ttl));
                Ok(())
            })
        }
    }

    async fn call(cache: &CacheInterceptor, transport: &dyn Transport, req: Request) -> Result<Response> {
        cache.intercept(req, Next::new(&[], transport)).await
    }

    #[test]
    fn default_hash_only_fingerprints_get() {
        let hash = default_request_hash(&get("https://example.com/a?b=c"));
        let_assert!(Some(hash) = hash);
        // 32-byte digest, padded URL-safe base64.
        check!(hash.len() == 44);
        check!(hash.ends_with('='));
        check!(!hash.contains(['+', '/']));

        check!(default_request_hash(&get("https://example.com/a?b=c")) == Some(hash));
        check!(
            default_request_hash(&get("https://example.com/a?b=d"))
                != default_request_hash(&get("https://example.com/a?b=c"))
        );
        check!(default_request_hash(&request(Method::Post, "https://example.com/a")).is_none());
    }

    #[test]
    fn default_should_cache_requires_get_and_200() {
        let ok = |status: u16| -> Result<Response> {
            Ok(Response::new(status, HashMap::new(), Bytes::new()))
        };
        let get_request = get("https://example.com/");
        let post_request = request(Method::Post, "https://example.com/");

        check!(default_should_cache(&get_request, &ok(200)));
        check!(!default_should_cache(&get_request, &ok(201)));
        check!(!default_should_cache(&get_request, &ok(500)));
        check!(!default_should_cache(&get_request, &Err(Error::Timeout)));
        check!(!default_should_cache(&post_request, &ok(200)));
    }

    #[test]
    fn option_disabled_without_cacher() {
        check!(!CacheOption::default().is_enabled());
        check!(CacheOption::new(TestStore::default()).is_enabled());
    }

    #[tokio::test]
    async fn hit_skips_the_transport() {
        let transport = MockTransport::with_body(200, "cached body");
        let cache = CacheInterceptor::new(CacheOption::new(TestStore::default()));

        let first = call(&cache, &transport, get("https://example.com/data")).await.expect("first");
        let second = call(&cache, &transport, get("https://example.com/data")).await.expect("second");

        check!(transport.call_count() == 1);
        check!(first.status() == 200);
        check!(second.status() == 200);
        check!(second.body() == first.body());
        check!(second.header("content-type") == Some("text/plain"));
    }

    #[tokio::test]
    async fn default_ttl_is_five_minutes() {
        let store = Arc::new(TestStore::default());
        let option = CacheOption {
            cacher: Some(Arc::clone(&store) as Arc<dyn Cacher>),
            ..CacheOption::default()
        };
        let cache = CacheInterceptor::new(option);
        let transport = MockTransport::with_status(200);

        call(&cache, &transport, get("https://example.com/")).await.expect("response");

        let entries = store.entries.lock().expect("lock");
        let ttls: Vec<_> = entries.values().map(|(_, ttl)| *ttl).collect();
        check!(ttls == vec![DEFAULT_CACHE_TTL]);
    }

    #[tokio::test]
    async fn non_get_requests_are_never_cached() {
        let transport = MockTransport::with_status(200);
        let cache = CacheInterceptor::new(
            CacheOption::new(TestStore::default()).with_should_cache(|_, _| true),
        );

        for _ in 0..2 {
            call(&cache, &transport, request(Method::Post, "https://example.com/data"))
                .await
                .expect("response");
        }

        check!(transport.call_count() == 2);
    }

    #[tokio::test]
    async fn uncacheable_status_is_not_stored() {
        let transport = MockTransport::with_status(404);
        let cache = CacheInterceptor::new(CacheOption::new(TestStore::default()));

        for _ in 0..2 {
            call(&cache, &transport, get("https://example.com/missing")).await.expect("response");
        }

        check!(transport.call_count() == 2);
    }

    #[tokio::test]
    async fn read_failure_degrades_to_a_miss() {
        let transport = MockTransport::with_status(200);
        let store = TestStore {
            fail_reads: true,
            ..TestStore::default()
        };
        let cache = CacheInterceptor::new(CacheOption::new(store));

        for _ in 0..2 {
            let response = call(&cache, &transport, get("https://example.com/")).await.expect("response");
            check!(response.status() == 200);
        }

        check!(transport.call_count() == 2);
    }

    #[tokio::test]
    async fn write_failure_still_returns_the_response() {
        let transport = MockTransport::with_body(200, "fresh");
        let store = TestStore {
            fail_writes: true,
            ..TestStore::default()
        };
        let cache = CacheInterceptor::new(CacheOption::new(store));

        let response = call(&cache, &transport, get("https://example.com/")).await.expect("response");

        check!(&response.body()[..] == b"fresh");
    }

    #[tokio::test]
    async fn undecodable_entry_degrades_to_a_miss() {
        let store = TestStore::default();
        let key = default_request_hash(&get("https://example.com/")).expect("key");
        store
            .set(&key, Bytes::from_static(b"not a transaction"), Duration::ZERO)
            .await
            .expect("seed");
        let cache = CacheInterceptor::new(CacheOption::new(store));
        let transport = MockTransport::with_status(200);

        let response = call(&cache, &transport, get("https://example.com/")).await.expect("response");

        check!(response.status() == 200);
        check!(transport.call_count() == 1);
    }

    #[tokio::test]
    async fn cached_error_is_replayed_as_text() {
        let transport = MockTransport::failing("connection reset");
        let cache = CacheInterceptor::new(
            CacheOption::new(TestStore::default()).with_should_cache(|_, _| true),
        );

        let_assert!(Err(first) = call(&cache, &transport, get("https://example.com/")).await);
        check!(first.is_connection());

        let_assert!(Err(replayed) = call(&cache, &transport, get("https://example.com/")).await);
        check!(matches!(replayed, Error::Replayed(_)));
        check!(replayed.to_string() == first.to_string());
        check!(transport.call_count() == 1);
    }

    #[tokio::test]
    async fn expired_file_entry_calls_the_transport_again() {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = Arc::new(Mutex::new(std::time::SystemTime::now()));
        let clock = Arc::clone(&now);
        let store = FileCache::new(dir.path()).with_clock(move || *clock.lock().expect("lock"));
        let cache = CacheInterceptor::new(CacheOption::new(store).with_ttl(Duration::from_secs(60)));
        let transport = MockTransport::with_status(200);

        call(&cache, &transport, get("https://example.com/")).await.expect("first");
        call(&cache, &transport, get("https://example.com/")).await.expect("second");
        check!(transport.call_count() == 1);

        *now.lock().expect("lock") += Duration::from_secs(61);
        call(&cache, &transport, get("https://example.com/")).await.expect("third");
        check!(transport.call_count() == 2);
    }
}
