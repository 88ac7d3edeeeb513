//! Rate limiting interceptor using governor.
//!
//! Requests are grouped by a key (per endpoint by default) and each group gets
//! its own token bucket. Buckets are created lazily on first use and kept for
//! the life of the interceptor.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::debug;
use url::Url;

use super::cancellable;
use crate::{Error, Interceptor, Method, Next, Request, Response, Result};

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key shared by every request under [`RateLimitKey::Global`].
const GLOBAL_KEY: &str = "__all__";

/// How requests are grouped into rate-limited buckets.
#[derive(Clone, Default)]
pub enum RateLimitKey {
    /// One bucket per method and endpoint. See [`endpoint_key`].
    #[default]
    PerEndpoint,
    /// A single bucket for every request.
    Global,
    /// Buckets named by a custom function.
    Custom(Arc<dyn Fn(&Request) -> String + Send + Sync>),
}

impl fmt::Debug for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerEndpoint => f.write_str("PerEndpoint"),
            Self::Global => f.write_str("Global"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl RateLimitKey {
    fn key(&self, request: &Request) -> String {
        match self {
            Self::PerEndpoint => endpoint_key(request.method(), request.url()),
            Self::Global => GLOBAL_KEY.to_string(),
            Self::Custom(key) => key(request),
        }
    }
}

/// Lower-cased `"{METHOD} {scheme}://{host}[:{port}]{path}"`.
///
/// Query, fragment and credentials are left out.
#[must_use]
pub fn endpoint_key(method: Method, url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let key = match url.port() {
        Some(port) => format!("{method} {}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{method} {}://{host}{}", url.scheme(), url.path()),
    };
    key.to_lowercase()
}

/// Rate limit configuration. A rate of `0` disables limiting.
#[derive(Debug, Clone, Default)]
pub struct RateLimitOption {
    /// Permits per second for each bucket.
    pub rate: u32,
    /// Bucket grouping.
    pub key: RateLimitKey,
}

impl RateLimitOption {
    /// Allow `rate` requests per second for each endpoint.
    #[must_use]
    pub fn per_second(rate: u32) -> Self {
        Self {
            rate,
            key: RateLimitKey::PerEndpoint,
        }
    }

    /// Replace the bucket grouping.
    #[must_use]
    pub fn with_key(mut self, key: RateLimitKey) -> Self {
        self.key = key;
        self
    }

    /// Share one bucket between all requests.
    #[must_use]
    pub fn global(self) -> Self {
        self.with_key(RateLimitKey::Global)
    }

    /// Name buckets with `key`.
    #[must_use]
    pub fn with_key_fn(self, key: impl Fn(&Request) -> String + Send + Sync + 'static) -> Self {
        self.with_key(RateLimitKey::Custom(Arc::new(key)))
    }

    /// Whether the client should install the rate limit interceptor.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.rate > 0
    }
}

/// Interceptor waiting for a permit before each attempt. See [`RateLimitOption`].
#[derive(Clone)]
pub struct RateLimitInterceptor {
    limiter: Option<Arc<KeyedLimiter>>,
    key: RateLimitKey,
}

impl fmt::Debug for RateLimitInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitInterceptor")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl RateLimitInterceptor {
    /// Create a rate limit interceptor.
    ///
    /// Permits are evenly spaced: a bucket holds a single permit, refilled
    /// every `1 / rate` seconds.
    #[must_use]
    pub fn new(option: RateLimitOption) -> Self {
        let limiter = NonZeroU32::new(option.rate).map(|rate| {
            let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
            Arc::new(RateLimiter::keyed(quota))
        });
        Self {
            limiter,
            key: option.key,
        }
    }

    async fn run(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let Some(limiter) = &self.limiter else {
            return next.run(request).await;
        };

        let key = self.key.key(&request);
        if limiter.check_key(&key).is_err() {
            debug!(key = %key, "waiting for rate limit permit");
            if cancellable(request.cancellation(), limiter.until_key_ready(&key))
                .await
                .is_none()
            {
                return Err(Error::cancelled(format!(
                    "while waiting for rate limit permit on {key}"
                )));
            }
        }

        next.run(request).await
    }
}

impl Interceptor for RateLimitInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.run(request, next))
    }
}
