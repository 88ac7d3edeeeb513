//! Built-in interceptors.
//!
//! Each interceptor is configured by an explicit option value built by the
//! caller. [`ClientBuilder`](crate::ClientBuilder) installs the enabled ones in a
//! fixed order, outermost first:
//!
//! | Order | Option | Interceptor |
//! |-------|--------|-------------|
//! | 1 | [`LoggerOption`] | [`LoggingInterceptor`] |
//! | 2 | [`RetryOption`] | [`RetryInterceptor`] |
//! | 3 | `RateLimitOption` (feature `rate-limit`) | `RateLimitInterceptor` |
//! | 4 | [`CircuitBreakerOption`] | [`CircuitBreakerInterceptor`] |
//! | 5 | [`TraceOption`] | [`TraceInterceptor`] |
//! | 6 | [`CacheOption`] | [`CacheInterceptor`] |
//! | 7 | [`BodySizeOption`] | [`BodySizeInterceptor`] |
//!
//! User interceptors run after these, right before the transport.
//!
//! # Example
//!
//! ```ignore
//! use clasp::Client;
//! use clasp::cache::MemoryCache;
//! use clasp::middleware::{CacheOption, RetryBackoff, RetryOption};
//!
//! let client = Client::builder()
//!     .retry(RetryOption::new(3, RetryBackoff::default()))
//!     .cache(CacheOption::new(MemoryCache::new()))
//!     .build();
//! ```

use std::future::Future;

use tokio_util::sync::CancellationToken;

mod backoff;
mod body_size;
mod cache;
mod circuit_breaker;
mod logging;
#[cfg(feature = "rate-limit")]
mod rate_limit;
mod retry;
mod trace;

pub use backoff::{MaxRetries, RetryBackoff};
pub use body_size::{BodySizeInterceptor, BodySizeOption};
pub use cache::{
    CacheInterceptor, CacheOption, CacheTtl, DEFAULT_CACHE_TTL, RequestHash, ShouldCache,
    default_request_hash, default_should_cache,
};
pub use circuit_breaker::{
    Circuit, CircuitBreakerConfig, CircuitBreakerInterceptor, CircuitBreakerOption,
    CircuitManager, CircuitRegistry, CircuitState, ConsecutiveFailureBreaker, CircuitWork,
    circuit_key,
};
pub use logging::{LogRecord, LogSink, LoggerOption, LoggingInterceptor};
#[cfg(feature = "rate-limit")]
pub use rate_limit::{RateLimitInterceptor, RateLimitKey, RateLimitOption, endpoint_key};
pub use retry::{RetryInterceptor, RetryOption, ShouldRetry, default_should_retry};
pub use trace::{
    OperationName, REQUEST_ID_HEADER, SpanTracer, TraceFinish, TraceInterceptor, TraceOption,
    Tracer, default_operation_name,
};

/// Await `future` unless `token` fires first; `None` means cancelled.
pub(crate) async fn cancellable<F: Future>(
    token: Option<&CancellationToken>,
    future: F,
) -> Option<F::Output> {
    match token {
        Some(token) => {
            tokio::select! {
                biased;
                () = token.cancelled() => None,
                output = future => Some(output),
            }
        }
        None => Some(future.await),
    }
}
