//! HTTP client with a composable interceptor pipeline.
//!
//! Every request goes through an ordered chain of [`Interceptor`]s before it
//! reaches the network. The built-in ones add logging, retries with backoff,
//! per-endpoint rate limiting, circuit breaking, tracing, response caching and a
//! response size limit; any closure can join the chain through
//! [`interceptor_fn`].
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use clasp::prelude::*;
//! use clasp::cache::MemoryCache;
//! use clasp::middleware::{CacheOption, LoggerOption, RetryBackoff, RetryOption};
//!
//! let client = Client::builder()
//!     .request_timeout(Duration::from_secs(10))
//!     .logger(LoggerOption::new().with_bodies(false, false))
//!     .retry(RetryOption::new(3, RetryBackoff::exponential()))
//!     .cache(CacheOption::new(MemoryCache::new()).with_ttl(Duration::from_secs(60)))
//!     .build();
//!
//! let user: User = client.get("https://api.example.com/users/42").await?.json()?;
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `rate-limit` | yes | `RateLimitInterceptor` (governor) |
//! | `memory-cache` | yes | `MemoryCache` backend (moka) |
//! | `redis-cache` | no | `RedisCache` backend |

pub mod cache;
mod chain;
mod client;
mod config;
mod connector;
pub mod middleware;
pub mod prelude;
#[cfg(test)]
mod testing;
mod transport;

pub use chain::{FnInterceptor, Interceptor, Next, Transport, chain, interceptor_fn};
pub use client::{Client, ClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connector::https_connector;
pub use transport::HyperTransport;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use clasp_core::{
    ContentType, Error, HttpClient, HttpClientExt, Method, Request, RequestBuilder, Response,
    Result, from_json, to_form, to_json,
};

// Re-export http types for status codes and headers
pub use clasp_core::{StatusCode, header};

pub use tokio_util::sync::CancellationToken;
pub use url;
