//! The pipeline client.
//!
//! A [`Client`] runs every request through its interceptor pipeline, then hands
//! it to the transport. It is itself an [`HttpClient`], so it can serve as the
//! transport of another client, and a `tower` service.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tower_service::Service;

use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::middleware::{
    BodySizeInterceptor, BodySizeOption, CacheInterceptor, CacheOption, CircuitBreakerInterceptor,
    CircuitBreakerOption, LoggerOption, LoggingInterceptor, RetryInterceptor, RetryOption,
    TraceInterceptor, TraceOption,
};
#[cfg(feature = "rate-limit")]
use crate::middleware::{RateLimitInterceptor, RateLimitOption};
use crate::transport::HyperTransport;
use crate::{Error, HttpClient, Interceptor, Next, Request, Response, Result, Transport, chain};

/// Future type for the Tower Service implementation.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// HTTP client running requests through an interceptor pipeline.
///
/// Cloning is cheap; clones share the pipeline and the transport.
///
/// # Example
///
/// ```ignore
/// use clasp::{Client, HttpClientExt};
/// use clasp::middleware::{LoggerOption, RetryBackoff, RetryOption};
///
/// let client = Client::builder()
///     .logger(LoggerOption::new())
///     .retry(RetryOption::new(3, RetryBackoff::exponential()))
///     .build();
///
/// let response = client.get("https://api.example.com/status").await?;
/// ```
#[derive(Clone)]
pub struct Client {
    pipeline: Arc<dyn Interceptor>,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Client with the default configuration and no interceptors.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl HttpClient for Client {
    async fn execute(&self, request: Request) -> Result<Response> {
        Next::new(std::slice::from_ref(&self.pipeline), self.transport.as_ref())
            .run(request)
            .await
    }
}

impl Service<Request> for Client {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}

/// Builder for [`Client`].
///
/// Built-in interceptors are installed in a fixed order, outermost first:
/// logging, retry, rate limit, circuit breaker, trace, cache, body size. Those
/// whose option is disabled are left out. Interceptors added with
/// [`ClientBuilder::interceptor`] run next, in the order they were added, right
/// before the transport.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfigBuilder,
    logger: LoggerOption,
    retry: RetryOption,
    #[cfg(feature = "rate-limit")]
    rate_limit: RateLimitOption,
    circuit_breaker: CircuitBreakerOption,
    trace: TraceOption,
    cache: CacheOption,
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("logger", &self.logger)
            .field("retry", &self.retry)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("trace", &self.trace)
            .field("cache", &self.cache)
            .field("interceptors_count", &self.interceptors.len())
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    // ========================================================================
    // Core Configuration
    // ========================================================================

    /// Set the timeout of a whole exchange.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.request_timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Reject responses larger than `bytes`; `0` disables the check.
    #[must_use]
    pub fn max_body_size(mut self, bytes: u64) -> Self {
        self.config = self.config.max_body_size(bytes);
        self
    }

    /// Same as [`ClientBuilder::max_body_size`].
    #[must_use]
    pub fn body_size(self, option: BodySizeOption) -> Self {
        self.max_body_size(option.max_body_size)
    }

    // ========================================================================
    // Interceptors
    // ========================================================================

    /// Configure request logging.
    #[must_use]
    pub fn logger(mut self, option: LoggerOption) -> Self {
        self.logger = option;
        self
    }

    /// Configure retries.
    #[must_use]
    pub fn retry(mut self, option: RetryOption) -> Self {
        self.retry = option;
        self
    }

    /// Configure rate limiting.
    #[cfg(feature = "rate-limit")]
    #[must_use]
    pub fn rate_limit(mut self, option: RateLimitOption) -> Self {
        self.rate_limit = option;
        self
    }

    /// Configure circuit breaking.
    #[must_use]
    pub fn circuit_breaker(mut self, option: CircuitBreakerOption) -> Self {
        self.circuit_breaker = option;
        self
    }

    /// Configure tracing.
    #[must_use]
    pub fn trace(mut self, option: TraceOption) -> Self {
        self.trace = option;
        self
    }

    /// Configure response caching.
    #[must_use]
    pub fn cache(mut self, option: CacheOption) -> Self {
        self.cache = option;
        self
    }

    /// Add an interceptor running after the built-in ones.
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Replace the network transport.
    #[must_use]
    pub fn transport(mut self, transport: impl HttpClient + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the client.
    #[must_use]
    pub fn build(self) -> Client {
        let config = self.config.build();
        let mut pipeline: Vec<Arc<dyn Interceptor>> = Vec::new();

        if self.logger.is_enabled() {
            pipeline.push(Arc::new(LoggingInterceptor::new(self.logger)));
        }
        if self.retry.is_enabled() {
            pipeline.push(Arc::new(RetryInterceptor::new(self.retry)));
        }
        #[cfg(feature = "rate-limit")]
        if self.rate_limit.is_enabled() {
            pipeline.push(Arc::new(RateLimitInterceptor::new(self.rate_limit)));
        }
        if self.circuit_breaker.is_enabled() {
            pipeline.push(Arc::new(CircuitBreakerInterceptor::new(self.circuit_breaker)));
        }
        if self.trace.is_enabled() {
            pipeline.push(Arc::new(TraceInterceptor::new(self.trace)));
        }
        if self.cache.is_enabled() {
            pipeline.push(Arc::new(CacheInterceptor::new(self.cache)));
        }
        let body_size = BodySizeOption::new(config.max_body_size);
        if body_size.is_enabled() {
            pipeline.push(Arc::new(BodySizeInterceptor::new(body_size)));
        }
        pipeline.extend(self.interceptors);

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(config.clone())),
        };

        Client {
            pipeline: chain(pipeline),
            transport,
            config,
        }
    }
}
