//! Retry interceptor.
//!
//! Re-runs the inner pipeline while a predicate asks for it and the backoff
//! policy still yields an interval. Waits between attempts abort as soon as the
//! request's cancellation token fires.
//!
//! # Example
//!
//! ```ignore
//! use clasp::middleware::{RetryBackoff, RetryOption};
//! use std::time::Duration;
//!
//! // Up to 3 retries, 200ms apart, on transport errors and 5xx responses.
//! let option = RetryOption::new(3, RetryBackoff::constant(Duration::from_millis(200)));
//! ```

use std::fmt;
use std::sync::Arc;

use backoff::backoff::Backoff;
use futures_util::future::BoxFuture;
use tracing::debug;

use super::{RetryBackoff, cancellable};
use crate::{Error, Interceptor, Next, Request, Response, Result};

/// Decides whether a completed attempt should be retried.
pub type ShouldRetry = Arc<dyn Fn(&Request, &Result<Response>) -> bool + Send + Sync>;

/// Retry unless the attempt produced a response with a status below 500.
#[must_use]
pub fn default_should_retry(_request: &Request, result: &Result<Response>) -> bool {
    !matches!(result, Ok(response) if response.status() < 500)
}

/// Retry configuration.
#[derive(Clone)]
pub struct RetryOption {
    /// Retry predicate.
    pub should_retry: ShouldRetry,
    /// Maximum number of retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    /// Wait policy between attempts, cloned and reset for every call.
    pub backoff: RetryBackoff,
}

impl Default for RetryOption {
    fn default() -> Self {
        Self::new(0, RetryBackoff::default())
    }
}

impl fmt::Debug for RetryOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOption")
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RetryOption {
    /// Retry up to `max_retries` times with the default predicate.
    #[must_use]
    pub fn new(max_retries: u32, backoff: RetryBackoff) -> Self {
        Self {
            should_retry: Arc::new(default_should_retry),
            max_retries,
            backoff,
        }
    }

    /// Replace the retry predicate.
    #[must_use]
    pub fn with_should_retry(
        mut self,
        should_retry: impl Fn(&Request, &Result<Response>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Arc::new(should_retry);
        self
    }

    /// Whether the client should install the retry interceptor.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }
}

/// Interceptor retrying the inner pipeline. See [`RetryOption`].
#[derive(Debug, Clone)]
pub struct RetryInterceptor {
    option: RetryOption,
}

impl RetryInterceptor {
    /// Create a retry interceptor.
    #[must_use]
    pub fn new(option: RetryOption) -> Self {
        Self { option }
    }

    async fn run(&self, request: Request, next: Next<'_>) -> Result<Response> {
        if self.option.max_retries == 0 {
            return next.run(request).await;
        }

        let mut backoff = self
            .option
            .backoff
            .fresh()
            .with_max_retries(self.option.max_retries);

        loop {
            let result = next.run(request.clone()).await;
            if !(self.option.should_retry)(&request, &result) {
                return result;
            }

            let Some(wait) = backoff.next_backoff() else {
                debug!(retries = backoff.retries(), "retry budget exhausted");
                return result;
            };

            let context = describe(&result);
            drop(result);

            debug!(
                retry = backoff.retries(),
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                last = %context,
                "retrying request"
            );

            if cancellable(request.cancellation(), tokio::time::sleep(wait))
                .await
                .is_none()
            {
                return Err(Error::cancelled(format!(
                    "while waiting to retry after {context}"
                )));
            }
        }
    }
}

impl Interceptor for RetryInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.run(request, next))
    }
}

fn describe(result: &Result<Response>) -> String {
    match result {
        Ok(response) => format!("status {}", response.status()),
        Err(err) => err.to_string(),
    }
}
