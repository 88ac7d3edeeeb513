//! Response body size limit.
//!
//! The limit is checked against the declared `Content-Length`; when the server
//! declares none, the received body length is used instead.
//!
//! This check runs on whatever the transport returns, so it also covers custom
//! transports. [`HyperTransport`](crate::HyperTransport) enforces the same
//! limit while reading and never buffers more than it allows.

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::{Error, Interceptor, Next, Request, Response, Result};

/// Maximum accepted response body size in bytes. `0` disables the check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BodySizeOption {
    /// Limit in bytes.
    pub max_body_size: u64,
}

impl BodySizeOption {
    /// Reject responses larger than `max_body_size` bytes.
    #[must_use]
    pub const fn new(max_body_size: u64) -> Self {
        Self { max_body_size }
    }

    /// Whether the client should install the body size interceptor.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.max_body_size > 0
    }
}

/// Interceptor rejecting oversized responses. See [`BodySizeOption`].
#[derive(Debug, Clone, Copy)]
pub struct BodySizeInterceptor {
    limit: u64,
}

impl BodySizeInterceptor {
    /// Create a body size interceptor.
    #[must_use]
    pub const fn new(option: BodySizeOption) -> Self {
        Self {
            limit: option.max_body_size,
        }
    }

    fn check(&self, response: &Response) -> Result<()> {
        let length = match response.content_length() {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::InvalidContentLength {
                    value: value.to_string(),
                })?,
            None => u64::try_from(response.body().len()).unwrap_or(u64::MAX),
        };

        if length > self.limit {
            debug!(length, limit = self.limit, "response body too large");
            return Err(Error::BodyTooLarge {
                length,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

impl Interceptor for BodySizeInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let response = next.run(request).await?;
            if self.limit > 0 {
                self.check(&response)?;
            }
            Ok(response)
        })
    }
}
