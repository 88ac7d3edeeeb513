//! Network transport using hyper-util.

use std::collections::HashMap;
use std::fmt;

use bytes::{Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::config::ClientConfig;
use crate::connector::https_connector;
use crate::middleware::cancellable;
use crate::{Error, HttpClient, Request, Response, Result};

/// Pooled HTTP/1.1 and HTTP/2 transport over rustls.
///
/// Bodies are fully buffered, up to [`ClientConfig::max_body_size`] when it is
/// set: a larger declared `Content-Length` fails before any of the body is
/// read, and reading stops as soon as the limit is crossed. The whole exchange
/// is bounded by [`ClientConfig::request_timeout`] and aborts when the
/// request's cancellation token fires.
#[derive(Clone)]
pub struct HyperTransport {
    inner: LegacyClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    config: ClientConfig,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl HyperTransport {
    /// Create a transport from `config`.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let connector = https_connector(config.connect_timeout);

        let inner = LegacyClient::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_idle_per_host)
            .build(connector);

        Self { inner, config }
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_hyper_request(request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body) = request.into_parts();

        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str());

        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = body.map_or_else(Full::default, Full::new);
        builder
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    fn extract_headers(headers: &http::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    async fn exchange(&self, request: Request) -> Result<Response> {
        let hyper_request = Self::build_hyper_request(request)?;
        let limit = self.config.max_body_size;

        let response = self
            .inner
            .request(hyper_request)
            .await
            .map_err(Self::map_hyper_error)?;

        let status = response.status().as_u16();
        let version = response.version();
        let headers = Self::extract_headers(response.headers());

        if limit > 0
            && let Some(length) = declared_length(response.headers())
            && length > limit
        {
            debug!(length, limit, "declared body exceeds the limit");
            return Err(Error::BodyTooLarge { length, limit });
        }

        let mut body = response.into_body();
        let mut collected = BytesMut::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| Error::connection(e.to_string()))?;
            let Some(data) = frame.data_ref() else {
                continue;
            };
            collected.extend_from_slice(data);
            let length = u64::try_from(collected.len()).unwrap_or(u64::MAX);
            if limit > 0 && length > limit {
                debug!(length, limit, "body exceeds the limit while reading");
                return Err(Error::BodyTooLarge { length, limit });
            }
        }

        Ok(Response::new(status, headers, collected.freeze()).with_version(version))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::connection(msg);
        }

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

fn declared_length(headers: &http::HeaderMap) -> Option<u64> {
    headers
        .get(http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

impl HttpClient for HyperTransport {
    async fn execute(&self, request: Request) -> Result<Response> {
        let token = request.cancellation().cloned();
        let method = request.method();
        let url = request.url().to_string();

        let exchange = tokio::time::timeout(self.config.request_timeout, self.exchange(request));
        match cancellable(token.as_ref(), exchange).await {
            Some(Ok(result)) => result,
            Some(Err(_elapsed)) => {
                debug!(%method, %url, timeout = ?self.config.request_timeout, "request timed out");
                Err(Error::Timeout)
            }
            None => Err(Error::cancelled(format!("during {method} {url}"))),
        }
    }
}
