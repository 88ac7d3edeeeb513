//! HTTP client traits.
//!
//! - [`HttpClient`] - Low-level HTTP execution
//! - [`HttpClientExt`] - Convenience verbs built on top of [`HttpClient::execute`]

use std::future::Future;

use bytes::Bytes;

use crate::{Method, Request, Response, Result};

/// Core HTTP client trait.
///
/// This trait defines the interface for executing HTTP requests.
/// Implementations should be async-first and support connection pooling.
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    /// - Cancellation
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

/// Extension trait for [`HttpClient`] with convenience methods.
pub trait HttpClientExt: HttpClient {
    /// Execute a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the request fails.
    fn get(&self, url: &str) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::Get, url).build();
            self.execute(request).await
        }
    }

    /// Execute a HEAD request.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the request fails.
    fn head(&self, url: &str) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::Head, url).build();
            self.execute(request).await
        }
    }

    /// Execute a POST request with a raw body and content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the request fails.
    fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes> + Send,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::Post, url)
                .header(http::header::CONTENT_TYPE.as_str(), content_type)
                .body(body.into())
                .build();
            self.execute(request).await
        }
    }

    /// Execute a POST request with a form-urlencoded body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the request fails.
    fn post_form<T: serde::Serialize + Send + Sync>(
        &self,
        url: &str,
        form: &T,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::Post, url).form(form)?.build();
            self.execute(request).await
        }
    }

    /// Execute a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the request fails.
    fn post_json<T: serde::Serialize + Send + Sync>(
        &self,
        url: &str,
        body: &T,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::Post, url).json(body)?.build();
            self.execute(request).await
        }
    }

    /// Execute a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the request fails.
    fn put_json<T: serde::Serialize + Send + Sync>(
        &self,
        url: &str,
        body: &T,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::Put, url).json(body)?.build();
            self.execute(request).await
        }
    }

    /// Execute a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn delete(&self, url: &str) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        async move {
            let url = url::Url::parse(url)?;
            let request = Request::builder(Method::Delete, url).build();
            self.execute(request).await
        }
    }
}

// Blanket implementation for all HttpClient implementors
impl<T: HttpClient> HttpClientExt for T {}
