//! Interceptor composition.
//!
//! An [`Interceptor`] wraps one request/response exchange. It receives the
//! request together with a [`Next`] handle running the rest of the pipeline and
//! may:
//! - forward the request (possibly modified) by calling [`Next::run`] once,
//! - short-circuit by never calling it (cache hit, open circuit),
//! - call it repeatedly (retry).
//!
//! [`chain`] folds an ordered list of interceptors into a single one; the
//! innermost [`Next`] ends at a [`Transport`].
//!
//! # Example
//!
//! ```ignore
//! use clasp::{chain, interceptor_fn};
//!
//! let tagging = interceptor_fn(|mut request, next| {
//!     Box::pin(async move {
//!         request.headers_mut().insert("x-tag".into(), "1".into());
//!         next.run(request).await
//!     })
//! });
//! let pipeline = chain(vec![Arc::new(tagging)]);
//! ```

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::{HttpClient, Request, Response, Result};

/// A composable wrapper around a request/response exchange.
pub trait Interceptor: Send + Sync {
    /// Handle `request`, delegating to `next` for the rest of the pipeline.
    fn intercept<'a>(&'a self, request: Request, next: Next<'a>)
    -> BoxFuture<'a, Result<Response>>;
}

/// The terminal call of a pipeline.
///
/// Every [`HttpClient`] is a transport.
pub trait Transport: Send + Sync {
    /// Perform the exchange.
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response>>;
}

impl<C: HttpClient> Transport for C {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
        Box::pin(self.execute(request))
    }
}

/// Handle on the remainder of a pipeline.
///
/// `Next` is `Copy`: an interceptor that retries calls [`Next::run`] once per
/// attempt, and only the interceptors inward of it are re-run.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Create a handle running `interceptors` in order, then `transport`.
    #[must_use]
    pub fn new(interceptors: &'a [Arc<dyn Interceptor>], transport: &'a dyn Transport) -> Self {
        Self {
            interceptors,
            transport,
        }
    }

    /// Run the rest of the pipeline.
    pub fn run(self, request: Request) -> BoxFuture<'a, Result<Response>> {
        match self.interceptors.split_first() {
            Some((head, tail)) => head.intercept(
                request,
                Next {
                    interceptors: tail,
                    transport: self.transport,
                },
            ),
            None => self.transport.send(request),
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

// A nested chain ends at the enclosing pipeline's continuation.
impl Transport for Next<'_> {
    fn send(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
        self.run(request)
    }
}

/// Compose interceptors into one.
///
/// - no interceptor: a pass-through straight to `next`
/// - one interceptor: that interceptor, unwrapped
/// - more: a composite running them in order, each `next` wired to the ones after it
#[must_use]
pub fn chain(mut interceptors: Vec<Arc<dyn Interceptor>>) -> Arc<dyn Interceptor> {
    match interceptors.len() {
        0 => Arc::new(PassThrough),
        1 => interceptors.remove(0),
        _ => Arc::new(Chain { interceptors }),
    }
}

#[derive(Debug, Clone, Copy)]
struct PassThrough;

impl Interceptor for PassThrough {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        next.run(request)
    }
}

struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Interceptor for Chain {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move { Next::new(&self.interceptors, &next).run(request).await })
    }
}

/// Interceptor built from a closure. See [`interceptor_fn`].
#[derive(Clone)]
pub struct FnInterceptor<F> {
    f: F,
}

impl<F> fmt::Debug for FnInterceptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInterceptor").finish_non_exhaustive()
    }
}

/// Turn a closure into an [`Interceptor`].
pub fn interceptor_fn<F>(f: F) -> FnInterceptor<F>
where
    F: for<'a> Fn(Request, Next<'a>) -> BoxFuture<'a, Result<Response>> + Send + Sync,
{
    FnInterceptor { f }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: for<'a> Fn(Request, Next<'a>) -> BoxFuture<'a, Result<Response>> + Send + Sync,
{
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        (self.f)(request, next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::testing::{MockTransport, get};

    type Journal = Arc<Mutex<Vec<String>>>;

    fn recording(name: &'static str, journal: &Journal) -> Arc<dyn Interceptor> {
        let journal = Arc::clone(journal);
        Arc::new(interceptor_fn(move |request, next| {
            let journal = Arc::clone(&journal);
            Box::pin(async move {
                journal.lock().expect("lock").push(format!("{name}:in"));
                let result = next.run(request).await;
                journal.lock().expect("lock").push(format!("{name}:out"));
                result
            })
        }))
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().expect("lock").clone()
    }

    #[tokio::test]
    async fn empty_chain_calls_transport_directly() {
        let transport = MockTransport::with_status(204);
        let pipeline = chain(Vec::new());

        let response = pipeline
            .intercept(get("https://example.com/"), Next::new(&[], &transport))
            .await
            .expect("response");

        assert_eq!(response.status(), 204);
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn single_interceptor_is_returned_unwrapped() {
        let journal = Journal::default();
        let only = recording("only", &journal);
        let pipeline = chain(vec![Arc::clone(&only)]);

        assert!(Arc::ptr_eq(&only, &pipeline));
    }

    #[tokio::test]
    async fn chain_preserves_order_in_and_reverse_out() {
        let journal = Journal::default();
        let pipeline = chain(vec![
            recording("h1", &journal),
            recording("h2", &journal),
            recording("h3", &journal),
        ]);
        let transport = MockTransport::with_status(200);

        pipeline
            .intercept(get("https://example.com/"), Next::new(&[], &transport))
            .await
            .expect("response");

        assert_eq!(
            entries(&journal),
            ["h1:in", "h2:in", "h3:in", "h3:out", "h2:out", "h1:out"]
        );
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn short_circuit_skips_inner_interceptors_and_transport() {
        let journal = Journal::default();
        let blocker: Arc<dyn Interceptor> = Arc::new(interceptor_fn(|_request, _next| {
            Box::pin(async { Ok(Response::new(299, Default::default(), bytes::Bytes::new())) })
        }));
        let pipeline = chain(vec![
            recording("outer", &journal),
            blocker,
            recording("inner", &journal),
        ]);
        let transport = MockTransport::with_status(200);

        let response = pipeline
            .intercept(get("https://example.com/"), Next::new(&[], &transport))
            .await
            .expect("response");

        assert_eq!(response.status(), 299);
        assert_eq!(entries(&journal), ["outer:in", "outer:out"]);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn repeated_next_only_reruns_inner_interceptors() {
        let journal = Journal::default();
        let twice: Arc<dyn Interceptor> = Arc::new(interceptor_fn(|request, next| {
            Box::pin(async move {
                let _ = next.run(request.clone()).await;
                next.run(request).await
            })
        }));
        let pipeline = chain(vec![
            recording("outer", &journal),
            twice,
            recording("inner", &journal),
        ]);
        let transport = MockTransport::with_status(200);

        pipeline
            .intercept(get("https://example.com/"), Next::new(&[], &transport))
            .await
            .expect("response");

        assert_eq!(
            entries(&journal),
            [
                "outer:in",
                "inner:in",
                "inner:out",
                "inner:in",
                "inner:out",
                "outer:out"
            ]
        );
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn nested_chain_continues_into_outer_pipeline() {
        let journal = Journal::default();
        let nested = chain(vec![recording("a", &journal), recording("b", &journal)]);
        let outer = vec![nested, recording("c", &journal)];
        let transport = MockTransport::with_status(200);

        Next::new(&outer, &transport)
            .run(get("https://example.com/"))
            .await
            .expect("response");

        assert_eq!(
            entries(&journal),
            ["a:in", "b:in", "c:in", "c:out", "b:out", "a:out"]
        );
    }
}
