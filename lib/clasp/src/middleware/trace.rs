//! Distributed-trace interceptor.
//!
//! A [`Tracer`] enriches the outgoing request (trace-context headers) and hands
//! back a [`TraceFinish`] handle. The handle is released once the inner
//! pipeline returns, whatever the outcome.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{Instrument, Span, field, info_span};
use uuid::Uuid;

use crate::{Interceptor, Next, Request, Response, Result};

/// Header carrying the request id set by [`SpanTracer`].
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const COMPONENT: &str = "HTTP Client";

/// Names the traced operation of a request.
pub type OperationName = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Starts a trace for an outgoing request.
pub trait Tracer: Send + Sync {
    /// Start tracing `request` as `operation`.
    ///
    /// Returns the request to send, possibly carrying extra headers.
    fn start(&self, request: Request, operation: &str) -> (Request, Box<dyn TraceFinish>);
}

/// Completion handle of a started trace.
pub trait TraceFinish: Send {
    /// Span the downstream call runs in.
    fn span(&self) -> Span {
        Span::none()
    }

    /// End the trace; `status` is `None` when the call failed.
    fn finish(self: Box<Self>, status: Option<u16>);
}

/// [`Tracer`] backed by `tracing` spans.
///
/// Opens an `http.client` span and tags the request with an `x-request-id`
/// header (UUID v4) unless the caller already set one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanTracer;

struct SpanFinish {
    span: Span,
}

impl Tracer for SpanTracer {
    fn start(&self, mut request: Request, operation: &str) -> (Request, Box<dyn TraceFinish>) {
        let request_id = match request.header(REQUEST_ID_HEADER) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                request
                    .headers_mut()
                    .insert(REQUEST_ID_HEADER.to_string(), id.clone());
                id
            }
        };

        let span = info_span!(
            "http.client",
            component = COMPONENT,
            operation,
            method = %request.method(),
            url = %request.url(),
            request_id = %request_id,
            status = field::Empty,
            error = field::Empty,
        );
        (request, Box::new(SpanFinish { span }))
    }
}

impl TraceFinish for SpanFinish {
    fn span(&self) -> Span {
        self.span.clone()
    }

    fn finish(self: Box<Self>, status: Option<u16>) {
        match status {
            Some(status) => self.span.record("status", status),
            None => self.span.record("error", true),
        };
    }
}

/// `"HTTP {METHOD} {path}"`.
#[must_use]
pub fn default_operation_name(request: &Request) -> String {
    format!("HTTP {} {}", request.method(), request.url().path())
}

/// Trace configuration. Disabled until a [`Tracer`] is set.
#[derive(Clone)]
pub struct TraceOption {
    /// Trace source.
    pub tracer: Option<Arc<dyn Tracer>>,
    /// Operation naming.
    pub operation_name: OperationName,
}

impl Default for TraceOption {
    fn default() -> Self {
        Self {
            tracer: None,
            operation_name: Arc::new(default_operation_name),
        }
    }
}

impl fmt::Debug for TraceOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceOption")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl TraceOption {
    /// Trace through `tracer`.
    #[must_use]
    pub fn new(tracer: impl Tracer + 'static) -> Self {
        Self {
            tracer: Some(Arc::new(tracer)),
            ..Self::default()
        }
    }

    /// Trace with [`SpanTracer`].
    #[must_use]
    pub fn spans() -> Self {
        Self::new(SpanTracer)
    }

    /// Replace the operation naming.
    #[must_use]
    pub fn with_operation_name(
        mut self,
        operation_name: impl Fn(&Request) -> String + Send + Sync + 'static,
    ) -> Self {
        self.operation_name = Arc::new(operation_name);
        self
    }

    /// Whether the client should install the trace interceptor.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.tracer.is_some()
    }
}

/// Interceptor wrapping the inner pipeline in a trace. See [`TraceOption`].
#[derive(Debug, Clone)]
pub struct TraceInterceptor {
    option: TraceOption,
}

impl TraceInterceptor {
    /// Create a trace interceptor.
    #[must_use]
    pub fn new(option: TraceOption) -> Self {
        Self { option }
    }

    async fn run(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let Some(tracer) = &self.option.tracer else {
            return next.run(request).await;
        };

        let operation = (self.option.operation_name)(&request);
        let (request, finish) = tracer.start(request, &operation);
        let result = next.run(request).instrument(finish.span()).await;
        finish.finish(result.as_ref().ok().map(Response::status));
        result
    }
}

impl Interceptor for TraceInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.run(request, next))
    }
}
