//! Request/response logging interceptor.
//!
//! Logs one structured record per call using the `tracing` crate, inside an
//! `http_request` span. Records with a status of 400 or more, or with an error,
//! are logged at `warn`, the rest at `info`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tracing::{Instrument, info, info_span, warn};

use crate::{Interceptor, Method, Next, Request, Response, Result};

const DEFAULT_LOG_MESSAGE: &str = "http client request";

/// Receives log records instead of the default `tracing` output.
pub type LogSink = Arc<dyn Fn(&LogRecord, &str) + Send + Sync>;

/// One logged exchange.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers, when enabled.
    pub request_headers: Option<BTreeMap<String, String>>,
    /// Request body, when enabled and present.
    pub request_body: Option<Bytes>,
    /// Response headers, when enabled and a response was received.
    pub response_headers: Option<BTreeMap<String, String>>,
    /// Response body, when enabled and a response was received.
    pub response_body: Option<Bytes>,
    /// Response status, when a response was received.
    pub status: Option<u16>,
    /// Error text, when the call failed.
    pub error: Option<String>,
    /// Wall-clock time the call started.
    pub start_time: SystemTime,
    /// Time spent in the inner pipeline.
    pub elapsed: Duration,
}

impl LogRecord {
    /// Whether the record is logged with elevated severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.status.is_some_and(|status| status >= 400)
    }

    /// Start time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn start_time_ms(&self) -> u64 {
        self.start_time
            .duration_since(UNIX_EPOCH)
            .map(|since| u64::try_from(since.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Logging configuration.
///
/// [`LoggerOption::new`] logs everything; the default value is disabled.
#[derive(Clone)]
pub struct LoggerOption {
    /// Whether the client installs the logging interceptor.
    pub enabled: bool,
    /// Event message.
    pub message: String,
    /// Include request headers.
    pub request_headers: bool,
    /// Include the request body.
    pub request_body: bool,
    /// Include response headers.
    pub response_headers: bool,
    /// Include the response body.
    pub response_body: bool,
    /// Custom sink replacing the `tracing` event.
    pub sink: Option<LogSink>,
}

impl Default for LoggerOption {
    fn default() -> Self {
        Self {
            enabled: false,
            message: DEFAULT_LOG_MESSAGE.to_string(),
            request_headers: true,
            request_body: true,
            response_headers: true,
            response_body: true,
            sink: None,
        }
    }
}

impl fmt::Debug for LoggerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerOption")
            .field("enabled", &self.enabled)
            .field("message", &self.message)
            .field("request_headers", &self.request_headers)
            .field("request_body", &self.request_body)
            .field("response_headers", &self.response_headers)
            .field("response_body", &self.response_body)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl LoggerOption {
    /// Log headers and bodies of every exchange.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Set the event message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Toggle header logging for requests and responses.
    #[must_use]
    pub const fn with_headers(mut self, request: bool, response: bool) -> Self {
        self.request_headers = request;
        self.response_headers = response;
        self
    }

    /// Toggle body logging for requests and responses.
    #[must_use]
    pub const fn with_bodies(mut self, request: bool, response: bool) -> Self {
        self.request_body = request;
        self.response_body = response;
        self
    }

    /// Send records to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_sink(mut self, sink: impl Fn(&LogRecord, &str) + Send + Sync + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Whether the client should install the logging interceptor.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Interceptor logging each exchange. See [`LoggerOption`].
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    option: LoggerOption,
}

impl LoggingInterceptor {
    /// Create a logging interceptor.
    #[must_use]
    pub fn new(option: LoggerOption) -> Self {
        Self { option }
    }

    async fn run(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let option = &self.option;
        let method = request.method();
        let url = request.url().to_string();
        let span = info_span!("http_request", %method, %url);

        let mut record = LogRecord {
            method,
            url,
            request_headers: option.request_headers.then(|| sorted(request.headers())),
            request_body: option
                .request_body
                .then(|| request.body().cloned())
                .flatten(),
            response_headers: None,
            response_body: None,
            status: None,
            error: None,
            start_time: SystemTime::now(),
            elapsed: Duration::ZERO,
        };

        let start = Instant::now();
        let result = next.run(request).instrument(span.clone()).await;
        record.elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                record.status = Some(response.status());
                record.response_headers =
                    option.response_headers.then(|| sorted(response.headers()));
                record.response_body = option.response_body.then(|| response.body().clone());
            }
            Err(err) => record.error = Some(err.to_string()),
        }

        span.in_scope(|| match &option.sink {
            Some(sink) => sink(&record, &option.message),
            None => emit(&record, &option.message),
        });

        result
    }
}

impl Interceptor for LoggingInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.run(request, next))
    }
}

fn sorted(headers: &std::collections::HashMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn emit(record: &LogRecord, message: &str) {
    let request_headers = record.request_headers.as_ref().map(|headers| format!("{headers:?}"));
    let response_headers = record.response_headers.as_ref().map(|headers| format!("{headers:?}"));
    let request_body = record.request_body.as_ref().map(|body| String::from_utf8_lossy(body));
    let response_body = record.response_body.as_ref().map(|body| String::from_utf8_lossy(body));

    macro_rules! log_with {
        ($level:ident) => {
            $level!(
                method = %record.method,
                url = %record.url,
                status = record.status,
                error = record.error.as_deref(),
                start_time = record.start_time_ms(),
                elapsed_ms = record.elapsed_ms(),
                request_headers = request_headers.as_deref(),
                request_body = request_body.as_deref(),
                response_headers = response_headers.as_deref(),
                response_body = response_body.as_deref(),
                "{}",
                message
            )
        };
    }

    if record.is_error() {
        log_with!(warn);
    } else {
        log_with!(info);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert2::{check, let_assert};

    use super::*;
    use crate::testing::MockTransport;

    fn capture(option: LoggerOption) -> (LoggingInterceptor, Arc<Mutex<Vec<(LogRecord, String)>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        let option = option.with_sink(move |record, message| {
            sink.lock()
                .expect("lock")
                .push((record.clone(), message.to_string()));
        });
        (LoggingInterceptor::new(option), records)
    }

    fn post() -> Request {
        let url = url::Url::parse("https://example.com/items?x=1").expect("valid url");
        Request::builder(Method::Post, url)
            .header("Content-Type", "text/plain")
            .body(Bytes::from_static(b"ping"))
            .build()
    }

    #[test]
    fn option_defaults() {
        let option = LoggerOption::default();
        check!(!option.is_enabled());
        check!(option.message == "http client request");

        let option = LoggerOption::new();
        check!(option.is_enabled());
        check!(option.request_body);
        check!(option.response_headers);
    }

    #[test]
    fn severity_follows_status_and_error() {
        let record = |status: Option<u16>, error: Option<&str>| LogRecord {
            method: Method::Get,
            url: "https://example.com/".to_string(),
            request_headers: None,
            request_body: None,
            response_headers: None,
            response_body: None,
            status,
            error: error.map(ToString::to_string),
            start_time: UNIX_EPOCH + Duration::from_millis(1_500),
            elapsed: Duration::from_millis(12),
        };

        check!(!record(Some(200), None).is_error());
        check!(!record(Some(399), None).is_error());
        check!(record(Some(400), None).is_error());
        check!(record(Some(503), None).is_error());
        check!(record(None, Some("timeout")).is_error());
        check!(record(Some(200), None).start_time_ms() == 1_500);
        check!(record(Some(200), None).elapsed_ms() == 12);
    }

    #[tokio::test]
    async fn records_the_whole_exchange() {
        let (logging, records) = capture(LoggerOption::new().with_message("outbound"));
        let transport = MockTransport::with_body(201, "pong");

        let response = logging
            .intercept(post(), Next::new(&[], &transport))
            .await
            .expect("response");
        check!(response.status() == 201);

        let records = records.lock().expect("lock");
        let_assert!([(record, message)] = records.as_slice());
        check!(message == "outbound");
        check!(record.method == Method::Post);
        check!(record.url == "https://example.com/items?x=1");
        check!(record.status == Some(201));
        check!(record.error.is_none());
        check!(record.request_body.as_deref() == Some(&b"ping"[..]));
        check!(record.response_body.as_deref() == Some(&b"pong"[..]));
        let_assert!(Some(request_headers) = &record.request_headers);
        check!(request_headers.get("Content-Type").map(String::as_str) == Some("text/plain"));
        let_assert!(Some(response_headers) = &record.response_headers);
        check!(response_headers.get("Content-Length").map(String::as_str) == Some("4"));
    }

    #[tokio::test]
    async fn disabled_flags_leave_fields_empty() {
        let option = LoggerOption::new()
            .with_headers(false, false)
            .with_bodies(false, false);
        let (logging, records) = capture(option);
        let transport = MockTransport::with_body(200, "pong");

        logging
            .intercept(post(), Next::new(&[], &transport))
            .await
            .expect("response");

        let records = records.lock().expect("lock");
        let_assert!([(record, _)] = records.as_slice());
        check!(record.request_headers.is_none());
        check!(record.request_body.is_none());
        check!(record.response_headers.is_none());
        check!(record.response_body.is_none());
    }

    #[tokio::test]
    async fn failed_call_is_recorded_and_returned() {
        let (logging, records) = capture(LoggerOption::new());
        let transport = MockTransport::failing("refused");

        let_assert!(Err(err) = logging.intercept(post(), Next::new(&[], &transport)).await);
        check!(err.is_connection());

        let records = records.lock().expect("lock");
        let_assert!([(record, _)] = records.as_slice());
        check!(record.status.is_none());
        check!(record.error.as_deref() == Some("connection error: refused"));
        check!(record.response_headers.is_none());
        check!(record.is_error());
    }

    #[tokio::test]
    async fn default_output_goes_through_tracing() {
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt().with_test_writer().finish(),
        );
        let logging = LoggingInterceptor::new(LoggerOption::new());
        let transport = MockTransport::with_status(404);

        let response = logging
            .intercept(post(), Next::new(&[], &transport))
            .await
            .expect("response");

        check!(response.status() == 404);
    }
}
