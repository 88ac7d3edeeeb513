//! Error types for clasp.

use derive_more::{Display, Error, From};

/// Main error type for clasp operations.
///
/// Interceptors never replace an error without keeping a trace of it: wrapping
/// variants such as [`Error::Cancelled`] carry the text of the failure they
/// interrupted.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// The request's cancellation signal fired.
    #[display("request cancelled: {_0}")]
    #[from(skip)]
    Cancelled(#[error(not(source))] String),

    /// A circuit breaker rejected the call without executing it.
    #[display("circuit is open: {circuit}")]
    #[from(skip)]
    CircuitOpen {
        /// Name of the open circuit.
        circuit: String,
    },

    /// The response body is larger than the configured limit.
    #[display("response body too large: {length} bytes exceeds limit of {limit}")]
    #[from(skip)]
    BodyTooLarge {
        /// Declared length, or the bytes received before the limit was crossed.
        length: u64,
        /// Configured maximum.
        limit: u64,
    },

    /// The `Content-Length` header could not be parsed.
    #[display("invalid response content length '{value}'")]
    #[from(skip)]
    InvalidContentLength {
        /// Raw header value.
        value: String,
    },

    /// Encoding or decoding a cached transaction failed.
    #[display("serialization failed: {_0}")]
    #[from(skip)]
    Serialization(#[error(not(source))] String),

    /// An error recorded in a cached transaction, replayed as plain text.
    #[display("{_0}")]
    #[from(skip)]
    Replayed(#[error(not(source))] String),

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Form URL-encoded serialization error.
    #[display("form serialization error: {_0}")]
    #[from]
    FormSerialization(serde_html_form::ser::Error),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a cancellation error with context about what was interrupted.
    #[must_use]
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled(context.into())
    }

    /// Create a circuit-open error for the named circuit.
    #[must_use]
    pub fn circuit_open(circuit: impl Into<String>) -> Self {
        Self::CircuitOpen {
            circuit: circuit.into(),
        }
    }

    /// Create a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the request was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns `true` if a circuit breaker rejected the call.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns `true` if the response exceeded the body size limit.
    #[must_use]
    pub const fn is_body_too_large(&self) -> bool {
        matches!(self, Self::BodyTooLarge { .. })
    }
}
