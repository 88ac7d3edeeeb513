//! Serialization of request/response transactions.

use std::collections::{BTreeMap, HashMap};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::{StatusCode, Version};
use serde::{Deserialize, Serialize};

use crate::{Error, Method, Request, Response, Result};

/// A request together with its response or terminal error.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// The request.
    pub request: Request,
    /// The response, when one was received.
    pub response: Option<Response>,
    /// Text of the terminal error, when the exchange failed.
    pub error: Option<String>,
}

impl Transaction {
    /// The outcome this transaction recorded.
    ///
    /// A recorded error wins over a response. `None` when neither was
    /// recorded.
    #[must_use]
    pub fn replay(self) -> Option<Result<Response>> {
        match (self.error, self.response) {
            (Some(message), _) => Some(Err(Error::Replayed(message))),
            (None, Some(response)) => Some(Ok(response)),
            (None, None) => None,
        }
    }
}

/// Converts transactions to and from bytes.
pub trait TransactionCodec: Send + Sync {
    /// Encode an exchange.
    fn encode(&self, request: &Request, result: &Result<Response>) -> Result<Bytes>;

    /// Decode bytes produced by [`TransactionCodec::encode`].
    fn decode(&self, bytes: &[u8]) -> Result<Transaction>;
}

/// JSON transaction codec; bodies are stored as base64 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Record {
    method: String,
    url: String,
    request_headers: BTreeMap<String, String>,
    request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    status_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    proto: String,
    proto_major: u8,
    proto_minor: u8,
    response_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TransactionCodec for JsonCodec {
    fn encode(&self, request: &Request, result: &Result<Response>) -> Result<Bytes> {
        let mut record = Record {
            method: request.method().to_string(),
            url: request.url().to_string(),
            request_headers: sorted(request.headers()),
            request_body: request.body().map(|body| STANDARD.encode(body)),
            ..Record::default()
        };

        match result {
            Ok(response) => {
                let (proto, proto_major, proto_minor) = protocol(response.version());
                let status = response.status();
                record.status = Some(match StatusCode::from_u16(status)
                    .ok()
                    .and_then(|code| code.canonical_reason())
                {
                    Some(reason) => format!("{status} {reason}"),
                    None => status.to_string(),
                });
                record.status_code = i32::from(status);
                record.proto = proto.to_string();
                record.proto_major = proto_major;
                record.proto_minor = proto_minor;
                record.response_headers = sorted(response.headers());
                record.response_body = Some(STANDARD.encode(response.body()));
            }
            Err(err) => record.error = Some(err.to_string()),
        }

        serde_json::to_vec(&record)
            .map(Bytes::from)
            .map_err(|err| Error::serialization(err.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Transaction> {
        let record: Record =
            serde_json::from_slice(bytes).map_err(|err| Error::serialization(err.to_string()))?;

        let method: Method = record.method.parse()?;
        let url = url::Url::parse(&record.url)?;
        let mut builder = Request::builder(method, url).headers(record.request_headers);
        if let Some(body) = record.request_body {
            builder = builder.body(decode_body(&body)?);
        }

        let response = match u16::try_from(record.status_code) {
            Ok(status) if status > 0 => {
                let body = record
                    .response_body
                    .as_deref()
                    .map(decode_body)
                    .transpose()?
                    .unwrap_or_default();
                let headers: HashMap<_, _> = record.response_headers.into_iter().collect();
                Some(
                    Response::new(status, headers, body)
                        .with_version(version(record.proto_major, record.proto_minor)),
                )
            }
            _ => None,
        };

        Ok(Transaction {
            request: builder.build(),
            response,
            error: record.error,
        })
    }
}

fn sorted(headers: &HashMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn decode_body(encoded: &str) -> Result<Bytes> {
    STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(|err| Error::serialization(format!("invalid body encoding: {err}")))
}

fn protocol(version: Version) -> (&'static str, u8, u8) {
    match version {
        Version::HTTP_09 => ("HTTP/0.9", 0, 9),
        Version::HTTP_10 => ("HTTP/1.0", 1, 0),
        Version::HTTP_2 => ("HTTP/2.0", 2, 0),
        Version::HTTP_3 => ("HTTP/3.0", 3, 0),
        _ => ("HTTP/1.1", 1, 1),
    }
}

fn version(major: u8, minor: u8) -> Version {
    match (major, minor) {
        (0, _) => Version::HTTP_09,
        (1, 0) => Version::HTTP_10,
        (2, _) => Version::HTTP_2,
        (3, _) => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}
