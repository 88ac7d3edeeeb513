//! Encoding of request bodies and decoding of response bodies.
//!
//! Requests carry JSON or form bodies, built by [`RequestBuilder::json`] and
//! [`RequestBuilder::form`]; responses are decoded from JSON with errors that
//! name the offending field.
//!
//! [`RequestBuilder::json`]: crate::RequestBuilder::json
//! [`RequestBuilder::form`]: crate::RequestBuilder::form

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Media types of the bodies this client encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded`
    FormUrlEncoded,
    /// `text/plain`
    PlainText,
    /// `application/octet-stream`
    OctetStream,
}

impl ContentType {
    /// Media type without parameters.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
        }
    }

    /// Recognize a `Content-Type` header value, ignoring parameters such as
    /// `charset` and letter case.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or_default().trim();
        [
            Self::Json,
            Self::FormUrlEncoded,
            Self::PlainText,
            Self::OctetStream,
        ]
        .into_iter()
        .find(|candidate| candidate.as_str().eq_ignore_ascii_case(essence))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode `value` as a JSON body.
///
/// ```
/// let body = clasp_core::to_json(&[1, 2, 3]).expect("encodable");
/// assert_eq!(&body[..], b"[1,2,3]");
/// ```
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    let encoded = serde_json::to_vec(value)?;
    Ok(Bytes::from(encoded))
}

/// Encode `value` as an `application/x-www-form-urlencoded` body.
///
/// Sequences become repeated fields (`tag=a&tag=b`) and `None` fields are left
/// out.
pub fn to_form<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    let encoded = serde_html_form::to_string(value)?;
    Ok(Bytes::from(encoded))
}

/// Decode a JSON body.
///
/// On failure the error carries the path of the field that could not be read,
/// e.g. `items[1].id`.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|err| Error::json_deserialization(err.path().to_string(), err.inner().to_string()))
}
