//! Prelude module for convenient imports.
//!
//! ```ignore
//! use clasp::prelude::*;
//! ```

pub use crate::{
    Client, ClientBuilder, ClientConfig, ContentType, Error, HttpClient, HttpClientExt,
    Interceptor, Method, Next, Request, RequestBuilder, Response, Result, StatusCode, chain,
    from_json, header, interceptor_fn, to_form, to_json,
};
pub use serde::{Deserialize, Serialize};
