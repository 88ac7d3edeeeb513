//! Prelude module for convenient imports.
//!
//! ```ignore
//! use clasp_core::prelude::*;
//! ```

pub use crate::{
    ContentType, Error, HttpClient, HttpClientExt, Method, Request, RequestBuilder, Response,
    Result, from_json, to_form, to_json,
};
