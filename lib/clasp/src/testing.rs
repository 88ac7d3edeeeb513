//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::{Error, HttpClient, Method, Request, Response, Result};

type Responder = dyn Fn(u32, &Request) -> Result<Response> + Send + Sync;

/// Transport answering from a closure, counting calls and recording requests.
#[derive(Clone)]
pub(crate) struct MockTransport {
    responder: Arc<Responder>,
    call_count: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockTransport {
    /// Answer every call with `responder(attempt_index, request)`.
    pub(crate) fn from_fn(
        responder: impl Fn(u32, &Request) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            call_count: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_status(status: u16) -> Self {
        Self::from_fn(move |_, _| Ok(Response::new(status, HashMap::new(), Bytes::new())))
    }

    pub(crate) fn with_body(status: u16, body: &'static str) -> Self {
        Self::from_fn(move |_, _| {
            let mut headers = HashMap::new();
            headers.insert("Content-Length".to_string(), body.len().to_string());
            headers.insert("Content-Type".to_string(), "text/plain".to_string());
            Ok(Response::new(status, headers, Bytes::from_static(body.as_bytes())))
        })
    }

    /// Answer with `statuses[n]` on the n-th call, repeating the last one.
    pub(crate) fn with_statuses(statuses: Vec<u16>) -> Self {
        Self::from_fn(move |attempt, _| {
            let index = usize::try_from(attempt).unwrap_or(usize::MAX);
            let status = statuses
                .get(index)
                .or_else(|| statuses.last())
                .copied()
                .unwrap_or(200);
            Ok(Response::new(status, HashMap::new(), Bytes::new()))
        })
    }

    pub(crate) fn failing(message: &'static str) -> Self {
        Self::from_fn(move |_, _| Err(Error::connection(message)))
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("lock").clone()
    }
}

impl HttpClient for MockTransport {
    async fn execute(&self, request: Request) -> Result<Response> {
        let attempt = self.call_count.fetch_add(1, Ordering::SeqCst);
        let result = (self.responder)(attempt, &request);
        self.requests.lock().expect("lock").push(request);
        result
    }
}

pub(crate) fn get(url: &str) -> Request {
    request(Method::Get, url)
}

pub(crate) fn request(method: Method, url: &str) -> Request {
    let url = url::Url::parse(url).expect("valid url");
    Request::builder(method, url).build()
}
