//! HTTP collaborator used for snapshot fetches.
//!
//! The actual HTTP client is abstracted via a trait to allow different
//! implementations (reqwest, hyper, an in-process loopback, etc.).

use crate::error::SyncResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// An HTTP response as seen by the snapshot fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Reason phrase.
    pub reason: String,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a `200 OK` response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            reason: "OK".into(),
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response with a JSON body.
    pub fn json(value: &Value) -> Self {
        Self::ok(value.to_string())
    }

    /// Creates an error response with an empty body.
    pub fn error(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            body: Vec::new(),
        }
    }

    /// Returns true for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Sends a GET request with the given headers.
    ///
    /// Non-2xx statuses are returned as responses, not errors; errors are
    /// reserved for failures to obtain a response at all.
    async fn get(&self, url: &str, headers: &[(String, String)]) -> SyncResult<HttpResponse>;
}

/// A recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Requested URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Returns the value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A mock HTTP client for testing.
///
/// Answers from per-URL scripted responses and records every request.
/// Unknown URLs get `404 Not Found`.
#[derive(Debug, Default)]
pub struct MockHttpClient {
    responses: Mutex<HashMap<String, HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response for a URL.
    pub fn set_response(&self, url: impl Into<String>, response: HttpResponse) {
        self.responses.lock().insert(url.into(), response);
    }

    /// Sets a `200 OK` JSON response for a URL.
    pub fn set_json(&self, url: impl Into<String>, value: &Value) {
        self.set_response(url, HttpResponse::json(value));
    }

    /// Returns all recorded requests.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests were made for a URL.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> SyncResult<HttpResponse> {
        self.requests.lock().push(HttpRequest {
            url: url.to_string(),
            headers: headers.to_vec(),
        });
        Ok(self
            .responses
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| HttpResponse::error(404, "Not Found")))
    }
}
