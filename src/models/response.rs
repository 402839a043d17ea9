//! HTTP response data model and transport metadata.
//!
//! Responses are produced by the external transport and normalized by the
//! post-processing phase. A failed pre-processing run synthesizes a
//! zero-status error response instead of surfacing a bare error, so the
//! consuming UI always has something renderable.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Facts recorded by the transport about how a request was actually sent.
///
/// Passed to response conditions and modules so hooks can observe what went
/// over the wire, not just what the editor configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMetadata {
    /// Millisecond timestamp at which the transport call started.
    pub started_at: i64,

    /// Wall-clock duration of the transport call.
    pub duration: Duration,

    /// The serialized HTTP message as sent, when the transport records it.
    #[serde(default)]
    pub sent_http_message: Option<String>,
}

impl TransportMetadata {
    /// Creates metadata for a completed transport call.
    pub fn new(started_at: i64, duration: Duration) -> Self {
        Self {
            started_at,
            duration,
            sent_http_message: None,
        }
    }

    /// Metadata for a transport call that failed before completing.
    pub fn failed() -> Self {
        Self::new(Utc::now().timestamp_millis(), Duration::from_secs(0))
    }
}

/// An HTTP response as seen by the post-processing phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpResponse {
    /// HTTP status code. `0` marks a response synthesized by the pipeline
    /// for a pre-processing or transport failure.
    pub status: u16,

    /// Human-readable status text.
    pub status_text: String,

    /// Response headers as name/value pairs.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response payload as text, when one was received.
    #[serde(default)]
    pub payload: Option<String>,

    /// The error message behind a synthesized error response.
    #[serde(default)]
    pub error: Option<String>,
}

impl HttpResponse {
    /// Creates a response with the given status and status text.
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: HashMap::new(),
            payload: None,
            error: None,
        }
    }

    /// Creates a plain 200 response, useful as a test fixture.
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// Synthesizes the zero-status error response delivered when the
    /// pipeline fails before the transport produced anything.
    pub fn synthesized_error(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut response = Self::new(0, "Request failed");
        response.error = Some(message);
        response
    }

    /// Returns `true` for a synthesized error response.
    pub fn is_error(&self) -> bool {
        self.status == 0 || self.error.is_some()
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
