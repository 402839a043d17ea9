//! HTTP request data model.
//!
//! The request object is the unit that travels through the processing
//! pipeline: variable evaluation, actions and modules all read and mutate
//! it before it is handed to the transport.

use crate::actions::model::ActionCondition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    /// Returns the canonical upper-case name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::GET),
            "POST" => Ok(HttpMethod::POST),
            "PUT" => Ok(HttpMethod::PUT),
            "DELETE" => Ok(HttpMethod::DELETE),
            "PATCH" => Ok(HttpMethod::PATCH),
            "HEAD" => Ok(HttpMethod::HEAD),
            "OPTIONS" => Ok(HttpMethod::OPTIONS),
            other => Err(format!("Unknown HTTP method: {}", other)),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pre- and post-transport action condition groups attached to a request.
///
/// The editor stores the user-configured hooks directly on the request
/// object; the actions runner selects the group matching the pipeline phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionGroups {
    /// Conditions evaluated before the request is transported.
    #[serde(default)]
    pub request: Vec<ActionCondition>,

    /// Conditions evaluated after a response (or error response) arrives.
    #[serde(default)]
    pub response: Vec<ActionCondition>,
}

/// An editor request as consumed by the processing pipeline.
///
/// The URL, header names/values and payload may contain `${...}` template
/// expressions that are resolved during pre-processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Unique identifier used for cancellation records and event
    /// correlation. At most one in-flight pipeline exists per id.
    pub id: String,

    /// HTTP method.
    pub method: HttpMethod,

    /// Target URL, possibly containing template expressions.
    pub url: String,

    /// Request headers as name/value pairs.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Optional request payload (body) as text.
    #[serde(default)]
    pub payload: Option<String>,

    /// User-configured pre/post hooks for this request.
    #[serde(default)]
    pub actions: ActionGroups,
}

impl HttpRequest {
    /// Creates a request with the given id, method and URL.
    pub fn new(id: impl Into<String>, method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method,
            url: url.into(),
            headers: HashMap::new(),
            payload: None,
            actions: ActionGroups::default(),
        }
    }

    /// Creates a request with a generated UUID id.
    pub fn generated(method: HttpMethod, url: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), method, url)
    }

    /// Adds a header to the request.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Sets the request payload.
    pub fn set_payload(&mut self, payload: impl Into<String>) {
        self.payload = Some(payload.into());
    }

    /// Returns `true` if the request carries a non-empty payload.
    pub fn has_payload(&self) -> bool {
        self.payload.as_ref().map_or(false, |p| !p.is_empty())
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
