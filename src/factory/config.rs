//! Transport defaults assembled from application configuration.

use crate::store::PipelineStore;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings handed to the transport alongside the request. Values come from
/// the application configuration; anything absent or ill-typed falls back
/// to the default.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RequestConfig {
    /// Transport timeout in seconds.
    pub timeout_secs: u64,

    /// Whether the transport should follow redirects.
    pub follow_redirects: bool,

    /// Whether the transport injects its default header set.
    pub default_headers: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            follow_redirects: true,
            default_headers: true,
        }
    }
}

impl RequestConfig {
    /// Reads the transport settings from the store's configuration keys.
    pub fn from_store(store: &dyn PipelineStore) -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: store
                .read_config("request.timeout")
                .and_then(|v| v.as_u64())
                .unwrap_or(defaults.timeout_secs),
            follow_redirects: store
                .read_config("request.followRedirects")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.follow_redirects),
            default_headers: store
                .read_config("request.defaultHeaders")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.default_headers),
        }
    }
}
