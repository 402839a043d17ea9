//! Data models for the request/response pipeline.

pub mod request;
pub mod response;

pub use request::{ActionGroups, HttpMethod, HttpRequest};
pub use response::{HttpResponse, TransportMetadata};
