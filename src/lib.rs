//! Request processing engine for a REST client.
//!
//! This crate implements the request/response pipeline that sits between a
//! host UI and the network: `${...}` expression evaluation over requests,
//! priority-ordered conditional actions, permission-scoped pluggable
//! modules, and a request factory with per-request cooperative
//! cancellation. The network itself stays behind the [`factory::Transport`]
//! trait; persistence stays behind [`store::PipelineStore`].
//!
//! # Example
//!
//! ```no_run
//! use request_engine::factory::{ProcessOptions, RequestFactory};
//! use request_engine::models::{HttpMethod, HttpRequest};
//! use request_engine::modules::ModulesRegistry;
//! use request_engine::store::{InMemoryBus, InMemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example(transport: Arc<dyn request_engine::factory::Transport>) {
//! let store = Arc::new(InMemoryStore::new());
//! let events = Arc::new(InMemoryBus::new());
//! let factory = RequestFactory::new(store, events, transport, ModulesRegistry::new());
//!
//! let request = HttpRequest::generated(HttpMethod::GET, "https://${host}/v1/users");
//! let response = factory.run(request, &ProcessOptions::default()).await;
//! # let _ = response;
//! # }
//! ```

pub mod actions;
pub mod error;
pub mod factory;
pub mod models;
pub mod modules;
pub mod store;
pub mod variables;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used at the crate's async trait seams (modules and the
/// transport).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use error::PipelineError;
pub use factory::{ProcessOptions, RequestFactory, Transport};
pub use models::{HttpMethod, HttpRequest, HttpResponse, TransportMetadata};
pub use modules::{ModuleContext, ModulesRegistry, Permission};
pub use variables::{EvaluateOptions, VariablesProcessor};
