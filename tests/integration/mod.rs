//! Integration tests for the request engine.
//!
//! Shared fixtures: an in-memory store and event bus, a scriptable mock
//! transport, and a handful of reusable test modules.

pub mod end_to_end_test;
pub mod module_chain_test;
pub mod request_chaining_test;

use request_engine::factory::{
    RequestConfig, RequestFactory, Transport, TransportError, TransportOutcome,
};
use request_engine::models::{HttpRequest, HttpResponse, TransportMetadata};
use request_engine::modules::ModulesRegistry;
use request_engine::store::{EventBus, InMemoryBus, InMemoryStore, PipelineStore};
use request_engine::variables::EnvironmentSnapshot;
use request_engine::BoxFuture;
use std::sync::{Mutex, Once};
use std::sync::Arc;

static INIT: Once = Once::new();

/// Initialize test environment (run once).
pub fn init_test_env() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Transport double: replies with a configured response and records every
/// request it was handed.
pub struct MockTransport {
    response: Mutex<HttpResponse>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn replying(response: HttpResponse) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::replying(HttpResponse::ok())
    }

    pub fn set_response(&self, response: HttpResponse) {
        *self.response.lock().unwrap() = response;
    }

    /// Requests handed to the transport, in order.
    pub fn seen(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn transport<'a>(
        &'a self,
        request: &'a HttpRequest,
        _id: &'a str,
        _config: &'a RequestConfig,
    ) -> BoxFuture<'a, Result<TransportOutcome, TransportError>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(request.clone());
            Ok(TransportOutcome {
                response: self.response.lock().unwrap().clone(),
                metadata: TransportMetadata::new(chrono::Utc::now().timestamp_millis(), std::time::Duration::from_millis(5)),
            })
        })
    }
}

/// Everything a test scenario needs, pre-wired.
pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub events: Arc<InMemoryBus>,
    pub transport: Arc<MockTransport>,
    pub factory: RequestFactory,
}

/// Builds a factory over an environment with `host` and `token` defined.
pub fn fixture(registry: ModulesRegistry) -> Fixture {
    init_test_env();
    let mut snapshot = EnvironmentSnapshot::new("default");
    snapshot.add_variable("host", "api.example.com");
    snapshot.add_variable("token", "bearer_token_12345");

    let store = Arc::new(InMemoryStore::with_environment(snapshot));
    let events = Arc::new(InMemoryBus::new());
    let transport = MockTransport::ok();
    let factory = RequestFactory::new(
        Arc::clone(&store) as Arc<dyn PipelineStore>,
        Arc::clone(&events) as Arc<dyn EventBus>,
        Arc::clone(&transport) as Arc<dyn Transport>,
        registry,
    );
    Fixture {
        store,
        events,
        transport,
        factory,
    }
}
