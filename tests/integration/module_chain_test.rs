//! Module chain behavior: registration order, halting, cancellation and
//! permission scoping observed through the factory.

use super::fixture;
use request_engine::factory::{CancellationToken, ProcessOptions};
use request_engine::models::{HttpMethod, HttpRequest, HttpResponse, TransportMetadata};
use request_engine::modules::{
    ExecutionContext, ModuleContext, ModuleError, ModuleHandler, ModulesRegistry, Permission,
    RegistryError, RequestModule, ResponseModule,
};
use request_engine::store::PipelineStore;
use request_engine::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Returns a fixed status and counts its invocations.
struct StatusModule {
    status: i32,
    calls: Arc<AtomicUsize>,
}

impl StatusModule {
    fn new(status: i32) -> (Arc<AtomicUsize>, Arc<Self>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let module = Arc::new(Self {
            status,
            calls: Arc::clone(&calls),
        });
        (calls, module)
    }
}

impl RequestModule for StatusModule {
    fn on_request<'a>(
        &'a self,
        _request: &'a mut HttpRequest,
        _context: &'a ExecutionContext,
        _token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.status)
        })
    }
}

impl ResponseModule for StatusModule {
    fn on_response<'a>(
        &'a self,
        _request: &'a HttpRequest,
        _executed: &'a TransportMetadata,
        _response: &'a HttpResponse,
        _context: &'a ExecutionContext,
        _token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.status)
        })
    }
}

/// Always fails.
struct FailingModule;

impl RequestModule for FailingModule {
    fn on_request<'a>(
        &'a self,
        _request: &'a mut HttpRequest,
        _context: &'a ExecutionContext,
        _token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>> {
        Box::pin(async { Err(ModuleError::new("boom")) })
    }
}

/// Signals the shared token, as an out-of-band abort would.
struct CancelModule;

impl RequestModule for CancelModule {
    fn on_request<'a>(
        &'a self,
        _request: &'a mut HttpRequest,
        _context: &'a ExecutionContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>> {
        Box::pin(async move {
            token.cancel();
            Ok(0)
        })
    }
}

/// Mutates the request before transport.
struct HeaderModule;

impl RequestModule for HeaderModule {
    fn on_request<'a>(
        &'a self,
        request: &'a mut HttpRequest,
        _context: &'a ExecutionContext,
        _token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>> {
        Box::pin(async move {
            request.add_header("X-Trace", "injected");
            Ok(0)
        })
    }
}

/// Writes a variable through its scoped store facade.
struct WriterModule;

impl RequestModule for WriterModule {
    fn on_request<'a>(
        &'a self,
        _request: &'a mut HttpRequest,
        context: &'a ExecutionContext,
        _token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>> {
        Box::pin(async move {
            context
                .store()
                .set_variable("module_wrote", "1")
                .map_err(|e| ModuleError::new(e.to_string()))?;
            Ok(0)
        })
    }
}

fn request() -> HttpRequest {
    HttpRequest::new("mod-1", HttpMethod::GET, "https://${host}/v1")
}

#[tokio::test]
async fn test_non_zero_status_halts_remaining_chain() {
    let (first_calls, first) = StatusModule::new(1);
    let (second_calls, second) = StatusModule::new(0);

    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Request,
            "halting",
            ModuleHandler::Request(first),
            vec![],
        )
        .unwrap();
    registry
        .register(
            ModuleContext::Request,
            "never-runs",
            ModuleHandler::Request(second),
            vec![],
        )
        .unwrap();

    let fx = fixture(registry);
    let processed = fx
        .factory
        .process_request(request(), &ProcessOptions::default())
        .await
        .unwrap();

    // The halt only cuts the chain; pre-processing still succeeds.
    assert!(processed.is_some());
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_module_error_halts_chain_but_request_proceeds() {
    let (second_calls, second) = StatusModule::new(0);

    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Request,
            "failing",
            ModuleHandler::Request(Arc::new(FailingModule)),
            vec![],
        )
        .unwrap();
    registry
        .register(
            ModuleContext::Request,
            "after-failure",
            ModuleHandler::Request(second),
            vec![],
        )
        .unwrap();

    let fx = fixture(registry);
    let response = fx
        .factory
        .run(request(), &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancellation_skips_remaining_modules_and_yields_none() {
    let (second_calls, second) = StatusModule::new(0);

    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Request,
            "cancelling",
            ModuleHandler::Request(Arc::new(CancelModule)),
            vec![],
        )
        .unwrap();
    registry
        .register(
            ModuleContext::Request,
            "after-cancel",
            ModuleHandler::Request(second),
            vec![],
        )
        .unwrap();

    let fx = fixture(registry);
    let processed = fx
        .factory
        .process_request(request(), &ProcessOptions::default())
        .await
        .unwrap();

    assert!(processed.is_none());
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);

    // The abandoned pipeline must not leave its record behind.
    assert!(!fx.factory.tracker().is_active("mod-1").unwrap());
}

#[tokio::test]
async fn test_module_mutation_reaches_transport() {
    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Request,
            "tracing",
            ModuleHandler::Request(Arc::new(HeaderModule)),
            vec![],
        )
        .unwrap();

    let fx = fixture(registry);
    fx.factory
        .run(request(), &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let seen = fx.transport.seen();
    assert_eq!(seen[0].header("X-Trace"), Some("injected"));
}

#[tokio::test]
async fn test_write_without_permission_is_dropped() {
    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Request,
            "writer",
            ModuleHandler::Request(Arc::new(WriterModule)),
            vec![],
        )
        .unwrap();

    let fx = fixture(registry);
    fx.factory
        .run(request(), &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let snapshot = fx.store.read_environment();
    assert!(snapshot.variables.iter().all(|v| v.name != "module_wrote"));
}

#[tokio::test]
async fn test_write_with_permission_lands_in_store() {
    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Request,
            "writer",
            ModuleHandler::Request(Arc::new(WriterModule)),
            vec![Permission::StoreWrite],
        )
        .unwrap();

    let fx = fixture(registry);
    fx.factory
        .run(request(), &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    let snapshot = fx.store.read_environment();
    assert!(snapshot.variables.iter().any(|v| v.name == "module_wrote"));
}

#[tokio::test]
async fn test_response_module_halt_cuts_response_chain_only() {
    let (first_calls, first) = StatusModule::new(2);
    let (second_calls, second) = StatusModule::new(0);

    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Response,
            "normalizer",
            ModuleHandler::Response(first),
            vec![],
        )
        .unwrap();
    registry
        .register(
            ModuleContext::Response,
            "after-halt",
            ModuleHandler::Response(second),
            vec![],
        )
        .unwrap();

    let fx = fixture(registry);
    let response = fx
        .factory
        .run(request(), &ProcessOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let (_, module) = StatusModule::new(0);
    let mut registry = ModulesRegistry::new();
    registry
        .register(
            ModuleContext::Request,
            "auth",
            ModuleHandler::Request(Arc::clone(&module) as Arc<dyn RequestModule>),
            vec![],
        )
        .unwrap();

    let err = registry
        .register(
            ModuleContext::Request,
            "auth",
            ModuleHandler::Request(module),
            vec![],
        )
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateId { .. }));
    assert!(registry.has(ModuleContext::Request, "auth"));
}
