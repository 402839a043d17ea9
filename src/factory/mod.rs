//! Pipeline orchestration: pre-processing, transport, post-processing.
//!
//! The [`RequestFactory`] drives one request through its pipeline: variable
//! evaluation, request actions, request modules, the transport call, then
//! response modules and response actions. Cancellation is cooperative; the
//! shared token is consulted before every step, and an aborted pipeline
//! resolves to `None` rather than an error.

pub mod cancellation;
pub mod config;

pub use cancellation::{
    CancelError, CancellationToken, Connection, ConnectionTracker, SharedConnectionTracker,
};
pub use config::{RequestConfig, DEFAULT_TIMEOUT_SECS};

use crate::actions::ActionsRunner;
use crate::error::PipelineError;
use crate::models::{HttpRequest, HttpResponse, TransportMetadata};
use crate::modules::{
    ExecutionContext, ModuleContext, ModuleError, ModuleHandler, ModulesRegistry, Permission,
    RegisteredModule,
};
use crate::store::{EventBus, PipelineStore};
use crate::variables::{EvaluateOptions, VariablesProcessor};
use crate::BoxFuture;
use std::sync::Arc;
use url::Url;

/// Failure of the transport collaborator itself (connection refused, DNS,
/// timeout). HTTP error statuses are not transport errors.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// What the transport produced: the response plus timing facts.
#[derive(Debug, Clone)]
pub struct TransportOutcome {
    pub response: HttpResponse,
    pub metadata: TransportMetadata,
}

/// The only network-performing collaborator. The factory treats it as
/// opaque; anything implementing this trait can back the pipeline.
pub trait Transport: Send + Sync {
    fn transport<'a>(
        &'a self,
        request: &'a HttpRequest,
        id: &'a str,
        config: &'a RequestConfig,
    ) -> BoxFuture<'a, Result<TransportOutcome, TransportError>>;
}

/// Per-run options.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOptions {
    /// Evaluate `${...}` expressions over the request before sending.
    pub evaluate_variables: bool,

    /// Include host-provided system variables in the evaluation context.
    pub evaluate_system_variables: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            evaluate_variables: true,
            evaluate_system_variables: false,
        }
    }
}

impl ProcessOptions {
    fn eval_options(&self) -> EvaluateOptions {
        EvaluateOptions {
            evaluate_system_variables: self.evaluate_system_variables,
        }
    }
}

/// Pipeline states, logged as a request progresses. `Aborted` is terminal
/// and reachable from any state before `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Created,
    PreProcessing,
    Transported,
    PostProcessing,
    Completed,
    Aborted,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Created => "created",
            PipelineState::PreProcessing => "pre-processing",
            PipelineState::Transported => "transported",
            PipelineState::PostProcessing => "post-processing",
            PipelineState::Completed => "completed",
            PipelineState::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Builds and drives request pipelines.
pub struct RequestFactory {
    store: Arc<dyn PipelineStore>,
    events: Arc<dyn EventBus>,
    transport: Arc<dyn Transport>,
    registry: ModulesRegistry,
    runner: ActionsRunner,
    tracker: SharedConnectionTracker,
}

impl RequestFactory {
    /// The registry is taken by value: modules are wired before the factory
    /// exists and the set is fixed afterwards.
    pub fn new(
        store: Arc<dyn PipelineStore>,
        events: Arc<dyn EventBus>,
        transport: Arc<dyn Transport>,
        registry: ModulesRegistry,
    ) -> Self {
        let runner = ActionsRunner::new(Arc::clone(&store), Arc::clone(&events));
        Self {
            store,
            events,
            transport,
            registry,
            runner,
            tracker: SharedConnectionTracker::new(),
        }
    }

    /// Cancellation records of the in-flight pipelines.
    pub fn tracker(&self) -> &SharedConnectionTracker {
        &self.tracker
    }

    /// Flips the cancellation record for `id` and signals the shared token.
    /// Steps already completed are not rolled back; remaining steps are
    /// skipped at their next cancellation check. The flagged record stays
    /// until the pipeline observes the cancellation and winds down, so an
    /// abort issued between phases is still seen by the later phase.
    pub fn abort(&self, id: &str) -> Result<(), CancelError> {
        log::debug!("request {} entering {}", id, PipelineState::Aborted);
        self.tracker.abort(id)
    }

    /// Pre-processes a request: variable evaluation, request actions, then
    /// request modules in registration order.
    ///
    /// Resolves to `Ok(None)` when the pipeline was aborted mid-flight,
    /// otherwise to the possibly mutated request. The cancellation record
    /// stays registered for the transport step that follows.
    pub async fn process_request(
        &self,
        mut request: HttpRequest,
        options: &ProcessOptions,
    ) -> Result<Option<HttpRequest>, PipelineError> {
        let token = self.tracker.register(&request.id)?;
        match self.pre_process(&mut request, &token, options).await {
            Ok(true) => Ok(Some(request)),
            Ok(false) => {
                self.tracker.unregister(&request.id)?;
                Ok(None)
            }
            Err(err) => {
                self.tracker.unregister(&request.id)?;
                Err(err)
            }
        }
    }

    /// Post-processes a delivered (or synthesized) response: response
    /// modules first, so transport facts are normalized before user hooks
    /// observe them, then response actions. Destroys the cancellation
    /// record on every exit, success or not.
    ///
    /// An abort issued after pre-processing leaves a flagged record
    /// behind; every post-processing step is skipped for it.
    pub async fn process_response(
        &self,
        request: &HttpRequest,
        executed: &TransportMetadata,
        response: &HttpResponse,
        options: &ProcessOptions,
    ) -> Result<(), PipelineError> {
        let result = self.post_process(request, executed, response, options).await;
        self.tracker.unregister(&request.id)?;
        result
    }

    async fn post_process(
        &self,
        request: &HttpRequest,
        executed: &TransportMetadata,
        response: &HttpResponse,
        options: &ProcessOptions,
    ) -> Result<(), PipelineError> {
        let token = self.tracker.token_for(&request.id)?.unwrap_or_default();
        if token.is_cancelled() {
            return Ok(());
        }

        for module in self.registry.get(ModuleContext::Response) {
            if token.is_cancelled() {
                break;
            }
            match self
                .execute_response_module(&module, request, executed, response, &token)
                .await
            {
                Ok(0) => {}
                Ok(status) => {
                    log::info!(
                        "response module '{}' halted the chain with status {}",
                        module.id,
                        status
                    );
                    break;
                }
                Err(err) => {
                    log::warn!("response module '{}' failed, halting chain: {}", module.id, err);
                    break;
                }
            }
        }

        if !token.is_cancelled() {
            let mut processor = VariablesProcessor::new(self.store.read_environment());
            self.runner
                .process_response_actions(
                    request,
                    executed,
                    response,
                    &mut processor,
                    &options.eval_options(),
                )
                .await?;
        }

        Ok(())
    }

    /// Drives the whole pipeline for one request and returns the response.
    ///
    /// A pre-processing failure does not reject: it synthesizes a
    /// zero-status error response and still runs post-processing over it.
    /// An aborted pipeline resolves to `Ok(None)`.
    pub async fn run(
        &self,
        request: HttpRequest,
        options: &ProcessOptions,
    ) -> Result<Option<HttpResponse>, PipelineError> {
        let id = request.id.clone();
        log::debug!("request {} entering {}", id, PipelineState::Created);
        let token = self.tracker.register(&id)?;

        log::debug!("request {} entering {}", id, PipelineState::PreProcessing);
        let mut request = request;
        let pre = self.pre_process(&mut request, &token, options).await;

        let (executed, response) = match pre {
            Ok(false) => {
                self.tracker.unregister(&id)?;
                return Ok(None);
            }
            Ok(true) => match validate_url(&request.url) {
                Err(err) => (
                    TransportMetadata::failed(),
                    HttpResponse::synthesized_error(err.to_string()),
                ),
                Ok(()) => {
                    if token.is_cancelled() {
                        self.tracker.unregister(&id)?;
                        return Ok(None);
                    }
                    let config = RequestConfig::from_store(&*self.store);
                    match self.transport.transport(&request, &id, &config).await {
                        Ok(outcome) => {
                            log::debug!(
                                "request {} entering {}",
                                id,
                                PipelineState::Transported
                            );
                            (outcome.metadata, outcome.response)
                        }
                        Err(err) => (
                            TransportMetadata::failed(),
                            HttpResponse::synthesized_error(err.to_string()),
                        ),
                    }
                }
            },
            Err(err) => (
                TransportMetadata::failed(),
                HttpResponse::synthesized_error(err.to_string()),
            ),
        };

        if token.is_cancelled() {
            self.tracker.unregister(&id)?;
            return Ok(None);
        }

        log::debug!("request {} entering {}", id, PipelineState::PostProcessing);
        self.process_response(&request, &executed, &response, options)
            .await?;

        log::debug!("request {} entering {}", id, PipelineState::Completed);
        Ok(Some(response))
    }

    async fn pre_process(
        &self,
        request: &mut HttpRequest,
        token: &CancellationToken,
        options: &ProcessOptions,
    ) -> Result<bool, PipelineError> {
        if token.is_cancelled() {
            return Ok(false);
        }

        // One processor per run: the now/random group caches live exactly
        // as long as this request's evaluation session.
        let mut processor = VariablesProcessor::new(self.store.read_environment());
        let eval_options = options.eval_options();

        if options.evaluate_variables {
            processor.evaluate_request(request, &eval_options)?;
        }

        if token.is_cancelled() {
            return Ok(false);
        }

        self.runner
            .process_request_actions(request, &mut processor, &eval_options)
            .await?;

        for module in self.registry.get(ModuleContext::Request) {
            if token.is_cancelled() {
                return Ok(false);
            }
            match self.execute_request_module(&module, request, token).await {
                Ok(0) => {}
                Ok(status) => {
                    log::info!(
                        "request module '{}' halted the chain with status {}",
                        module.id,
                        status
                    );
                    break;
                }
                Err(err) => {
                    log::warn!("request module '{}' failed, halting chain: {}", module.id, err);
                    break;
                }
            }
        }

        Ok(!token.is_cancelled())
    }

    async fn execute_request_module(
        &self,
        module: &RegisteredModule,
        request: &mut HttpRequest,
        token: &CancellationToken,
    ) -> Result<i32, ModuleError> {
        let context = self.build_execution_context(&module.permissions);
        let ModuleHandler::Request(handler) = &module.handler else {
            return Err(ModuleError::new(format!(
                "module '{}' does not handle the request phase",
                module.id
            )));
        };
        handler.on_request(request, &context, token).await
    }

    async fn execute_response_module(
        &self,
        module: &RegisteredModule,
        request: &HttpRequest,
        executed: &TransportMetadata,
        response: &HttpResponse,
        token: &CancellationToken,
    ) -> Result<i32, ModuleError> {
        let context = self.build_execution_context(&module.permissions);
        let ModuleHandler::Response(handler) = &module.handler else {
            return Err(ModuleError::new(format!(
                "module '{}' does not handle the response phase",
                module.id
            )));
        };
        handler
            .on_response(request, executed, response, &context, token)
            .await
    }

    /// Builds the permission-scoped sandbox one module invocation runs in.
    fn build_execution_context(&self, permissions: &[Permission]) -> ExecutionContext {
        ExecutionContext::new(
            permissions.to_vec(),
            self.store.read_environment(),
            Arc::clone(&self.store),
            Arc::clone(&self.events),
        )
    }
}

/// The transport only speaks http and https; anything else is refused
/// before the request leaves the pipeline.
fn validate_url(raw: &str) -> Result<(), PipelineError> {
    let parsed =
        Url::parse(raw).map_err(|err| PipelineError::InvalidUrl(format!("{}: {}", raw, err)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(PipelineError::UnsupportedProtocol(scheme.to_string())),
    }
}
