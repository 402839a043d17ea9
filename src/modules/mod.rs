//! Pluggable request/response modules and their registry.
//!
//! Modules are host-supplied hooks that run during pre- and post-processing,
//! outside the configured action model. They are registered once at wiring
//! time with a declared permission list and invoked per request with a
//! permission-scoped [`ExecutionContext`].

pub mod context;

pub use context::{ExecutionContext, Permission, ScopedEvents, ScopedStore};

use crate::factory::CancellationToken;
use crate::models::{HttpRequest, HttpResponse, TransportMetadata};
use crate::BoxFuture;
use std::sync::Arc;

/// The pipeline phase a module participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleContext {
    Request,
    Response,
}

impl std::fmt::Display for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModuleContext::Request => write!(f, "request"),
            ModuleContext::Response => write!(f, "response"),
        }
    }
}

/// Error raised by a module implementation. Treated by the factory as a
/// halting failure for the remaining chain of that phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleError {
    pub message: String,
}

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ModuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Module error: {}", self.message)
    }
}

impl std::error::Error for ModuleError {}

/// Errors from registry mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// A module with this id already exists under the context.
    DuplicateId { context: ModuleContext, id: String },

    /// The handler's phase does not match the registration context.
    ContextMismatch { context: ModuleContext, id: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateId { context, id } => {
                write!(f, "Module '{}' is already registered for {}", id, context)
            }
            RegistryError::ContextMismatch { context, id } => {
                write!(f, "Module '{}' does not handle the {} phase", id, context)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// A pre-processing hook. Returns a status code: `0` continues the chain,
/// any other value halts the remaining request modules.
pub trait RequestModule: Send + Sync {
    fn on_request<'a>(
        &'a self,
        request: &'a mut HttpRequest,
        context: &'a ExecutionContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>>;
}

/// A post-processing hook, invoked with the transport facts. Same status
/// convention as [`RequestModule`].
pub trait ResponseModule: Send + Sync {
    fn on_response<'a>(
        &'a self,
        request: &'a HttpRequest,
        executed: &'a TransportMetadata,
        response: &'a HttpResponse,
        context: &'a ExecutionContext,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<i32, ModuleError>>;
}

/// Phase-specific module function.
#[derive(Clone)]
pub enum ModuleHandler {
    Request(Arc<dyn RequestModule>),
    Response(Arc<dyn ResponseModule>),
}

impl ModuleHandler {
    fn matches(&self, context: ModuleContext) -> bool {
        matches!(
            (self, context),
            (ModuleHandler::Request(_), ModuleContext::Request)
                | (ModuleHandler::Response(_), ModuleContext::Response)
        )
    }
}

/// One registered module: id, granted permissions and the handler.
#[derive(Clone)]
pub struct RegisteredModule {
    pub id: String,
    pub permissions: Vec<Permission>,
    pub handler: ModuleHandler,
}

/// Holds the registered modules per phase, in registration order.
///
/// The registry is an explicit object handed to the factory at construction
/// time. `get` returns a snapshot so iteration never races with later
/// registrations and callers cannot mutate the registry through it.
#[derive(Default)]
pub struct ModulesRegistry {
    request: Vec<RegisteredModule>,
    response: Vec<RegisteredModule>,
}

impl ModulesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under the given phase.
    ///
    /// Fails when the id is already taken for that phase or when the handler
    /// does not implement that phase.
    pub fn register(
        &mut self,
        context: ModuleContext,
        id: impl Into<String>,
        handler: ModuleHandler,
        permissions: Vec<Permission>,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if !handler.matches(context) {
            return Err(RegistryError::ContextMismatch { context, id });
        }
        if self.has(context, &id) {
            return Err(RegistryError::DuplicateId { context, id });
        }
        self.slot_mut(context).push(RegisteredModule {
            id,
            permissions,
            handler,
        });
        Ok(())
    }

    /// Removes a module. Removing an unknown id is not an error.
    pub fn unregister(&mut self, context: ModuleContext, id: &str) {
        self.slot_mut(context).retain(|module| module.id != id);
    }

    /// Snapshot of the modules registered for a phase, in registration
    /// order.
    pub fn get(&self, context: ModuleContext) -> Vec<RegisteredModule> {
        self.slot(context).to_vec()
    }

    pub fn has(&self, context: ModuleContext, id: &str) -> bool {
        self.slot(context).iter().any(|module| module.id == id)
    }

    fn slot(&self, context: ModuleContext) -> &[RegisteredModule] {
        match context {
            ModuleContext::Request => &self.request,
            ModuleContext::Response => &self.response,
        }
    }

    fn slot_mut(&mut self, context: ModuleContext) -> &mut Vec<RegisteredModule> {
        match context {
            ModuleContext::Request => &mut self.request,
            ModuleContext::Response => &mut self.response,
        }
    }
}
