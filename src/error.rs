//! Top-level pipeline error.
//!
//! Each module owns its error enum; [`PipelineError`] aggregates them at the
//! factory boundary so callers handle one type.

use crate::actions::ActionError;
use crate::factory::{CancelError, TransportError};
use crate::modules::ModuleError;
use crate::store::StoreError;
use crate::variables::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Expression evaluation failed while processing the request.
    Eval(EvalError),

    /// A synchronous action with `fail_on_error` rejected the run.
    Action(ActionError),

    /// A module implementation failed.
    Module(ModuleError),

    /// The backing store rejected an operation.
    Store(StoreError),

    /// The transport collaborator failed outright.
    Transport(TransportError),

    /// Cancellation bookkeeping failed.
    Cancel(CancelError),

    /// The request URL did not parse.
    InvalidUrl(String),

    /// The request URL uses a scheme the transport does not speak.
    UnsupportedProtocol(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Eval(err) => write!(f, "{}", err),
            PipelineError::Action(err) => write!(f, "{}", err),
            PipelineError::Module(err) => write!(f, "{}", err),
            PipelineError::Store(err) => write!(f, "{}", err),
            PipelineError::Transport(err) => write!(f, "{}", err),
            PipelineError::Cancel(err) => write!(f, "{}", err),
            PipelineError::InvalidUrl(detail) => write!(f, "Invalid URL: {}", detail),
            PipelineError::UnsupportedProtocol(scheme) => {
                write!(f, "Unsupported protocol: {}", scheme)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<EvalError> for PipelineError {
    fn from(err: EvalError) -> Self {
        PipelineError::Eval(err)
    }
}

impl From<ActionError> for PipelineError {
    fn from(err: ActionError) -> Self {
        PipelineError::Action(err)
    }
}

impl From<ModuleError> for PipelineError {
    fn from(err: ModuleError) -> Self {
        PipelineError::Module(err)
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Store(err)
    }
}

impl From<TransportError> for PipelineError {
    fn from(err: TransportError) -> Self {
        PipelineError::Transport(err)
    }
}

impl From<CancelError> for PipelineError {
    fn from(err: CancelError) -> Self {
        PipelineError::Cancel(err)
    }
}
