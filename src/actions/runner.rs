//! Priority-ordered execution of configured actions.
//!
//! The runner selects the enabled, satisfied condition groups for the
//! current phase, flattens their actions into one priority-ordered list
//! and executes them. Action configuration is passed through the variables
//! processor first, so configured values may contain `${...}` expressions.

use super::model::{Action, ActionCondition, ActionContext, ActionKind};
use crate::models::{HttpRequest, HttpResponse, TransportMetadata};
use crate::store::{Cookie, EventBus, PipelineStore, StoreError};
use crate::variables::{EvalError, EvaluateOptions, VariablesProcessor};
use serde_json::json;
use std::sync::Arc;

/// Errors surfaced by an action run.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
    /// An expression in the action configuration failed to evaluate.
    /// Always propagates, regardless of the action's failure policy.
    Eval(EvalError),

    /// A synchronous action with `fail_on_error` failed.
    Failed { action: String, message: String },
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::Eval(err) => write!(f, "Action configuration error: {}", err),
            ActionError::Failed { action, message } => {
                write!(f, "Action {} failed: {}", action, message)
            }
        }
    }
}

impl std::error::Error for ActionError {}

impl From<EvalError> for ActionError {
    fn from(err: EvalError) -> Self {
        ActionError::Eval(err)
    }
}

/// Executes request and response actions against the store and event bus.
pub struct ActionsRunner {
    store: Arc<dyn PipelineStore>,
    events: Arc<dyn EventBus>,
}

impl ActionsRunner {
    pub fn new(store: Arc<dyn PipelineStore>, events: Arc<dyn EventBus>) -> Self {
        Self { store, events }
    }

    /// Runs the request-phase actions configured on the request.
    pub async fn process_request_actions(
        &self,
        request: &HttpRequest,
        processor: &mut VariablesProcessor,
        options: &EvaluateOptions,
    ) -> Result<(), ActionError> {
        let actions = select_actions(
            &request.actions.request,
            ActionContext::Request,
            request,
            None,
            None,
        );
        self.run_actions(&request.id, actions, processor, options)
            .await
    }

    /// Runs the response-phase actions, with the transport metadata and the
    /// (possibly synthesized error) response available to conditions.
    pub async fn process_response_actions(
        &self,
        request: &HttpRequest,
        executed: &TransportMetadata,
        response: &HttpResponse,
        processor: &mut VariablesProcessor,
        options: &EvaluateOptions,
    ) -> Result<(), ActionError> {
        let actions = select_actions(
            &request.actions.response,
            ActionContext::Response,
            request,
            Some(executed),
            Some(response),
        );
        self.run_actions(&request.id, actions, processor, options)
            .await
    }

    async fn run_actions(
        &self,
        request_id: &str,
        actions: Vec<Action>,
        processor: &mut VariablesProcessor,
        options: &EvaluateOptions,
    ) -> Result<(), ActionError> {
        for action in actions {
            let kind = evaluate_kind(processor, &action.kind, options)?;

            if action.sync {
                match execute_kind(&*self.store, &*self.events, request_id, &kind) {
                    Ok(()) => {}
                    Err(err) if action.fail_on_error => {
                        return Err(ActionError::Failed {
                            action: kind.name().to_string(),
                            message: err.to_string(),
                        });
                    }
                    Err(err) => {
                        log::warn!(
                            "action {} failed for request {}, continuing: {}",
                            kind.name(),
                            request_id,
                            err
                        );
                    }
                }
            } else {
                self.run_asynchronous_action(request_id, kind);
            }
        }
        Ok(())
    }

    /// Dispatches a fire-and-forget action. Failures are logged but never
    /// affect the pipeline.
    fn run_asynchronous_action(&self, request_id: &str, kind: ActionKind) {
        let store = Arc::clone(&self.store);
        let events = Arc::clone(&self.events);
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = execute_kind(&*store, &*events, &request_id, &kind) {
                log::warn!(
                    "asynchronous action {} failed for request {}: {}",
                    kind.name(),
                    request_id,
                    err
                );
            }
        });
    }
}

/// Flattens the satisfied, enabled condition groups into one ordered
/// action list. The sort is stable: equal priorities keep insertion order.
fn select_actions(
    conditions: &[ActionCondition],
    context: ActionContext,
    request: &HttpRequest,
    executed: Option<&TransportMetadata>,
    response: Option<&HttpResponse>,
) -> Vec<Action> {
    let mut selected: Vec<Action> = conditions
        .iter()
        .filter(|group| {
            group.enabled
                && group.context == context
                && group.satisfied(request, executed, response)
        })
        .flat_map(|group| group.actions.iter().filter(|a| a.enabled).cloned())
        .collect();
    selected.sort_by_key(|action| action.priority);
    selected
}

/// Evaluates `${...}` expressions in an action's configuration.
fn evaluate_kind(
    processor: &mut VariablesProcessor,
    kind: &ActionKind,
    options: &EvaluateOptions,
) -> Result<ActionKind, EvalError> {
    let mut eval = |text: &str| processor.evaluate_variable(text, options);
    Ok(match kind {
        ActionKind::SetVariable { variable, value } => ActionKind::SetVariable {
            variable: eval(variable)?,
            value: eval(value)?,
        },
        ActionKind::SetCookie { cookie, value, url } => ActionKind::SetCookie {
            cookie: eval(cookie)?,
            value: eval(value)?,
            url: url.as_deref().map(&mut eval).transpose()?,
        },
        ActionKind::DeleteCookie { cookie, url } => ActionKind::DeleteCookie {
            cookie: cookie.as_deref().map(&mut eval).transpose()?,
            url: url.as_deref().map(&mut eval).transpose()?,
        },
    })
}

/// Applies one action's effect to the store and notifies the host.
fn execute_kind(
    store: &dyn PipelineStore,
    events: &dyn EventBus,
    request_id: &str,
    kind: &ActionKind,
) -> Result<(), StoreError> {
    match kind {
        ActionKind::SetVariable { variable, value } => {
            store.set_variable(variable, value)?;
            events.publish(
                "variable.updated",
                json!({ "id": request_id, "name": variable }),
            );
        }
        ActionKind::SetCookie { cookie, value, url } => {
            store.set_cookie(Cookie {
                name: cookie.clone(),
                value: value.clone(),
                url: url.clone(),
            })?;
            events.publish(
                "cookie.updated",
                json!({ "id": request_id, "name": cookie }),
            );
        }
        ActionKind::DeleteCookie { cookie, url } => {
            store.delete_cookie(cookie.as_deref(), url.as_deref())?;
            events.publish(
                "cookie.deleted",
                json!({ "id": request_id, "name": cookie }),
            );
        }
    }
    Ok(())
}
