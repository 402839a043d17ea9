//! Action and condition value objects.
//!
//! An action is one configured pre/post hook; an [`ActionCondition`] gates
//! an ordered group of actions behind a predicate over the request, the
//! transport metadata and the response. The action kind is a tagged union,
//! so dispatch over kinds is exhaustive at compile time.

use crate::models::{HttpRequest, HttpResponse, TransportMetadata};
use serde::{Deserialize, Serialize};

/// Which pipeline phase a condition (or action) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionContext {
    Request,
    Response,
}

/// What a single action does when it runs. The serialized form is tagged
/// with the action name, matching the stored configuration format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum ActionKind {
    /// Writes a variable into the active environment.
    SetVariable { variable: String, value: String },

    /// Stores a session cookie.
    SetCookie {
        cookie: String,
        value: String,
        #[serde(default)]
        url: Option<String>,
    },

    /// Removes session cookies by name and/or URL.
    DeleteCookie {
        #[serde(default)]
        cookie: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

impl ActionKind {
    /// The stable action name used in stored configuration and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::SetVariable { .. } => "set-variable",
            ActionKind::SetCookie { .. } => "set-cookie",
            ActionKind::DeleteCookie { .. } => "delete-cookie",
        }
    }
}

/// UI presentation state carried alongside an action. Opaque to the
/// pipeline; preserved so clones round-trip the stored configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionView {
    #[serde(default)]
    pub opened: bool,
}

/// A single configured hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Phase this action belongs to.
    pub context: ActionContext,

    /// Disabled actions never execute.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ordering key; lower priorities run earlier. Ties keep insertion
    /// order.
    #[serde(default)]
    pub priority: i32,

    /// Synchronous actions block the pipeline; asynchronous ones are
    /// dispatched and not awaited.
    #[serde(default = "default_true")]
    pub sync: bool,

    /// When `true`, a failure of this (synchronous) action rejects the
    /// whole run. When `false`, the failure is logged and skipped.
    #[serde(default)]
    pub fail_on_error: bool,

    /// What the action does. Configuration values may contain `${...}`
    /// expressions, evaluated just before execution.
    #[serde(flatten)]
    pub kind: ActionKind,

    /// UI state, opaque here.
    #[serde(default)]
    pub view: ActionView,
}

fn default_true() -> bool {
    true
}

impl Action {
    /// Creates an enabled, synchronous action with priority 0.
    pub fn new(context: ActionContext, kind: ActionKind) -> Self {
        Self {
            context,
            enabled: true,
            priority: 0,
            sync: true,
            fail_on_error: false,
            kind,
            view: ActionView::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Where a condition reads its comparison value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionSource {
    /// The request URL.
    Url,
    /// The request method.
    Method,
    /// A header, selected by the condition's `path`. Response-phase
    /// conditions read response headers; request-phase conditions read
    /// request headers.
    Headers,
    /// The response status code. Unsatisfiable before a response exists.
    Status,
}

/// Comparison operator applied between the extracted and expected values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanEqual,
    LessThan,
    LessThanEqual,
    Contains,
    Regex,
}

/// The predicate gating a group of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub source: ConditionSource,
    pub operator: ConditionOperator,

    /// Expected value the extracted value is compared against.
    pub value: String,

    /// Source selector parameter, e.g. the header name for
    /// [`ConditionSource::Headers`].
    #[serde(default)]
    pub path: Option<String>,
}

/// A gating predicate plus an ordered group of actions.
///
/// A condition group with no configured [`Condition`] is always satisfied;
/// it still only runs when `enabled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCondition {
    #[serde(default)]
    pub condition: Option<Condition>,

    /// Phase this group belongs to.
    pub context: ActionContext,

    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ActionCondition {
    /// Creates an enabled, unconditional group for the given phase.
    pub fn unconditional(context: ActionContext, actions: Vec<Action>) -> Self {
        Self {
            condition: None,
            context,
            actions,
            enabled: true,
        }
    }

    /// Evaluates the predicate against the request, the transport metadata
    /// and the response, whichever are available in the current phase.
    pub fn satisfied(
        &self,
        request: &HttpRequest,
        _executed: Option<&TransportMetadata>,
        response: Option<&HttpResponse>,
    ) -> bool {
        let condition = match &self.condition {
            Some(condition) => condition,
            None => return true,
        };

        let extracted: Option<String> = match condition.source {
            ConditionSource::Url => Some(request.url.clone()),
            ConditionSource::Method => Some(request.method.as_str().to_string()),
            ConditionSource::Status => response.map(|r| r.status.to_string()),
            ConditionSource::Headers => {
                let name = condition.path.as_deref().unwrap_or_default();
                match (self.context, response) {
                    (ActionContext::Response, Some(response)) => {
                        response.header(name).map(str::to_string)
                    }
                    _ => request.header(name).map(str::to_string),
                }
            }
        };

        match extracted {
            Some(actual) => compare(condition.operator, &actual, &condition.value),
            None => false,
        }
    }
}

/// Compares numerically when both sides parse as numbers, textually
/// otherwise. A regex that fails to compile never matches.
fn compare(operator: ConditionOperator, actual: &str, expected: &str) -> bool {
    if let (Ok(a), Ok(b)) = (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        return match operator {
            ConditionOperator::Equal => a == b,
            ConditionOperator::NotEqual => a != b,
            ConditionOperator::GreaterThan => a > b,
            ConditionOperator::GreaterThanEqual => a >= b,
            ConditionOperator::LessThan => a < b,
            ConditionOperator::LessThanEqual => a <= b,
            ConditionOperator::Contains => actual.contains(expected),
            ConditionOperator::Regex => regex_matches(expected, actual),
        };
    }

    match operator {
        ConditionOperator::Equal => actual == expected,
        ConditionOperator::NotEqual => actual != expected,
        ConditionOperator::GreaterThan => actual > expected,
        ConditionOperator::GreaterThanEqual => actual >= expected,
        ConditionOperator::LessThan => actual < expected,
        ConditionOperator::LessThanEqual => actual <= expected,
        ConditionOperator::Contains => actual.contains(expected),
        ConditionOperator::Regex => regex_matches(expected, actual),
    }
}

fn regex_matches(pattern: &str, actual: &str) -> bool {
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(actual),
        Err(_) => false,
    }
}
