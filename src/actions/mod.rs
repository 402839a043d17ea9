//! Conditional actions attached to requests.
//!
//! A request carries two action groups, one evaluated before the request is
//! sent and one after the response arrives. Each group is a list of
//! condition blocks; a block whose condition holds contributes its enabled
//! actions to a single priority-ordered run.

pub mod model;
pub mod runner;

pub use model::{
    Action, ActionCondition, ActionContext, ActionKind, ActionView, Condition, ConditionOperator,
    ConditionSource,
};
pub use runner::{ActionError, ActionsRunner};
