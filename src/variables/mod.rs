//! Template variable evaluation.
//!
//! Strings anywhere in a request (URL, headers, payload, action
//! configuration) may embed `${...}` expressions. This module parses those
//! expressions into a small AST and evaluates them against an evaluation
//! context built from the active environment's variable set, with a fixed
//! set of built-in functions (`now`, `random`, and the `Math`, `Json` and
//! `String` namespaces).

pub mod ast;
pub mod environment;
pub mod evaluator;
pub mod functions;
pub mod parser;

pub use ast::{Expr, Segment, Template};
pub use environment::{EnvironmentSnapshot, Variable, VariableSet};
pub use evaluator::{is_valid_name, EvaluateOptions, VariablesProcessor};
pub use functions::{EvalSession, MAX_SAFE_INTEGER};

/// Errors produced while parsing or evaluating template expressions.
///
/// These always propagate to the caller; the evaluator never swallows a
/// malformed expression or a bad function call.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// The expression text is malformed.
    Syntax(String),

    /// The expression calls a function outside the supported set.
    UnsupportedFunction(String),

    /// A supported function was called with invalid arguments.
    FunctionArgs(String),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Syntax(msg) => write!(f, "Invalid expression syntax: {}", msg),
            EvalError::UnsupportedFunction(name) => {
                write!(f, "Unsupported function: {}", name)
            }
            EvalError::FunctionArgs(msg) => write!(f, "Invalid function arguments: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}
