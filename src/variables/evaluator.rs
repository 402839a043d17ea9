//! Template evaluation against an environment context.
//!
//! [`VariablesProcessor`] is the public face of the variables module. It
//! builds an evaluation context from an environment snapshot (plus caller
//! overrides), parses template text into an AST and walks it. One processor
//! instance corresponds to one evaluation session: the `now`/`random` group
//! cache is scoped to the instance, and the request factory constructs a
//! fresh processor per request run so no cached value leaks across runs.

use super::ast::{Expr, Segment};
use super::environment::EnvironmentSnapshot;
use super::functions::{call_namespaced, EvalSession};
use super::parser::parse_template;
use super::EvalError;
use crate::models::HttpRequest;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

/// Variable names follow the identifier rule of the expression language.
static NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Failed to compile name regex"));

/// Variable values referencing other variables are resolved during context
/// building, capped at two passes to guarantee termination.
const MAX_CONTEXT_PASSES: usize = 2;

/// Returns `true` if `name` is a valid variable name.
pub fn is_valid_name(name: &str) -> bool {
    NAME_REGEX.is_match(name)
}

/// Per-call evaluation options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluateOptions {
    /// Include host-provided system variables in the context.
    pub evaluate_system_variables: bool,
}

/// Evaluates `${...}` template expressions against an environment snapshot.
#[derive(Debug)]
pub struct VariablesProcessor {
    snapshot: EnvironmentSnapshot,
    overrides: HashMap<String, String>,
    session: EvalSession,
}

impl VariablesProcessor {
    /// Creates a processor over the given environment snapshot.
    pub fn new(snapshot: EnvironmentSnapshot) -> Self {
        Self::with_overrides(snapshot, HashMap::new())
    }

    /// Creates a processor with caller-supplied override values. Overrides
    /// win over stored variables during context building.
    pub fn with_overrides(
        snapshot: EnvironmentSnapshot,
        overrides: HashMap<String, String>,
    ) -> Self {
        Self {
            snapshot,
            overrides,
            session: EvalSession::new(),
        }
    }

    /// The environment snapshot this processor evaluates against.
    pub fn environment(&self) -> &EnvironmentSnapshot {
        &self.snapshot
    }

    /// Drops all cached `now`/`random` group values. Call between
    /// independent evaluation sessions when reusing one processor.
    pub fn clear_cache(&mut self) {
        self.session.clear();
    }

    /// Evaluates all expressions in a string. Multiline input is evaluated
    /// line by line and rejoined with its line breaks.
    pub fn evaluate_variable(
        &mut self,
        text: &str,
        options: &EvaluateOptions,
    ) -> Result<String, EvalError> {
        let context = self.build_context(options.evaluate_system_variables)?;
        evaluate_text(text, &context, &mut self.session)
    }

    /// Deeply evaluates a JSON value: strings are evaluated, arrays and
    /// objects recursed into, all other scalars pass through unchanged.
    pub fn evaluate_variables(
        &mut self,
        value: &Value,
        options: &EvaluateOptions,
    ) -> Result<Value, EvalError> {
        let context = self.build_context(options.evaluate_system_variables)?;
        evaluate_value(value, &context, &mut self.session)
    }

    /// Evaluates every templated field of a request in place: URL, header
    /// names and values, and the payload.
    pub fn evaluate_request(
        &mut self,
        request: &mut HttpRequest,
        options: &EvaluateOptions,
    ) -> Result<(), EvalError> {
        let context = self.build_context(options.evaluate_system_variables)?;

        request.url = evaluate_text(&request.url, &context, &mut self.session)?;

        let mut headers = HashMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let name = evaluate_text(name, &context, &mut self.session)?;
            let value = evaluate_text(value, &context, &mut self.session)?;
            headers.insert(name, value);
        }
        request.headers = headers;

        if let Some(payload) = &request.payload {
            request.payload = Some(evaluate_text(payload, &context, &mut self.session)?);
        }

        Ok(())
    }

    /// Builds the name-to-value context: merge raw values, then resolve
    /// variable values that themselves contain expressions. The pass count
    /// is capped; values still unresolved after the last pass stay as-is.
    fn build_context(&mut self, include_system: bool) -> Result<HashMap<String, String>, EvalError> {
        let mut context = self.snapshot.merge_raw(&self.overrides, include_system);

        for _ in 0..MAX_CONTEXT_PASSES {
            let pending: Vec<String> = context
                .iter()
                .filter(|(_, value)| value.contains("${"))
                .map(|(name, _)| name.clone())
                .collect();
            if pending.is_empty() {
                break;
            }

            // Each pass resolves against the context as it stood at the
            // start of the pass, so resolution order is deterministic.
            let frozen = context.clone();
            for name in pending {
                let raw = frozen[&name].clone();
                let resolved = evaluate_text(&raw, &frozen, &mut self.session)?;
                context.insert(name, resolved);
            }
        }

        Ok(context)
    }
}

/// Evaluates a multi-line string line by line.
fn evaluate_text(
    text: &str,
    context: &HashMap<String, String>,
    session: &mut EvalSession,
) -> Result<String, EvalError> {
    // Fast path: nothing to evaluate.
    if !text.contains("${") {
        return Ok(text.to_string());
    }

    let lines: Vec<String> = text
        .split('\n')
        .map(|line| evaluate_line(line, context, session))
        .collect::<Result<_, _>>()?;
    Ok(lines.join("\n"))
}

fn evaluate_line(
    line: &str,
    context: &HashMap<String, String>,
    session: &mut EvalSession,
) -> Result<String, EvalError> {
    let template = parse_template(line)?;
    let mut output = String::with_capacity(line.len());
    for segment in &template.segments {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Expr { node, raw } => {
                output.push_str(&evaluate_segment(node, raw, context, session)?)
            }
        }
    }
    Ok(output)
}

fn evaluate_segment(
    node: &Expr,
    raw: &str,
    context: &HashMap<String, String>,
    session: &mut EvalSession,
) -> Result<String, EvalError> {
    match node {
        Expr::StringLit(s) => Ok(s.clone()),
        Expr::NumberLit(n) => Ok(n.clone()),
        // A reference to an undefined name is left in place verbatim;
        // only defined names are substituted.
        Expr::VariableRef(name) => Ok(context
            .get(name)
            .cloned()
            .unwrap_or_else(|| raw.to_string())),
        Expr::FunctionCall {
            namespace,
            name,
            args,
        } => evaluate_call(namespace.as_deref(), name, args, context, session),
    }
}

fn evaluate_call(
    namespace: Option<&str>,
    name: &str,
    args: &[Expr],
    context: &HashMap<String, String>,
    session: &mut EvalSession,
) -> Result<String, EvalError> {
    match namespace {
        None => match name {
            "now" => {
                let label = group_label(name, args)?;
                Ok(session.now(label.as_deref()).to_string())
            }
            "random" => {
                let label = group_label(name, args)?;
                Ok(session.random(label.as_deref()).to_string())
            }
            other => Err(EvalError::UnsupportedFunction(other.to_string())),
        },
        Some(ns) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate_argument(arg, context, session)?);
            }
            call_namespaced(ns, name, &values)
        }
    }
}

/// The optional `now`/`random` argument is a group *label*, not a value:
/// identifiers and numbers are taken textually, quoted strings by content.
fn group_label(name: &str, args: &[Expr]) -> Result<Option<String>, EvalError> {
    match args {
        [] => Ok(None),
        [Expr::StringLit(label)] | [Expr::NumberLit(label)] => Ok(Some(label.clone())),
        [Expr::VariableRef(label)] => Ok(Some(label.clone())),
        [_] => Err(EvalError::FunctionArgs(format!(
            "{} group label must be an identifier, number or string",
            name
        ))),
        _ => Err(EvalError::FunctionArgs(format!(
            "{} takes at most one group label, got {}",
            name,
            args.len()
        ))),
    }
}

/// Function arguments are strict: an undefined variable reference inside an
/// argument list is an error rather than being left in place.
fn evaluate_argument(
    arg: &Expr,
    context: &HashMap<String, String>,
    session: &mut EvalSession,
) -> Result<String, EvalError> {
    match arg {
        Expr::StringLit(s) => Ok(s.clone()),
        Expr::NumberLit(n) => Ok(n.clone()),
        Expr::VariableRef(name) => context.get(name).cloned().ok_or_else(|| {
            EvalError::FunctionArgs(format!("undefined variable {:?} in function arguments", name))
        }),
        Expr::FunctionCall {
            namespace,
            name,
            args,
        } => evaluate_call(namespace.as_deref(), name, args, context, session),
    }
}

fn evaluate_value(
    value: &Value,
    context: &HashMap<String, String>,
    session: &mut EvalSession,
) -> Result<Value, EvalError> {
    match value {
        Value::String(text) => Ok(Value::String(evaluate_text(text, context, session)?)),
        Value::Array(items) => {
            let mut evaluated = Vec::with_capacity(items.len());
            for item in items {
                evaluated.push(evaluate_value(item, context, session)?);
            }
            Ok(Value::Array(evaluated))
        }
        Value::Object(map) => {
            let mut evaluated = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                evaluated.insert(key.clone(), evaluate_value(item, context, session)?);
            }
            Ok(Value::Object(evaluated))
        }
        other => Ok(other.clone()),
    }
}
