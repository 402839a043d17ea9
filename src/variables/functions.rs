//! Built-in template functions and the per-session result cache.
//!
//! `now` and `random` support a group label: within one evaluation session,
//! repeated calls with the same label return the first computed value, so a
//! request can stamp the same timestamp or random value in several places.
//! Ungrouped calls are never cached. The cache lives in [`EvalSession`] and
//! must be cleared (or the session dropped) between independent request
//! runs; the factory creates a fresh session per run.

use super::EvalError;
use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;

/// Largest integer exactly representable in an IEEE 754 double, matching
/// the range the host UI can consume. `random` yields values below this.
pub const MAX_SAFE_INTEGER: u64 = (1u64 << 53) - 1;

/// Per-evaluation-session cache for grouped `now`/`random` results.
#[derive(Debug, Default)]
pub struct EvalSession {
    now_groups: HashMap<String, i64>,
    random_groups: HashMap<String, u64>,
}

impl EvalSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all cached group values.
    pub fn clear(&mut self) {
        self.now_groups.clear();
        self.random_groups.clear();
    }

    /// Millisecond timestamp; grouped calls are first-call-wins cached.
    pub fn now(&mut self, group: Option<&str>) -> i64 {
        match group {
            Some(label) => *self
                .now_groups
                .entry(label.to_string())
                .or_insert_with(|| Utc::now().timestamp_millis()),
            None => Utc::now().timestamp_millis(),
        }
    }

    /// Uniform integer in `[0, MAX_SAFE_INTEGER)`; same caching rule.
    pub fn random(&mut self, group: Option<&str>) -> u64 {
        match group {
            Some(label) => *self
                .random_groups
                .entry(label.to_string())
                .or_insert_with(random_value),
            None => random_value(),
        }
    }
}

fn random_value() -> u64 {
    rand::thread_rng().gen_range(0..MAX_SAFE_INTEGER)
}

/// Dispatches a namespaced function call. Only the `Math`, `Json` and
/// `String` namespaces exist; anything else is an unsupported function.
pub fn call_namespaced(namespace: &str, name: &str, args: &[String]) -> Result<String, EvalError> {
    match namespace {
        "Math" => call_math(name, args),
        "Json" => call_json(name, args),
        "String" => call_string(name, args),
        _ => Err(EvalError::UnsupportedFunction(format!(
            "{}.{}",
            namespace, name
        ))),
    }
}

fn call_math(name: &str, args: &[String]) -> Result<String, EvalError> {
    let numbers = parse_numbers(name, args)?;
    let result = match name {
        "abs" => single(name, &numbers)?.abs(),
        "ceil" => single(name, &numbers)?.ceil(),
        "floor" => single(name, &numbers)?.floor(),
        "round" => single(name, &numbers)?.round(),
        "min" => fold_args(name, &numbers, f64::min)?,
        "max" => fold_args(name, &numbers, f64::max)?,
        "pow" => {
            if numbers.len() != 2 {
                return Err(EvalError::FunctionArgs(format!(
                    "Math.pow expects 2 arguments, got {}",
                    numbers.len()
                )));
            }
            numbers[0].powf(numbers[1])
        }
        _ => {
            return Err(EvalError::UnsupportedFunction(format!("Math.{}", name)));
        }
    };
    Ok(format_number(result))
}

fn parse_numbers(name: &str, args: &[String]) -> Result<Vec<f64>, EvalError> {
    args.iter()
        .map(|arg| {
            arg.trim().parse::<f64>().map_err(|_| {
                EvalError::FunctionArgs(format!(
                    "Math.{} expects numeric arguments, got {:?}",
                    name, arg
                ))
            })
        })
        .collect()
}

fn single(name: &str, numbers: &[f64]) -> Result<f64, EvalError> {
    if numbers.len() != 1 {
        return Err(EvalError::FunctionArgs(format!(
            "Math.{} expects 1 argument, got {}",
            name,
            numbers.len()
        )));
    }
    Ok(numbers[0])
}

fn fold_args(name: &str, numbers: &[f64], f: fn(f64, f64) -> f64) -> Result<f64, EvalError> {
    let mut iter = numbers.iter().copied();
    let first = iter.next().ok_or_else(|| {
        EvalError::FunctionArgs(format!("Math.{} expects at least 1 argument", name))
    })?;
    Ok(iter.fold(first, f))
}

/// Integral results print without a fractional part.
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < MAX_SAFE_INTEGER as f64 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn call_json(name: &str, args: &[String]) -> Result<String, EvalError> {
    match name {
        // Validates and normalizes a JSON document.
        "parse" => {
            if args.len() != 1 {
                return Err(EvalError::FunctionArgs(format!(
                    "Json.parse expects 1 argument, got {}",
                    args.len()
                )));
            }
            let value: Value = serde_json::from_str(&args[0])
                .map_err(|e| EvalError::FunctionArgs(format!("Json.parse: {}", e)))?;
            Ok(value.to_string())
        }
        // Extracts a value by dotted path; array steps are numeric.
        "get" => {
            if args.len() != 2 {
                return Err(EvalError::FunctionArgs(format!(
                    "Json.get expects 2 arguments, got {}",
                    args.len()
                )));
            }
            let root: Value = serde_json::from_str(&args[0])
                .map_err(|e| EvalError::FunctionArgs(format!("Json.get: {}", e)))?;
            let mut current = &root;
            for step in args[1].split('.') {
                current = match current {
                    Value::Object(map) => map.get(step),
                    Value::Array(items) => step
                        .parse::<usize>()
                        .ok()
                        .and_then(|index| items.get(index)),
                    _ => None,
                }
                .ok_or_else(|| {
                    EvalError::FunctionArgs(format!(
                        "Json.get: path {:?} not found at {:?}",
                        args[1], step
                    ))
                })?;
            }
            Ok(match current {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
        _ => Err(EvalError::UnsupportedFunction(format!("Json.{}", name))),
    }
}

fn call_string(name: &str, args: &[String]) -> Result<String, EvalError> {
    let subject = || -> Result<&String, EvalError> {
        args.first().ok_or_else(|| {
            EvalError::FunctionArgs(format!("String.{} expects a subject argument", name))
        })
    };

    match name {
        "toUpperCase" => Ok(subject()?.to_uppercase()),
        "toLowerCase" => Ok(subject()?.to_lowercase()),
        "trim" => Ok(subject()?.trim().to_string()),
        "length" => Ok(subject()?.chars().count().to_string()),
        "concat" => Ok(args.concat()),
        "replace" => {
            if args.len() != 3 {
                return Err(EvalError::FunctionArgs(format!(
                    "String.replace expects 3 arguments, got {}",
                    args.len()
                )));
            }
            Ok(args[0].replacen(&args[1], &args[2], 1))
        }
        "substring" => {
            if args.len() < 2 || args.len() > 3 {
                return Err(EvalError::FunctionArgs(format!(
                    "String.substring expects 2 or 3 arguments, got {}",
                    args.len()
                )));
            }
            let text: Vec<char> = args[0].chars().collect();
            let parse_index = |arg: &String| -> Result<usize, EvalError> {
                arg.trim().parse::<usize>().map_err(|_| {
                    EvalError::FunctionArgs(format!(
                        "String.substring expects numeric indexes, got {:?}",
                        arg
                    ))
                })
            };
            let mut start = parse_index(&args[1])?.min(text.len());
            let mut end = match args.get(2) {
                Some(arg) => parse_index(arg)?.min(text.len()),
                None => text.len(),
            };
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            Ok(text[start..end].iter().collect())
        }
        _ => Err(EvalError::UnsupportedFunction(format!("String.{}", name))),
    }
}
