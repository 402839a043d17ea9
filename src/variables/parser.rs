//! Recursive-descent parser for `${...}` template expressions.
//!
//! The parser turns input text into a [`Template`]: literal runs plus
//! parsed expression segments. Quoting and escaping are handled here, so
//! the evaluator never does textual surgery on the input.
//!
//! Grammar inside a `${...}` segment:
//!
//! ```text
//! expr     := string | number | call | ident
//! call     := ident ("." ident)? "(" (expr ("," expr)*)? ")"
//!           | ("now" | "random") ":" group          // legacy short form
//! string   := '"' ... '"' | '\'' ... '\''           // backslash escapes
//! number   := "-"? digits ("." digits)?
//! ident    := [A-Za-z_][A-Za-z0-9_]*
//! group    := [A-Za-z0-9_-]+
//! ```
//!
//! A literal `${` is written as `\${`.

use super::ast::{Expr, Segment, Template};
use super::EvalError;

/// Parses one line of input text into a template.
pub fn parse_template(input: &str) -> Result<Template, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        // \${ escapes the expression opener.
        if chars[i] == '\\' && starts_with(&chars, i + 1, "${") {
            literal.push_str("${");
            i += 3;
            continue;
        }

        if starts_with(&chars, i, "${") {
            let end = find_segment_end(&chars, i + 2)?;
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let raw: String = chars[i..=end].iter().collect();
            let inner: String = chars[i + 2..end].iter().collect();
            let node = parse_expression(&inner)?;
            segments.push(Segment::Expr { node, raw });
            i = end + 1;
            continue;
        }

        literal.push(chars[i]);
        i += 1;
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(Template { segments })
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut i = at;
    for expected in pattern.chars() {
        if chars.get(i) != Some(&expected) {
            return false;
        }
        i += 1;
    }
    true
}

/// Finds the index of the `}` closing an expression segment, skipping over
/// quoted strings (which may legally contain `}`).
fn find_segment_end(chars: &[char], from: usize) -> Result<usize, EvalError> {
    let mut i = from;
    let mut quote: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == '\\' {
                    i += 1; // skip the escaped character
                } else if c == q {
                    quote = None;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                } else if c == '}' {
                    return Ok(i);
                }
            }
        }
        i += 1;
    }

    Err(EvalError::Syntax(
        "unterminated expression: missing '}'".to_string(),
    ))
}

/// Parses the text between `${` and `}` into a single expression.
pub fn parse_expression(inner: &str) -> Result<Expr, EvalError> {
    let mut parser = ExprParser::new(inner);
    let expr = parser.parse_expr()?;
    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(EvalError::Syntax(format!(
            "unexpected trailing input in expression: {:?}",
            parser.rest()
        )));
    }
    Ok(expr)
}

struct ExprParser {
    chars: Vec<char>,
    pos: usize,
}

impl ExprParser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn rest(&self) -> String {
        self.chars[self.pos.min(self.chars.len())..].iter().collect()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.skip_whitespace();
        match self.peek() {
            Some('"') | Some('\'') => self.parse_string(),
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_number(),
            Some(c) if is_ident_start(c) => self.parse_ident_expr(),
            Some(c) => Err(EvalError::Syntax(format!(
                "unexpected character {:?} in expression",
                c
            ))),
            None => Err(EvalError::Syntax("empty expression".to_string())),
        }
    }

    fn parse_string(&mut self) -> Result<Expr, EvalError> {
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(c) => value.push(c),
                    None => {
                        return Err(EvalError::Syntax(
                            "unterminated escape in string literal".to_string(),
                        ))
                    }
                },
                Some(c) if c == quote => return Ok(Expr::StringLit(value)),
                Some(c) => value.push(c),
                None => {
                    return Err(EvalError::Syntax(
                        "unterminated string literal".to_string(),
                    ))
                }
            }
        }
    }

    fn parse_number(&mut self) -> Result<Expr, EvalError> {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.pos += 1;
        }
        let mut saw_digit = false;
        let mut saw_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                saw_digit = true;
            } else if c == '.' && !saw_dot {
                saw_dot = true;
            } else {
                break;
            }
            text.push(c);
            self.pos += 1;
        }
        if !saw_digit {
            return Err(EvalError::Syntax(format!("invalid number: {:?}", text)));
        }
        Ok(Expr::NumberLit(text))
    }

    fn parse_ident(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        name
    }

    fn parse_ident_expr(&mut self) -> Result<Expr, EvalError> {
        let name = self.parse_ident();

        match self.peek() {
            // Namespaced call: Math.min(...), Json.get(...), String.trim(...)
            Some('.') => {
                self.pos += 1;
                let function = self.parse_ident();
                if function.is_empty() {
                    return Err(EvalError::Syntax(format!(
                        "expected function name after {:?}.",
                        name
                    )));
                }
                self.skip_whitespace();
                if self.peek() != Some('(') {
                    return Err(EvalError::Syntax(format!(
                        "expected '(' after {}.{}",
                        name, function
                    )));
                }
                let args = self.parse_args()?;
                Ok(Expr::FunctionCall {
                    namespace: Some(name),
                    name: function,
                    args,
                })
            }
            // Bare call: now(...), random(...)
            Some('(') => {
                let args = self.parse_args()?;
                Ok(Expr::FunctionCall {
                    namespace: None,
                    name,
                    args,
                })
            }
            // Legacy short form: now:group, random:group
            Some(':') => {
                if name != "now" && name != "random" {
                    return Err(EvalError::Syntax(format!(
                        "unexpected ':' after {:?}",
                        name
                    )));
                }
                self.pos += 1;
                let group = self.parse_group()?;
                Ok(Expr::FunctionCall {
                    namespace: None,
                    name,
                    args: vec![Expr::StringLit(group)],
                })
            }
            _ => {
                // Legacy bare magic tokens upgrade to no-argument calls.
                if name == "now" || name == "random" {
                    return Ok(Expr::FunctionCall {
                        namespace: None,
                        name,
                        args: Vec::new(),
                    });
                }
                Ok(Expr::VariableRef(name))
            }
        }
    }

    fn parse_group(&mut self) -> Result<String, EvalError> {
        let mut group = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                group.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if group.is_empty() {
            return Err(EvalError::Syntax(
                "expected group label after ':'".to_string(),
            ));
        }
        Ok(group)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, EvalError> {
        debug_assert_eq!(self.peek(), Some('('));
        self.pos += 1;

        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(args);
        }

        loop {
            args.push(self.parse_expr()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(')') => return Ok(args),
                Some(c) => {
                    return Err(EvalError::Syntax(format!(
                        "expected ',' or ')' in argument list, found {:?}",
                        c
                    )))
                }
                None => {
                    return Err(EvalError::Syntax(
                        "unterminated argument list".to_string(),
                    ))
                }
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
