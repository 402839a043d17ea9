//! Template AST.
//!
//! A template is the parsed form of one line of input text: literal runs
//! interleaved with `${...}` expression segments. Expressions are literals,
//! variable references or function calls; there is no other syntax.

/// A parsed `${...}` expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A quoted string literal, unescaped.
    StringLit(String),

    /// A numeric literal, kept as written.
    NumberLit(String),

    /// A reference to a variable in the evaluation context.
    VariableRef(String),

    /// A call to a built-in function, bare (`now`, `random`) or namespaced
    /// (`Math.x`, `Json.x`, `String.x`).
    FunctionCall {
        namespace: Option<String>,
        name: String,
        args: Vec<Expr>,
    },
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text copied through unchanged.
    Literal(String),

    /// An expression segment. `raw` preserves the original `${...}` source
    /// so unresolved variable references can be left in place verbatim.
    Expr { node: Expr, raw: String },
}

/// A fully parsed template line.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub segments: Vec<Segment>,
}

impl Template {
    /// Returns `true` when the template contains no expression segments.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }
}
