//! Node tree for compiled templates.

use serde_json::Value;

/// One node of a compiled template.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text.
    Text(String),
    /// `{{ pipeline }}`: evaluate and print.
    Action {
        /// Pipeline to evaluate.
        pipeline: Pipeline,
        /// Source line.
        line: usize,
    },
    /// `{{if}} ... {{else}} ... {{end}}`.
    If(Branch),
    /// `{{range}} ... {{else}} ... {{end}}`: body runs once per element.
    Range(Branch),
    /// `{{with}} ... {{else}} ... {{end}}`: body runs with the value as context.
    With(Branch),
}

/// Shared shape of `if`, `range`, and `with`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Controlling pipeline.
    pub pipeline: Pipeline,
    /// Nodes run when the pipeline is truthy.
    pub body: Vec<Node>,
    /// Nodes run otherwise. `else if` nests another `If` here.
    pub otherwise: Vec<Node>,
    /// Source line of the opening action.
    pub line: usize,
}

/// Commands joined by `|`; each result feeds the next command's last argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Commands in order.
    pub commands: Vec<Command>,
}

/// One command: a function call or a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Arguments; a leading [`Arg::Function`] makes this a call.
    pub args: Vec<Arg>,
}

/// One argument in a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `.`
    Dot,
    /// `.A.B` relative to the current context.
    Field(Vec<String>),
    /// `$` or `$.A.B` relative to the root.
    Variable(Vec<String>),
    /// String, number, boolean, or nil literal.
    Literal(Value),
    /// A function from the injected table.
    Function(String),
    /// Parenthesized sub-pipeline.
    Pipeline(Pipeline),
}
