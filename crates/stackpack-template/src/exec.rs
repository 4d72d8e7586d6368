//! Template execution against a variable tree.
//!
//! Field access is strict: a key missing from a mapping, or a field taken
//! on a scalar, is an execution error rather than an empty string.

use std::fmt;

use serde_json::Value;

use crate::funcs::FunctionTable;
use crate::parser::ast::{Arg, Branch, Command, Node, Pipeline};

/// An execution failure with the line of the failing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecError {
    /// Line of the action being executed.
    pub line: usize,
    /// Description of the failure.
    pub message: String,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Executes a compiled node tree and returns the rendered text.
///
/// # Errors
///
/// Returns an [`ExecError`] on missing fields, bad function arguments,
/// and non-iterable `range` values.
pub fn execute(nodes: &[Node], vars: &Value, functions: &FunctionTable) -> Result<String, ExecError> {
    let mut executor = Executor {
        functions,
        root: vars,
        out: String::new(),
    };
    executor.walk(nodes, vars)?;
    Ok(executor.out)
}

struct Executor<'a> {
    functions: &'a FunctionTable,
    root: &'a Value,
    out: String,
}

impl Executor<'_> {
    fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<(), ExecError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action { pipeline, line } => {
                    let value = self.pipeline(pipeline, dot, *line)?;
                    print_value(&mut self.out, &value);
                }
                Node::If(branch) => {
                    let value = self.pipeline(&branch.pipeline, dot, branch.line)?;
                    let next = if truthy(&value) {
                        &branch.body
                    } else {
                        &branch.otherwise
                    };
                    self.walk(next, dot)?;
                }
                Node::With(branch) => {
                    let value = self.pipeline(&branch.pipeline, dot, branch.line)?;
                    if truthy(&value) {
                        self.walk(&branch.body, &value)?;
                    } else {
                        self.walk(&branch.otherwise, dot)?;
                    }
                }
                Node::Range(branch) => self.range(branch, dot)?,
            }
        }
        Ok(())
    }

    fn range(&mut self, branch: &Branch, dot: &Value) -> Result<(), ExecError> {
        let value = self.pipeline(&branch.pipeline, dot, branch.line)?;
        let items: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(ExecError {
                    line: branch.line,
                    message: format!("range can't iterate over {}", type_name(other)),
                });
            }
        };
        if items.is_empty() {
            return self.walk(&branch.otherwise, dot);
        }
        for item in items {
            self.walk(&branch.body, item)?;
        }
        Ok(())
    }

    fn pipeline(&self, pipeline: &Pipeline, dot: &Value, line: usize) -> Result<Value, ExecError> {
        let mut piped: Option<Value> = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, dot, line, piped)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn command(
        &self,
        command: &Command,
        dot: &Value,
        line: usize,
        piped: Option<Value>,
    ) -> Result<Value, ExecError> {
        let err = |message: String| ExecError { line, message };
        match command.args.split_first() {
            Some((Arg::Function(name), rest)) => {
                let mut args = rest
                    .iter()
                    .map(|arg| self.arg(arg, dot, line))
                    .collect::<Result<Vec<_>, _>>()?;
                args.extend(piped);
                self.call(name, &args, line)
            }
            Some((first, [])) => {
                if piped.is_some() {
                    return Err(err("can't pipe a value into a non-function".into()));
                }
                self.arg(first, dot, line)
            }
            Some(_) => Err(err("can't give arguments to a non-function".into())),
            None => Err(err("empty command".into())),
        }
    }

    fn arg(&self, arg: &Arg, dot: &Value, line: usize) -> Result<Value, ExecError> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Field(path) => field(dot, path, line),
            Arg::Variable(path) => field(self.root, path, line),
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Function(name) => self.call(name, &[], line),
            Arg::Pipeline(inner) => self.pipeline(inner, dot, line),
        }
    }

    fn call(&self, name: &str, args: &[Value], line: usize) -> Result<Value, ExecError> {
        let function = self.functions.get(name).ok_or_else(|| ExecError {
            line,
            message: format!("function \"{name}\" not defined"),
        })?;
        function.call(args).map_err(|message| ExecError {
            line,
            message: format!("error calling {name}: {message}"),
        })
    }
}

fn field(start: &Value, path: &[String], line: usize) -> Result<Value, ExecError> {
    let mut current = start;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment).ok_or_else(|| ExecError {
                line,
                message: format!("map has no entry for key \"{segment}\""),
            })?,
            Value::Null => {
                return Err(ExecError {
                    line,
                    message: format!("nil pointer evaluating .{segment}"),
                });
            }
            other => {
                return Err(ExecError {
                    line,
                    message: format!("can't evaluate field {segment} in type {}", type_name(other)),
                });
            }
        };
    }
    Ok(current.clone())
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// `false`, zero, nil, and empty strings/lists/maps are false.
#[allow(clippy::float_cmp)]
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn print_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => out.push_str(&i.to_string()),
            (_, Some(u), _) => out.push_str(&u.to_string()),
            (_, _, Some(f)) => out.push_str(&f.to_string()),
            _ => out.push_str(&n.to_string()),
        },
        Value::Array(_) | Value::Object(_) => out.push_str(&value.to_string()),
    }
}
