//! Template parser.
//!
//! Transforms raw template text into a node tree through lexing and
//! recursive-descent parsing. Function names are checked against the
//! engine's function table at parse time, so a template calling an unknown
//! function never compiles.

pub mod ast;
pub mod lexer;

use std::fmt;

use serde_json::Value;

use self::ast::{Arg, Branch, Command, Node, Pipeline};
use self::lexer::{Item, Token};
use crate::funcs::FunctionTable;

/// A syntax error with its 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Line the error was detected on.
    pub line: usize,
    /// Description of the problem.
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

const KEYWORDS: [&str; 5] = ["if", "else", "end", "range", "with"];

/// Parses template source into a node tree.
///
/// # Errors
///
/// Returns a [`SyntaxError`] for malformed actions, unbalanced control
/// blocks, and calls to functions missing from `functions`.
pub fn parse(source: &str, functions: &FunctionTable) -> Result<Vec<Node>, SyntaxError> {
    let items = lexer::split_items(source)?;
    let mut cursor = ItemCursor {
        items: &items,
        pos: 0,
        functions,
    };
    match cursor.parse_list()? {
        (nodes, Terminator::Eof) => Ok(nodes),
        (_, Terminator::End { line }) => Err(syntax(line, "unexpected {{end}}")),
        (_, Terminator::Else { line } | Terminator::ElseIf { line, .. }) => {
            Err(syntax(line, "unexpected {{else}}"))
        }
    }
}

fn syntax(line: usize, message: impl Into<String>) -> SyntaxError {
    SyntaxError {
        line,
        message: message.into(),
    }
}

/// What ended a node list.
enum Terminator {
    Eof,
    End { line: usize },
    Else { line: usize },
    ElseIf { pipeline: Pipeline, line: usize },
}

/// Cursor over split items for block-level parsing.
struct ItemCursor<'a> {
    items: &'a [Item],
    pos: usize,
    functions: &'a FunctionTable,
}

impl ItemCursor<'_> {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Terminator), SyntaxError> {
        let items = self.items;
        let mut nodes = Vec::new();
        while let Some(item) = items.get(self.pos) {
            self.pos += 1;
            let (tokens, line) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text.clone()));
                    continue;
                }
                Item::Action { tokens, line } => (tokens.as_slice(), *line),
            };

            let keyword = match tokens.first() {
                Some(Token::Ident(name)) if KEYWORDS.contains(&name.as_str()) => name.as_str(),
                _ => {
                    let pipeline = self.pipeline(tokens, line)?;
                    nodes.push(Node::Action { pipeline, line });
                    continue;
                }
            };
            let rest = &tokens[1..];

            match keyword {
                "end" => {
                    expect_empty(rest, line, "end")?;
                    return Ok((nodes, Terminator::End { line }));
                }
                "else" => {
                    return match rest.first() {
                        None => Ok((nodes, Terminator::Else { line })),
                        Some(Token::Ident(name)) if name == "if" => {
                            let pipeline = self.pipeline(&rest[1..], line)?;
                            Ok((nodes, Terminator::ElseIf { pipeline, line }))
                        }
                        Some(_) => Err(syntax(line, "unexpected token after {{else}}")),
                    };
                }
                "if" => {
                    let pipeline = self.pipeline(rest, line)?;
                    nodes.push(Node::If(self.branch(pipeline, line, true)?));
                }
                "range" => {
                    let pipeline = self.pipeline(rest, line)?;
                    nodes.push(Node::Range(self.branch(pipeline, line, false)?));
                }
                _ => {
                    let pipeline = self.pipeline(rest, line)?;
                    nodes.push(Node::With(self.branch(pipeline, line, false)?));
                }
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    /// Parses a block body up to its `{{end}}`, including any `{{else}}`.
    fn branch(
        &mut self,
        pipeline: Pipeline,
        line: usize,
        allow_else_if: bool,
    ) -> Result<Branch, SyntaxError> {
        let (body, terminator) = self.parse_list()?;
        let otherwise = match terminator {
            Terminator::End { .. } => Vec::new(),
            Terminator::Else { line: else_line } => match self.parse_list()? {
                (nodes, Terminator::End { .. }) => nodes,
                (_, Terminator::Eof) => return Err(syntax(else_line, "missing {{end}}")),
                (_, Terminator::Else { line } | Terminator::ElseIf { line, .. }) => {
                    return Err(syntax(line, "unexpected {{else}} after {{else}}"));
                }
            },
            Terminator::ElseIf {
                pipeline: nested,
                line: else_line,
            } if allow_else_if => vec![Node::If(self.branch(nested, else_line, true)?)],
            Terminator::ElseIf { line, .. } => {
                return Err(syntax(line, "{{else if}} is only valid inside {{if}}"));
            }
            Terminator::Eof => return Err(syntax(line, "missing {{end}}")),
        };
        Ok(Branch {
            pipeline,
            body,
            otherwise,
            line,
        })
    }

    fn pipeline(&self, tokens: &[Token], line: usize) -> Result<Pipeline, SyntaxError> {
        if tokens.is_empty() {
            return Err(syntax(line, "missing value for command"));
        }
        let mut cursor = TokenCursor {
            tokens,
            pos: 0,
            line,
            functions: self.functions,
        };
        let pipeline = cursor.parse_pipeline()?;
        if let Some(tok) = cursor.peek() {
            return Err(syntax(line, format!("unexpected {tok:?} in action")));
        }
        Ok(pipeline)
    }
}

fn expect_empty(rest: &[Token], line: usize, keyword: &str) -> Result<(), SyntaxError> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(syntax(line, format!("unexpected arguments to {{{{{keyword}}}}}")))
    }
}

/// Cursor into a token stream for recursive-descent parsing.
struct TokenCursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
    functions: &'a FunctionTable,
}

impl TokenCursor<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> SyntaxError {
        syntax(self.line, message)
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, SyntaxError> {
        let mut commands = vec![self.parse_command()?];
        while self.peek() == Some(&Token::Pipe) {
            let _ = self.advance();
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline { commands })
    }

    fn parse_command(&mut self) -> Result<Command, SyntaxError> {
        let mut args = Vec::new();
        while let Some(tok) = self.peek() {
            if matches!(tok, Token::Pipe | Token::RParen) {
                break;
            }
            args.push(self.parse_arg()?);
        }
        if args.is_empty() {
            return Err(self.err("missing command in pipeline"));
        }
        Ok(Command { args })
    }

    fn parse_arg(&mut self) -> Result<Arg, SyntaxError> {
        let Some(tok) = self.advance().cloned() else {
            return Err(self.err("unexpected end of action"));
        };
        let arg = match tok {
            Token::Dot => Arg::Dot,
            Token::Field(path) => Arg::Field(path),
            Token::Variable(path) => Arg::Variable(path),
            Token::Str(s) => Arg::Literal(Value::String(s)),
            Token::Int(n) => Arg::Literal(Value::from(n)),
            Token::Float(f) => Arg::Literal(
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| self.err(format!("invalid number {f}")))?,
            ),
            Token::Bool(b) => Arg::Literal(Value::Bool(b)),
            Token::Nil => Arg::Literal(Value::Null),
            Token::LParen => {
                let inner = self.parse_pipeline()?;
                if self.advance() != Some(&Token::RParen) {
                    return Err(self.err("unclosed parenthesis"));
                }
                Arg::Pipeline(inner)
            }
            Token::Ident(name) => {
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(self.err(format!("unexpected keyword \"{name}\"")));
                }
                if !self.functions.contains(&name) {
                    return Err(self.err(format!("function \"{name}\" not defined")));
                }
                Arg::Function(name)
            }
            Token::Pipe | Token::RParen => {
                return Err(self.err(format!("unexpected {tok:?}")));
            }
        };
        Ok(arg)
    }
}
