//! Tokenization of template source using `nom`.
//!
//! Template text is first split into literal text and `{{ ... }}` actions
//! (honouring `{{- ` / ` -}}` trim markers and `{{/* */}}` comments), then
//! each action body is tokenized into a stream of [`Token`]s.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{opt, recognize, value},
    sequence::{pair, preceded},
};

use super::SyntaxError;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// A token inside a template action.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `.` on its own: the current context value.
    Dot,
    /// `.A.B` field chain relative to the current context.
    Field(Vec<String>),
    /// `$` or `$.A.B`: a field chain relative to the root tree.
    Variable(Vec<String>),
    /// Function name or control keyword.
    Ident(String),
    /// Quoted or raw string literal.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Decimal literal.
    Float(f64),
    /// `true` / `false`.
    Bool(bool),
    /// `nil`.
    Nil,
    /// `|` pipe.
    Pipe,
    /// `(` opening parenthesis.
    LParen,
    /// `)` closing parenthesis.
    RParen,
}

/// A top-level piece of template source.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Literal text copied to the output.
    Text(String),
    /// A tokenized action.
    Action {
        /// Tokens of the action body.
        tokens: Vec<Token>,
        /// 1-based line the action starts on.
        line: usize,
    },
}

/// Splits template source into text and tokenized actions.
///
/// # Errors
///
/// Returns a [`SyntaxError`] on unclosed actions or comments, empty
/// actions, and characters that cannot be tokenized.
pub fn split_items(source: &str) -> Result<Vec<Item>, SyntaxError> {
    let mut items = Vec::new();
    let mut rest = source;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let trim_left = has_left_trim(after_open);

        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }
        if trim_left {
            text = text.trim_end();
        }
        push_text(&mut items, text);
        line += count_lines(&rest[..start]);

        let body_start = usize::from(trim_left);
        let close = find_close(&after_open[body_start..]).ok_or_else(|| SyntaxError {
            line,
            message: "unclosed action".into(),
        })?;
        let mut body = &after_open[body_start..body_start + close];
        trim_next = has_right_trim(body);
        if trim_next {
            body = &body[..body.len() - 1];
        }

        let action_line = line;
        line += count_lines(&after_open[..body_start + close]);
        rest = &after_open[body_start + close + CLOSE.len()..];

        let trimmed = body.trim();
        if trimmed.starts_with("/*") {
            if !trimmed.ends_with("*/") {
                return Err(SyntaxError {
                    line: action_line,
                    message: "unclosed comment".into(),
                });
            }
            continue;
        }

        let tokens = tokenize(body).map_err(|message| SyntaxError {
            line: action_line,
            message,
        })?;
        if tokens.is_empty() {
            return Err(SyntaxError {
                line: action_line,
                message: "missing value for command".into(),
            });
        }
        items.push(Item::Action {
            tokens,
            line: action_line,
        });
    }

    let text = if trim_next { rest.trim_start() } else { rest };
    push_text(&mut items, text);
    Ok(items)
}

fn push_text(items: &mut Vec<Item>, text: &str) {
    if !text.is_empty() {
        items.push(Item::Text(text.to_string()));
    }
}

fn count_lines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// `{{- ` requires whitespace after the dash so `{{-3}}` stays a number.
fn has_left_trim(after_open: &str) -> bool {
    let mut chars = after_open.chars();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

fn has_right_trim(body: &str) -> bool {
    let mut chars = body.chars().rev();
    chars.next() == Some('-') && chars.next().is_some_and(char::is_whitespace)
}

/// Finds the closing `}}` outside of string literals.
fn find_close(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if bytes[i..].starts_with(CLOSE.as_bytes()) => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

/// Parses a double-quoted string literal with basic escape support.
fn string_literal(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('"')(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, '"')) => {
                let remaining = &input[idx + 1..];
                return Ok((remaining, Token::Str(result)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, '\\')) => result.push('\\'),
                Some((_, '"')) => result.push('"'),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => return Err(failure(input, nom::error::ErrorKind::Char)),
            },
            Some((_, c)) => result.push(c),
            None => return Err(failure(input, nom::error::ErrorKind::Char)),
        }
    }
}

/// Parses a backquoted raw string literal.
fn raw_string(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('`')(input)?;
    let (input, body) = take_while(|c| c != '`')(input)?;
    let (input, _) = char('`')(input)?;
    Ok((input, Token::Str(body.to_string())))
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(is_ident_start),
        take_while(is_ident_continue),
    ))
    .parse(input)
}

/// Collects `.Seg.Seg` segments after a leading `.` or `$`.
fn segments(mut input: &str) -> (&str, Vec<String>) {
    let mut path = Vec::new();
    while let Ok((rest, seg)) = preceded(char('.'), identifier).parse(input) {
        path.push(seg.to_string());
        input = rest;
    }
    (input, path)
}

/// Parses `.` or a `.Field.Chain`.
fn field_or_dot(input: &str) -> IResult<&str, Token> {
    let (_, _) = char('.')(input)?;
    let (rest, path) = segments(input);
    if path.is_empty() {
        Ok((&input[1..], Token::Dot))
    } else {
        Ok((rest, Token::Field(path)))
    }
}

/// Parses `$` or `$.Field.Chain`.
fn variable(input: &str) -> IResult<&str, Token> {
    let (input, _) = char('$')(input)?;
    let (rest, path) = segments(input);
    Ok((rest, Token::Variable(path)))
}

/// Parses an integer or decimal literal with an optional leading minus.
fn number(input: &str) -> IResult<&str, Token> {
    let (rest, text) = recognize((
        opt(char('-')),
        digit1,
        opt(preceded(char('.'), digit1)),
    ))
    .parse(input)?;
    let token = if text.contains('.') {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Token::Float)
    } else {
        text.parse::<i64>().ok().map(Token::Int)
    };
    token
        .map(|t| (rest, t))
        .ok_or_else(|| failure(input, nom::error::ErrorKind::Digit))
}

/// Parses a function name, keyword, or boolean/nil literal.
fn word(input: &str) -> IResult<&str, Token> {
    let (rest, name) = identifier(input)?;
    let token = match name {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        "nil" => Token::Nil,
        _ => Token::Ident(name.to_string()),
    };
    Ok((rest, token))
}

/// Parses a symbol token.
fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Pipe, char('|')),
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
    ))
    .parse(input)
}

/// Parses a single token (after whitespace has been skipped).
fn single_token(input: &str) -> IResult<&str, Token> {
    alt((
        string_literal,
        raw_string,
        field_or_dot,
        variable,
        number,
        symbol,
        word,
    ))
    .parse(input)
}

fn failure(input: &str, kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, kind))
}

/// Tokenizes the body of one action.
///
/// # Errors
///
/// Returns a message naming the input that could not be tokenized.
pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0::<&str, nom::error::Error<&str>>(remaining)
            .map_err(|e| format!("lexer error skipping whitespace: {e}"))?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        let (rest, token) = single_token(remaining).map_err(|_| {
            let snippet: String = remaining.chars().take(20).collect();
            format!("unexpected \"{snippet}\" in action")
        })?;
        tokens.push(token);
        remaining = rest;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_field_chain_and_pipe() {
        let tokens = tokenize(" .SSL.Enabled | upper ").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Field(vec!["SSL".into(), "Enabled".into()]),
                Token::Pipe,
                Token::Ident("upper".into()),
            ]
        );
    }

    #[test]
    fn tokenize_literals() {
        let tokens = tokenize(r#""a\"b" `raw` 42 -7 1.5 true nil . $ $.Root"#).expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Str("a\"b".into()),
                Token::Str("raw".into()),
                Token::Int(42),
                Token::Int(-7),
                Token::Float(1.5),
                Token::Bool(true),
                Token::Nil,
                Token::Dot,
                Token::Variable(Vec::new()),
                Token::Variable(vec!["Root".into()]),
            ]
        );
    }

    #[test]
    fn tokenize_rejects_unknown_characters() {
        let err = tokenize(".A + 1").unwrap_err();
        assert!(err.contains('+'), "got: {err}");
    }

    #[test]
    fn split_text_and_actions_with_lines() {
        let items = split_items("a\nb {{ .X }}\n{{.Y}}").expect("split");
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Item::Text("a\nb ".into()));
        assert!(matches!(&items[1], Item::Action { line: 2, .. }));
        assert!(matches!(&items[3], Item::Action { line: 3, .. }));
    }

    #[test]
    fn trim_markers_remove_adjacent_whitespace() {
        let items = split_items("a  \n {{- .X -}} \n b").expect("split");
        assert_eq!(items[0], Item::Text("a".into()));
        assert_eq!(items[2], Item::Text("b".into()));
    }

    #[test]
    fn negative_number_is_not_a_trim_marker() {
        let items = split_items("x {{-3}}").expect("split");
        assert_eq!(items[0], Item::Text("x ".into()));
        assert!(matches!(&items[1], Item::Action { tokens, .. } if tokens == &vec![Token::Int(-3)]));
    }

    #[test]
    fn comments_are_dropped() {
        let items = split_items("a{{/* note */}}b").expect("split");
        assert_eq!(items, vec![Item::Text("a".into()), Item::Text("b".into())]);
    }

    #[test]
    fn close_inside_string_does_not_end_action() {
        let items = split_items(r#"{{ "}}" }}"#).expect("split");
        assert!(matches!(&items[0], Item::Action { tokens, .. } if tokens == &vec![Token::Str("}}".into())]));
    }

    #[test]
    fn unclosed_action_is_error() {
        let err = split_items("line\n{{ .X").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn empty_action_is_error() {
        assert!(split_items("{{ }}").is_err());
    }
}
