//! Tagged operands and dot-path lookup over variable trees.
//!
//! Every comparison in the condition language happens between two
//! [`Operand`]s: one resolved from the variable tree and one parsed
//! from the literal on the right-hand side.

use serde_json::Value;

/// A comparable value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Missing field or explicit null.
    Nil,
    /// Boolean value.
    Bool(bool),
    /// Any numeric value, widened to `f64`.
    Number(f64),
    /// String value.
    Text(String),
    /// A sequence or mapping taken from the variable tree.
    Composite(Value),
}

impl Operand {
    /// Converts a (possibly missing) tree value into an operand.
    #[must_use]
    pub fn from_tree(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Nil,
            Some(Value::Bool(b)) => Self::Bool(*b),
            Some(Value::Number(n)) => n.as_f64().map_or(Self::Nil, Self::Number),
            Some(Value::String(s)) => Self::Text(s.clone()),
            Some(other) => Self::Composite(other.clone()),
        }
    }

    /// Parses the right-hand literal of a condition.
    ///
    /// `true`/`false` become booleans, integer and decimal literals become
    /// numbers, single- or double-quoted text is unquoted, and anything
    /// else is taken as a bare string.
    #[must_use]
    pub fn parse_literal(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if is_numeric_literal(raw) {
            if let Ok(n) = raw.parse::<f64>() {
                return Self::Number(n);
            }
        }
        if let Some(inner) = unquote(raw) {
            return Self::Text(inner.to_string());
        }
        Self::Text(raw.to_string())
    }

    /// Short name of the operand kind, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Composite(_) => "composite",
        }
    }

    /// Native equality: numbers compare as `f64`, everything else
    /// compares only against the same kind.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Composite(a), Self::Composite(b)) => a == b,
            _ => false,
        }
    }
}

/// Matches `-?[0-9]+(\.[0-9]+)?`.
fn is_numeric_literal(raw: &str) -> bool {
    let digits = raw.strip_prefix('-').unwrap_or(raw);
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let valid_whole = !whole.is_empty() && whole.bytes().all(|b| b.is_ascii_digit());
    match parts.next() {
        None => valid_whole,
        Some(frac) => valid_whole && !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()),
    }
}

fn unquote(raw: &str) -> Option<&str> {
    if raw.len() < 2 {
        return None;
    }
    let quoted = (raw.starts_with('"') && raw.ends_with('"'))
        || (raw.starts_with('\'') && raw.ends_with('\''));
    quoted.then(|| &raw[1..raw.len() - 1])
}

/// Resolves a dot-separated path through nested mappings.
///
/// Returns `None` when any segment is missing or an intermediate value
/// is not a mapping.
#[must_use]
pub fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim().trim_start_matches('.');
    if path.is_empty() {
        return Some(tree);
    }
    path.split('.')
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

/// Returns whether a tree value counts as empty.
///
/// Empty: missing, null, `""`, `false`, zero, and zero-length sequences or
/// mappings. Whitespace-only strings are not empty.
#[must_use]
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64().is_none_or(|f| f == 0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_literal_booleans() {
        assert_eq!(Operand::parse_literal("true"), Operand::Bool(true));
        assert_eq!(Operand::parse_literal(" false "), Operand::Bool(false));
    }

    #[test]
    fn parse_literal_numbers() {
        assert_eq!(Operand::parse_literal("10"), Operand::Number(10.0));
        assert_eq!(Operand::parse_literal("-2.5"), Operand::Number(-2.5));
    }

    #[test]
    fn parse_literal_quoted_and_bare_strings() {
        assert_eq!(
            Operand::parse_literal("\"prod\""),
            Operand::Text("prod".into())
        );
        assert_eq!(Operand::parse_literal("'a b'"), Operand::Text("a b".into()));
        assert_eq!(Operand::parse_literal("prod"), Operand::Text("prod".into()));
        assert_eq!(Operand::parse_literal("1.2.3"), Operand::Text("1.2.3".into()));
        assert_eq!(Operand::parse_literal("\"10\""), Operand::Text("10".into()));
    }

    #[test]
    fn lookup_nested_path() {
        let tree = json!({"SSL": {"Enabled": true, "Certificate": "pem"}});
        assert_eq!(lookup(&tree, "SSL.Certificate"), Some(&json!("pem")));
        assert_eq!(lookup(&tree, ".SSL.Enabled"), Some(&json!(true)));
    }

    #[test]
    fn lookup_through_scalar_is_none() {
        let tree = json!({"SSL": "off"});
        assert_eq!(lookup(&tree, "SSL.Enabled"), None);
        assert_eq!(lookup(&tree, "Missing.Key"), None);
    }

    #[test]
    fn emptiness_rules() {
        assert!(is_empty(None));
        assert!(is_empty(Some(&json!(null))));
        assert!(is_empty(Some(&json!(""))));
        assert!(is_empty(Some(&json!(false))));
        assert!(is_empty(Some(&json!(0))));
        assert!(is_empty(Some(&json!(0.0))));
        assert!(is_empty(Some(&json!([]))));
        assert!(is_empty(Some(&json!({}))));

        assert!(!is_empty(Some(&json!("  "))));
        assert!(!is_empty(Some(&json!(true))));
        assert!(!is_empty(Some(&json!(3))));
        assert!(!is_empty(Some(&json!(["x"]))));
    }

    #[test]
    fn numbers_widen_for_equality() {
        let from_tree = Operand::from_tree(Some(&json!(10)));
        assert!(from_tree.equals(&Operand::parse_literal("10.0")));
        assert!(!from_tree.equals(&Operand::Text("10".into())));
    }
}
