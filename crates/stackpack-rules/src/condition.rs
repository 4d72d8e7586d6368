//! The condition mini-language: `{{.<dot-path>}} <op> <literal>`.
//!
//! An empty condition is always true. Anything else must be exactly one
//! field reference, one comparison operator, and one literal.

use std::fmt;

use serde_json::Value;

use crate::error::RuleError;
use crate::value::{Operand, lookup};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CompareOp {
    /// Two-character operators first so `>=` never parses as `>`.
    const TABLE: [(&'static str, Self); 6] = [
        ("==", Self::Eq),
        ("!=", Self::Ne),
        (">=", Self::Ge),
        ("<=", Self::Le),
        (">", Self::Gt),
        ("<", Self::Lt),
    ];

    /// Operator symbol as written in conditions.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    fn strip(input: &str) -> Option<(Self, &str)> {
        Self::TABLE
            .iter()
            .find_map(|(sym, op)| input.strip_prefix(sym).map(|rest| (*op, rest)))
    }

    /// Applies the operator to two operands.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::NonNumericComparison`] when a relational
    /// operator meets a non-numeric, non-nil operand.
    pub fn apply(self, left: &Operand, right: &Operand) -> Result<bool, RuleError> {
        match (left, right) {
            (Operand::Nil, Operand::Nil) => {
                return Ok(matches!(self, Self::Eq | Self::Le | Self::Ge));
            }
            (Operand::Nil, _) | (_, Operand::Nil) => return Ok(self == Self::Ne),
            _ => {}
        }
        match self {
            Self::Eq => Ok(left.equals(right)),
            Self::Ne => Ok(!left.equals(right)),
            Self::Gt | Self::Ge | Self::Lt | Self::Le => {
                let (Operand::Number(a), Operand::Number(b)) = (left, right) else {
                    return Err(RuleError::NonNumericComparison {
                        op: self.symbol(),
                        left: left.kind(),
                        right: right.kind(),
                    });
                };
                Ok(match self {
                    Self::Gt => a > b,
                    Self::Ge => a >= b,
                    Self::Lt => a < b,
                    _ => a <= b,
                })
            }
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Empty condition; always true.
    Always,
    /// Field comparison.
    Compare {
        /// Dot-path into the variable tree, without the leading dot.
        path: String,
        /// Comparison operator.
        op: CompareOp,
        /// Parsed right-hand literal.
        literal: Operand,
    },
}

impl Condition {
    /// Parses condition text.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidCondition`] if the text is not empty and
    /// not of the form `{{.Path}} <op> <literal>`.
    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::Always);
        }
        let invalid = |reason: &str| RuleError::InvalidCondition {
            condition: text.to_string(),
            reason: reason.to_string(),
        };

        let rest = trimmed
            .strip_prefix("{{")
            .ok_or_else(|| invalid("expected field reference starting with {{"))?;
        let (reference, rest) = rest
            .split_once("}}")
            .ok_or_else(|| invalid("unterminated field reference"))?;
        let path = reference
            .trim()
            .strip_prefix('.')
            .ok_or_else(|| invalid("field reference must start with '.'"))?;
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(invalid("empty field path"));
        }

        let (op, literal) = CompareOp::strip(rest.trim_start())
            .ok_or_else(|| invalid("expected one of == != > >= < <="))?;
        let literal = literal.trim();
        if literal.is_empty() {
            return Err(invalid("missing literal"));
        }

        Ok(Self::Compare {
            path: path.to_string(),
            op,
            literal: Operand::parse_literal(literal),
        })
    }

    /// Evaluates the condition against a variable tree.
    ///
    /// # Errors
    ///
    /// Returns an error if a relational operator meets non-numeric operands.
    pub fn evaluate(&self, vars: &Value) -> Result<bool, RuleError> {
        match self {
            Self::Always => Ok(true),
            Self::Compare { path, op, literal } => {
                let field = Operand::from_tree(lookup(vars, path));
                op.apply(&field, literal)
            }
        }
    }
}

/// Parses and evaluates condition text in one step.
///
/// # Errors
///
/// Returns an error if the condition is malformed or cannot be evaluated.
pub fn evaluate_condition(text: &str, vars: &Value) -> Result<bool, RuleError> {
    Condition::parse(text)?.evaluate(vars)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_condition_is_always_true() {
        assert_eq!(Condition::parse("  ").expect("parse"), Condition::Always);
        assert!(evaluate_condition("", &json!({})).expect("eval"));
    }

    #[test]
    fn parse_accepts_spaces_inside_braces() {
        let cond = Condition::parse("{{ .SSL.Enabled }} == true").expect("parse");
        assert_eq!(
            cond,
            Condition::Compare {
                path: "SSL.Enabled".into(),
                op: CompareOp::Eq,
                literal: Operand::Bool(true),
            }
        );
    }

    #[test]
    fn greater_equal_boundary() {
        let cond = "{{.Count}} >= 10";
        assert!(evaluate_condition(cond, &json!({"Count": 10})).expect("eval"));
        assert!(!evaluate_condition(cond, &json!({"Count": 9})).expect("eval"));
        assert!(evaluate_condition(cond, &json!({"Count": 10.5})).expect("eval"));
    }

    #[test]
    fn missing_field_equal_true_is_false_not_error() {
        let result = evaluate_condition("{{.Missing}} == true", &json!({}));
        assert_eq!(result, Ok(false));
    }

    #[test]
    fn nil_semantics() {
        let vars = json!({"Null": null});
        assert_eq!(evaluate_condition("{{.Null}} != 1", &vars), Ok(true));
        assert_eq!(evaluate_condition("{{.Null}} > 1", &vars), Ok(false));
        assert_eq!(evaluate_condition("{{.Null}} <= 1", &vars), Ok(false));

        let nil = Operand::Nil;
        assert_eq!(CompareOp::Eq.apply(&nil, &nil), Ok(true));
        assert_eq!(CompareOp::Le.apply(&nil, &nil), Ok(true));
        assert_eq!(CompareOp::Ge.apply(&nil, &nil), Ok(true));
        assert_eq!(CompareOp::Ne.apply(&nil, &nil), Ok(false));
        assert_eq!(CompareOp::Lt.apply(&nil, &nil), Ok(false));
    }

    #[test]
    fn string_equality() {
        let vars = json!({"Env": "prod"});
        assert_eq!(evaluate_condition("{{.Env}} == \"prod\"", &vars), Ok(true));
        assert_eq!(evaluate_condition("{{.Env}} != prod", &vars), Ok(false));
    }

    #[test]
    fn relational_on_strings_is_reported() {
        let err = evaluate_condition("{{.Env}} > 3", &json!({"Env": "prod"})).unwrap_err();
        assert_eq!(
            err,
            RuleError::NonNumericComparison {
                op: ">",
                left: "string",
                right: "number",
            }
        );
    }

    #[test]
    fn malformed_conditions_are_rejected() {
        for text in [
            "Count >= 10",
            "{{Count}} >= 10",
            "{{.Count >= 10",
            "{{.Count}} ~ 10",
            "{{.Count}} >=",
            "{{.}} == 1",
        ] {
            assert!(
                matches!(
                    Condition::parse(text),
                    Err(RuleError::InvalidCondition { .. })
                ),
                "accepted: {text}"
            );
        }
    }
}
