//! Errors raised while parsing or evaluating conditions.

use thiserror::Error;

/// Failure to parse or evaluate a rule condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The condition text does not follow `{{.Path}} <op> <literal>`.
    #[error("invalid condition \"{condition}\": {reason}")]
    InvalidCondition {
        /// Offending condition text.
        condition: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A relational operator was applied to a non-numeric operand.
    #[error("operator {op} requires numeric operands, got {left} and {right}")]
    NonNumericComparison {
        /// Operator symbol.
        op: &'static str,
        /// Kind of the resolved field value.
        left: &'static str,
        /// Kind of the literal.
        right: &'static str,
    },
}
