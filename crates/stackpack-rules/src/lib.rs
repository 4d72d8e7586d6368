//! # stackpack-rules
//!
//! Dependency rule evaluation over arbitrary nested variable trees.
//!
//! Handles:
//! - **Value**: Tagged operands, literal parsing, emptiness and comparison.
//! - **Condition**: The `{{.Path}} <op> <literal>` mini-language.
//! - **Checker**: `requires` / `conflicts` / `cascades` rule evaluation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod checker;
pub mod condition;
pub mod error;
pub mod value;

pub use checker::{DependencyChecker, DependencyRule, RuleKind, ValidationError};
pub use condition::{CompareOp, Condition, evaluate_condition};
pub use error::RuleError;
pub use value::Operand;
