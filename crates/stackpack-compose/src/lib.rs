//! # stackpack-compose
//!
//! Merging and linting of compose documents.
//!
//! Handles:
//! - **Document**: Parsing, section access, and reference extraction over
//!   the YAML value tree.
//! - **Merger**: Combining independently authored fragments under private
//!   `{module}__` namespaces.
//! - **Linter**: The fixed policy rule set applied to a merged document.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod document;
pub mod error;
pub mod linter;
pub mod merger;

pub use error::ComposeError;
pub use linter::{LintIssue, LintResult, LintRule, Linter, Severity};
pub use merger::{EntityKind, MergeResult, Merger, Module, NameMapping, RenamedEntity};
