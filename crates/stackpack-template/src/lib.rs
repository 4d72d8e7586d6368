//! # stackpack-template
//!
//! Renders configuration templates against a variable tree.
//!
//! Handles:
//! - **Parser**: Splitting template text into literal text and `{{ }}`
//!   actions, tokenizing actions, and building the node tree.
//! - **Exec**: Walking the node tree against a variable tree.
//! - **Funcs**: The closed function table injected into every engine.
//! - **Engine**: Compile, execute, and re-validate `yaml` / `json` output.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod engine;
pub mod error;
pub mod exec;
pub mod funcs;
pub mod parser;

pub use engine::{OutputFormat, TemplateEngine};
pub use error::{TemplateError, TemplateErrorKind};
pub use funcs::{FunctionTable, TemplateFunction};
