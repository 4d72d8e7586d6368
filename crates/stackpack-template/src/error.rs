//! Template error taxonomy.
//!
//! Compile, execute, and structural re-validation each fail with their own
//! variant so callers can tell a broken template from a broken variable
//! tree from output that no longer parses as its declared format.

use std::fmt;

use thiserror::Error;

/// Category of a [`TemplateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateErrorKind {
    /// Malformed template syntax.
    Parse,
    /// Failure while executing against the variable tree.
    Execution,
    /// Rendered output is not valid in its declared format.
    Structural,
}

impl fmt::Display for TemplateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Execution => write!(f, "execution"),
            Self::Structural => write!(f, "structural"),
        }
    }
}

/// Failure to render a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template did not compile.
    #[error("template {template}: parse error: {message}")]
    Parse {
        /// Template name.
        template: String,
        /// Description including the source line.
        message: String,
    },

    /// The template compiled but failed while executing.
    #[error("template {template}: execution error: {message}")]
    Execution {
        /// Template name.
        template: String,
        /// Description including the source line.
        message: String,
    },

    /// The rendered output is not valid for its declared format.
    #[error("template {template}: rendered output is not valid {format}: {message}")]
    Structural {
        /// Template name.
        template: String,
        /// Declared output format.
        format: String,
        /// Parser message for the rendered output.
        message: String,
    },
}

impl TemplateError {
    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> TemplateErrorKind {
        match self {
            Self::Parse { .. } => TemplateErrorKind::Parse,
            Self::Execution { .. } => TemplateErrorKind::Execution,
            Self::Structural { .. } => TemplateErrorKind::Structural,
        }
    }

    /// Name of the template that failed.
    #[must_use]
    pub fn template(&self) -> &str {
        match self {
            Self::Parse { template, .. }
            | Self::Execution { template, .. }
            | Self::Structural { template, .. } => template,
        }
    }
}
