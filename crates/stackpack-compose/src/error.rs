//! Compose error types.

use thiserror::Error;

/// Failure to merge or lint a compose document.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The document is not valid YAML.
    #[error("failed to parse compose document {document}: {source}")]
    Parse {
        /// Module or file the document came from.
        document: String,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// The document parsed but does not have the compose shape.
    #[error("invalid compose document {document}: {message}")]
    InvalidDocument {
        /// Module or file the document came from.
        document: String,
        /// Description of the problem.
        message: String,
    },

    /// The merged document could not be serialized.
    #[error("failed to serialize merged document: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// Strict linting found at least one error.
    #[error("compose document failed linting with {errors} error(s)")]
    LintFailed {
        /// Number of lint errors.
        errors: usize,
    },
}
