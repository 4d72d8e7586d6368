//! Packaging error types.

use stackpack_common::error::StackpackError;
use stackpack_compose::ComposeError;
use thiserror::Error;

/// Failure to assemble or publish a bundle.
#[derive(Debug, Error)]
pub enum PackageError {
    /// A resource path is unusable inside the archive.
    #[error("invalid resource path {path:?}: {reason}")]
    InvalidResourcePath {
        /// Offending path.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Two entries would land at the same archive path.
    #[error("duplicate archive path {path}")]
    DuplicatePath {
        /// Path written twice.
        path: String,
    },

    /// The merged document could not be read for image discovery.
    #[error("invalid merged document: {0}")]
    Document(#[from] ComposeError),

    /// The manifest could not be serialized.
    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Writing the tar or gzip stream failed.
    #[error("failed to assemble archive: {source}")]
    Archive {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The artifact store rejected the upload.
    #[error("failed to upload bundle to {path}: {source}")]
    Upload {
        /// Store path of the upload.
        path: String,
        /// Store error.
        #[source]
        source: StackpackError,
    },
}
