//! The byte storage seam.

use std::future::Future;

use stackpack_common::error::Result;

/// External byte storage that bundles are uploaded to and assets are
/// loaded from.
///
/// Failures are opaque to callers; retry policy belongs to the
/// implementation.
pub trait ArtifactStore: Send + Sync {
    /// Loads the bytes stored at `path`.
    fn download(&self, path: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Stores `bytes` at `path` and returns a locator for the stored object.
    fn upload(&self, path: &str, bytes: Vec<u8>) -> impl Future<Output = Result<String>> + Send;
}
