//! Deterministic gzip(tar) writing.
//!
//! Entries are written in the order given with a fixed mtime, uid/gid 0,
//! and an explicit mode, so identical inputs give identical bytes.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::PackageError;

/// One regular file to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Relative path inside the archive.
    pub path: String,
    /// File contents.
    pub data: Vec<u8>,
    /// Unix permission bits.
    pub mode: u32,
}

/// Checks that `path` can be used as a relative archive path.
///
/// # Errors
///
/// Returns [`PackageError::InvalidResourcePath`] for empty or absolute
/// paths, `.`/`..` components, empty components, and backslashes.
pub fn validate_path(path: &str) -> Result<(), PackageError> {
    let reject = |reason| {
        Err(PackageError::InvalidResourcePath {
            path: path.to_string(),
            reason,
        })
    };
    if path.is_empty() {
        return reject("path is empty");
    }
    if path.starts_with('/') {
        return reject("path must be relative");
    }
    if path.contains('\\') {
        return reject("path must use forward slashes");
    }
    if path
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return reject("path has an empty, `.` or `..` component");
    }
    Ok(())
}

/// Writes `entries` as a gzip-compressed tar stream.
///
/// # Errors
///
/// Returns [`PackageError::Archive`] if the tar or gzip stream cannot be
/// written.
pub fn write_tar_gz(entries: &[ArchiveEntry], mtime: u64) -> Result<Vec<u8>, PackageError> {
    let archive_err = |source| PackageError::Archive { source };
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        tracing::debug!(path = %entry.path, size = entry.data.len(), "adding archive entry");
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(entry.data.len() as u64);
        header.set_mode(entry.mode);
        header.set_mtime(mtime);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();
        builder
            .append_data(&mut header, &entry.path, entry.data.as_slice())
            .map_err(archive_err)?;
    }

    let mut encoder = builder.into_inner().map_err(archive_err)?;
    encoder.flush().map_err(archive_err)?;
    encoder.finish().map_err(archive_err)
}
