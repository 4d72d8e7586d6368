//! # stackpack-package
//!
//! Installer bundle assembly for merged compose documents.
//!
//! Handles:
//! - **Archive**: Deterministic gzip(tar) writing with fixed modes.
//! - **Manifest**: The `manifest.json` schema and image discovery.
//! - **Scripts**: Generated `install.sh`, `verify.sh`, and `.env.example`.
//! - **Hashing**: SHA-256 checksums and verification.
//! - **Store**: The artifact store seam bundles are uploaded through.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod archive;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod packager;
pub mod scripts;
pub mod store;

pub use error::PackageError;
pub use manifest::{DownloadDescriptor, PackageManifest};
pub use packager::{Bundle, PackageOptions, PackageRequest, Packager, Resource};
pub use store::ArtifactStore;
