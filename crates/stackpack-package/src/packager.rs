//! Bundle assembly and publication.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use stackpack_common::config::StackpackConfig;
use stackpack_common::constants::{
    ARCHIVE_COMPOSE_PATH, ARCHIVE_ENV_EXAMPLE_PATH, ARCHIVE_INSTALL_PATH, ARCHIVE_MANIFEST_PATH,
    ARCHIVE_VERIFY_PATH, FILE_MODE, SCRIPT_MODE,
};

use crate::archive::{self, ArchiveEntry};
use crate::error::PackageError;
use crate::hash::sha256_hex;
use crate::manifest::{self, DownloadDescriptor, PackageManifest};
use crate::scripts::{self, ScriptParams};
use crate::store::ArtifactStore;

/// A caller-supplied file and its archive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Relative path inside the archive.
    pub path: String,
    /// File contents.
    pub data: Vec<u8>,
}

impl Resource {
    /// Creates a resource.
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
        }
    }
}

/// Everything one bundle is built from.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    /// Bundle name.
    pub name: String,
    /// Merged compose document.
    pub compose: String,
    /// Files to embed.
    pub resources: Vec<Resource>,
    /// Assets to fetch at install time.
    pub downloads: Vec<DownloadDescriptor>,
    /// Names of the configuration knobs listed in `.env.example`.
    pub knobs: BTreeSet<String>,
    /// Creation time stamped into the manifest and every entry.
    pub created_at: DateTime<Utc>,
}

impl PackageRequest {
    /// Creates a request with no resources, downloads, or knobs.
    pub fn new(name: impl Into<String>, compose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compose: compose.into(),
            resources: Vec::new(),
            downloads: Vec::new(),
            knobs: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// Settings shared by every bundle a [`Packager`] builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOptions {
    /// Version stamped into manifests.
    pub version: String,
    /// Directory `install.sh` copies resources into.
    pub runtime_dir: String,
    /// Seconds `install.sh` waits after `up -d`.
    pub startup_grace_secs: u64,
}

impl PackageOptions {
    /// Takes packaging settings from the runtime configuration.
    #[must_use]
    pub fn from_config(config: &StackpackConfig) -> Self {
        Self {
            version: config.package_version.clone(),
            runtime_dir: config.runtime_dir.clone(),
            startup_grace_secs: config.startup_grace_secs,
        }
    }
}

impl Default for PackageOptions {
    fn default() -> Self {
        Self::from_config(&StackpackConfig::default())
    }
}

/// An assembled bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// The manifest written into the archive.
    pub manifest: PackageManifest,
    /// The gzip(tar) bytes.
    pub bytes: Vec<u8>,
}

/// Builds and publishes installer bundles.
#[derive(Debug, Clone, Default)]
pub struct Packager {
    options: PackageOptions,
}

impl Packager {
    /// Creates a packager.
    #[must_use]
    pub const fn new(options: PackageOptions) -> Self {
        Self { options }
    }

    /// Assembles a bundle in memory.
    ///
    /// The archive holds `compose/docker-compose.yaml`, `env/.env.example`,
    /// `bin/install.sh`, `bin/verify.sh`, `manifest.json`, and then every
    /// resource sorted by path. Scripts get mode 0755, everything else 0644.
    ///
    /// # Errors
    ///
    /// Returns a [`PackageError`] for unusable or duplicate resource paths,
    /// an unreadable compose document, or a failed archive write.
    pub fn assemble(&self, request: &PackageRequest) -> Result<Bundle, PackageError> {
        tracing::info!(
            name = %request.name,
            resources = request.resources.len(),
            downloads = request.downloads.len(),
            "assembling bundle"
        );

        let fixed = [
            ARCHIVE_COMPOSE_PATH,
            ARCHIVE_ENV_EXAMPLE_PATH,
            ARCHIVE_INSTALL_PATH,
            ARCHIVE_VERIFY_PATH,
            ARCHIVE_MANIFEST_PATH,
        ];
        let mut resources: BTreeMap<&str, &[u8]> = BTreeMap::new();
        for resource in &request.resources {
            archive::validate_path(&resource.path)?;
            if fixed.contains(&resource.path.as_str())
                || resources
                    .insert(&resource.path, &resource.data)
                    .is_some()
            {
                return Err(PackageError::DuplicatePath {
                    path: resource.path.clone(),
                });
            }
        }

        let params = ScriptParams {
            name: &request.name,
            version: &self.options.version,
            runtime_dir: &self.options.runtime_dir,
            startup_grace_secs: self.options.startup_grace_secs,
            has_resources: !resources.is_empty(),
        };

        let mut entries = vec![
            ArchiveEntry {
                path: ARCHIVE_COMPOSE_PATH.into(),
                data: request.compose.clone().into_bytes(),
                mode: FILE_MODE,
            },
            ArchiveEntry {
                path: ARCHIVE_ENV_EXAMPLE_PATH.into(),
                data: scripts::env_example(&request.knobs, &request.compose).into_bytes(),
                mode: FILE_MODE,
            },
            ArchiveEntry {
                path: ARCHIVE_INSTALL_PATH.into(),
                data: scripts::install_script(&params).into_bytes(),
                mode: SCRIPT_MODE,
            },
            ArchiveEntry {
                path: ARCHIVE_VERIFY_PATH.into(),
                data: scripts::verify_script(&params).into_bytes(),
                mode: SCRIPT_MODE,
            },
        ];
        let mut resource_entries: Vec<ArchiveEntry> = resources
            .iter()
            .map(|(path, data)| ArchiveEntry {
                path: (*path).to_string(),
                data: data.to_vec(),
                mode: FILE_MODE,
            })
            .collect();

        let checksums = entries
            .iter()
            .chain(&resource_entries)
            .map(|entry| (entry.path.clone(), sha256_hex(&entry.data)))
            .collect();

        let manifest = PackageManifest {
            name: request.name.clone(),
            version: self.options.version.clone(),
            created_at: request.created_at,
            images: manifest::collect_images(&request.compose)?,
            resources: resources.keys().map(|path| (*path).to_string()).collect(),
            checksums,
            downloads: request.downloads.clone(),
        };
        entries.push(ArchiveEntry {
            path: ARCHIVE_MANIFEST_PATH.into(),
            data: manifest.to_json()?,
            mode: FILE_MODE,
        });
        entries.append(&mut resource_entries);

        let mtime = u64::try_from(request.created_at.timestamp()).unwrap_or(0);
        let bytes = archive::write_tar_gz(&entries, mtime)?;
        tracing::info!(name = %request.name, size = bytes.len(), "bundle assembled");
        Ok(Bundle { manifest, bytes })
    }

    /// Uploads an assembled bundle and returns the store's locator.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Upload`] wrapping the store's error.
    pub async fn publish<S: ArtifactStore>(
        &self,
        store: &S,
        path: &str,
        bundle: Bundle,
    ) -> Result<String, PackageError> {
        tracing::info!(path, size = bundle.bytes.len(), "uploading bundle");
        store
            .upload(path, bundle.bytes)
            .await
            .map_err(|source| PackageError::Upload {
                path: path.to_string(),
                source,
            })
    }

    /// Assembles a bundle and uploads it. Nothing is uploaded when assembly
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns the assembly error or the wrapped upload error.
    pub async fn package<S: ArtifactStore>(
        &self,
        request: &PackageRequest,
        store: &S,
        path: &str,
    ) -> Result<(PackageManifest, String), PackageError> {
        let bundle = self.assemble(request)?;
        let manifest = bundle.manifest.clone();
        let locator = self.publish(store, path, bundle).await?;
        Ok((manifest, locator))
    }
}
