//! The `manifest.json` schema.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use stackpack_compose::document::{self, SERVICES};

use crate::error::PackageError;

/// An asset fetched at install time instead of being embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    /// Namespaced path the asset belongs at.
    pub path: String,
    /// Where to fetch it from.
    pub url: String,
    /// Expected SHA-256, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Expected size in bytes, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Describes the contents of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Bundle name.
    pub name: String,
    /// Bundle version.
    pub version: String,
    /// Creation time; also the mtime of every archive entry.
    pub created_at: DateTime<Utc>,
    /// Images referenced by the merged document, sorted and deduplicated.
    pub images: Vec<String>,
    /// Archive paths of caller-supplied resources, sorted.
    pub resources: Vec<String>,
    /// SHA-256 of every archived file except the manifest, by archive path.
    pub checksums: BTreeMap<String, String>,
    /// Assets to fetch at install time.
    #[serde(default)]
    pub downloads: Vec<DownloadDescriptor>,
}

impl PackageManifest {
    /// Serializes the manifest as pretty JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::Manifest`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, PackageError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Images named by the services of a compose document.
///
/// # Errors
///
/// Returns [`PackageError::Document`] if the text is not a compose document.
pub fn collect_images(compose: &str) -> Result<Vec<String>, PackageError> {
    let root = document::parse("merged", compose)?;
    let images: BTreeSet<String> = document::entries(document::section(&root, SERVICES))
        .filter_map(|(_, service)| service.get("image").and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    Ok(images.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_sorted_and_deduplicated() {
        let compose = "services:\n  b:\n    image: redis:7\n  a:\n    image: nginx:1\n  c:\n    image: redis:7\n  d:\n    command: x\n";
        assert_eq!(collect_images(compose).expect("images"), ["nginx:1", "redis:7"]);
    }

    #[test]
    fn manifest_json_shape() {
        let manifest = PackageManifest {
            name: "demo".into(),
            version: "1.0.0".into(),
            created_at: DateTime::from_timestamp(0, 0).expect("epoch"),
            images: vec!["nginx:1".into()],
            resources: Vec::new(),
            checksums: BTreeMap::new(),
            downloads: vec![DownloadDescriptor {
                path: "t_1/m/big.bin".into(),
                url: "https://example.test/big.bin".into(),
                checksum: None,
                size: Some(10),
            }],
        };
        let value: serde_json::Value =
            serde_json::from_slice(&manifest.to_json().expect("json")).expect("parse");
        assert_eq!(value["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(value["downloads"][0]["size"], 10);
        assert!(value["downloads"][0].get("checksum").is_none());
    }
}
