//! Global configuration model for Stackpack builds.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, StackpackError};

/// Root configuration for build orchestration and packaging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackpackConfig {
    /// Store path prefix under which bundles are uploaded.
    pub upload_prefix: String,
    /// Base URL for deferred-download assets that declare no URL.
    pub download_base_url: String,
    /// Directory `install.sh` copies resources into.
    pub runtime_dir: String,
    /// Seconds `install.sh` waits after starting the stack.
    pub startup_grace_secs: u64,
    /// Environment variables the template `env` function may read.
    pub env_allow_list: Vec<String>,
    /// Version stamped into package manifests.
    pub package_version: String,
}

impl Default for StackpackConfig {
    fn default() -> Self {
        Self {
            upload_prefix: constants::DEFAULT_UPLOAD_PREFIX.into(),
            download_base_url: constants::DEFAULT_DOWNLOAD_BASE_URL.into(),
            runtime_dir: constants::DEFAULT_RUNTIME_DIR.into(),
            startup_grace_secs: constants::DEFAULT_STARTUP_GRACE_SECS,
            env_allow_list: constants::DEFAULT_ENV_ALLOW_LIST
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            package_version: constants::DEFAULT_PACKAGE_VERSION.into(),
        }
    }
}

impl StackpackConfig {
    /// Loads a configuration file. `.json` files are read as JSON,
    /// everything else as YAML. Missing keys fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| StackpackError::io(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }
}
