//! Build input records and build status.
//!
//! These are the shapes the persistence collaborator supplies and
//! accepts. They carry data only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stackpack_common::types::{BuildId, TargetId};
use stackpack_rules::DependencyRule;
use stackpack_template::OutputFormat;

use crate::stage::Stage;

const fn enabled() -> bool {
    true
}

/// A deployment target: one set of members built into one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Target identifier.
    pub id: TargetId,
    /// Target name; part of every namespace.
    pub name: String,
    /// Inactive targets are never built.
    #[serde(default = "enabled")]
    pub active: bool,
    /// Target-level variables.
    #[serde(default)]
    pub variables: Value,
    /// Members in build order.
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Target {
    /// Members that take part in a build.
    pub fn enabled_members(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| m.enabled)
    }
}

/// One container version attached to a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Member name, unique within the target.
    pub name: String,
    /// Disabled members are skipped.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Compose fragment as YAML text.
    pub compose: String,
    /// Name of the attached configuration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,
    /// Per-member variable overrides; highest precedence.
    #[serde(default)]
    pub overrides: Value,
}

/// A named bundle of files, assets, and rules attachable to members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Configuration name.
    pub name: String,
    /// Configuration version.
    #[serde(default)]
    pub version: String,
    /// Variables of this configuration version.
    #[serde(default)]
    pub variables: Value,
    /// Files to render or copy.
    #[serde(default)]
    pub files: Vec<ConfigFile>,
    /// Assets to embed or defer.
    #[serde(default)]
    pub assets: Vec<AssetDecl>,
    /// Dependency rules checked against the resolved variables.
    #[serde(default)]
    pub rules: Vec<DependencyRule>,
}

/// How a configuration file is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Rendered through the template engine.
    #[default]
    Template,
    /// Copied unchanged.
    Static,
}

/// One file of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Path relative to the member's namespace.
    pub path: String,
    /// Store path of the raw file.
    pub source: String,
    /// Template or static.
    #[serde(default)]
    pub kind: FileKind,
    /// Declared output format of templates.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Whether an asset travels inside the bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetMode {
    /// Loaded and embedded.
    #[default]
    Embedded,
    /// Listed in the manifest and fetched at install time.
    Download,
}

/// One asset of a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDecl {
    /// Path relative to the member's namespace.
    pub path: String,
    /// Store path of the bytes; defaults to `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Embedded or deferred.
    #[serde(default)]
    pub mode: AssetMode,
    /// Inclusion condition in the rule condition language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Download location; may itself be a template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Expected SHA-256.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Expected size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Coarse build status persisted for pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BuildStatus {
    /// Accepted, not started.
    Pending,
    /// Inside the given stage.
    Building(Stage),
    /// Every stage succeeded.
    Completed,
    /// A stage failed.
    Failed,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Building(stage) => write!(f, "building:{stage}"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => other
                .strip_prefix("building:")
                .ok_or_else(|| format!("unknown build status: {other}"))?
                .parse()
                .map(Self::Building),
        }
    }
}

impl From<BuildStatus> for String {
    fn from(status: BuildStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for BuildStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Final record of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Build identifier.
    pub build_id: BuildId,
    /// `completed` or `failed`.
    pub status: BuildStatus,
    /// Stage that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    /// Error text of the failed stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Locator of the uploaded bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Merge warnings.
    #[serde(default)]
    pub merge_warnings: Vec<String>,
    /// Lint warnings.
    #[serde(default)]
    pub lint_warnings: Vec<String>,
}

impl BuildOutcome {
    /// Whether the build completed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == BuildStatus::Completed
    }
}
