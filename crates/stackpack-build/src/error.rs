//! Build error types.

use stackpack_common::error::StackpackError;
use stackpack_compose::ComposeError;
use stackpack_package::PackageError;
use stackpack_rules::{RuleError, ValidationError};
use stackpack_template::TemplateError;
use thiserror::Error;

/// Failure of one stage. Recorded verbatim in the build outcome.
#[derive(Debug, Error)]
pub enum StageError {
    /// The target is switched off.
    #[error("target {target} is inactive")]
    TargetInactive {
        /// Target identifier.
        target: String,
    },

    /// Nothing to build.
    #[error("target {target} has no enabled members")]
    NoEnabledMembers {
        /// Target identifier.
        target: String,
    },

    /// Two enabled members share a name and would share a namespace.
    #[error("member name {member} is used more than once")]
    DuplicateMember {
        /// Repeated name.
        member: String,
    },

    /// Dependency rules failed for a member.
    #[error("member {member}: {} dependency rule violation(s): {}", .errors.len(), summarize(.errors))]
    RuleViolations {
        /// Member name.
        member: String,
        /// Every violation, in rule order.
        errors: Vec<ValidationError>,
    },

    /// An asset inclusion condition could not be evaluated.
    #[error("member {member}: condition of asset {asset}: {source}")]
    AssetCondition {
        /// Member name.
        member: String,
        /// Asset path.
        asset: String,
        /// Evaluation error.
        #[source]
        source: RuleError,
    },

    /// A template file is not UTF-8.
    #[error("template {path} is not valid UTF-8")]
    Encoding {
        /// Namespaced path of the file.
        path: String,
    },

    /// An earlier stage did not leave the expected output.
    #[error("{0} missing from build context")]
    MissingInput(&'static str),

    /// Rendering failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Merging or linting failed.
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// Packaging or upload failed.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// A collaborator call failed.
    #[error(transparent)]
    Store(#[from] StackpackError),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure outside any stage: loading inputs or persisting status.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The target record could not be loaded.
    #[error("failed to load target {target}: {source}")]
    LoadTarget {
        /// Target identifier.
        target: String,
        /// Persistence error.
        #[source]
        source: StackpackError,
    },

    /// A status or outcome write failed.
    #[error("failed to record state of build {build_id}: {source}")]
    Record {
        /// Build identifier.
        build_id: String,
        /// Persistence error.
        #[source]
        source: StackpackError,
    },
}
