//! The mutable record threaded through every stage of one build.

use std::collections::BTreeMap;

use serde_json::Value;
use stackpack_common::constants::NAMESPACE_SEPARATOR;
use stackpack_common::types::BuildId;
use stackpack_compose::{LintResult, MergeResult};
use stackpack_package::{DownloadDescriptor, PackageManifest};

use crate::model::{Configuration, Target};

/// State of one build. Stages only ever add to it.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Build identifier.
    pub build_id: BuildId,
    /// Target being built.
    pub target: Target,
    /// Loaded configuration per member name.
    pub configurations: BTreeMap<String, Configuration>,
    /// Resolved variables per member name.
    pub variables: BTreeMap<String, Value>,
    /// Rendered and copied files by namespaced path.
    pub rendered_files: BTreeMap<String, Vec<u8>>,
    /// Embedded assets by namespaced path.
    pub assets: BTreeMap<String, Vec<u8>>,
    /// Assets deferred to install time.
    pub downloads: Vec<DownloadDescriptor>,
    /// Output of `compose_merge`.
    pub merged: Option<MergeResult>,
    /// Output of `linting`.
    pub lint: Option<LintResult>,
    /// Manifest of the published bundle.
    pub manifest: Option<PackageManifest>,
    /// Locator of the published bundle.
    pub artifact: Option<String>,
}

impl BuildContext {
    /// Creates an empty context for `target`.
    #[must_use]
    pub fn new(build_id: BuildId, target: Target) -> Self {
        Self {
            build_id,
            target,
            configurations: BTreeMap::new(),
            variables: BTreeMap::new(),
            rendered_files: BTreeMap::new(),
            assets: BTreeMap::new(),
            downloads: Vec::new(),
            merged: None,
            lint: None,
            manifest: None,
            artifact: None,
        }
    }

    /// `{target}_{targetID}`, the root of every namespace in this build.
    #[must_use]
    pub fn target_slug(&self) -> String {
        format!("{}_{}", self.target.name, self.target.id)
    }

    /// `{target}_{targetID}/{member}/{relative}`.
    #[must_use]
    pub fn namespaced_path(&self, member: &str, relative: &str) -> String {
        format!(
            "{}/{member}/{}",
            self.target_slug(),
            relative.trim_start_matches('/')
        )
    }

    /// `{target}_{targetID}__{member}`, the merge namespace of a member.
    #[must_use]
    pub fn merge_namespace(&self, member: &str) -> String {
        format!("{}{NAMESPACE_SEPARATOR}{member}", self.target_slug())
    }
}

#[cfg(test)]
mod tests {
    use stackpack_common::types::TargetId;

    use super::*;

    fn context() -> BuildContext {
        BuildContext::new(
            BuildId::new("b1"),
            Target {
                id: TargetId::new("42"),
                name: "shop".into(),
                active: true,
                variables: Value::Null,
                members: Vec::new(),
            },
        )
    }

    #[test]
    fn namespaces() {
        let ctx = context();
        assert_eq!(ctx.target_slug(), "shop_42");
        assert_eq!(ctx.namespaced_path("api", "conf/app.yaml"), "shop_42/api/conf/app.yaml");
        assert_eq!(ctx.namespaced_path("api", "/abs.txt"), "shop_42/api/abs.txt");
        assert_eq!(ctx.merge_namespace("api"), "shop_42__api");
    }
}
