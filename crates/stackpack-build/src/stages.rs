//! The seven build stages.
//!
//! Each stage reads what earlier stages left in the [`BuildContext`] and
//! adds its own output. A stage never removes anything.

use std::collections::HashSet;

use serde_json::Value;
use stackpack_common::config::StackpackConfig;
use stackpack_common::constants::RESOURCES_PREFIX;
use stackpack_compose::{Linter, Merger, Module};
use stackpack_package::{DownloadDescriptor, PackageRequest, Packager, Resource, hash};
use stackpack_rules::{DependencyChecker, evaluate_condition};
use stackpack_template::TemplateEngine;

use crate::context::BuildContext;
use crate::error::StageError;
use crate::model::{AssetDecl, AssetMode, Configuration, FileKind, Member};
use crate::store::{ArtifactStore, BuildRecords};
use crate::variables;

/// Fails on an inactive target, no enabled members, or a repeated member name.
pub(crate) fn validation(ctx: &BuildContext) -> Result<(), StageError> {
    let target = &ctx.target;
    if !target.active {
        return Err(StageError::TargetInactive {
            target: target.id.to_string(),
        });
    }
    let mut seen = HashSet::new();
    for member in target.enabled_members() {
        if !seen.insert(member.name.as_str()) {
            return Err(StageError::DuplicateMember {
                member: member.name.clone(),
            });
        }
    }
    if seen.is_empty() {
        return Err(StageError::NoEnabledMembers {
            target: target.id.to_string(),
        });
    }
    Ok(())
}

/// Loads configurations, resolves every member's variables, and checks
/// dependency rules.
pub(crate) async fn configuration<R: BuildRecords>(
    ctx: &mut BuildContext,
    records: &R,
    checker: &DependencyChecker,
) -> Result<(), StageError> {
    let members: Vec<Member> = ctx.target.enabled_members().cloned().collect();
    let none = Value::Null;
    for member in &members {
        let configuration = match &member.configuration {
            Some(name) => {
                let loaded = records.load_configuration(name).await?;
                if loaded.is_none() {
                    tracing::debug!(member = %member.name, configuration = %name, "configuration not found, skipping");
                }
                loaded
            }
            None => None,
        };

        let builtins = variables::builtins(
            ctx.build_id.as_str(),
            ctx.target.id.as_str(),
            &ctx.target.name,
            &member.name,
            &ctx.merge_namespace(&member.name),
        );
        let version_vars = configuration.as_ref().map_or(&none, |c| &c.variables);
        let resolved = variables::resolve(&[
            &builtins,
            &ctx.target.variables,
            version_vars,
            &member.overrides,
        ]);

        if let Some(configuration) = configuration {
            if !configuration.rules.is_empty() {
                let errors = checker.check(&configuration.rules, &resolved);
                if !errors.is_empty() {
                    return Err(StageError::RuleViolations {
                        member: member.name.clone(),
                        errors,
                    });
                }
            }
            tracing::debug!(
                member = %member.name,
                configuration = %configuration.name,
                version = %configuration.version,
                "configuration attached"
            );
            let _ = ctx.configurations.insert(member.name.clone(), configuration);
        }
        let _ = ctx.variables.insert(member.name.clone(), resolved);
    }
    Ok(())
}

/// Renders template files and copies static files of every configuration.
pub(crate) async fn template_render<S: ArtifactStore>(
    ctx: &mut BuildContext,
    store: &S,
    engine: &TemplateEngine,
) -> Result<(), StageError> {
    let work = attached(ctx);
    for (member, configuration) in &work {
        let vars = member_variables(ctx, member);
        for file in &configuration.files {
            let path = ctx.namespaced_path(member, &file.path);
            let raw = store.download(&file.source).await?;
            let output = match file.kind {
                FileKind::Static => raw,
                FileKind::Template => {
                    let source =
                        String::from_utf8(raw).map_err(|_| StageError::Encoding { path: path.clone() })?;
                    engine.render(&path, &source, &vars, file.format)?
                }
            };
            tracing::debug!(member = %member, path = %path, size = output.len(), "file rendered");
            let _ = ctx.rendered_files.insert(path, output);
        }
    }
    Ok(())
}

/// Embeds or defers every asset whose inclusion condition holds.
pub(crate) async fn asset_resolution<S: ArtifactStore>(
    ctx: &mut BuildContext,
    store: &S,
    engine: &TemplateEngine,
    config: &StackpackConfig,
) -> Result<(), StageError> {
    let work = attached(ctx);
    for (member, configuration) in &work {
        let vars = member_variables(ctx, member);
        for asset in &configuration.assets {
            if let Some(condition) = &asset.condition {
                let include = evaluate_condition(condition, &vars).map_err(|source| {
                    StageError::AssetCondition {
                        member: member.clone(),
                        asset: asset.path.clone(),
                        source,
                    }
                })?;
                if !include {
                    tracing::debug!(member = %member, asset = %asset.path, "asset condition false, skipping");
                    continue;
                }
            }

            let path = ctx.namespaced_path(member, &asset.path);
            match asset.mode {
                AssetMode::Embedded => {
                    let source = asset.source.as_deref().unwrap_or(&asset.path);
                    let bytes = store.download(source).await?;
                    if let Some(checksum) = &asset.checksum {
                        hash::verify(&path, &bytes, checksum)?;
                    }
                    tracing::debug!(member = %member, path = %path, size = bytes.len(), "asset embedded");
                    let _ = ctx.assets.insert(path, bytes);
                }
                AssetMode::Download => {
                    let url = download_url(asset, &path, &vars, engine, config)?;
                    tracing::debug!(member = %member, path = %path, url = %url, "asset deferred");
                    ctx.downloads.push(DownloadDescriptor {
                        path,
                        url,
                        checksum: asset.checksum.clone(),
                        size: asset.size,
                    });
                }
            }
        }
    }
    Ok(())
}

fn download_url(
    asset: &AssetDecl,
    path: &str,
    vars: &Value,
    engine: &TemplateEngine,
    config: &StackpackConfig,
) -> Result<String, StageError> {
    match &asset.url {
        Some(url) if url.contains("{{") => {
            let compiled = engine.compile(path, url)?;
            Ok(engine.execute(&compiled, vars)?.trim().to_string())
        }
        Some(url) => Ok(url.clone()),
        None => Ok(format!(
            "{}/{path}",
            config.download_base_url.trim_end_matches('/')
        )),
    }
}

/// Merges the compose fragments of every enabled member.
///
/// The project map holds the flattened target-level variables, minus any
/// key a member resolved to a different value, so member overrides and
/// configuration values keep precedence during substitution.
pub(crate) fn compose_merge(ctx: &mut BuildContext, merger: &Merger) -> Result<(), StageError> {
    let modules: Vec<Module> = ctx
        .target
        .enabled_members()
        .map(|member| {
            let vars = ctx
                .variables
                .get(&member.name)
                .map(variables::flatten)
                .unwrap_or_default();
            Module::new(ctx.merge_namespace(&member.name), member.compose.clone()).with_variables(vars)
        })
        .collect();

    let mut project = variables::flatten(&ctx.target.variables);
    project.retain(|key, value| {
        modules
            .iter()
            .all(|module| module.variables.get(key).is_none_or(|own| own == value))
    });

    let merged = merger.merge(&modules, &project)?;
    for warning in &merged.warnings {
        tracing::warn!(build_id = %ctx.build_id, "{warning}");
    }
    ctx.merged = Some(merged);
    Ok(())
}

/// Lints the merged document in strict mode.
pub(crate) fn linting(ctx: &mut BuildContext, linter: &Linter) -> Result<(), StageError> {
    let merged = ctx
        .merged
        .as_ref()
        .ok_or(StageError::MissingInput("merged compose document"))?;
    let result = linter.lint_strict(&merged.document)?;
    for warning in &result.warnings {
        tracing::warn!(build_id = %ctx.build_id, "{warning}");
    }
    ctx.lint = Some(result);
    Ok(())
}

/// Assembles the bundle and uploads it under
/// `{upload_prefix}/{target}_{targetID}/{buildID}.tar.gz`.
pub(crate) async fn packaging<S: ArtifactStore>(
    ctx: &mut BuildContext,
    store: &S,
    packager: &Packager,
    config: &StackpackConfig,
) -> Result<(), StageError> {
    let merged = ctx
        .merged
        .as_ref()
        .ok_or(StageError::MissingInput("merged compose document"))?;
    let slug = ctx.target_slug();

    let mut request = PackageRequest::new(slug.clone(), merged.document.clone());
    request.resources = ctx
        .rendered_files
        .iter()
        .chain(&ctx.assets)
        .map(|(path, data)| Resource::new(format!("{RESOURCES_PREFIX}/{path}"), data.clone()))
        .collect();
    request.downloads.clone_from(&ctx.downloads);
    request.knobs = variables::flatten(&ctx.target.variables).into_keys().collect();

    let upload_path = format!(
        "{}/{slug}/{}.tar.gz",
        config.upload_prefix.trim_matches('/'),
        ctx.build_id
    );
    let (manifest, locator) = packager.package(&request, store, &upload_path).await?;
    tracing::info!(build_id = %ctx.build_id, artifact = %locator, "bundle published");
    ctx.manifest = Some(manifest);
    ctx.artifact = Some(locator);
    Ok(())
}

fn attached(ctx: &BuildContext) -> Vec<(String, Configuration)> {
    ctx.configurations
        .iter()
        .map(|(member, configuration)| (member.clone(), configuration.clone()))
        .collect()
}

fn member_variables(ctx: &BuildContext, member: &str) -> Value {
    ctx.variables.get(member).cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stackpack_common::types::BuildId;
    use stackpack_template::FunctionTable;

    use super::*;
    use crate::model::Target;
    use crate::store::MemoryStore;

    fn target(members: Value) -> Target {
        serde_json::from_value(json!({
            "id": "7",
            "name": "shop",
            "variables": {"PORT": 80, "REGION": "eu"},
            "members": members
        }))
        .expect("target")
    }

    fn engine() -> TemplateEngine {
        TemplateEngine::new(FunctionTable::standard(&[]))
    }

    #[test]
    fn validation_rejects_duplicates_and_empty_targets() {
        let dup = BuildContext::new(
            BuildId::new("b"),
            target(json!([
                {"name": "api", "compose": ""},
                {"name": "api", "compose": ""}
            ])),
        );
        assert!(matches!(validation(&dup), Err(StageError::DuplicateMember { .. })));

        let empty = BuildContext::new(
            BuildId::new("b"),
            target(json!([{"name": "api", "compose": "", "enabled": false}])),
        );
        assert!(matches!(validation(&empty), Err(StageError::NoEnabledMembers { .. })));
    }

    #[tokio::test]
    async fn missing_configuration_is_skipped_but_variables_resolve() {
        let store = MemoryStore::new();
        let mut ctx = BuildContext::new(
            BuildId::new("b"),
            target(json!([{"name": "api", "compose": "", "configuration": "absent", "overrides": {"PORT": 9}}])),
        );
        configuration(&mut ctx, &store, &DependencyChecker::new())
            .await
            .expect("configuration");
        assert!(ctx.configurations.is_empty());
        assert_eq!(ctx.variables["api"]["PORT"], 9);
        assert_eq!(ctx.variables["api"]["Namespace"], "shop_7__api");
    }

    #[tokio::test]
    async fn false_condition_skips_asset_and_download_gets_url() {
        let store = MemoryStore::new();
        store.insert_blob("blobs/logo.png", "png");
        let mut ctx = BuildContext::new(BuildId::new("b"), target(json!([])));
        let _ = ctx.variables.insert("web".into(), json!({"SSL": {"Enabled": false}, "REGION": "eu"}));
        let configuration: Configuration = serde_json::from_value(json!({
            "name": "web",
            "assets": [
                {"path": "certs/server.pem", "condition": "{{.SSL.Enabled}} == true"},
                {"path": "img/logo.png", "source": "blobs/logo.png"},
                {"path": "data/geo.db", "mode": "download", "url": "https://cdn.invalid/{{.REGION}}/geo.db", "size": 10},
                {"path": "data/big.bin", "mode": "download"}
            ]
        }))
        .expect("configuration");
        let _ = ctx.configurations.insert("web".into(), configuration);

        asset_resolution(&mut ctx, &store, &engine(), &StackpackConfig::default())
            .await
            .expect("assets");

        assert_eq!(ctx.assets.keys().collect::<Vec<_>>(), ["shop_7/web/img/logo.png"]);
        assert_eq!(ctx.downloads.len(), 2);
        assert_eq!(ctx.downloads[0].url, "https://cdn.invalid/eu/geo.db");
        assert_eq!(ctx.downloads[0].size, Some(10));
        assert_eq!(
            ctx.downloads[1].url,
            "https://downloads.invalid/assets/shop_7/web/data/big.bin"
        );
    }

    #[tokio::test]
    async fn embedded_asset_checksum_is_verified() {
        let store = MemoryStore::new();
        store.insert_blob("a.bin", "hello");
        let mut ctx = BuildContext::new(BuildId::new("b"), target(json!([])));
        let configuration: Configuration = serde_json::from_value(json!({
            "name": "c",
            "assets": [{"path": "a.bin", "checksum": "0".repeat(64)}]
        }))
        .expect("configuration");
        let _ = ctx.configurations.insert("m".into(), configuration);

        let err = asset_resolution(&mut ctx, &store, &engine(), &StackpackConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("hash mismatch"), "got: {err}");
    }

    #[test]
    fn project_variables_never_beat_member_values() {
        let mut ctx = BuildContext::new(
            BuildId::new("b"),
            target(json!([{
                "name": "db",
                "compose": "services:\n  pg:\n    image: postgres\n    ports:\n      - \"${PORT}:5432\"\n    environment:\n      REGION: ${REGION}\n"
            }])),
        );
        let _ = ctx
            .variables
            .insert("db".into(), json!({"PORT": 5433, "REGION": "eu"}));
        compose_merge(&mut ctx, &Merger::new()).expect("merge");
        let document = &ctx.merged.as_ref().expect("merged").document;
        assert!(document.contains("5433:5432"), "got: {document}");
        assert!(document.contains("REGION: eu"), "got: {document}");
    }

    #[test]
    fn linting_requires_a_merged_document() {
        let mut ctx = BuildContext::new(BuildId::new("b"), target(json!([])));
        assert!(matches!(
            linting(&mut ctx, &Linter::new()),
            Err(StageError::MissingInput(_))
        ));
    }
}
