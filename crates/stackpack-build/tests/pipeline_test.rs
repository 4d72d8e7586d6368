//! End-to-end tests of the build pipeline.
//!
//! These drive the orchestrator through every stage against in-memory and
//! on-disk collaborators:
//! 1. Successful build producing an uploaded bundle
//! 2. Variable precedence across target, configuration, and member override
//! 3. Halting at the first failing stage
//! 4. Status reporting for pollers
//! 5. Filesystem-backed records and uploads

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::io::Read;

use serde_json::{Value, json};
use stackpack_build::{
    BuildError, BuildOrchestrator, BuildReport, BuildStatus, Configuration, FsStore, MemoryStore,
    Stage, Target,
};
use stackpack_common::config::StackpackConfig;
use stackpack_common::types::{BuildId, TargetId};
use stackpack_package::PackageManifest;

const API_COMPOSE: &str = r#"
services:
  app:
    image: registry.invalid/api@sha256:aaaa
    depends_on: [cache]
    ports:
      - "${PORT}:8080"
    networks: [back]
  cache:
    image: redis:7
    networks: [back]
networks:
  back: {}
"#;

const WEB_COMPOSE: &str = r#"
services:
  web:
    image: nginx@sha256:bbbb
    ports:
      - "8081:80"
"#;

const APP_TEMPLATE: &str = "port: {{ .PORT }}\nmember: {{ .MemberName }}\nreplicas: {{ .Replicas }}\n";

fn target(members: Value) -> Target {
    serde_json::from_value(json!({
        "id": "42",
        "name": "shop",
        "variables": {"PORT": 80, "REGION": "eu", "SSL": {"Enabled": false}},
        "members": members
    }))
    .expect("target")
}

fn default_members() -> Value {
    json!([
        {"name": "api", "compose": API_COMPOSE, "configuration": "api-config", "overrides": {"PORT": 5433}},
        {"name": "web", "compose": WEB_COMPOSE},
        {"name": "legacy", "compose": "services:\n  old:\n    build: .\n", "enabled": false}
    ])
}

fn configuration() -> Configuration {
    serde_json::from_value(json!({
        "name": "api-config",
        "version": "3",
        "variables": {"PORT": 3000, "Replicas": 2},
        "files": [
            {"path": "conf/app.yaml", "source": "blobs/app.yaml.tmpl", "format": "yaml"},
            {"path": "conf/motd.txt", "source": "blobs/motd.txt", "kind": "static"}
        ],
        "assets": [
            {"path": "certs/server.pem", "condition": "{{.SSL.Enabled}} == true"},
            {"path": "img/logo.png", "source": "blobs/logo.png"},
            {"path": "data/geo.db", "mode": "download", "url": "https://cdn.invalid/{{.REGION}}/geo.db"}
        ],
        "rules": [
            {"type": "requires", "field": "Replicas", "condition": "{{.Replicas}} > 1", "target": "REGION"}
        ]
    }))
    .expect("configuration")
}

fn seeded_store(members: Value) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_target(target(members));
    store.insert_configuration(configuration());
    store.insert_blob("blobs/app.yaml.tmpl", APP_TEMPLATE);
    store.insert_blob("blobs/motd.txt", "welcome {{ not rendered }}\n");
    store.insert_blob("blobs/logo.png", vec![0x89, b'P', b'N', b'G']);
    store
}

async fn build(store: &MemoryStore, build_id: &str) -> BuildReport {
    BuildOrchestrator::new(store.clone(), store.clone(), StackpackConfig::default())
        .run(BuildId::new(build_id), &TargetId::new("42"))
        .await
        .expect("build runs")
}

fn unpack(bytes: &[u8]) -> Vec<(String, u32, Vec<u8>)> {
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(bytes));
    archive
        .entries()
        .expect("entries")
        .map(|entry| {
            let mut entry = entry.expect("entry");
            let path = entry.path().expect("path").to_string_lossy().into_owned();
            let mode = entry.header().mode().expect("mode");
            let mut data = Vec::new();
            let _ = entry.read_to_end(&mut data).expect("read");
            (path, mode, data)
        })
        .collect()
}

fn entry<'a>(entries: &'a [(String, u32, Vec<u8>)], path: &str) -> &'a [u8] {
    entries
        .iter()
        .find(|(p, _, _)| p == path)
        .map(|(_, _, data)| data.as_slice())
        .unwrap_or_else(|| panic!("archive has no {path}"))
}

// ── Successful Build ─────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_builds_and_uploads_bundle() {
    let store = seeded_store(default_members());
    let report = build(&store, "b-1").await;

    assert!(report.outcome.succeeded(), "{:?}", report.outcome);
    assert_eq!(report.outcome.failed_stage, None);
    assert_eq!(
        report.outcome.artifact.as_deref(),
        Some("memory://packages/shop_42/b-1.tar.gz")
    );

    let bytes = store.blob("packages/shop_42/b-1.tar.gz").expect("uploaded bundle");
    let entries = unpack(&bytes);
    let paths: Vec<&str> = entries.iter().map(|(p, _, _)| p.as_str()).collect();
    assert_eq!(
        paths,
        [
            "compose/docker-compose.yaml",
            "env/.env.example",
            "bin/install.sh",
            "bin/verify.sh",
            "manifest.json",
            "resources/shop_42/api/conf/app.yaml",
            "resources/shop_42/api/conf/motd.txt",
            "resources/shop_42/api/img/logo.png",
        ]
    );
    for (path, mode, _) in &entries {
        let expected = if path.starts_with("bin/") { 0o755 } else { 0o644 };
        assert_eq!(*mode, expected, "{path}");
    }

    assert_eq!(
        entry(&entries, "resources/shop_42/api/conf/motd.txt"),
        b"welcome {{ not rendered }}\n"
    );
    assert_eq!(
        entry(&entries, "resources/shop_42/api/img/logo.png"),
        [0x89, b'P', b'N', b'G']
    );

    let manifest: PackageManifest =
        serde_json::from_slice(entry(&entries, "manifest.json")).expect("manifest");
    assert_eq!(manifest.name, "shop_42");
    assert_eq!(
        manifest.images,
        ["nginx@sha256:bbbb", "redis:7", "registry.invalid/api@sha256:aaaa"]
    );
    assert_eq!(manifest.downloads.len(), 1);
    assert_eq!(manifest.downloads[0].path, "shop_42/api/data/geo.db");
    assert_eq!(manifest.downloads[0].url, "https://cdn.invalid/eu/geo.db");
    assert_eq!(report.context.manifest.as_ref(), Some(&manifest));
}

#[tokio::test]
async fn pipeline_skips_disabled_members_and_false_conditions() {
    let store = seeded_store(default_members());
    let report = build(&store, "b-2").await;

    let document = &report.context.merged.as_ref().expect("merged").document;
    assert!(!document.contains("legacy"), "got: {document}");
    assert!(!report.context.assets.contains_key("shop_42/api/certs/server.pem"));
    assert!(report.context.variables.contains_key("web"));
    assert!(!report.context.configurations.contains_key("web"));
}

#[tokio::test]
async fn pipeline_env_example_never_carries_variable_values() {
    let store = seeded_store(default_members());
    let mut secret_target = target(default_members());
    secret_target.variables = json!({
        "PORT": 80,
        "REGION": "eu",
        "DB": {"Password": "s3cr3t"},
        "SSL": {"Enabled": false, "Key": "-----BEGIN KEY-----\nabc\n-----END KEY-----"}
    });
    store.insert_target(secret_target);

    let report = build(&store, "b-env").await;
    assert!(report.outcome.succeeded(), "{:?}", report.outcome);

    let bytes = store.blob("packages/shop_42/b-env.tar.gz").expect("uploaded bundle");
    let entries = unpack(&bytes);
    let env = String::from_utf8(entry(&entries, "env/.env.example").to_vec()).expect("utf-8");
    assert!(!env.contains("s3cr3t"), "got: {env}");
    assert!(!env.contains("BEGIN KEY"), "got: {env}");
    assert!(!env.contains("eu"), "got: {env}");
    let lines: Vec<&str> = env.lines().skip(1).collect();
    assert_eq!(
        lines,
        ["DB_Password=", "PORT=", "REGION=", "SSL_Enabled=", "SSL_Key="]
    );
}

#[tokio::test]
async fn pipeline_reports_merge_and_lint_warnings() {
    let store = seeded_store(default_members());
    let report = build(&store, "b-3").await;

    assert!(report.outcome.merge_warnings.is_empty(), "{:?}", report.outcome.merge_warnings);
    assert!(
        report
            .outcome
            .lint_warnings
            .iter()
            .any(|w| w.contains("image-digest") && w.contains("redis:7")),
        "{:?}",
        report.outcome.lint_warnings
    );
}

// ── Variable Precedence ──────────────────────────────────────────────

#[tokio::test]
async fn pipeline_member_override_wins_everywhere() {
    let store = seeded_store(default_members());
    let report = build(&store, "b-4").await;

    assert_eq!(report.context.variables["api"]["PORT"], 5433);
    assert_eq!(report.context.variables["web"]["PORT"], 80);
    assert_eq!(
        report.context.rendered_files["shop_42/api/conf/app.yaml"],
        b"port: 5433\nmember: api\nreplicas: 2\n"
    );

    let document = &report.context.merged.as_ref().expect("merged").document;
    let merged: serde_yaml::Value = serde_yaml::from_str(document).expect("merged yaml");
    let ports = &merged["services"]["shop_42__api__app"]["ports"][0];
    assert_eq!(ports.as_str(), Some("5433:8080"));
    assert_eq!(
        merged["services"]["shop_42__api__app"]["depends_on"][0].as_str(),
        Some("shop_42__api__cache")
    );
    assert!(merged["networks"]["shop_42__api__back"].is_mapping());
}

// ── Stage Failures ───────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_lint_failure_never_reaches_packaging() {
    let store = seeded_store(json!([
        {"name": "api", "compose": API_COMPOSE},
        {"name": "worker", "compose": "services:\n  job:\n    build: .\n"}
    ]));
    let build_id = BuildId::new("b-5");
    let report = build(&store, build_id.as_str()).await;

    assert_eq!(report.outcome.status, BuildStatus::Failed);
    assert_eq!(report.outcome.failed_stage, Some(Stage::Linting));
    let error = report.outcome.error.as_deref().expect("error text");
    assert!(error.contains("2 error(s)"), "got: {error}");
    assert_eq!(report.outcome.artifact, None);
    assert!(store.blob("packages/shop_42/b-5.tar.gz").is_none());

    // Earlier stage output stays in place.
    assert!(report.context.merged.is_some());
    assert!(report.context.manifest.is_none());

    let statuses = store.statuses(&build_id);
    assert_eq!(
        &statuses[statuses.len() - 2..],
        [BuildStatus::Building(Stage::Linting), BuildStatus::Failed]
    );
    assert!(!statuses.contains(&BuildStatus::Building(Stage::Packaging)));
    assert_eq!(store.outcome(&build_id), Some(report.outcome));
}

#[tokio::test]
async fn pipeline_rule_violation_fails_configuration() {
    let store = seeded_store(default_members());
    store.insert_target(
        serde_json::from_value(json!({
            "id": "42",
            "name": "shop",
            "variables": {"PORT": 80},
            "members": default_members()
        }))
        .expect("target"),
    );
    let report = build(&store, "b-6").await;

    assert_eq!(report.outcome.failed_stage, Some(Stage::Configuration));
    let error = report.outcome.error.as_deref().expect("error text");
    assert!(error.contains("member api"), "got: {error}");
    assert!(error.contains("1 dependency rule violation(s)"), "got: {error}");
    assert!(error.contains("REGION"), "got: {error}");
    assert!(report.context.rendered_files.is_empty());
}

#[tokio::test]
async fn pipeline_inactive_target_fails_validation() {
    let store = MemoryStore::new();
    store.insert_target(
        serde_json::from_value(json!({
            "id": "42",
            "name": "shop",
            "active": false,
            "members": [{"name": "api", "compose": API_COMPOSE}]
        }))
        .expect("target"),
    );
    let report = build(&store, "b-7").await;

    assert_eq!(report.outcome.failed_stage, Some(Stage::Validation));
    assert!(report.context.variables.is_empty());
    assert_eq!(
        store.statuses(&BuildId::new("b-7")),
        [
            BuildStatus::Pending,
            BuildStatus::Building(Stage::Validation),
            BuildStatus::Failed
        ]
    );
}

#[tokio::test]
async fn pipeline_broken_template_fails_render() {
    let store = seeded_store(default_members());
    store.insert_blob("blobs/app.yaml.tmpl", "port: {{ .PORT }\n");
    let report = build(&store, "b-8").await;

    assert_eq!(report.outcome.failed_stage, Some(Stage::TemplateRender));
    let error = report.outcome.error.as_deref().expect("error text");
    assert!(error.contains("shop_42/api/conf/app.yaml"), "got: {error}");
    assert!(error.contains("parse error"), "got: {error}");
}

#[tokio::test]
async fn pipeline_missing_blob_fails_stage() {
    let store = MemoryStore::new();
    store.insert_target(target(default_members()));
    store.insert_configuration(configuration());
    let report = build(&store, "b-9").await;

    assert_eq!(report.outcome.failed_stage, Some(Stage::TemplateRender));
    let error = report.outcome.error.as_deref().expect("error text");
    assert!(error.contains("blobs/app.yaml.tmpl"), "got: {error}");
}

#[tokio::test]
async fn pipeline_unknown_target_is_an_error() {
    let store = MemoryStore::new();
    let orchestrator =
        BuildOrchestrator::new(store.clone(), store.clone(), StackpackConfig::default());
    let err = orchestrator
        .run(BuildId::new("b-10"), &TargetId::new("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, BuildError::LoadTarget { ref target, .. } if target == "missing"));
    assert_eq!(
        store.statuses(&BuildId::new("b-10")),
        [BuildStatus::Pending, BuildStatus::Failed]
    );
}

// ── Status Reporting ─────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_records_status_before_and_after_every_stage() {
    let store = seeded_store(default_members());
    let build_id = BuildId::new("b-11");
    let _ = build(&store, build_id.as_str()).await;

    let mut expected = vec![BuildStatus::Pending];
    for stage in Stage::ALL {
        expected.push(BuildStatus::Building(stage));
        expected.push(BuildStatus::Building(stage));
    }
    expected.push(BuildStatus::Completed);
    assert_eq!(store.statuses(&build_id), expected);
    assert!(store.outcome(&build_id).is_some_and(|o| o.succeeded()));
}

// ── Filesystem Store ─────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_runs_over_filesystem_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    std::fs::create_dir_all(root.join("targets")).expect("mkdir");
    std::fs::create_dir_all(root.join("configurations")).expect("mkdir");
    std::fs::create_dir_all(root.join("blobs")).expect("mkdir");
    std::fs::write(
        root.join("targets/42.json"),
        serde_json::to_vec(&target(default_members())).expect("json"),
    )
    .expect("write target");
    std::fs::write(
        root.join("configurations/api-config.json"),
        serde_json::to_vec(&configuration()).expect("json"),
    )
    .expect("write configuration");
    std::fs::write(root.join("blobs/app.yaml.tmpl"), APP_TEMPLATE).expect("write");
    std::fs::write(root.join("blobs/motd.txt"), "hi\n").expect("write");
    std::fs::write(root.join("blobs/logo.png"), b"png").expect("write");

    let store = FsStore::new(root);
    let orchestrator = BuildOrchestrator::new(store.clone(), store, StackpackConfig::default());
    let report = orchestrator
        .run(BuildId::new("fs-1"), &TargetId::new("42"))
        .await
        .expect("build runs");

    assert!(report.outcome.succeeded(), "{:?}", report.outcome);
    let bundle = root.join("packages/shop_42/fs-1.tar.gz");
    assert!(bundle.is_file());
    assert_eq!(unpack(&std::fs::read(&bundle).expect("read bundle")).len(), 8);

    let log = std::fs::read_to_string(root.join("builds/fs-1.log")).expect("status log");
    assert!(log.starts_with("pending\nbuilding:validation\n"), "got: {log}");
    assert!(log.ends_with("building:packaging\ncompleted\n"), "got: {log}");
    let outcome: Value =
        serde_json::from_slice(&std::fs::read(root.join("builds/fs-1.json")).expect("outcome"))
            .expect("outcome json");
    assert_eq!(outcome["status"], "completed");
}
