//! Generated files: `install.sh`, `verify.sh`, and `.env.example`.

use std::collections::{BTreeMap, BTreeSet};

use stackpack_common::constants::{
    ARCHIVE_COMPOSE_PATH, ARCHIVE_ENV_EXAMPLE_PATH, ARCHIVE_INSTALL_PATH, ARCHIVE_MANIFEST_PATH,
    ARCHIVE_VERIFY_PATH, IMAGES_PREFIX, RESOURCES_PREFIX,
};
use stackpack_compose::document;

/// Values substituted into the generated scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptParams<'a> {
    /// Bundle name.
    pub name: &'a str,
    /// Bundle version.
    pub version: &'a str,
    /// Directory resources are copied into.
    pub runtime_dir: &'a str,
    /// Seconds to wait after `up -d`.
    pub startup_grace_secs: u64,
    /// Whether the bundle carries a `resources/` directory.
    pub has_resources: bool,
}

const INSTALL_TEMPLATE: &str = r#"#!/bin/sh
# Installs @NAME@ @VERSION@.
set -eu

BUNDLE_DIR="$(cd "$(dirname "$0")/.." && pwd)"
RUNTIME_DIR="@RUNTIME_DIR@"

fail() {
    echo "install: $*" >&2
    exit 1
}

command -v docker >/dev/null 2>&1 || fail "docker is not installed"
if docker compose version >/dev/null 2>&1; then
    COMPOSE="docker compose"
elif command -v docker-compose >/dev/null 2>&1; then
    COMPOSE="docker-compose"
else
    fail "docker compose is not installed"
fi

for image in "$BUNDLE_DIR"/@IMAGES@/*.tar; do
    [ -e "$image" ] || continue
    echo "loading image $image"
    docker load -i "$image"
done

mkdir -p "$RUNTIME_DIR"
if [ -d "$BUNDLE_DIR/@RESOURCES@" ]; then
    cp -R "$BUNDLE_DIR/@RESOURCES@/." "$RUNTIME_DIR/"
fi

if [ ! -f "$BUNDLE_DIR/compose/.env" ]; then
    cp "$BUNDLE_DIR/@ENV_EXAMPLE@" "$BUNDLE_DIR/compose/.env"
fi

cd "$BUNDLE_DIR/compose"
$COMPOSE up -d
sleep @GRACE@
$COMPOSE ps
"#;

const VERIFY_TEMPLATE: &str = r#"#!/bin/sh
# Verifies the host and bundle for @NAME@ @VERSION@.
set -u

BUNDLE_DIR="$(cd "$(dirname "$0")/.." && pwd)"
status=0

echo "== tools"
if command -v docker >/dev/null 2>&1; then
    docker --version
else
    echo "docker: missing"
    status=1
fi
if docker compose version 2>/dev/null; then
    :
elif command -v docker-compose >/dev/null 2>&1; then
    docker-compose version
else
    echo "docker compose: missing"
    status=1
fi

echo "== disk"
df -h "$BUNDLE_DIR"

echo "== bundle"
for path in @PATHS@; do
    if [ -e "$BUNDLE_DIR/$path" ]; then
        echo "present: $path"
    else
        echo "absent: $path"
        status=1
    fi
done

exit $status
"#;

/// Renders `bin/install.sh`.
#[must_use]
pub fn install_script(params: &ScriptParams<'_>) -> String {
    fill(INSTALL_TEMPLATE, params)
        .replace("@IMAGES@", IMAGES_PREFIX)
        .replace("@RESOURCES@", RESOURCES_PREFIX)
        .replace("@ENV_EXAMPLE@", ARCHIVE_ENV_EXAMPLE_PATH)
        .replace("@GRACE@", &params.startup_grace_secs.to_string())
        .replace("@RUNTIME_DIR@", params.runtime_dir)
}

/// Renders `bin/verify.sh`.
#[must_use]
pub fn verify_script(params: &ScriptParams<'_>) -> String {
    fill(VERIFY_TEMPLATE, params).replace("@PATHS@", &required_paths(params).join(" "))
}

/// Top-level paths `verify.sh` checks for.
#[must_use]
pub fn required_paths(params: &ScriptParams<'_>) -> Vec<&'static str> {
    let mut paths = vec![
        ARCHIVE_COMPOSE_PATH,
        ARCHIVE_ENV_EXAMPLE_PATH,
        ARCHIVE_INSTALL_PATH,
        ARCHIVE_VERIFY_PATH,
        ARCHIVE_MANIFEST_PATH,
    ];
    if params.has_resources {
        paths.push(RESOURCES_PREFIX);
    }
    paths
}

fn fill(template: &str, params: &ScriptParams<'_>) -> String {
    template
        .replace("@NAME@", params.name)
        .replace("@VERSION@", params.version)
}

/// Renders `env/.env.example`.
///
/// Every knob in `knobs` is listed as an empty `NAME=` line; values never
/// reach the file. Names that are not shell identifiers are left out. Every
/// `${NAME}` still present in `compose` and not already a knob is listed
/// empty, or commented out with its default when it has one.
#[must_use]
pub fn env_example(knobs: &BTreeSet<String>, compose: &str) -> String {
    let mut lines: BTreeMap<String, String> = knobs
        .iter()
        .filter(|name| is_env_name(name))
        .map(|name| (name.clone(), format!("{name}=")))
        .collect();

    for placeholder in document::placeholders(compose) {
        let name = placeholder.name();
        if !is_env_name(name) || lines.contains_key(name) {
            continue;
        }
        let line = match default_value(&placeholder.expression) {
            Some(default) => format!("# {name}={default}"),
            None => format!("{name}="),
        };
        let _ = lines.insert(name.to_string(), line);
    }

    let mut out = String::from("# Configuration knobs. Copy to compose/.env and adjust.\n");
    for line in lines.values() {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn default_value(expression: &str) -> Option<&str> {
    expression
        .split_once(":-")
        .or_else(|| expression.split_once('-'))
        .map(|(_, default)| default)
}
