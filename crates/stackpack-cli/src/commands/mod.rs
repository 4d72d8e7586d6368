//! CLI command definitions and dispatch.

pub mod build;
pub mod check;
pub mod lint;
pub mod merge;
pub mod package;
pub mod render;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use stackpack_common::config::StackpackConfig;

/// Stackpack — compose fragments in, offline installer bundles out.
#[derive(Parser, Debug)]
#[command(name = "spk", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML or JSON configuration file.
    #[arg(long, global = true, env = "STACKPACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge compose fragments into one namespaced document.
    Merge(merge::MergeArgs),
    /// Lint a compose document.
    Lint(lint::LintArgs),
    /// Render a template against a variable file.
    Render(render::RenderArgs),
    /// Check dependency rules against a variable file.
    Check(check::CheckArgs),
    /// Package a compose document into an installer bundle.
    Package(package::PackageArgs),
    /// Run a full target build over a store directory.
    Build(build::BuildArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the command
/// fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => StackpackConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => StackpackConfig::default(),
    };

    match cli.command {
        Command::Merge(args) => merge::execute(&args),
        Command::Lint(args) => lint::execute(&args),
        Command::Render(args) => render::execute(&args, &config),
        Command::Check(args) => check::execute(&args),
        Command::Package(args) => package::execute(&args, &config),
        Command::Build(args) => build::execute(&args, config),
    }
}

/// Parses a `KEY=VALUE` argument.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Reads a JSON or YAML file, chosen by extension (`.json` is JSON,
/// anything else YAML).
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_data<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = read_text(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let value = if is_json {
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(value)
}

/// Reads a UTF-8 file with the path in the error.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
