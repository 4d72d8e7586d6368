//! `spk render` — Render a template against a variable file.

use std::path::PathBuf;

use clap::Args;
use stackpack_common::config::StackpackConfig;
use stackpack_template::{FunctionTable, OutputFormat, TemplateEngine};

use super::{read_data, read_text};
use crate::output;

/// Arguments for the `render` command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to the template.
    pub template: PathBuf,

    /// Variable tree as JSON or YAML.
    #[arg(long)]
    pub vars: Option<PathBuf>,

    /// Output format: yaml, json, env, or text.
    #[arg(long, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Executes the `render` command.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the template fails to
/// parse, execute, or validate.
pub fn execute(args: &RenderArgs, config: &StackpackConfig) -> anyhow::Result<()> {
    let source = read_text(&args.template)?;
    let vars = match &args.vars {
        Some(path) => read_data(path)?,
        None => serde_json::Value::Object(serde_json::Map::new()),
    };

    let engine = TemplateEngine::new(FunctionTable::standard(&config.env_allow_list));
    let name = args.template.display().to_string();
    let rendered = engine.render(&name, &source, &vars, args.format)?;
    output::emit(args.output.as_deref(), &rendered)
}
