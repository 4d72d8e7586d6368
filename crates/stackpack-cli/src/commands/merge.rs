//! `spk merge` — Merge compose fragments into one namespaced document.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use stackpack_compose::{Merger, Module};

use super::{parse_key_value, read_text};
use crate::output;

/// Arguments for the `merge` command.
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Compose fragments, merged in order. Each file's stem names its module.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Project-level variable substituted into `${NAME}` placeholders.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub vars: Vec<(String, String)>,

    /// Print the merge result (document, mapping, warnings) as JSON.
    #[arg(long)]
    pub json: bool,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Executes the `merge` command.
///
/// # Errors
///
/// Returns an error if a fragment cannot be read or parsed.
pub fn execute(args: &MergeArgs) -> anyhow::Result<()> {
    let modules = args
        .files
        .iter()
        .map(|path| {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .with_context(|| format!("cannot derive a module name from {}", path.display()))?;
            Ok(Module::new(name, read_text(path)?))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let project: BTreeMap<String, String> = args.vars.iter().cloned().collect();

    let result = Merger::new().merge(&modules, &project)?;
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }

    if args.json {
        output::emit_json(args.output.as_deref(), &result)
    } else {
        output::emit(args.output.as_deref(), result.document.as_bytes())
    }
}
