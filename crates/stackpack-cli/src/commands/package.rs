//! `spk package` — Package a compose document into an installer bundle.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use stackpack_common::config::StackpackConfig;
use stackpack_package::{PackageOptions, PackageRequest, Packager, Resource};

use super::{parse_key_value, read_text};
use crate::output;

/// Arguments for the `package` command.
#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Path to the merged compose document.
    pub compose: PathBuf,

    /// Bundle name.
    #[arg(long)]
    pub name: String,

    /// File to embed, as `archive/path=local/path`.
    #[arg(long = "resource", value_name = "ARCHIVE=LOCAL", value_parser = parse_key_value)]
    pub resources: Vec<(String, String)>,

    /// Knob name listed in `.env.example`.
    #[arg(long = "knob", value_name = "NAME")]
    pub knobs: Vec<String>,

    /// Path of the bundle to write.
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Executes the `package` command.
///
/// # Errors
///
/// Returns an error if an input cannot be read or assembly fails.
pub fn execute(args: &PackageArgs, config: &StackpackConfig) -> anyhow::Result<()> {
    let mut request = PackageRequest::new(&args.name, read_text(&args.compose)?);
    request.resources = args
        .resources
        .iter()
        .map(|(archive_path, local)| {
            let data = std::fs::read(local).with_context(|| format!("reading resource {local}"))?;
            Ok(Resource::new(archive_path, data))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    request.knobs = args.knobs.iter().cloned().collect();

    let bundle = Packager::new(PackageOptions::from_config(config)).assemble(&request)?;
    output::emit(Some(&args.output), &bundle.bytes)?;
    println!(
        "Packaged {} -> {} ({}, {} image(s), {} resource(s))",
        args.name,
        args.output.display(),
        output::format_bytes(bundle.bytes.len() as u64),
        bundle.manifest.images.len(),
        bundle.manifest.resources.len()
    );
    Ok(())
}
