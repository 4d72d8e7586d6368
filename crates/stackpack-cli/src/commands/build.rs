//! `spk build` — Run a full target build over a store directory.

use std::path::PathBuf;

use clap::Args;
use stackpack_build::{BuildOrchestrator, FsStore};
use stackpack_common::config::StackpackConfig;
use stackpack_common::types::{BuildId, TargetId};

use crate::output;

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Identifier of the target to build.
    pub target: String,

    /// Store directory holding targets, configurations, and blobs.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Build identifier; generated when omitted.
    #[arg(long)]
    pub build_id: Option<String>,

    /// Print the build outcome as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `build` command.
///
/// # Errors
///
/// Returns an error if the target cannot be loaded, build state cannot be
/// recorded, or any stage fails.
pub fn execute(args: &BuildArgs, config: StackpackConfig) -> anyhow::Result<()> {
    let build_id = args
        .build_id
        .as_deref()
        .map_or_else(BuildId::generate, BuildId::new);
    let target_id = TargetId::new(&args.target);
    let store = FsStore::new(&args.root);
    let orchestrator = BuildOrchestrator::new(store.clone(), store, config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(orchestrator.run(build_id, &target_id))?;
    let outcome = &report.outcome;

    if args.json {
        output::emit_json(None, outcome)?;
    } else {
        for warning in outcome.merge_warnings.iter().chain(&outcome.lint_warnings) {
            eprintln!("warning: {warning}");
        }
        println!("build {}: {}", outcome.build_id, outcome.status);
        if let Some(artifact) = &outcome.artifact {
            println!("artifact: {artifact}");
        }
    }

    if let (Some(stage), Some(error)) = (outcome.failed_stage, &outcome.error) {
        anyhow::bail!("build {} failed at {stage}: {error}", outcome.build_id);
    }
    Ok(())
}
