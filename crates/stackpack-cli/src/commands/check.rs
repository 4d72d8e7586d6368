//! `spk check` — Check dependency rules against a variable file.

use std::path::PathBuf;

use clap::Args;
use stackpack_rules::{DependencyChecker, DependencyRule};

use super::read_data;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Rule list as JSON or YAML.
    #[arg(long)]
    pub rules: PathBuf,

    /// Variable tree as JSON or YAML.
    #[arg(long)]
    pub vars: PathBuf,
}

/// Executes the `check` command.
///
/// # Errors
///
/// Returns an error if a file cannot be read or any rule is violated.
pub fn execute(args: &CheckArgs) -> anyhow::Result<()> {
    let rules: Vec<DependencyRule> = read_data(&args.rules)?;
    let vars: serde_json::Value = read_data(&args.vars)?;

    let errors = DependencyChecker::new().check(&rules, &vars);
    for error in &errors {
        println!("{error}");
    }
    if !errors.is_empty() {
        anyhow::bail!("{} of {} rule(s) violated", errors.len(), rules.len());
    }
    println!("{} rule(s) satisfied", rules.len());
    Ok(())
}
