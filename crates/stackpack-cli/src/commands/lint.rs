//! `spk lint` — Lint a compose document.

use std::path::PathBuf;

use clap::Args;
use stackpack_compose::Linter;

use super::read_text;
use crate::output;

/// Arguments for the `lint` command.
#[derive(Args, Debug)]
pub struct LintArgs {
    /// Path to the compose document.
    pub file: PathBuf,

    /// Fail on warnings as well as errors.
    #[arg(long)]
    pub strict: bool,

    /// Print the lint result as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `lint` command.
///
/// Every finding is printed before the exit status is decided.
///
/// # Errors
///
/// Returns an error if the document cannot be read or parsed, if it has
/// lint errors, or (with `--strict`) if it has lint warnings.
pub fn execute(args: &LintArgs) -> anyhow::Result<()> {
    let text = read_text(&args.file)?;
    let result = Linter::new().lint(&text)?;

    if args.json {
        output::emit_json(None, &result)?;
    } else {
        for issue in &result.errors {
            println!("error: {issue}");
        }
        for issue in &result.warnings {
            println!("warning: {issue}");
        }
        println!(
            "{}: {} error(s), {} warning(s)",
            args.file.display(),
            result.errors.len(),
            result.warnings.len()
        );
    }

    if !result.valid {
        anyhow::bail!("{} has {} lint error(s)", args.file.display(), result.errors.len());
    }
    if args.strict && !result.warnings.is_empty() {
        anyhow::bail!(
            "{} has {} lint warning(s) and --strict is set",
            args.file.display(),
            result.warnings.len()
        );
    }
    Ok(())
}
