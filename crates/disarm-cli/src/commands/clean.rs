//! Clean command implementation.

use crate::cli::CleanArgs;
use crate::output::OutputFormatter;
use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use disarm_core::Status;
use disarm_core::clean_path;
use disarm_core::clean_tree;

pub fn execute(args: &CleanArgs, formatter: &dyn OutputFormatter) -> Result<i32> {
    if !args.input.exists() {
        bail!("input path '{}' does not exist", args.input.display());
    }
    if args.output.exists() && !args.force {
        bail!(
            "output path '{}' already exists (use --force to overwrite)",
            args.output.display()
        );
    }

    let policy = args.limits.to_policy(args.permissive);
    log::debug!(
        "cleaning {} -> {}",
        args.input.display(),
        args.output.display()
    );

    let scan = if args.input.is_dir() {
        clean_tree(&args.input, &args.output, &policy)
    } else {
        clean_path(&args.input, &args.output, &policy)
    }
    .with_context(|| format!("failed to sanitize '{}'", args.input.display()))?;

    if scan.status >= Status::Blocked {
        formatter.format_warning("input was blocked; no sanitized output was produced");
    }
    formatter.format_clean_result(&args.input, &args.output, &scan)?;

    Ok(super::exit_code(scan.status))
}
