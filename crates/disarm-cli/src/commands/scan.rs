//! Scan command implementation.

use crate::cli::ScanArgs;
use crate::output::OutputFormatter;
use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use disarm_core::Sanitizer;

pub fn execute(args: &ScanArgs, formatter: &dyn OutputFormatter) -> Result<i32> {
    if args.input.is_dir() {
        bail!(
            "'{}' is a directory; use `disarm clean <INPUT> <OUTPUT>` for trees",
            args.input.display()
        );
    }

    log::debug!("scanning {}", args.input.display());
    let policy = args.limits.to_policy(false);
    let scan = Sanitizer::new(policy)
        .scan_path(&args.input)
        .with_context(|| format!("failed to scan '{}'", args.input.display()))?;

    formatter.format_scan_result(&args.input, &scan)?;

    // The scan exit code reports the worst finding anywhere in the tree,
    // not just the root disposition.
    Ok(super::exit_code(scan.verdict.status))
}
