//! JSON output formatter for machine-readable results.

use super::formatter::JsonOutput;
use super::formatter::OutputFormatter;
use anyhow::Result;
use disarm_core::Scan;
use disarm_core::Verdict;
use serde::Serialize;
use std::io::Write;
use std::io::{self};
use std::path::Path;

pub struct JsonFormatter;

impl JsonFormatter {
    fn output<T: Serialize>(value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        writeln!(io::stdout(), "{json}")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct ScanOutput<'a> {
    input: String,
    status: &'static str,
    verdict_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    items: usize,
    verdict: &'a Verdict,
}

impl OutputFormatter for JsonFormatter {
    fn format_scan_result(&self, input: &Path, scan: &Scan) -> Result<()> {
        let data = ScanOutput {
            input: input.display().to_string(),
            status: scan.status.name(),
            verdict_status: scan.verdict.status.name(),
            output: None,
            items: scan.verdict.node_count(),
            verdict: &scan.verdict,
        };
        Self::output(&JsonOutput::success("scan", data))
    }

    fn format_clean_result(&self, input: &Path, output: &Path, scan: &Scan) -> Result<()> {
        let data = ScanOutput {
            input: input.display().to_string(),
            status: scan.status.name(),
            verdict_status: scan.verdict.status.name(),
            output: Some(output.display().to_string()),
            items: scan.verdict.node_count(),
            verdict: &scan.verdict,
        };
        Self::output(&JsonOutput::success("clean", data))
    }

    fn format_warning(&self, message: &str) {
        let _ = writeln!(io::stderr(), "Warning: {message}");
    }
}
