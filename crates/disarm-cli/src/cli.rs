//! CLI argument parsing using clap.

use clap::Parser;
use clap::Subcommand;
use disarm_core::Policy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "disarm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a file and report verdicts without writing output
    Scan(ScanArgs),
    /// Sanitize a file or directory tree into a reconstructed copy
    Clean(CleanArgs),
}

#[derive(clap::Args)]
pub struct ScanArgs {
    /// Path to the file to scan
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(clap::Args)]
pub struct CleanArgs {
    /// Path to the file or directory to sanitize
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination file (or directory when INPUT is a directory)
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Pass unrecognized content through instead of blocking it
    #[arg(long)]
    pub permissive: bool,

    /// Overwrite an existing output file
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Resource-limit flags shared by both subcommands.
#[derive(clap::Args)]
pub struct LimitArgs {
    /// Maximum container nesting depth
    #[arg(long, default_value = "8", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_depth: u32,

    /// Maximum total materialized bytes across the scan
    #[arg(long, value_parser = parse_byte_size)]
    pub max_total_bytes: Option<u64>,

    /// Maximum uncompressed size for a single member
    #[arg(long, value_parser = parse_byte_size)]
    pub max_member_bytes: Option<u64>,

    /// Maximum member count across the scan
    #[arg(long, default_value = "10000")]
    pub max_members: u64,

    /// Maximum declared compression ratio
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_inflation_ratio: u32,

    /// Do not escalate actions on type/extension mismatches
    #[arg(long)]
    pub no_escalate: bool,
}

impl LimitArgs {
    /// Builds the engine policy from the flag set.
    pub fn to_policy(&self, permissive: bool) -> Policy {
        let base = if permissive {
            Policy::permissive()
        } else {
            Policy::default()
        };
        Policy {
            max_depth: self.max_depth,
            max_total_bytes: self.max_total_bytes.unwrap_or(base.max_total_bytes),
            max_member_bytes: self.max_member_bytes.unwrap_or(base.max_member_bytes),
            max_member_count: self.max_members,
            max_inflation_ratio: self.max_inflation_ratio,
            escalate_on_mismatch: base.escalate_on_mismatch && !self.no_escalate,
            ..base
        }
    }
}

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty byte size".to_string());
    }

    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix('T') {
        (stripped, 1024_u64.pow(4))
    } else if let Some(stripped) = s.strip_suffix('G') {
        (stripped, 1024_u64.pow(3))
    } else if let Some(stripped) = s.strip_suffix('M') {
        (stripped, 1024_u64.pow(2))
    } else if let Some(stripped) = s.strip_suffix('K') {
        (stripped, 1024)
    } else {
        (s, 1)
    };

    num_str
        .parse::<u64>()
        .map_err(|_| format!("invalid byte size: {s}"))
        .and_then(|n| {
            n.checked_mul(multiplier)
                .ok_or_else(|| format!("byte size overflow: {s}"))
        })
}
