//! Human-readable output formatter with colors and styling.

use super::formatter::OutputFormatter;
use anyhow::Result;
use console::Term;
use console::style;
use disarm_core::Scan;
use disarm_core::Status;
use disarm_core::Verdict;
use std::path::Path;

pub struct HumanFormatter {
    verbose: bool,
    quiet: bool,
    use_colors: bool,
    term: Term,
}

impl HumanFormatter {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            use_colors: console::colors_enabled(),
            term: Term::stdout(),
        }
    }

    fn status_label(&self, status: Status) -> String {
        let name = status.name();
        if !self.use_colors {
            return name.to_string();
        }
        match status {
            Status::Clean => style(name).green().to_string(),
            Status::Cleaned => style(name).yellow().to_string(),
            Status::Blocked => style(name).red().to_string(),
            Status::Error => style(name).red().bold().to_string(),
        }
    }

    fn write_verdict(&self, verdict: &Verdict, depth: usize) {
        let name = verdict.path.last().map_or("<root>", String::as_str);
        let mut line = format!(
            "{:indent$}{} [{}]",
            "",
            name,
            self.status_label(verdict.status),
            indent = depth * 2
        );
        // Reasons for clean leaves are noise unless asked for.
        if self.verbose || verdict.status > Status::Clean {
            line.push_str(&format!(" {}", verdict.reason));
        }
        let _ = self.term.write_line(&line);

        for child in &verdict.children {
            self.write_verdict(child, depth + 1);
        }
    }

    fn write_summary(&self, scan: &Scan) {
        let leaves = scan.verdict.leaves().count();
        let flagged = scan
            .verdict
            .leaves()
            .filter(|l| l.status >= Status::Blocked)
            .count();
        let _ = self.term.write_line(&format!(
            "  Items: {} ({} total, {} blocked)",
            leaves,
            scan.verdict.node_count(),
            flagged
        ));
    }
}

impl OutputFormatter for HumanFormatter {
    fn format_scan_result(&self, input: &Path, scan: &Scan) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        let mark = if scan.verdict.status == Status::Clean {
            "✓"
        } else {
            "✗"
        };
        if self.use_colors {
            let styled = if scan.verdict.status == Status::Clean {
                style(mark).green().bold()
            } else {
                style(mark).red().bold()
            };
            let _ = self.term.write_line(&format!(
                "{} {}: {}",
                styled,
                input.display(),
                self.status_label(scan.verdict.status)
            ));
        } else {
            let _ = self.term.write_line(&format!(
                "{} {}: {}",
                mark,
                input.display(),
                scan.verdict.status.name()
            ));
        }

        self.write_verdict(&scan.verdict, 1);
        self.write_summary(scan);
        Ok(())
    }

    fn format_clean_result(&self, input: &Path, output: &Path, scan: &Scan) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        match scan.status {
            Status::Clean | Status::Cleaned => {
                if self.use_colors {
                    let _ = self.term.write_line(&format!(
                        "{} Sanitized: {} -> {}",
                        style("✓").green().bold(),
                        input.display(),
                        output.display()
                    ));
                } else {
                    let _ = self.term.write_line(&format!(
                        "Sanitized: {} -> {}",
                        input.display(),
                        output.display()
                    ));
                }
            }
            Status::Blocked | Status::Error => {
                let _ = self.term.write_line(&format!(
                    "{}: {} (no output written)",
                    self.status_label(scan.status),
                    input.display()
                ));
            }
        }

        if self.verbose {
            self.write_verdict(&scan.verdict, 1);
        }
        self.write_summary(scan);
        Ok(())
    }

    fn format_warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        if self.use_colors {
            let _ = self
                .term
                .write_line(&format!("{} {message}", style("⚠").yellow().bold()));
        } else {
            let _ = self.term.write_line(&format!("Warning: {message}"));
        }
    }
}
