//! Convenience entry points for the common one-shot cases.

use std::fs;
use std::path::Path;

use crate::Result;
use crate::engine::{Sanitizer, Scan};
use crate::policy::Policy;

/// Scans the file at `input` and writes the reconstructed output to
/// `output`.
///
/// When the scan ends `Blocked` or `Error` there is no output and
/// nothing is written; callers decide from [`Scan::status`].
pub fn clean_path(input: &Path, output: &Path, policy: &Policy) -> Result<Scan> {
    let engine = Sanitizer::new(policy.clone());
    let scan = engine.scan_path(input)?;
    if let Some(bytes) = &scan.output {
        fs::write(output, bytes)?;
    }
    Ok(scan)
}

/// Scans every file under `input` and mirrors the surviving, sanitized
/// set under `output`.
pub fn clean_tree(input: &Path, output: &Path, policy: &Policy) -> Result<Scan> {
    Sanitizer::new(policy.clone()).clean_tree(input, output)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::verdict::Status;
    use tempfile::TempDir;

    #[test]
    fn test_clean_path_writes_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("page.html");
        let output = dir.path().join("page.clean.html");
        fs::write(&input, "<p>ok</p><script>x</script>").unwrap();

        let scan = clean_path(&input, &output, &Policy::default()).unwrap();
        assert_eq!(scan.status, Status::Cleaned);
        assert_eq!(fs::read(&output).unwrap(), b"<p>ok</p>");
    }

    #[test]
    fn test_clean_path_blocked_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("blob.bin");
        let output = dir.path().join("blob.clean.bin");
        fs::write(&input, [0u8, 1, 2, 200]).unwrap();

        let scan = clean_path(&input, &output, &Policy::default()).unwrap();
        assert_eq!(scan.status, Status::Blocked);
        assert!(!output.exists());
    }

    #[test]
    fn test_clean_tree_round_trip() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(src.path().join("a.txt"), "alpha").unwrap();

        let scan = clean_tree(src.path(), dest.path(), &Policy::default()).unwrap();
        assert_eq!(scan.status, Status::Clean);
        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"alpha");
    }
}
