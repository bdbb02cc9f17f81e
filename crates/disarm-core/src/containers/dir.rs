//! Directory-tree container.
//!
//! A directory tree is one container whose members are the regular files
//! under its root, named by their relative paths. Enumeration order is
//! sorted for deterministic reconstruction. Rebuilding mirrors the kept
//! and replaced members under a destination root; dropped members are
//! simply never written.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::Result;
use crate::error::DisarmError;
use crate::policy::Policy;

use super::{Container, Disposition, Member, Rebuilt};

/// Filesystem directory container.
pub struct DirTree {
    root: PathBuf,
    dest: PathBuf,
    members: Vec<Member>,
}

impl DirTree {
    /// Opens a directory tree rooted at `root`, with rebuilds targeting
    /// `dest`.
    pub fn open(root: &Path, dest: &Path, policy: &Policy) -> Result<Self> {
        if !root.is_dir() {
            return Err(DisarmError::MalformedContainer(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let mut members = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                DisarmError::MalformedContainer(format!("directory walk failed: {e}"))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| DisarmError::MalformedContainer(e.to_string()))?;
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > policy.max_member_bytes {
                return Err(DisarmError::TooLarge {
                    what: "file size",
                    actual: size,
                    limit: policy.max_member_bytes,
                });
            }
            members.push(Member {
                name: rel.to_string_lossy().replace('\\', "/"),
                declared_size: size,
            });
        }

        Ok(Self {
            root: root.to_path_buf(),
            dest: dest.to_path_buf(),
            members,
        })
    }
}

impl Container for DirTree {
    fn kind_name(&self) -> &'static str {
        "directory"
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn member_bytes(&mut self, index: usize) -> Result<Vec<u8>> {
        let path = self.root.join(&self.members[index].name);
        Ok(fs::read(path)?)
    }

    fn rebuild(&mut self, dispositions: &[Disposition]) -> Result<Rebuilt> {
        if dispositions.len() != self.members.len() {
            return Err(DisarmError::RebuildFailed(
                "disposition count does not match member count".into(),
            ));
        }

        fs::create_dir_all(&self.dest)?;
        for (member, disposition) in self.members.iter().zip(dispositions) {
            let out = self.dest.join(&member.name);
            match disposition {
                Disposition::Drop => continue,
                Disposition::Keep => {
                    write_member(&out, &fs::read(self.root.join(&member.name))?)?;
                }
                Disposition::Replace(bytes) => write_member(&out, bytes)?,
            }
        }
        Ok(Rebuilt::Tree)
    }
}

fn write_member(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("src/sub")).unwrap();
        fs::write(temp.path().join("a.txt"), b"alpha").unwrap();
        fs::write(temp.path().join("src/b.txt"), b"beta").unwrap();
        fs::write(temp.path().join("src/sub/c.bin"), b"\x00\x01").unwrap();
        temp
    }

    #[test]
    fn test_enumeration_is_sorted_files_only() {
        let temp = seed_tree();
        let dest = TempDir::new().unwrap();
        let tree = DirTree::open(temp.path(), dest.path(), &Policy::default()).unwrap();
        let names: Vec<&str> = tree.members().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "src/b.txt", "src/sub/c.bin"]);
    }

    #[test]
    fn test_rebuild_mirrors_and_drops() {
        let temp = seed_tree();
        let dest = TempDir::new().unwrap();
        let mut tree = DirTree::open(temp.path(), dest.path(), &Policy::default()).unwrap();
        let dispositions = vec![
            Disposition::Keep,
            Disposition::Replace(b"rewritten".to_vec()),
            Disposition::Drop,
        ];
        assert!(matches!(tree.rebuild(&dispositions).unwrap(), Rebuilt::Tree));

        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dest.path().join("src/b.txt")).unwrap(), b"rewritten");
        assert!(!dest.path().join("src/sub/c.bin").exists());
    }

    #[test]
    fn test_open_rejects_non_directory() {
        let temp = seed_tree();
        let dest = TempDir::new().unwrap();
        let err = DirTree::open(&temp.path().join("a.txt"), dest.path(), &Policy::default());
        assert!(matches!(err, Err(DisarmError::MalformedContainer(_))));
    }
}
