//! In-memory file items flowing through the traversal.

use std::fs;
use std::path::Path;

use crate::Result;
use crate::identify::DetectedType;

/// A byte blob plus the metadata the engine tracks for it.
///
/// Items are exclusively owned by whichever component currently processes
/// them; the engine hands them down into containers and filters and
/// receives replacements back, never sharing them mutably.
#[derive(Debug, Clone)]
pub struct FileItem {
    /// Name as declared by the source (file name or container member name).
    pub declared_name: String,
    /// Raw content.
    pub bytes: Vec<u8>,
    /// Detected format; `None` until identification has run.
    pub detected: Option<DetectedType>,
    /// Container member names from the root down to this item.
    pub provenance: Vec<String>,
}

impl FileItem {
    /// Creates a root item from raw bytes.
    #[must_use]
    pub fn from_bytes(declared_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let declared_name = declared_name.into();
        Self {
            provenance: vec![declared_name.clone()],
            declared_name,
            bytes,
            detected: None,
        }
    }

    /// Reads a root item from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::from_bytes(name, bytes))
    }

    /// Creates a child item for a container member, extending provenance.
    #[must_use]
    pub fn child(&self, member_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let member_name = member_name.into();
        let mut provenance = self.provenance.clone();
        provenance.push(member_name.clone());
        Self {
            declared_name: member_name,
            bytes,
            detected: None,
            provenance,
        }
    }

    /// Content length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Returns `true` for zero-length content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Slash-joined provenance path for reporting.
    #[must_use]
    pub fn path_string(&self) -> String {
        self.provenance.join("/")
    }
}
