//! Container abstraction: open, enumerate, and rebuild structured
//! collections of named members.
//!
//! A container enumerates its direct members without expanding nested
//! containers; recursing into members that are themselves containers is
//! the traversal driver's decision. Rebuilding produces a byte-valid
//! container of the same format with members kept, replaced, or omitted
//! in the original member order.

mod dir;
mod ole2;
mod ooxml;
mod path_guard;
mod zip;

pub use dir::DirTree;
pub use ole2::Ole2File;
pub use ooxml::OoxmlPackage;
pub use path_guard::sanitize_member_name;
pub use zip::ZipContainer;

use crate::Result;
use crate::error::DisarmError;
use crate::identify::DetectedType;
use crate::policy::Policy;

/// A directly enumerable member of a container.
#[derive(Debug, Clone)]
pub struct Member {
    /// Normalized member name (path-safe, slash-separated).
    pub name: String,
    /// Header-declared (or on-disk) uncompressed size.
    pub declared_size: u64,
}

/// What to do with one member during rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Carry the original bytes through unchanged.
    Keep,
    /// Substitute cleaned bytes.
    Replace(Vec<u8>),
    /// Omit the member from the rebuilt container.
    Drop,
}

/// Result of a rebuild.
#[derive(Debug)]
pub enum Rebuilt {
    /// Rebuilt container bytes (archive variants).
    Bytes(Vec<u8>),
    /// Output written to the destination tree (directory variant).
    Tree,
}

/// Uniform contract over the container variants.
pub trait Container {
    /// Short stable label for the container variant.
    fn kind_name(&self) -> &'static str;

    /// Direct members in declared order. Does not materialize content.
    fn members(&self) -> &[Member];

    /// Materializes one member's bytes.
    fn member_bytes(&mut self, index: usize) -> Result<Vec<u8>>;

    /// Rebuilds the container applying one disposition per member,
    /// preserving declared member order.
    fn rebuild(&mut self, dispositions: &[Disposition]) -> Result<Rebuilt>;
}

/// Opens the container variant matching `kind` over in-memory bytes.
///
/// Directory trees are opened separately via [`DirTree::open`]; they come
/// from a filesystem path, not a byte buffer.
pub fn open_container(
    kind: DetectedType,
    bytes: Vec<u8>,
    policy: &Policy,
) -> Result<Box<dyn Container>> {
    match kind {
        DetectedType::Zip => Ok(Box::new(ZipContainer::open(bytes, policy)?)),
        DetectedType::OoxmlPackage => Ok(Box::new(OoxmlPackage::open(bytes, policy)?)),
        DetectedType::Ole2 => Ok(Box::new(Ole2File::open(&bytes, policy)?)),
        other => Err(DisarmError::UnsupportedFormat(format!(
            "{} is not a container format",
            other.name()
        ))),
    }
}
