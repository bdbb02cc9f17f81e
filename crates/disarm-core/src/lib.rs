//! Content disarm and reconstruction library.
//!
//! `disarm-core` takes untrusted files, identifies what they really are
//! from their bytes, recursively opens containers (ZIP, OLE2 compound
//! files, OpenXML packages, directory trees), rewrites each piece of
//! content with active constructs removed, and reconstructs byte-valid
//! output. What cannot be made safe is dropped, never passed through.
//!
//! # Examples
//!
//! ```
//! use disarm_core::{Policy, Sanitizer, Status};
//!
//! let engine = Sanitizer::new(Policy::default());
//! let scan = engine.scan_bytes("note.txt", b"hello".to_vec());
//! assert_eq!(scan.status, Status::Clean);
//! assert_eq!(scan.output.as_deref(), Some(b"hello".as_slice()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod budget;
pub mod containers;
pub mod engine;
pub mod error;
pub mod filters;
pub mod identify;
pub mod item;
pub mod policy;
pub mod sink;
pub mod verdict;

pub use api::clean_path;
pub use api::clean_tree;
pub use engine::Sanitizer;
pub use engine::Scan;
pub use error::DisarmError;
pub use error::Result;
pub use identify::DetectedType;
pub use identify::identify;
pub use item::FileItem;
pub use policy::Action;
pub use policy::Policy;
pub use verdict::Status;
pub use verdict::Verdict;
