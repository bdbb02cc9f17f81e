//! ZIP archive container.
//!
//! Opening performs the zip-bomb guard from header-declared sizes before
//! any decompression: per-member size, summed declared size, and
//! inflation ratio are checked against the policy, and encrypted members
//! fail the whole open. Rebuilding preserves member order and carries
//! kept members over raw (no recompression), so an untouched archive
//! round-trips byte-for-byte at the member level.

use std::io::{Cursor, Read, Write};

use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, result::ZipError};

use crate::Result;
use crate::error::DisarmError;
use crate::policy::Policy;

use super::path_guard::sanitize_member_name;
use super::{Container, Disposition, Member, Rebuilt};

/// ZIP container over an in-memory archive.
pub struct ZipContainer {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    members: Vec<Member>,
    /// Original archive index per enumerated member (directory entries
    /// and their metadata rows are not enumerated).
    indices: Vec<usize>,
    /// Sanitized output name per enumerated member.
    out_names: Vec<String>,
    max_member_bytes: u64,
}

impl ZipContainer {
    /// Opens an in-memory ZIP archive and runs the pre-extraction guards.
    pub fn open(bytes: Vec<u8>, policy: &Policy) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(map_zip_err)?;

        let mut members = Vec::new();
        let mut indices = Vec::new();
        let mut out_names = Vec::new();
        let mut declared_total: u64 = 0;

        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i).map_err(map_zip_err)?;
            if entry.is_dir() {
                continue;
            }
            if entry.encrypted() {
                return Err(DisarmError::Encrypted(format!(
                    "zip member {:?} is password protected",
                    entry.name()
                )));
            }

            let declared = entry.size();
            let compressed = entry.compressed_size();
            if declared > policy.max_member_bytes {
                return Err(DisarmError::TooLarge {
                    what: "declared member size",
                    actual: declared,
                    limit: policy.max_member_bytes,
                });
            }
            declared_total = declared_total.saturating_add(declared);
            if declared_total > policy.max_total_bytes {
                return Err(DisarmError::TooLarge {
                    what: "declared archive size",
                    actual: declared_total,
                    limit: policy.max_total_bytes,
                });
            }
            if compressed > 0 && declared / compressed > u64::from(policy.max_inflation_ratio) {
                return Err(DisarmError::TooLarge {
                    what: "declared inflation ratio",
                    actual: declared / compressed,
                    limit: u64::from(policy.max_inflation_ratio),
                });
            }

            let declared_name = String::from_utf8_lossy(entry.name_raw()).into_owned();
            drop(entry);
            let sanitized = sanitize_member_name(&declared_name)?;
            members.push(Member {
                name: sanitized.name.clone(),
                declared_size: declared,
            });
            indices.push(i);
            out_names.push(sanitized.name);
        }

        Ok(Self {
            archive,
            members,
            indices,
            out_names,
            max_member_bytes: policy.max_member_bytes,
        })
    }

    /// Number of file members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` when the archive holds no file members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Container for ZipContainer {
    fn kind_name(&self) -> &'static str {
        "zip"
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn member_bytes(&mut self, index: usize) -> Result<Vec<u8>> {
        let archive_index = self.indices[index];
        let declared = self.members[index].declared_size;
        let mut entry = self.archive.by_index(archive_index).map_err(map_zip_err)?;

        // Declared sizes passed the open-time guard; a stream producing
        // more than declared is lying and gets cut off as malformed.
        let mut bytes = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
        let read = entry
            .by_ref()
            .take(self.max_member_bytes.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if read as u64 > declared {
            return Err(DisarmError::MalformedContainer(format!(
                "zip member {:?} exceeds its declared size",
                self.members[index].name
            )));
        }
        Ok(bytes)
    }

    fn rebuild(&mut self, dispositions: &[Disposition]) -> Result<Rebuilt> {
        if dispositions.len() != self.members.len() {
            return Err(DisarmError::RebuildFailed(
                "disposition count does not match member count".into(),
            ));
        }

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut enumerated = 0usize;

        for i in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(i).map_err(map_zip_err)?;
            if entry.is_dir() {
                // Directory rows carry no content; keep them for structure.
                writer.raw_copy_file(entry).map_err(map_rebuild_err)?;
                continue;
            }

            let out_name = self.out_names[enumerated].clone();
            match &dispositions[enumerated] {
                Disposition::Keep => {
                    writer
                        .raw_copy_file_rename(entry, out_name)
                        .map_err(map_rebuild_err)?;
                }
                Disposition::Replace(bytes) => {
                    drop(entry);
                    let options = SimpleFileOptions::default()
                        .compression_method(CompressionMethod::Deflated);
                    writer.start_file(out_name, options).map_err(map_rebuild_err)?;
                    writer.write_all(bytes)?;
                }
                Disposition::Drop => {}
            }
            enumerated += 1;
        }

        let cursor = writer
            .finish()
            .map_err(|e| DisarmError::RebuildFailed(e.to_string()))?;
        Ok(Rebuilt::Bytes(cursor.into_inner()))
    }
}

fn map_zip_err(err: ZipError) -> DisarmError {
    match err {
        ZipError::Io(io) => DisarmError::Io(io),
        ZipError::UnsupportedArchive(what) => {
            if what.contains("Password") || what.contains("password") {
                DisarmError::Encrypted("zip archive requires a password".into())
            } else {
                DisarmError::UnsupportedFormat(format!("zip: {what}"))
            }
        }
        other => DisarmError::MalformedContainer(other.to_string()),
    }
}

fn map_rebuild_err(err: ZipError) -> DisarmError {
    match err {
        ZipError::Io(io) => DisarmError::Io(io),
        other => DisarmError::RebuildFailed(other.to_string()),
    }
}
