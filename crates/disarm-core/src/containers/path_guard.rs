//! Member-name normalization.
//!
//! Container member names are attacker-controlled. Extraction never
//! resolves a name outside the container's own namespace: absolute
//! prefixes, drive letters, and parent-directory components are stripped
//! before any member is materialized, and names that normalize to
//! nothing are rejected.

use crate::Result;
use crate::error::DisarmError;

/// A member name after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedName {
    /// Safe, slash-separated relative name.
    pub name: String,
    /// `true` when normalization changed the declared name.
    pub renamed: bool,
}

/// Normalizes a declared member name into a safe relative path.
///
/// Backslashes are treated as separators; empty, `.`, and `..`
/// components are removed, as are Windows drive-letter prefixes. NUL
/// bytes are rejected outright, as are names with no surviving
/// components.
pub fn sanitize_member_name(declared: &str) -> Result<SanitizedName> {
    if declared.contains('\0') {
        return Err(DisarmError::MalformedContainer(
            "member name contains NUL".into(),
        ));
    }

    let mut kept: Vec<&str> = Vec::new();
    let mut renamed = false;
    for component in declared.split(['/', '\\']) {
        match component {
            "" | "." | ".." => renamed = true,
            c if is_drive_prefix(c) => renamed = true,
            c => kept.push(c),
        }
    }

    if kept.is_empty() {
        return Err(DisarmError::MalformedContainer(format!(
            "member name {declared:?} normalizes to nothing"
        )));
    }

    let name = kept.join("/");
    Ok(SanitizedName {
        renamed: renamed || name != declared,
        name,
    })
}

fn is_drive_prefix(component: &str) -> bool {
    let bytes = component.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
