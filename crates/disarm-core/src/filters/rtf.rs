//! RTF filter.
//!
//! The RTF attack surface is embedded OLE objects (`{\object ...}` and
//! `{\*\objdata ...}` groups), which is how the Equation Editor family
//! of exploits ships. Cleaning removes any group whose leading control
//! word is object- or DDE-related, with balanced-brace scanning that
//! honors `\{` and `\}` escapes. Everything outside removed groups is
//! untouched.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::Policy;

use super::{ContentFilter, FilterOutcome};

/// Filter for RTF documents.
pub struct RtfFilter;

const DENY_WORDS: &[&str] = &[
    "object",
    "objdata",
    "objemb",
    "objautlink",
    "objlink",
    "objclass",
    "objupdate",
    "datastore",
    "datafield",
    "dde",
    "ddeauto",
];

impl ContentFilter for RtfFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::Rtf]
    }

    fn scrub(&self, bytes: &[u8], _policy: &Policy) -> Result<FilterOutcome> {
        if !bytes.starts_with(b"{\\rtf") {
            return Ok(FilterOutcome::Block(
                "rtf content lacks the {\\rtf group".into(),
            ));
        }
        // Splicing the text around a removed group can spell out a new
        // denied control word; rewrite until a pass changes nothing.
        let mut cleaned = bytes.to_vec();
        loop {
            let next = rewrite(&cleaned);
            if next == cleaned {
                break;
            }
            cleaned = next;
        }
        if cleaned == bytes {
            Ok(FilterOutcome::Allow)
        } else {
            Ok(FilterOutcome::Clean(cleaned))
        }
    }
}

fn rewrite(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'{' => {
                if let Some(word) = group_control_word(&input[i..]) {
                    if DENY_WORDS.contains(&word.as_str()) {
                        i += group_len(&input[i..]);
                        continue;
                    }
                }
                out.push(b'{');
                i += 1;
            }
            // Escapes never open or close groups; copy the pair so a
            // trailing "\{" cannot desynchronize the scan.
            b'\\' if i + 1 < input.len() => {
                out.push(input[i]);
                out.push(input[i + 1]);
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Leading control word of a group: `{\word` or `{\*\word`, lowercased.
fn group_control_word(group: &[u8]) -> Option<String> {
    let mut i = 1;
    if group.get(i) == Some(&b'\\') && group.get(i + 1) == Some(&b'*') {
        i += 2;
    }
    if group.get(i) != Some(&b'\\') {
        return None;
    }
    i += 1;
    let start = i;
    while i < group.len() && group[i].is_ascii_alphabetic() {
        i += 1;
    }
    (i > start).then(|| String::from_utf8_lossy(&group[start..i]).to_ascii_lowercase())
}

/// Byte length of the balanced group starting at `{`; an unterminated
/// group swallows the rest of the input.
fn group_len(group: &[u8]) -> usize {
    let mut depth = 0usize;
    let mut i = 0;
    while i < group.len() {
        match group[i] {
            b'\\' => i += 2,
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    group.len()
}
