//! PDF filter.
//!
//! A PDF's cross-reference table stores absolute byte offsets, so any
//! rewrite that shifts bytes breaks the file. Instead of restructuring,
//! cleaning neutralizes active-content name tokens (`/JavaScript`,
//! `/OpenAction`, `/Launch`, ...) in place with same-length dummy names:
//! viewers no longer recognize the action, and every offset stays valid.
//!
//! Name tokens are matched after `#xx` hex-escape decoding, so
//! `/J#61vaScript` does not slip through.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::Policy;

use super::{ContentFilter, FilterOutcome};

/// Filter for PDF documents.
pub struct PdfFilter;

impl ContentFilter for PdfFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::Pdf]
    }

    fn scrub(&self, bytes: &[u8], policy: &Policy) -> Result<FilterOutcome> {
        if !bytes.starts_with(b"%PDF-") {
            return Ok(FilterOutcome::Block("pdf content lacks the %PDF header".into()));
        }
        let mut out = bytes.to_vec();
        let mut changed = false;
        let mut i = 0;
        while i < out.len() {
            if out[i] != b'/' {
                i += 1;
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while end < out.len() && !is_delimiter(out[end]) {
                end += 1;
            }
            let decoded = decode_name(&out[start..end]);
            if policy
                .pdf
                .strip_names
                .iter()
                .any(|name| name.as_bytes() == decoded.as_slice())
            {
                for byte in &mut out[start..end] {
                    *byte = b'X';
                }
                changed = true;
            }
            i = end.max(start);
        }
        if changed {
            Ok(FilterOutcome::Clean(out))
        } else {
            Ok(FilterOutcome::Allow)
        }
    }
}

/// PDF whitespace and delimiter characters end a name token.
fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' '
            | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Resolves `#xx` hex escapes inside a raw name token.
fn decode_name(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hi = (raw[i + 1] as char).to_digit(16);
            let lo = (raw[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}
