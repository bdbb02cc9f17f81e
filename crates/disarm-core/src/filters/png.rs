//! PNG filter.
//!
//! PNG's chunk structure makes it an easy smuggling wrapper: decoders
//! ignore chunks they do not know, so arbitrary payloads ride along in
//! ancillary chunks without changing a pixel. Cleaning re-emits only
//! the chunks a renderer needs (critical chunks plus transparency and
//! color-intent) with their original bytes and CRCs; anything that does
//! not parse as a chunk sequence is blocked rather than repaired.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::Policy;

use super::{ContentFilter, FilterOutcome};

/// Filter for PNG images.
pub struct PngFilter;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const KEEP_CHUNKS: &[&[u8; 4]] = &[b"IHDR", b"PLTE", b"IDAT", b"IEND", b"tRNS", b"gAMA", b"sRGB"];

impl ContentFilter for PngFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::Png]
    }

    fn scrub(&self, bytes: &[u8], _policy: &Policy) -> Result<FilterOutcome> {
        let Some(mut rest) = bytes.strip_prefix(&SIGNATURE) else {
            return Ok(FilterOutcome::Block("png signature missing".into()));
        };

        let mut out = SIGNATURE.to_vec();
        let mut first = true;
        let mut saw_end = false;
        while !rest.is_empty() {
            let Some((chunk, kind, next)) = split_chunk(rest) else {
                return Ok(FilterOutcome::Block("png chunk structure is corrupt".into()));
            };
            if first && kind != *b"IHDR" {
                return Ok(FilterOutcome::Block("png does not start with IHDR".into()));
            }
            first = false;
            if KEEP_CHUNKS.contains(&&kind) {
                out.extend_from_slice(chunk);
            }
            if kind == *b"IEND" {
                saw_end = true;
                // Anything after IEND is smuggled payload; drop it.
                break;
            }
            rest = next;
        }
        if !saw_end {
            return Ok(FilterOutcome::Block("png has no IEND chunk".into()));
        }

        if out == bytes {
            Ok(FilterOutcome::Allow)
        } else {
            Ok(FilterOutcome::Clean(out))
        }
    }
}

/// Splits the next chunk off `rest`: (full chunk bytes, type, remainder).
fn split_chunk(rest: &[u8]) -> Option<(&[u8], [u8; 4], &[u8])> {
    if rest.len() < 12 {
        return None;
    }
    let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    let mut kind = [0u8; 4];
    kind.copy_from_slice(&rest[4..8]);
    if !kind.iter().all(u8::is_ascii_alphabetic) {
        return None;
    }
    let total = length.checked_add(12)?;
    if rest.len() < total {
        return None;
    }
    Some((&rest[..total], kind, &rest[total..]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0, 0, 0, 0]); // CRC not validated
        out
    }

    fn minimal_png(extra: &[Vec<u8>], trailing: &[u8]) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        out.extend(chunk(b"IHDR", &[0; 13]));
        for c in extra {
            out.extend_from_slice(c);
        }
        out.extend(chunk(b"IDAT", b"compressed"));
        out.extend(chunk(b"IEND", b""));
        out.extend_from_slice(trailing);
        out
    }

    fn run(png: &[u8]) -> FilterOutcome {
        PngFilter.scrub(png, &Policy::default()).unwrap()
    }

    #[test]
    fn test_minimal_png_allowed() {
        assert_eq!(run(&minimal_png(&[], b"")), FilterOutcome::Allow);
    }

    #[test]
    fn test_text_chunks_stripped() {
        let png = minimal_png(&[chunk(b"tEXt", b"Comment\0payload")], b"");
        let FilterOutcome::Clean(out) = run(&png) else {
            panic!("expected a rewrite");
        };
        assert_eq!(out, minimal_png(&[], b""));
    }

    #[test]
    fn test_transparency_kept() {
        let png = minimal_png(&[chunk(b"tRNS", &[0])], b"");
        assert_eq!(run(&png), FilterOutcome::Allow);
    }

    #[test]
    fn test_payload_after_iend_dropped() {
        let png = minimal_png(&[], b"PK\x03\x04 smuggled zip");
        let FilterOutcome::Clean(out) = run(&png) else {
            panic!("expected a rewrite");
        };
        assert_eq!(out, minimal_png(&[], b""));
    }

    #[test]
    fn test_truncated_chunk_blocked() {
        let mut png = minimal_png(&[], b"");
        png.truncate(png.len() - 4);
        assert!(matches!(run(&png), FilterOutcome::Block(_)));
    }

    #[test]
    fn test_missing_signature_blocked() {
        assert!(matches!(run(b"not a png"), FilterOutcome::Block(_)));
    }

    #[test]
    fn test_ihdr_must_come_first() {
        let mut png = SIGNATURE.to_vec();
        png.extend(chunk(b"tEXt", b"x"));
        png.extend(chunk(b"IEND", b""));
        assert!(matches!(run(&png), FilterOutcome::Block(_)));
    }

    #[test]
    fn test_oversized_length_blocked() {
        let mut png = SIGNATURE.to_vec();
        png.extend_from_slice(&u32::MAX.to_be_bytes());
        png.extend_from_slice(b"IHDR");
        png.extend_from_slice(&[0; 32]);
        assert!(matches!(run(&png), FilterOutcome::Block(_)));
    }
}
