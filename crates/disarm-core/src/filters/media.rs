//! AVI and MP3 filter.
//!
//! Media files are pass-through formats here: there is nothing to
//! rewrite without transcoding, so cleaning them means verifying the
//! declared structure actually matches the bytes. A file whose header
//! arithmetic does not add up is a wrapper for something else and gets
//! blocked, never repaired.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::Policy;

use super::{ContentFilter, FilterOutcome};

/// Validating filter for AVI and MP3 media.
pub struct MediaFilter;

impl ContentFilter for MediaFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::Avi, DetectedType::Mp3]
    }

    fn scrub(&self, bytes: &[u8], _policy: &Policy) -> Result<FilterOutcome> {
        if bytes.starts_with(b"RIFF") {
            return Ok(check_avi(bytes));
        }
        Ok(check_mp3(bytes))
    }
}

fn check_avi(bytes: &[u8]) -> FilterOutcome {
    if bytes.len() < 12 || &bytes[8..12] != b"AVI " {
        return FilterOutcome::Block("riff file is not an avi".into());
    }
    let declared = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as u64;
    // The RIFF size covers everything after the first 8 bytes; a size
    // pointing past the end means truncation or a lying header, and a
    // shorter size leaves trailing bytes no player will read.
    let actual = bytes.len() as u64 - 8;
    if declared > actual {
        return FilterOutcome::Block("avi declares more content than the file holds".into());
    }
    if declared < actual {
        return FilterOutcome::Block("avi carries trailing bytes beyond its riff size".into());
    }
    FilterOutcome::Allow
}

fn check_mp3(bytes: &[u8]) -> FilterOutcome {
    if let Some(rest) = bytes.strip_prefix(b"ID3") {
        if rest.len() < 7 {
            return FilterOutcome::Block("id3 header truncated".into());
        }
        let size_bytes = &rest[3..7];
        if size_bytes.iter().any(|&b| b & 0x80 != 0) {
            return FilterOutcome::Block("id3 size is not syncsafe".into());
        }
        let tag_size = size_bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 7) | u64::from(b));
        let audio_start = 10 + tag_size;
        let Some(audio) = bytes.get(usize::try_from(audio_start).unwrap_or(usize::MAX)..) else {
            return FilterOutcome::Block("id3 tag extends past end of file".into());
        };
        if audio.is_empty() {
            return FilterOutcome::Block("id3 tag with no audio frames".into());
        }
        return frame_sync(audio);
    }
    frame_sync(bytes)
}

fn frame_sync(audio: &[u8]) -> FilterOutcome {
    // Tolerate leading padding before the first frame header.
    let start = audio.iter().position(|&b| b != 0).unwrap_or(0);
    if audio.len() >= start + 2 && audio[start] == 0xFF && audio[start + 1] & 0xE0 == 0xE0 {
        FilterOutcome::Allow
    } else {
        FilterOutcome::Block("no mpeg audio frame sync".into())
    }
}
