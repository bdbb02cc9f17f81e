//! Plain-text filter.
//!
//! Text carries no active constructs, but NUL and other control bytes
//! are a classic way to smuggle content past downstream parsers or to
//! truncate what a reviewer sees. Cleaning strips every control byte
//! except tab, line feed, and carriage return, and re-encodes invalid
//! UTF-8 lossily.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::Policy;

use super::{ContentFilter, FilterOutcome};

/// Filter for plain text content.
pub struct TextFilter;

fn keep(c: char) -> bool {
    !c.is_control() || matches!(c, '\t' | '\n' | '\r')
}

impl ContentFilter for TextFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::Text]
    }

    fn scrub(&self, bytes: &[u8], _policy: &Policy) -> Result<FilterOutcome> {
        let text = String::from_utf8_lossy(bytes);
        let cleaned: String = text.chars().filter(|&c| keep(c)).collect();
        if cleaned.as_bytes() == bytes {
            Ok(FilterOutcome::Allow)
        } else {
            Ok(FilterOutcome::Clean(cleaned.into_bytes()))
        }
    }
}
