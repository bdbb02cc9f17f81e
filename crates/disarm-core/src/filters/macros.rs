//! Macro payload filter.
//!
//! A VBA project binary is executable content with no document value;
//! there is no cleaned form of it. The filter exists so that even a
//! policy that says `Clean` for macro payloads cannot let one through.

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::Policy;

use super::{ContentFilter, FilterOutcome};

/// Unconditional block for macro project payloads.
pub struct MacroFilter;

impl ContentFilter for MacroFilter {
    fn claims(&self) -> &'static [DetectedType] {
        &[DetectedType::MacroPayload]
    }

    fn scrub(&self, _bytes: &[u8], _policy: &Policy) -> Result<FilterOutcome> {
        Ok(FilterOutcome::Block(
            "macro project payloads are never carried through".into(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::policy::Action;

    #[test]
    fn test_always_blocks() {
        let outcome = MacroFilter.scrub(b"anything", &Policy::default()).unwrap();
        assert!(matches!(outcome, FilterOutcome::Block(_)));
    }

    #[test]
    fn test_blocks_even_under_clean_policy() {
        let policy = Policy::default().with_action(DetectedType::MacroPayload, Action::Clean);
        let outcome =
            super::super::scrub(DetectedType::MacroPayload, false, b"vba", &policy).unwrap();
        assert!(matches!(outcome, FilterOutcome::Block(_)));
    }
}
