//! Property-based tests over arbitrary inputs.
//!
//! The identifier and the filters face fully attacker-controlled bytes,
//! so the properties here are the load-bearing ones: total functions
//! that never panic, escalation that never weakens an action, cleaning
//! that converges after one pass, and member names that can never step
//! outside the extraction namespace.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use disarm_core::containers::sanitize_member_name;
use disarm_core::filters::{filter_for, FilterOutcome};
use disarm_core::{identify, DetectedType, Policy, Sanitizer, Status};
use proptest::prelude::*;

proptest! {
    /// Identification is total: any bytes plus any name yield a kind.
    #[test]
    fn prop_identify_never_panics(
        bytes in prop::collection::vec(any::<u8>(), 0..2048),
        name in ".{0,40}"
    ) {
        let _ = identify(&bytes, &name);
    }

    /// A mismatch can only hold or raise the resolved action severity.
    #[test]
    fn prop_mismatch_never_weakens_action(
        kind_idx in 0usize..13
    ) {
        let kinds = [
            DetectedType::Text, DetectedType::Html, DetectedType::Xml,
            DetectedType::Rtf, DetectedType::Pdf, DetectedType::Png,
            DetectedType::Avi, DetectedType::Mp3, DetectedType::Zip,
            DetectedType::OoxmlPackage, DetectedType::Ole2,
            DetectedType::MacroPayload, DetectedType::Binary,
        ];
        let kind = kinds[kind_idx];
        let policy = Policy::default();
        prop_assert!(policy.action_for(kind, true) >= policy.action_for(kind, false));
    }

    /// Sanitized member names are relative and free of parent hops.
    #[test]
    fn prop_sanitized_names_stay_inside(name in ".{1,80}") {
        if let Ok(sanitized) = sanitize_member_name(&name) {
            prop_assert!(!sanitized.name.starts_with('/'));
            prop_assert!(!sanitized.name.contains('\\'));
            prop_assert!(!sanitized.name.split('/').any(|c| c == ".." || c == "." || c.is_empty()));
        }
    }

    /// One cleaning pass reaches the fixed point for leaf filters.
    #[test]
    fn prop_leaf_cleaning_is_idempotent(
        bytes in prop::collection::vec(any::<u8>(), 0..512),
        kind_idx in 0usize..4
    ) {
        let kinds = [
            DetectedType::Text,
            DetectedType::Html,
            DetectedType::Xml,
            DetectedType::Pdf,
        ];
        let kind = kinds[kind_idx];
        let policy = Policy::default();
        let filter = filter_for(kind).unwrap();
        if let Ok(FilterOutcome::Clean(once)) = filter.scrub(&bytes, &policy) {
            let again = filter.scrub(&once, &policy).unwrap();
            prop_assert_eq!(again, FilterOutcome::Allow);
        }
    }

    /// Scanning arbitrary bytes terminates with a coherent result: output
    /// exists exactly for Clean and Cleaned scans.
    #[test]
    fn prop_scan_is_total_and_coherent(
        bytes in prop::collection::vec(any::<u8>(), 0..1024),
        name in "[a-z]{1,8}(\\.[a-z]{1,4})?"
    ) {
        let engine = Sanitizer::new(Policy::default());
        let scan = engine.scan_bytes(&name, bytes);
        match scan.status {
            Status::Clean | Status::Cleaned => prop_assert!(scan.output.is_some()),
            Status::Blocked | Status::Error => prop_assert!(scan.output.is_none()),
        }
        prop_assert!(scan.verdict.node_count() >= 1);
    }
}

#[test]
fn test_pdf_cleaning_preserves_length_on_fixtures() {
    // In-place neutralization must never shift a byte.
    let fixtures: [&[u8]; 3] = [
        b"%PDF-1.4 /OpenAction 1 0 R",
        b"%PDF-1.7 << /AA << /O 2 0 R >> /Names /JS >>",
        b"%PDF-1.3 /Launch /EmbeddedFile /JavaScript",
    ];
    let policy = Policy::default();
    let filter = filter_for(DetectedType::Pdf).unwrap();
    for pdf in fixtures {
        if let FilterOutcome::Clean(out) = filter.scrub(pdf, &policy).unwrap() {
            assert_eq!(out.len(), pdf.len());
        }
    }
}
