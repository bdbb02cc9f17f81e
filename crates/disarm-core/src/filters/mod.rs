//! Per-format content filters.
//!
//! A filter owns one or more detected types and knows how to rewrite
//! that content with active constructs removed, or to declare it
//! unsalvageable. Filters never decide policy: the resolved action
//! arrives from the policy table, and a filter only runs when that
//! action is `Clean`.
//!
//! Dispatch is fail-closed: a `Clean` action on a type no filter claims
//! becomes `Block` unless the policy's default action is `Allow`.

mod html;
mod macros;
mod media;
mod pdf;
mod png;
mod rtf;
mod text;
mod xml;

pub use html::HtmlFilter;
pub use macros::MacroFilter;
pub use media::MediaFilter;
pub use pdf::PdfFilter;
pub use png::PngFilter;
pub use rtf::RtfFilter;
pub use text::TextFilter;
pub use xml::XmlFilter;

use crate::Result;
use crate::identify::DetectedType;
use crate::policy::{Action, Policy};

/// What a filter decided about one piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Content is acceptable as-is.
    Allow,
    /// Content was rewritten; carry these bytes instead.
    Clean(Vec<u8>),
    /// Content cannot be made safe; the reason is user-facing.
    Block(String),
}

/// A content rewriter for one or more detected types.
pub trait ContentFilter: Send + Sync {
    /// Detected types this filter handles.
    fn claims(&self) -> &'static [DetectedType];

    /// Rewrites or judges `bytes`. Returning `Allow` asserts the bytes
    /// are already in the filter's cleaned form, which is what makes
    /// cleaning idempotent.
    fn scrub(&self, bytes: &[u8], policy: &Policy) -> Result<FilterOutcome>;
}

static TEXT: TextFilter = TextFilter;
static HTML: HtmlFilter = HtmlFilter;
static XML: XmlFilter = XmlFilter;
static RTF: RtfFilter = RtfFilter;
static PDF: PdfFilter = PdfFilter;
static PNG: PngFilter = PngFilter;
static MEDIA: MediaFilter = MediaFilter;
static MACROS: MacroFilter = MacroFilter;

static FILTERS: &[&dyn ContentFilter] =
    &[&TEXT, &HTML, &XML, &RTF, &PDF, &PNG, &MEDIA, &MACROS];

/// Finds the filter claiming `kind`, if any.
#[must_use]
pub fn filter_for(kind: DetectedType) -> Option<&'static dyn ContentFilter> {
    FILTERS.iter().copied().find(|f| f.claims().contains(&kind))
}

/// Resolves the policy action for `kind` and applies the owning filter.
pub fn scrub(
    kind: DetectedType,
    mismatch: bool,
    bytes: &[u8],
    policy: &Policy,
) -> Result<FilterOutcome> {
    match policy.action_for(kind, mismatch) {
        Action::Allow => Ok(FilterOutcome::Allow),
        Action::Block => Ok(FilterOutcome::Block(format!(
            "{} content blocked by policy",
            kind.name()
        ))),
        Action::Clean => match filter_for(kind) {
            Some(filter) => filter.scrub(bytes, policy),
            None if policy.default_action == Action::Allow => Ok(FilterOutcome::Allow),
            None => Ok(FilterOutcome::Block(format!(
                "no filter can clean {} content",
                kind.name()
            ))),
        },
    }
}
