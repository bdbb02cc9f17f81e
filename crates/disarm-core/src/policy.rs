//! Traversal policy: per-type actions, escalation, and resource limits.
//!
//! A `Policy` is loaded once before a traversal begins and is read-only
//! for its duration. Every component receives it by reference; there is
//! no process-wide mutable configuration.

use std::collections::HashMap;

use crate::identify::DetectedType;

/// What the engine is permitted to do with a piece of content.
///
/// Ordering reflects severity: `Allow < Clean < Block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Pass content through unchanged.
    Allow,
    /// Rewrite content with active constructs removed.
    Clean,
    /// Drop content entirely.
    Block,
}

impl Action {
    /// One severity step stricter; `Block` saturates.
    #[must_use]
    pub const fn escalate(self) -> Self {
        match self {
            Self::Allow => Self::Clean,
            Self::Clean | Self::Block => Self::Block,
        }
    }
}

/// HTML-specific strip parameters.
#[derive(Debug, Clone)]
pub struct HtmlRules {
    /// Element names whose entire subtree is removed.
    pub strip_elements: Vec<String>,
    /// URI schemes removed from attribute values.
    pub strip_uri_schemes: Vec<String>,
}

impl Default for HtmlRules {
    fn default() -> Self {
        Self {
            strip_elements: ["script", "iframe", "object", "embed", "applet"]
                .map(str::to_string)
                .to_vec(),
            strip_uri_schemes: ["javascript", "vbscript", "data"].map(str::to_string).to_vec(),
        }
    }
}

/// PDF-specific strip parameters: name tokens neutralized in place.
#[derive(Debug, Clone)]
pub struct PdfRules {
    /// PDF name tokens (without leading `/`) to neutralize.
    pub strip_names: Vec<String>,
}

impl Default for PdfRules {
    fn default() -> Self {
        Self {
            strip_names: ["JavaScript", "JS", "Launch", "OpenAction", "AA", "EmbeddedFile"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

/// Immutable per-traversal configuration.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Per-type resolved action; types absent here use `default_action`.
    pub actions: HashMap<DetectedType, Action>,
    /// Action for types with no table entry (fail-closed by default).
    pub default_action: Action,
    /// Escalate the resolved action one step on type/extension mismatch.
    pub escalate_on_mismatch: bool,
    /// Report unopenable containers as `Blocked` rather than `Error`.
    pub block_unopenable_containers: bool,

    /// Maximum container nesting depth.
    pub max_depth: u32,
    /// Maximum total materialized bytes across the whole traversal.
    pub max_total_bytes: u64,
    /// Maximum member count across the whole traversal.
    pub max_member_count: u64,
    /// Maximum declared uncompressed size for a single member.
    pub max_member_bytes: u64,
    /// Maximum declared inflation ratio (uncompressed / compressed).
    pub max_inflation_ratio: u32,

    /// HTML filter parameters.
    pub html: HtmlRules,
    /// PDF filter parameters.
    pub pdf: PdfRules,
}

impl Default for Policy {
    /// Strict defaults: clean everything cleanable, block active payloads
    /// and unknown binary content.
    fn default() -> Self {
        use DetectedType::{
            Avi, Html, MacroPayload, Mp3, Ole2, OoxmlPackage, Pdf, Png, Rtf, Text, Xml, Zip,
        };
        let actions = HashMap::from([
            (Text, Action::Allow),
            (Html, Action::Clean),
            (Xml, Action::Clean),
            (Rtf, Action::Clean),
            (Pdf, Action::Clean),
            (Png, Action::Clean),
            // Media cleaning is header validation; Allow would skip it.
            (Avi, Action::Clean),
            (Mp3, Action::Clean),
            (Zip, Action::Clean),
            (OoxmlPackage, Action::Clean),
            (Ole2, Action::Clean),
            (MacroPayload, Action::Block),
        ]);
        Self {
            actions,
            default_action: Action::Block,
            escalate_on_mismatch: true,
            block_unopenable_containers: true,
            max_depth: 8,
            max_total_bytes: 512 * 1024 * 1024,
            max_member_count: 10_000,
            max_member_bytes: 64 * 1024 * 1024,
            max_inflation_ratio: 100,
            html: HtmlRules::default(),
            pdf: PdfRules::default(),
        }
    }
}

impl Policy {
    /// Permissive preset for trusted input: unknown types pass through and
    /// mismatches do not escalate. Limits stay in force.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            default_action: Action::Allow,
            escalate_on_mismatch: false,
            ..Self::default()
        }
    }

    /// Resolves the action for a detected type, applying mismatch
    /// escalation.
    #[must_use]
    pub fn action_for(&self, kind: DetectedType, mismatch: bool) -> Action {
        let base = self.actions.get(&kind).copied().unwrap_or(self.default_action);
        if mismatch && self.escalate_on_mismatch {
            base.escalate()
        } else {
            base
        }
    }

    /// Overrides the action for one detected type.
    #[must_use]
    pub fn with_action(mut self, kind: DetectedType, action: Action) -> Self {
        self.actions.insert(kind, action);
        self
    }

    /// Overrides the maximum nesting depth.
    #[must_use]
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }
}
