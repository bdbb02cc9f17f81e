//! Structured event emission.
//!
//! The engine reports what it did through an injected sink so callers can
//! route events to logging, metrics, or test collectors without the core
//! coupling to any transport. The default sink forwards to the `log`
//! facade.

use std::sync::Mutex;

use crate::identify::DetectedType;
use crate::policy::Action;

/// One structured event emitted during traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A format was identified for an item.
    Identified {
        /// Provenance path of the item.
        path: String,
        /// Detected format.
        kind: DetectedType,
        /// Whether a type/extension mismatch was flagged.
        mismatch: bool,
    },
    /// An action was applied to an item.
    ActionTaken {
        /// Provenance path of the item.
        path: String,
        /// Resolved action.
        action: Action,
        /// Reason recorded in the verdict.
        reason: String,
    },
    /// An error was absorbed for a subtree.
    ErrorAbsorbed {
        /// Provenance path of the subtree root.
        path: String,
        /// Stable error label.
        label: &'static str,
        /// Error message.
        message: String,
    },
}

/// Injected sink for traversal events.
pub trait EventSink: Send + Sync {
    /// Receives one event.
    fn emit(&self, event: ScanEvent);
}

/// Default sink forwarding events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ScanEvent) {
        match event {
            ScanEvent::Identified { path, kind, mismatch } => {
                log::debug!("identified {path} as {} (mismatch: {mismatch})", kind.name());
            }
            ScanEvent::ActionTaken { path, action, reason } => {
                log::info!("{action:?} {path}: {reason}");
            }
            ScanEvent::ErrorAbsorbed { path, label, message } => {
                log::warn!("{label} at {path}: {message}");
            }
        }
    }
}

/// Collecting sink for tests and in-process consumers.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ScanEvent>>,
}

impl MemorySink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events collected so far.
    #[must_use]
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: ScanEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
