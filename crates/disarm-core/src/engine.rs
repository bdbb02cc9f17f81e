//! Traversal driver.
//!
//! The engine walks one input item at a time: identify the format, then
//! either hand the bytes to the owning filter (leaf) or open the
//! container, recurse into every member, and rebuild it from the
//! surviving members. Every error below the root is absorbed into the
//! verdict for that subtree; scanning never aborts because the input
//! misbehaved.
//!
//! Depth is tracked per branch; bytes and member counts are global via
//! [`TraversalBudget`]. Hitting a bound resolves the current branch to
//! blocked, exactly like hostile content would.

use std::path::Path;
use std::sync::Arc;

use crate::budget::TraversalBudget;
use crate::containers::{Container, DirTree, Disposition, Rebuilt, open_container};
use crate::error::DisarmError;
use crate::filters::{self, FilterOutcome};
use crate::identify::{DetectedType, identify};
use crate::item::FileItem;
use crate::policy::{Action, Policy};
use crate::sink::{EventSink, LogSink, ScanEvent};
use crate::verdict::{Status, Verdict};
use crate::Result;

/// Completed scan of one root input.
#[derive(Debug)]
pub struct Scan {
    /// Disposition-level status of the root item itself: `Clean` when it
    /// passed unchanged, `Cleaned` when it was rewritten (including
    /// containers that dropped members), `Blocked`/`Error` when there is
    /// no output. Worst-case detail lives in [`Scan::verdict`].
    pub status: Status,
    /// Reconstructed output bytes; `None` when the root was dropped or
    /// when output went to a destination tree.
    pub output: Option<Vec<u8>>,
    /// Full result tree, one node per processed item.
    pub verdict: Verdict,
}

/// How one item left the traversal, from its parent's point of view.
enum Processed {
    Kept,
    Replaced(Vec<u8>),
    Dropped,
}

/// The engine: policy plus event sink, reusable across scans.
pub struct Sanitizer {
    policy: Policy,
    sink: Arc<dyn EventSink>,
}

impl Sanitizer {
    /// Creates an engine that reports through the `log` facade.
    #[must_use]
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            sink: Arc::new(LogSink),
        }
    }

    /// Creates an engine reporting into the given sink.
    #[must_use]
    pub fn with_sink(policy: Policy, sink: Arc<dyn EventSink>) -> Self {
        Self { policy, sink }
    }

    /// The policy this engine applies.
    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Scans one in-memory input.
    #[must_use]
    pub fn scan_bytes(&self, name: &str, bytes: Vec<u8>) -> Scan {
        let budget = TraversalBudget::new(&self.policy);
        if let Err(hit) = budget.charge_bytes(bytes.len() as u64) {
            let verdict = Verdict::leaf(vec![name.to_string()], Status::Blocked, hit.name());
            return Scan {
                status: Status::Blocked,
                output: None,
                verdict,
            };
        }
        let original = bytes.clone();
        let item = FileItem::from_bytes(name, bytes);
        let (processed, verdict) = self.process(item, 0, &budget);
        let (status, output) = match processed {
            Processed::Kept => (Status::Clean, Some(original)),
            Processed::Replaced(bytes) => (Status::Cleaned, Some(bytes)),
            Processed::Dropped => {
                let status = if verdict.status == Status::Error {
                    Status::Error
                } else {
                    Status::Blocked
                };
                (status, None)
            }
        };
        Scan {
            status,
            output,
            verdict,
        }
    }

    /// Reads and scans one file.
    pub fn scan_path(&self, path: &Path) -> Result<Scan> {
        let FileItem {
            declared_name,
            bytes,
            ..
        } = FileItem::from_path(path)?;
        Ok(self.scan_bytes(&declared_name, bytes))
    }

    /// Scans every file under `src` and mirrors the surviving set under
    /// `dest`. The tree itself acts as the root container.
    pub fn clean_tree(&self, src: &Path, dest: &Path) -> Result<Scan> {
        let budget = TraversalBudget::new(&self.policy);
        let mut tree = DirTree::open(src, dest, &self.policy)?;
        let root_name = src
            .file_name()
            .map_or_else(|| src.display().to_string(), |n| n.to_string_lossy().into_owned());
        let root = FileItem::from_bytes(root_name, Vec::new());

        let (dispositions, children) = self.traverse_members(&mut tree, &root, 1, &budget);
        let changed = dispositions.iter().any(|d| !matches!(d, Disposition::Keep));
        tree.rebuild(&dispositions)?;

        let own = if changed { Status::Cleaned } else { Status::Clean };
        let reason = if changed {
            "tree mirrored with members removed or rewritten"
        } else {
            "tree mirrored unchanged"
        };
        let verdict = Verdict::container(root.provenance, own, reason, children);
        Ok(Scan {
            status: own,
            output: None,
            verdict,
        })
    }

    /// Identifies and resolves one item. Never fails; failures become
    /// the item's verdict.
    fn process(&self, mut item: FileItem, depth: u32, budget: &TraversalBudget) -> (Processed, Verdict) {
        let ident = identify(&item.bytes, &item.declared_name);
        item.detected = Some(ident.kind);
        self.sink.emit(ScanEvent::Identified {
            path: item.path_string(),
            kind: ident.kind,
            mismatch: ident.mismatch,
        });

        if ident.kind.is_container() {
            self.process_container(&item, ident.kind, ident.mismatch, depth, budget)
        } else {
            self.process_leaf(&item, ident.kind, ident.mismatch)
        }
    }

    fn process_leaf(
        &self,
        item: &FileItem,
        kind: DetectedType,
        mismatch: bool,
    ) -> (Processed, Verdict) {
        let path = item.provenance.clone();
        let action = self.policy.action_for(kind, mismatch);
        let (processed, status, reason) =
            match filters::scrub(kind, mismatch, &item.bytes, &self.policy) {
                Ok(FilterOutcome::Allow) => (
                    Processed::Kept,
                    Status::Clean,
                    format!("{} passed through", kind.name()),
                ),
                Ok(FilterOutcome::Clean(bytes)) => (
                    Processed::Replaced(bytes),
                    Status::Cleaned,
                    format!("{} rewritten with active content removed", kind.name()),
                ),
                Ok(FilterOutcome::Block(reason)) => (Processed::Dropped, Status::Blocked, reason),
                Err(err) => {
                    self.sink.emit(ScanEvent::ErrorAbsorbed {
                        path: item.path_string(),
                        label: err.label(),
                        message: err.to_string(),
                    });
                    (Processed::Dropped, Status::Error, err.to_string())
                }
            };
        self.sink.emit(ScanEvent::ActionTaken {
            path: item.path_string(),
            action,
            reason: reason.clone(),
        });
        (processed, Verdict::leaf(path, status, reason))
    }

    fn process_container(
        &self,
        item: &FileItem,
        kind: DetectedType,
        mismatch: bool,
        depth: u32,
        budget: &TraversalBudget,
    ) -> (Processed, Verdict) {
        let path = item.provenance.clone();
        let action = self.policy.action_for(kind, mismatch);
        if action == Action::Block {
            let reason = format!("{} container blocked by policy", kind.name());
            self.sink.emit(ScanEvent::ActionTaken {
                path: item.path_string(),
                action,
                reason: reason.clone(),
            });
            return (Processed::Dropped, Verdict::leaf(path, Status::Blocked, reason));
        }
        if action == Action::Allow {
            let reason = format!("{} container allowed without inspection", kind.name());
            self.sink.emit(ScanEvent::ActionTaken {
                path: item.path_string(),
                action,
                reason: reason.clone(),
            });
            return (Processed::Kept, Verdict::leaf(path, Status::Clean, reason));
        }
        if depth >= self.policy.max_depth {
            let reason = format!(
                "container nesting exceeds the depth limit of {}",
                self.policy.max_depth
            );
            self.sink.emit(ScanEvent::ActionTaken {
                path: item.path_string(),
                action: Action::Block,
                reason: reason.clone(),
            });
            return (Processed::Dropped, Verdict::leaf(path, Status::Blocked, reason));
        }

        match self.rebuild_container(item, kind, depth, budget) {
            Ok(done) => done,
            Err(err) => {
                self.sink.emit(ScanEvent::ErrorAbsorbed {
                    path: item.path_string(),
                    label: err.label(),
                    message: err.to_string(),
                });
                let status = if self.policy.block_unopenable_containers {
                    Status::Blocked
                } else {
                    Status::Error
                };
                (Processed::Dropped, Verdict::leaf(path, status, err.to_string()))
            }
        }
    }

    fn rebuild_container(
        &self,
        item: &FileItem,
        kind: DetectedType,
        depth: u32,
        budget: &TraversalBudget,
    ) -> Result<(Processed, Verdict)> {
        let mut container = open_container(kind, item.bytes.clone(), &self.policy)?;
        let (dispositions, children) =
            self.traverse_members(&mut *container, item, depth + 1, budget);
        let changed = dispositions.iter().any(|d| !matches!(d, Disposition::Keep));

        let rebuilt = container.rebuild(&dispositions)?;
        let Rebuilt::Bytes(bytes) = rebuilt else {
            return Err(DisarmError::RebuildFailed(
                "byte container rebuilt to a tree".into(),
            ));
        };

        let (processed, own, reason) = if changed {
            (
                Processed::Replaced(bytes),
                Status::Cleaned,
                format!("{} rebuilt with members removed or rewritten", kind.name()),
            )
        } else {
            (
                Processed::Kept,
                Status::Clean,
                format!("{} rebuilt unchanged", kind.name()),
            )
        };
        self.sink.emit(ScanEvent::ActionTaken {
            path: item.path_string(),
            action: Action::Clean,
            reason: reason.clone(),
        });
        let verdict = Verdict::container(item.provenance.clone(), own, reason, children);
        Ok((processed, verdict))
    }

    /// Walks a container's members, recursing into each. Member-level
    /// failures resolve that member, not the container.
    fn traverse_members(
        &self,
        container: &mut dyn Container,
        parent: &FileItem,
        depth: u32,
        budget: &TraversalBudget,
    ) -> (Vec<Disposition>, Vec<Verdict>) {
        let members: Vec<_> = container.members().to_vec();
        let mut dispositions = Vec::with_capacity(members.len());
        let mut children = Vec::with_capacity(members.len());

        for (index, member) in members.iter().enumerate() {
            let child_path = {
                let mut p = parent.provenance.clone();
                p.push(member.name.clone());
                p
            };
            if let Err(hit) = budget.charge_member() {
                dispositions.push(Disposition::Drop);
                children.push(Verdict::leaf(child_path, Status::Blocked, hit.name()));
                continue;
            }
            let bytes = match container.member_bytes(index) {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.sink.emit(ScanEvent::ErrorAbsorbed {
                        path: child_path.join("/"),
                        label: err.label(),
                        message: err.to_string(),
                    });
                    dispositions.push(Disposition::Drop);
                    children.push(Verdict::leaf(child_path, Status::Blocked, err.to_string()));
                    continue;
                }
            };
            if let Err(hit) = budget.charge_bytes(bytes.len() as u64) {
                dispositions.push(Disposition::Drop);
                children.push(Verdict::leaf(child_path, Status::Blocked, hit.name()));
                continue;
            }

            let child = parent.child(member.name.clone(), bytes);
            let (processed, verdict) = self.process(child, depth, budget);
            dispositions.push(match processed {
                Processed::Kept => Disposition::Keep,
                Processed::Replaced(bytes) => Disposition::Replace(bytes),
                Processed::Dropped => Disposition::Drop,
            });
            children.push(verdict);
        }
        (dispositions, children)
    }
}
