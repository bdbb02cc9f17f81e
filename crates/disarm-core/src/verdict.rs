//! Per-item outcome records and the traversal result tree.
//!
//! One `Verdict` node exists per processed item, mirroring the input's
//! nesting structure. A container's aggregate status is the most severe
//! status among its children; aggregation happens once, bottom-up, as
//! branches complete, and nodes are immutable afterwards.

use serde::Serialize;

/// Outcome status for one processed item.
///
/// Ordering reflects severity: `Clean < Cleaned < Blocked < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Passed through unchanged.
    Clean,
    /// Rewritten with active content removed (or members dropped).
    Cleaned,
    /// Dropped per policy or resource bounds.
    Blocked,
    /// Could not be processed; fails closed at the parent level.
    Error,
}

impl Status {
    /// Short stable label for reporting.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Cleaned => "cleaned",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }
}

/// One node of the result tree.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    /// Provenance path from the root (container member names).
    pub path: Vec<String>,
    /// Aggregate status of this node.
    pub status: Status,
    /// Human-readable reason for the status.
    pub reason: String,
    /// Child verdicts, in the container's declared member order.
    pub children: Vec<Verdict>,
}

impl Verdict {
    /// Records a leaf verdict.
    #[must_use]
    pub fn leaf(path: Vec<String>, status: Status, reason: impl Into<String>) -> Self {
        Self {
            path,
            status,
            reason: reason.into(),
            children: Vec::new(),
        }
    }

    /// Records a container verdict, aggregating the children's statuses.
    ///
    /// `own_status` covers the container's own processing (rebuild result
    /// or open failure); the aggregate is the maximum of it and every
    /// child. A container that could not be opened has no children and
    /// keeps its own status.
    #[must_use]
    pub fn container(
        path: Vec<String>,
        own_status: Status,
        reason: impl Into<String>,
        children: Vec<Verdict>,
    ) -> Self {
        let status = children
            .iter()
            .map(|c| c.status)
            .fold(own_status, Status::max);
        Self {
            path,
            status,
            reason: reason.into(),
            children,
        }
    }

    /// Total node count of this subtree, including self.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Verdict::node_count).sum::<usize>()
    }

    /// Iterates leaves of this subtree in declared order.
    pub fn leaves(&self) -> Box<dyn Iterator<Item = &Verdict> + '_> {
        if self.children.is_empty() {
            Box::new(std::iter::once(self))
        } else {
            Box::new(self.children.iter().flat_map(Verdict::leaves))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(status: Status) -> Verdict {
        Verdict::leaf(vec!["a".into()], status, "test")
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Status::Clean < Status::Cleaned);
        assert!(Status::Cleaned < Status::Blocked);
        assert!(Status::Blocked < Status::Error);
    }

    #[test]
    fn test_aggregate_takes_worst_child() {
        let v = Verdict::container(
            vec!["z.zip".into()],
            Status::Clean,
            "rebuilt",
            vec![leaf(Status::Clean), leaf(Status::Cleaned), leaf(Status::Blocked)],
        );
        assert_eq!(v.status, Status::Blocked);
    }

    #[test]
    fn test_aggregate_cleaned_children() {
        let v = Verdict::container(
            vec!["z.zip".into()],
            Status::Clean,
            "rebuilt",
            vec![leaf(Status::Clean), leaf(Status::Cleaned)],
        );
        assert_eq!(v.status, Status::Cleaned);
    }

    #[test]
    fn test_unopenable_container_keeps_own_status() {
        let v = Verdict::container(vec!["z.zip".into()], Status::Error, "malformed", Vec::new());
        assert_eq!(v.status, Status::Error);
        assert_eq!(v.node_count(), 1);
    }

    #[test]
    fn test_leaf_iteration_order() {
        let v = Verdict::container(
            vec!["z".into()],
            Status::Clean,
            "",
            vec![
                Verdict::container(
                    vec!["z".into(), "n".into()],
                    Status::Clean,
                    "",
                    vec![leaf(Status::Clean)],
                ),
                leaf(Status::Blocked),
            ],
        );
        let statuses: Vec<Status> = v.leaves().map(|l| l.status).collect();
        assert_eq!(statuses, vec![Status::Clean, Status::Blocked]);
        assert_eq!(v.node_count(), 4);
    }
}
