//! Shared resource accounting for a whole traversal.
//!
//! Depth is tracked per branch by the driver; total bytes and member
//! counts are global across the traversal and must hold even when
//! sibling subtrees are processed by parallel workers, so they live in
//! atomics behind an `Arc`. A bound hit resolves the current branch to a
//! blocked outcome; it never aborts the process.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::policy::Policy;

/// Which global bound a charge ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetHit {
    /// Total materialized bytes across the traversal.
    TotalBytes,
    /// Total member count across the traversal.
    MemberCount,
}

impl BudgetHit {
    /// Short stable label for reasons and events.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TotalBytes => "total_bytes_exceeded",
            Self::MemberCount => "member_count_exceeded",
        }
    }
}

/// Atomic counters enforcing traversal-wide limits.
#[derive(Debug)]
pub struct TraversalBudget {
    max_total_bytes: u64,
    max_member_count: u64,
    total_bytes: AtomicU64,
    member_count: AtomicU64,
}

impl TraversalBudget {
    /// Creates a budget from the policy's global limits.
    #[must_use]
    pub fn new(policy: &Policy) -> Self {
        Self {
            max_total_bytes: policy.max_total_bytes,
            max_member_count: policy.max_member_count,
            total_bytes: AtomicU64::new(0),
            member_count: AtomicU64::new(0),
        }
    }

    /// Charges `len` materialized bytes; all-or-nothing.
    pub fn charge_bytes(&self, len: u64) -> Result<(), BudgetHit> {
        let prev = self.total_bytes.fetch_add(len, Ordering::Relaxed);
        if prev.saturating_add(len) > self.max_total_bytes {
            Err(BudgetHit::TotalBytes)
        } else {
            Ok(())
        }
    }

    /// Charges one enumerated member.
    pub fn charge_member(&self) -> Result<(), BudgetHit> {
        let prev = self.member_count.fetch_add(1, Ordering::Relaxed);
        if prev + 1 > self.max_member_count {
            Err(BudgetHit::MemberCount)
        } else {
            Ok(())
        }
    }

    /// Total bytes charged so far.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Members charged so far.
    #[must_use]
    pub fn member_count(&self) -> u64 {
        self.member_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_budget() -> TraversalBudget {
        let policy = Policy {
            max_total_bytes: 100,
            max_member_count: 3,
            ..Policy::default()
        };
        TraversalBudget::new(&policy)
    }

    #[test]
    fn test_bytes_within_budget() {
        let budget = small_budget();
        assert!(budget.charge_bytes(60).is_ok());
        assert!(budget.charge_bytes(40).is_ok());
        assert_eq!(budget.total_bytes(), 100);
    }

    #[test]
    fn test_bytes_over_budget() {
        let budget = small_budget();
        assert!(budget.charge_bytes(60).is_ok());
        assert_eq!(budget.charge_bytes(41), Err(BudgetHit::TotalBytes));
    }

    #[test]
    fn test_member_count_bound() {
        let budget = small_budget();
        for _ in 0..3 {
            assert!(budget.charge_member().is_ok());
        }
        assert_eq!(budget.charge_member(), Err(BudgetHit::MemberCount));
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;

        let budget = Arc::new(small_budget());
        std::thread::scope(|s| {
            for _ in 0..4 {
                let b = Arc::clone(&budget);
                s.spawn(move || {
                    let _ = b.charge_bytes(30);
                });
            }
        });
        // Charges are recorded even when some exceed the bound.
        assert_eq!(budget.total_bytes(), 120);
    }
}
