//! Typed identifiers shared across planner and execution components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a node within one query's plan tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanNodeId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable fragment identifier within a query's fragment tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic [`PlanNodeId`] allocator.
///
/// One allocator lives for the duration of a single query's planning pass.
/// Ids are never reused within a query, which lets later stages identify
/// nodes unambiguously after the tree has been restructured into fragments.
#[derive(Debug, Default)]
pub struct PlanNodeIdAllocator {
    next: u64,
}

impl PlanNodeIdAllocator {
    /// Create an allocator starting at id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id.
    pub fn next_id(&mut self) -> PlanNodeId {
        let id = PlanNodeId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let mut allocator = PlanNodeIdAllocator::new();
        let a = allocator.next_id();
        let b = allocator.next_id();
        let c = allocator.next_id();
        assert!(a < b && b < c);
        assert_eq!(a, PlanNodeId(0));
        assert_eq!(c, PlanNodeId(2));
    }
}
