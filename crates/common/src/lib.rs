//! Shared error types, identifiers, and memory accounting for quern crates.
//!
//! Architecture role:
//! - defines the [`QuernError`] / [`Result`] contracts used across all layers
//! - provides plan-node and fragment identifiers with their allocator
//! - hosts the per-fragment memory budget tracker

pub mod error;
pub mod ids;
pub mod memory;

pub use error::{QuernError, Result};
pub use ids::{FragmentId, PlanNodeId, PlanNodeIdAllocator};
pub use memory::{MemoryReservation, MemoryTracker};
