//! Table metadata, the catalog contract, function resolution, and sessions.
//!
//! Architecture role:
//! - qualified names and table/column descriptors used by analysis and planning
//! - the [`Metadata`] catalog contract plus the in-memory reference catalog
//! - the explicit [`FunctionRegistry`] instance passed to analyzer and
//!   local execution planner
//! - the per-query [`Session`] carrying user and default catalog/schema

pub mod catalog;
pub mod functions;
pub mod schema;
pub mod session;

pub use catalog::{InMemoryMetadata, Metadata};
pub use functions::{AggregateImpl, FunctionHandle, FunctionInfo, FunctionRegistry};
pub use schema::{
    ColumnMetadata, QualifiedTableName, QualifiedTablePrefix, TableColumn, TableMetadata,
};
pub use session::Session;
