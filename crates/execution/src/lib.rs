//! Execution back half: physical expressions, operators, and local planning.
//!
//! Architecture role:
//! - [`scalar`]: hashable row values used for join and group keys
//! - [`expressions`]: compile analyzed expressions to arrow evaluation
//! - [`source`]: the split/data-source boundary plus the in-memory reference
//!   provider
//! - [`join_hash`]: the shared build-once hash table provider for joins
//! - [`operator`]: the pull-based operator runtime
//! - [`local_planner`]: compiles one fragment into an operator pipeline under
//!   a memory budget
//! - [`driver`]: the minimal single-pipeline driver loop

pub mod driver;
pub mod expressions;
pub mod join_hash;
pub mod local_planner;
pub mod operator;
pub mod scalar;
pub mod source;

pub use driver::drive;
pub use expressions::{compile_expr, PhysicalExpr};
pub use join_hash::{JoinHashTable, SourceHashProviderFactory, SourceHashSupplier};
pub use local_planner::LocalExecutionPlanner;
pub use operator::Operator;
pub use scalar::ScalarValue;
pub use source::{DataSourceProvider, InMemoryDataSource, PageIterator, Split};
