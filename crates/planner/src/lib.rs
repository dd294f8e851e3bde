//! Query compilation front half: parse, analyze, lower, fragment.
//!
//! Architecture role:
//! - [`parser`]: the boundary to the external SQL parser
//! - [`analyzer`]: binds a statement against the catalog, producing symbols
//!   and types
//! - [`plan`]: the logical plan node sum type
//! - [`planner`]: lowers an analysis result to a plan tree
//! - [`fragmenter`]: cuts the tree into distributable fragments at exchange
//!   boundaries
//! - [`printer`]: plan rendering for diagnostics

pub mod analyzer;
pub mod fragmenter;
pub mod parser;
pub mod plan;
pub mod planner;
pub mod printer;

pub use analyzer::{AnalysisResult, AnalyzedQuery, Analyzer, Symbol, SymbolAllocator};
pub use fragmenter::{DistributedPlanner, PlanFragment, SubPlan};
pub use parser::parse_statement;
pub use plan::{AggregateCall, BinaryOp, Expr, Literal, PlanNode};
pub use planner::LogicalPlanner;
pub use printer::{explain_plan, explain_subplan};
