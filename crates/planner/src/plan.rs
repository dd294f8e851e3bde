//! Logical plan nodes and scalar expressions.
//!
//! `PlanNode` is a closed sum type: new node kinds extend the enum and the
//! match arms that dispatch over it. Trees are strictly trees (no shared
//! subtrees, no cycles) and immutable once built, so they can be shared
//! across threads by reference without locking.

use serde::{Deserialize, Serialize};

use quern_catalog::{FunctionHandle, QualifiedTableName};
use quern_common::{FragmentId, PlanNodeId};

use crate::analyzer::Symbol;

/// Binary operator over two scalar expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
}

/// Literal scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

/// Scalar expression over symbols.
///
/// After analysis every column reference is a resolved [`Symbol`]; execution
/// maps symbols to channels through the producing node's output layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Reference to a symbol produced by the input node.
    Symbol(Symbol),
    /// Literal value.
    Literal(Literal),
    /// Comparison or arithmetic.
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Collect every symbol referenced by this expression.
    pub fn collect_symbols(&self, out: &mut Vec<Symbol>) {
        match self {
            Expr::Symbol(symbol) => out.push(symbol.clone()),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.collect_symbols(out);
                right.collect_symbols(out);
            }
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
            Expr::Not(inner) => inner.collect_symbols(out),
        }
    }
}

/// A resolved aggregate call: function handle plus its argument expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCall {
    /// Handle into the function registry.
    pub handle: FunctionHandle,
    /// Argument, evaluated per input row.
    pub argument: Expr,
}

/// Logical plan node.
///
/// Every node carries a [`PlanNodeId`] unique and monotonically increasing
/// within one query, so fragments can be identified unambiguously after the
/// tree is restructured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanNode {
    /// Leaf scan over one table; `assignments` pairs each output symbol with
    /// the source column name in declared order.
    TableScan {
        id: PlanNodeId,
        table: QualifiedTableName,
        assignments: Vec<(Symbol, String)>,
    },
    /// Row filter; passes its input's symbols through unchanged.
    Filter {
        id: PlanNodeId,
        input: Box<PlanNode>,
        predicate: Expr,
    },
    /// Scalar projection; each assignment defines one output symbol.
    Project {
        id: PlanNodeId,
        input: Box<PlanNode>,
        assignments: Vec<(Symbol, Expr)>,
    },
    /// Inner equi-join; `criteria` pairs (probe symbol, build symbol) with
    /// probe on the left input and build on the right.
    Join {
        id: PlanNodeId,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
        criteria: Vec<(Symbol, Symbol)>,
    },
    /// Hash aggregation; output is group symbols then aggregate symbols.
    Aggregate {
        id: PlanNodeId,
        input: Box<PlanNode>,
        group_by: Vec<Symbol>,
        aggregates: Vec<(Symbol, AggregateCall)>,
    },
    /// Query result shape: final column names over the chosen symbols.
    Output {
        id: PlanNodeId,
        input: Box<PlanNode>,
        column_names: Vec<String>,
        output_symbols: Vec<Symbol>,
    },
    /// Partition-redistribution boundary; fragmentation cuts here.
    Exchange {
        id: PlanNodeId,
        input: Box<PlanNode>,
    },
    /// Placeholder left behind by fragmentation: reads the output of another
    /// fragment. Reuses the id of the exchange it replaced.
    RemoteSource {
        id: PlanNodeId,
        fragment: FragmentId,
        output_symbols: Vec<Symbol>,
    },
}

impl PlanNode {
    /// This node's id.
    pub fn id(&self) -> PlanNodeId {
        match self {
            PlanNode::TableScan { id, .. }
            | PlanNode::Filter { id, .. }
            | PlanNode::Project { id, .. }
            | PlanNode::Join { id, .. }
            | PlanNode::Aggregate { id, .. }
            | PlanNode::Output { id, .. }
            | PlanNode::Exchange { id, .. }
            | PlanNode::RemoteSource { id, .. } => *id,
        }
    }

    /// Direct children in data-flow order.
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::TableScan { .. } | PlanNode::RemoteSource { .. } => vec![],
            PlanNode::Filter { input, .. }
            | PlanNode::Project { input, .. }
            | PlanNode::Aggregate { input, .. }
            | PlanNode::Output { input, .. }
            | PlanNode::Exchange { input, .. } => vec![input.as_ref()],
            PlanNode::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        }
    }

    /// Symbols this node produces, in channel order.
    pub fn output_symbols(&self) -> Vec<Symbol> {
        match self {
            PlanNode::TableScan { assignments, .. } => {
                assignments.iter().map(|(s, _)| s.clone()).collect()
            }
            PlanNode::Filter { input, .. } | PlanNode::Exchange { input, .. } => {
                input.output_symbols()
            }
            PlanNode::Project { assignments, .. } => {
                assignments.iter().map(|(s, _)| s.clone()).collect()
            }
            PlanNode::Join { left, right, .. } => {
                let mut symbols = left.output_symbols();
                symbols.extend(right.output_symbols());
                symbols
            }
            PlanNode::Aggregate {
                group_by,
                aggregates,
                ..
            } => {
                let mut symbols = group_by.clone();
                symbols.extend(aggregates.iter().map(|(s, _)| s.clone()));
                symbols
            }
            PlanNode::Output { output_symbols, .. }
            | PlanNode::RemoteSource { output_symbols, .. } => output_symbols.clone(),
        }
    }

    /// Variant name for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            PlanNode::TableScan { .. } => "TableScan",
            PlanNode::Filter { .. } => "Filter",
            PlanNode::Project { .. } => "Project",
            PlanNode::Join { .. } => "Join",
            PlanNode::Aggregate { .. } => "Aggregate",
            PlanNode::Output { .. } => "Output",
            PlanNode::Exchange { .. } => "Exchange",
            PlanNode::RemoteSource { .. } => "RemoteSource",
        }
    }
}
