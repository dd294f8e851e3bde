//! Lowering from an analysis result to a logical plan tree.

use quern_catalog::{Metadata, Session};
use quern_common::{PlanNodeIdAllocator, Result};

use crate::analyzer::{AnalysisResult, RelationBinding};
use crate::plan::PlanNode;

/// Lowers each clause of an analyzed statement into plan nodes in a fixed
/// structural order: scans, joins, filter, aggregation, projection, output.
///
/// Every node takes a fresh id from the shared allocator, so ids are unique
/// and monotonically increasing across the whole tree for one query.
/// Exchange nodes are placed where results must be redistributed across
/// workers: above every join input and above the aggregation input. A plain
/// scan-filter-project query gets no exchange and therefore stays a single
/// fragment.
pub struct LogicalPlanner<'a> {
    session: &'a Session,
    metadata: &'a dyn Metadata,
    id_allocator: &'a mut PlanNodeIdAllocator,
}

impl<'a> LogicalPlanner<'a> {
    /// Create a planner bound to a session, catalog, and id allocator.
    pub fn new(
        session: &'a Session,
        metadata: &'a dyn Metadata,
        id_allocator: &'a mut PlanNodeIdAllocator,
    ) -> Self {
        Self {
            session,
            metadata,
            id_allocator,
        }
    }

    /// Lower the analyzed statement into a plan tree rooted at an Output node.
    pub fn plan(&mut self, analysis: &AnalysisResult) -> Result<PlanNode> {
        let query = analysis.query();

        let mut root = self.plan_table_scan(&query.relations[0])?;
        for (idx, join) in query.joins.iter().enumerate() {
            let right = self.plan_table_scan(&query.relations[idx + 1])?;
            let left = self.exchange(root);
            let right = self.exchange(right);
            root = PlanNode::Join {
                id: self.id_allocator.next_id(),
                left: Box::new(left),
                right: Box::new(right),
                criteria: join.criteria.clone(),
            };
        }

        if let Some(predicate) = &query.predicate {
            root = PlanNode::Filter {
                id: self.id_allocator.next_id(),
                input: Box::new(root),
                predicate: predicate.clone(),
            };
        }

        if !query.aggregates.is_empty() || !query.group_by.is_empty() {
            let input = self.exchange(root);
            root = PlanNode::Aggregate {
                id: self.id_allocator.next_id(),
                input: Box::new(input),
                group_by: query.group_by.clone(),
                aggregates: query.aggregates.clone(),
            };
        }

        root = PlanNode::Project {
            id: self.id_allocator.next_id(),
            input: Box::new(root),
            assignments: query
                .outputs
                .iter()
                .map(|output| (output.symbol.clone(), output.expr.clone()))
                .collect(),
        };

        let root = PlanNode::Output {
            id: self.id_allocator.next_id(),
            input: Box::new(root),
            column_names: query.outputs.iter().map(|o| o.name.clone()).collect(),
            output_symbols: query.outputs.iter().map(|o| o.symbol.clone()).collect(),
        };

        tracing::debug!(
            user = self.session.user(),
            root = root.variant_name(),
            "statement lowered to logical plan"
        );
        Ok(root)
    }

    fn plan_table_scan(&mut self, relation: &RelationBinding) -> Result<PlanNode> {
        // Consult the catalog for the declared column order; the analysis
        // bound one symbol per column in the same order.
        let table = self.metadata.get_table(&relation.table)?;
        let assignments = relation
            .column_symbols
            .iter()
            .zip(table.columns.iter())
            .map(|(symbol, column)| (symbol.clone(), column.name.clone()))
            .collect();
        Ok(PlanNode::TableScan {
            id: self.id_allocator.next_id(),
            table: relation.table.clone(),
            assignments,
        })
    }

    fn exchange(&mut self, input: PlanNode) -> PlanNode {
        PlanNode::Exchange {
            id: self.id_allocator.next_id(),
            input: Box::new(input),
        }
    }
}
