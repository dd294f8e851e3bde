//! Cutting a logical plan into distributable fragments.
//!
//! Fragmentation restructures the tree at exchange boundaries: the subtree
//! feeding an exchange becomes a child fragment, and the parent keeps a
//! remote-source placeholder that reuses the exchange's node id, so the id
//! allocator is never re-entered here. Children feed parents, never the
//! reverse, and every original node lands in exactly one fragment.

use serde::{Deserialize, Serialize};

use quern_common::{FragmentId, PlanNodeId};

use crate::plan::PlanNode;

/// A subtree of the logical plan assigned to run as one unit on one worker.
///
/// `sources` lists exactly this fragment's own table-scan node ids; scan
/// sets are disjoint across the fragments of one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFragment {
    /// Fragment id, unique within the query.
    pub id: FragmentId,
    /// Root of this fragment's plan subtree.
    pub root: PlanNode,
    /// Ids of the table-scan leaves owned by this fragment.
    pub sources: Vec<PlanNodeId>,
}

impl PlanFragment {
    fn new(id: FragmentId, root: PlanNode) -> Self {
        let mut sources = Vec::new();
        collect_table_scan_ids(&root, &mut sources);
        Self { id, root, sources }
    }

    /// The table-scan nodes owned by this fragment, in source order.
    pub fn table_scans(&self) -> Vec<&PlanNode> {
        let mut scans = Vec::new();
        collect_table_scans(&self.root, &mut scans);
        scans
    }
}

/// A fragment plus the child fragments that feed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPlan {
    /// This subplan's fragment.
    pub fragment: PlanFragment,
    /// Upstream subplans referenced by remote sources in `fragment`.
    pub children: Vec<SubPlan>,
}

impl SubPlan {
    /// All fragments in this subtree, parent first.
    pub fn all_fragments(&self) -> Vec<&PlanFragment> {
        let mut fragments = vec![&self.fragment];
        for child in &self.children {
            fragments.extend(child.all_fragments());
        }
        fragments
    }
}

/// Walks a logical plan and cuts it into fragments at exchange boundaries.
#[derive(Debug, Default)]
pub struct DistributedPlanner;

impl DistributedPlanner {
    /// Create a fragmenter.
    pub fn new() -> Self {
        Self
    }

    /// Partition `plan` into a fragment tree.
    ///
    /// With `single_node` set no cuts are made: the result is one fragment
    /// whose root is the input root, exchanges left inline to execute as
    /// local pass-throughs.
    pub fn create_subplans(&self, plan: PlanNode, single_node: bool) -> SubPlan {
        if single_node {
            return SubPlan {
                fragment: PlanFragment::new(FragmentId(0), plan),
                children: Vec::new(),
            };
        }
        let mut next_fragment_id = 1;
        let (root, children) = fragment_below(plan, &mut next_fragment_id);
        let subplan = SubPlan {
            fragment: PlanFragment::new(FragmentId(0), root),
            children,
        };
        tracing::debug!(
            fragments = subplan.all_fragments().len(),
            "logical plan fragmented"
        );
        subplan
    }
}

/// Rebuild `node`, cutting at each exchange and collecting child subplans.
fn fragment_below(node: PlanNode, next_fragment_id: &mut u64) -> (PlanNode, Vec<SubPlan>) {
    match node {
        PlanNode::Exchange { id, input } => {
            let fragment_id = FragmentId(*next_fragment_id);
            *next_fragment_id += 1;
            let (child_root, grandchildren) = fragment_below(*input, next_fragment_id);
            let output_symbols = child_root.output_symbols();
            let child = SubPlan {
                fragment: PlanFragment::new(fragment_id, child_root),
                children: grandchildren,
            };
            (
                PlanNode::RemoteSource {
                    id,
                    fragment: fragment_id,
                    output_symbols,
                },
                vec![child],
            )
        }
        PlanNode::Filter {
            id,
            input,
            predicate,
        } => {
            let (input, children) = fragment_below(*input, next_fragment_id);
            (
                PlanNode::Filter {
                    id,
                    input: Box::new(input),
                    predicate,
                },
                children,
            )
        }
        PlanNode::Project {
            id,
            input,
            assignments,
        } => {
            let (input, children) = fragment_below(*input, next_fragment_id);
            (
                PlanNode::Project {
                    id,
                    input: Box::new(input),
                    assignments,
                },
                children,
            )
        }
        PlanNode::Join {
            id,
            left,
            right,
            criteria,
        } => {
            let (left, mut children) = fragment_below(*left, next_fragment_id);
            let (right, right_children) = fragment_below(*right, next_fragment_id);
            children.extend(right_children);
            (
                PlanNode::Join {
                    id,
                    left: Box::new(left),
                    right: Box::new(right),
                    criteria,
                },
                children,
            )
        }
        PlanNode::Aggregate {
            id,
            input,
            group_by,
            aggregates,
        } => {
            let (input, children) = fragment_below(*input, next_fragment_id);
            (
                PlanNode::Aggregate {
                    id,
                    input: Box::new(input),
                    group_by,
                    aggregates,
                },
                children,
            )
        }
        PlanNode::Output {
            id,
            input,
            column_names,
            output_symbols,
        } => {
            let (input, children) = fragment_below(*input, next_fragment_id);
            (
                PlanNode::Output {
                    id,
                    input: Box::new(input),
                    column_names,
                    output_symbols,
                },
                children,
            )
        }
        leaf @ (PlanNode::TableScan { .. } | PlanNode::RemoteSource { .. }) => (leaf, Vec::new()),
    }
}

fn collect_table_scan_ids(node: &PlanNode, out: &mut Vec<PlanNodeId>) {
    if let PlanNode::TableScan { id, .. } = node {
        out.push(*id);
    }
    for child in node.children() {
        collect_table_scan_ids(child, out);
    }
}

fn collect_table_scans<'a>(node: &'a PlanNode, out: &mut Vec<&'a PlanNode>) {
    if matches!(node, PlanNode::TableScan { .. }) {
        out.push(node);
    }
    for child in node.children() {
        collect_table_scans(child, out);
    }
}
