use std::collections::HashSet;

use arrow_schema::DataType;
use quern_catalog::{
    ColumnMetadata, FunctionRegistry, InMemoryMetadata, Metadata, QualifiedTableName, Session,
    TableMetadata,
};
use quern_common::{PlanNodeId, PlanNodeIdAllocator};
use quern_planner::{
    parse_statement, Analyzer, DistributedPlanner, LogicalPlanner, PlanNode, SubPlan,
};

fn test_catalog() -> InMemoryMetadata {
    let catalog = InMemoryMetadata::new();
    catalog
        .create_table(TableMetadata::new(
            QualifiedTableName::new("cat", "sch", "orders"),
            vec![
                ColumnMetadata::new("order_id", DataType::Int64),
                ColumnMetadata::new("customer_id", DataType::Int64),
                ColumnMetadata::new("total", DataType::Float64),
            ],
        ))
        .unwrap();
    catalog
        .create_table(TableMetadata::new(
            QualifiedTableName::new("cat", "sch", "customers"),
            vec![
                ColumnMetadata::new("customer_id", DataType::Int64),
                ColumnMetadata::new("name", DataType::Utf8),
            ],
        ))
        .unwrap();
    catalog
}

fn plan_sql(catalog: &dyn Metadata, sql: &str) -> PlanNode {
    let session = Session::new("test", "cat", "sch");
    let functions = FunctionRegistry::builtin();
    let statement = parse_statement(sql).expect("parse");
    let analysis = Analyzer::new(&session, catalog, &functions)
        .analyze(&statement)
        .expect("analyze");
    let mut ids = PlanNodeIdAllocator::new();
    LogicalPlanner::new(&session, catalog, &mut ids)
        .plan(&analysis)
        .expect("plan")
}

fn collect_scan_ids(node: &PlanNode, out: &mut Vec<PlanNodeId>) {
    if matches!(node, PlanNode::TableScan { .. }) {
        out.push(node.id());
    }
    for child in node.children() {
        collect_scan_ids(child, out);
    }
}

fn collect_variants(node: &PlanNode, out: &mut Vec<&'static str>) {
    out.push(node.variant_name());
    for child in node.children() {
        collect_variants(child, out);
    }
}

fn all_node_ids(node: &PlanNode, out: &mut Vec<PlanNodeId>) {
    out.push(node.id());
    for child in node.children() {
        all_node_ids(child, out);
    }
}

#[test]
fn simple_query_stays_one_fragment_with_scan_filter_project_output_chain() {
    let catalog = test_catalog();
    let plan = plan_sql(&catalog, "SELECT orders.total FROM orders WHERE customer_id = 5");

    let mut variants = Vec::new();
    collect_variants(&plan, &mut variants);
    assert_eq!(variants, vec!["Output", "Project", "Filter", "TableScan"]);

    let subplan = DistributedPlanner::new().create_subplans(plan.clone(), false);
    assert!(subplan.children.is_empty());
    assert_eq!(subplan.fragment.root, plan);
    assert_eq!(subplan.fragment.sources.len(), 1);
}

#[test]
fn single_node_flag_always_yields_one_fragment_with_input_root() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT o.total FROM orders o JOIN customers c ON o.customer_id = c.customer_id",
    );
    let subplan = DistributedPlanner::new().create_subplans(plan.clone(), true);
    assert!(subplan.children.is_empty());
    assert_eq!(subplan.fragment.root, plan);
    // Both scans belong to the single fragment.
    assert_eq!(subplan.fragment.sources.len(), 2);
}

#[test]
fn join_query_cuts_into_root_plus_leaf_scan_fragments() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT o.total, c.name FROM orders o JOIN customers c ON o.customer_id = c.customer_id",
    );

    let mut original_scans = Vec::new();
    collect_scan_ids(&plan, &mut original_scans);
    assert_eq!(original_scans.len(), 2);

    let subplan = DistributedPlanner::new().create_subplans(plan, false);
    let fragments = subplan.all_fragments();
    assert_eq!(fragments.len(), 3);

    // Root fragment owns no scan; each leaf fragment owns exactly one.
    assert!(fragments[0].sources.is_empty());
    for leaf in &fragments[1..] {
        assert_eq!(leaf.sources.len(), 1);
        assert_eq!(leaf.table_scans().len(), 1);
    }

    // Round-trip: the union of fragment sources is exactly the original
    // scan set, with no duplicates and no omissions.
    let fragment_scans: Vec<PlanNodeId> =
        fragments.iter().flat_map(|f| f.sources.clone()).collect();
    let unique: HashSet<PlanNodeId> = fragment_scans.iter().copied().collect();
    assert_eq!(unique.len(), fragment_scans.len());
    assert_eq!(unique, original_scans.into_iter().collect());
}

#[test]
fn remote_sources_reuse_exchange_ids_and_reference_child_fragments() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT o.total FROM orders o JOIN customers c ON o.customer_id = c.customer_id",
    );
    let mut ids_before = Vec::new();
    all_node_ids(&plan, &mut ids_before);

    let subplan = DistributedPlanner::new().create_subplans(plan, false);

    // Fragmentation restructures but never allocates: the id set is unchanged.
    let mut ids_after = Vec::new();
    for fragment in subplan.all_fragments() {
        all_node_ids(&fragment.root, &mut ids_after);
    }
    let before: HashSet<PlanNodeId> = ids_before.into_iter().collect();
    let after: HashSet<PlanNodeId> = ids_after.into_iter().collect();
    assert_eq!(before, after);

    // Each remote source in the root names an existing child fragment.
    let child_ids: HashSet<_> = subplan
        .children
        .iter()
        .map(|child| child.fragment.id)
        .collect();
    fn remote_fragments(node: &PlanNode, out: &mut Vec<quern_common::FragmentId>) {
        if let PlanNode::RemoteSource { fragment, .. } = node {
            out.push(*fragment);
        }
        for child in node.children() {
            remote_fragments(child, out);
        }
    }
    let mut referenced = Vec::new();
    remote_fragments(&subplan.fragment.root, &mut referenced);
    assert_eq!(referenced.len(), 2);
    for fragment_id in referenced {
        assert!(child_ids.contains(&fragment_id));
    }
}

#[test]
fn aggregation_cuts_below_the_aggregate() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT customer_id, sum(total) FROM orders GROUP BY customer_id",
    );
    let subplan = DistributedPlanner::new().create_subplans(plan, false);
    let fragments = subplan.all_fragments();
    assert_eq!(fragments.len(), 2);

    // The aggregate runs in the root fragment, the scan in the leaf.
    let mut root_variants = Vec::new();
    collect_variants(&fragments[0].root, &mut root_variants);
    assert!(root_variants.contains(&"Aggregate"));
    assert!(root_variants.contains(&"RemoteSource"));
    assert!(!root_variants.contains(&"TableScan"));

    let mut leaf_variants = Vec::new();
    collect_variants(&fragments[1].root, &mut leaf_variants);
    assert!(leaf_variants.contains(&"TableScan"));
    assert_eq!(fragments[1].sources.len(), 1);
}

#[test]
fn planning_is_deterministic_across_runs() {
    let catalog = test_catalog();
    let sql =
        "SELECT o.total, c.name FROM orders o JOIN customers c ON o.customer_id = c.customer_id";

    let run = || -> SubPlan {
        let plan = plan_sql(&catalog, sql);
        DistributedPlanner::new().create_subplans(plan, false)
    };
    let first = run();
    let second = run();
    assert_eq!(first, second);
}

#[test]
fn node_ids_are_unique_and_monotonic() {
    let catalog = test_catalog();
    let plan = plan_sql(
        &catalog,
        "SELECT customer_id, sum(total) FROM orders GROUP BY customer_id",
    );
    let mut ids = Vec::new();
    all_node_ids(&plan, &mut ids);
    let unique: HashSet<PlanNodeId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
}
