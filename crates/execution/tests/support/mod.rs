use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};

use quern_catalog::{
    ColumnMetadata, FunctionRegistry, InMemoryMetadata, Metadata, QualifiedTableName, Session,
    TableMetadata,
};
use quern_common::{MemoryTracker, PlanNodeId, PlanNodeIdAllocator, Result};
use quern_execution::{
    drive, InMemoryDataSource, LocalExecutionPlanner, SourceHashProviderFactory, Split,
};
use quern_planner::{
    parse_statement, Analyzer, DistributedPlanner, LogicalPlanner, PlanNode, SubPlan,
};

/// Catalog + data fixture with an orders fact table and a customers
/// dimension table.
pub struct Fixture {
    pub catalog: InMemoryMetadata,
    pub data: Arc<InMemoryDataSource>,
    pub session: Session,
    pub functions: FunctionRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        let catalog = InMemoryMetadata::new();
        let data = Arc::new(InMemoryDataSource::new());

        let orders = TableMetadata::new(
            QualifiedTableName::new("cat", "sch", "orders"),
            vec![
                ColumnMetadata::new("order_id", DataType::Int64),
                ColumnMetadata::new("customer_id", DataType::Int64),
                ColumnMetadata::new("total", DataType::Float64),
            ],
        );
        catalog.create_table(orders.clone()).unwrap();
        let orders_schema = Arc::new(Schema::new(vec![
            Field::new("order_id", DataType::Int64, true),
            Field::new("customer_id", DataType::Int64, true),
            Field::new("total", DataType::Float64, true),
        ]));
        let orders_batch = RecordBatch::try_new(
            orders_schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4, 5])) as ArrayRef,
                Arc::new(Int64Array::from(vec![10, 20, 10, 30, 20])),
                Arc::new(Float64Array::from(vec![5.0, 10.0, 15.0, 20.0, 25.0])),
            ],
        )
        .unwrap();
        data.register_table(orders, vec![orders_batch]);

        let customers = TableMetadata::new(
            QualifiedTableName::new("cat", "sch", "customers"),
            vec![
                ColumnMetadata::new("customer_id", DataType::Int64),
                ColumnMetadata::new("name", DataType::Utf8),
            ],
        );
        catalog.create_table(customers.clone()).unwrap();
        let customers_schema = Arc::new(Schema::new(vec![
            Field::new("customer_id", DataType::Int64, true),
            Field::new("name", DataType::Utf8, true),
        ]));
        let customers_batch = RecordBatch::try_new(
            customers_schema,
            vec![
                Arc::new(Int64Array::from(vec![10, 20])) as ArrayRef,
                Arc::new(StringArray::from(vec!["alice", "bob"])),
            ],
        )
        .unwrap();
        data.register_table(customers, vec![customers_batch]);

        Self {
            catalog,
            data,
            session: Session::new("test", "cat", "sch"),
            functions: FunctionRegistry::builtin(),
        }
    }

    /// Analyze + lower + fragment one statement.
    pub fn plan(
        &self,
        sql: &str,
        single_node: bool,
    ) -> Result<(SubPlan, HashMap<quern_planner::Symbol, DataType>)> {
        let statement = parse_statement(sql)?;
        let analysis = Analyzer::new(&self.session, &self.catalog, &self.functions)
            .analyze(&statement)?;
        let mut ids = PlanNodeIdAllocator::new();
        let plan =
            LogicalPlanner::new(&self.session, &self.catalog, &mut ids).plan(&analysis)?;
        let subplan = DistributedPlanner::new().create_subplans(plan, single_node);
        Ok((subplan, analysis.types().clone()))
    }

    /// Assign the first split of each scanned table.
    pub fn splits_for(&self, subplan: &SubPlan) -> HashMap<PlanNodeId, Split> {
        let mut sources = HashMap::new();
        for fragment in subplan.all_fragments() {
            for scan in fragment.table_scans() {
                if let PlanNode::TableScan { id, table, .. } = scan {
                    let splits = self.data.splits(table);
                    sources.insert(*id, splits[0].clone());
                }
            }
        }
        sources
    }

    /// Compile and drive one fragment with the given memory budget.
    pub fn execute(
        &self,
        sql: &str,
        memory_budget_bytes: usize,
    ) -> Result<Vec<RecordBatch>> {
        let (subplan, types) = self.plan(sql, true)?;
        let sources = self.splits_for(&subplan);
        let tracker = MemoryTracker::new(memory_budget_bytes);
        let factory = Arc::new(SourceHashProviderFactory::new(Arc::clone(&tracker)));
        let planner = LocalExecutionPlanner::new(
            &self.session,
            &self.functions,
            &types,
            &sources,
            self.data.clone(),
            factory,
            tracker,
        );
        let operator = planner.plan(&subplan.fragment.root)?;
        drive(operator)
    }
}

/// Collect one Int64 column across pages.
pub fn int_column(pages: &[RecordBatch], column: usize) -> Vec<i64> {
    let mut values = Vec::new();
    for page in pages {
        let array = page
            .column(column)
            .as_any()
            .downcast_ref::<Int64Array>()
            .expect("Int64 column");
        for row in 0..array.len() {
            values.push(array.value(row));
        }
    }
    values
}

/// Collect one Utf8 column across pages.
pub fn string_column(pages: &[RecordBatch], column: usize) -> Vec<String> {
    let mut values = Vec::new();
    for page in pages {
        let array = page
            .column(column)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("Utf8 column");
        for row in 0..array.len() {
            values.push(array.value(row).to_string());
        }
    }
    values
}

/// Collect one Float64 column across pages.
pub fn float_column(pages: &[RecordBatch], column: usize) -> Vec<f64> {
    let mut values = Vec::new();
    for page in pages {
        let array = page
            .column(column)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("Float64 column");
        for row in 0..array.len() {
            values.push(array.value(row));
        }
    }
    values
}
