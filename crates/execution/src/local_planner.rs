//! Compiles one plan fragment into a pull-based operator pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema, SchemaRef};

use quern_catalog::{FunctionRegistry, Session};
use quern_common::{MemoryTracker, PlanNodeId, QuernError, Result};
use quern_planner::{PlanNode, Symbol};

use crate::expressions::compile_expr;
use crate::join_hash::{BuildSideInput, SourceHashProviderFactory};
use crate::operator::{
    AggregateOperator, AggregateSpec, FilterProjectOperator, HashJoinProbeOperator, Operator,
    OutputOperator, TableScanOperator,
};
use crate::source::{DataSourceProvider, Split};

/// Compiles each plan-node variant of one fragment into the matching
/// operator variant, wiring in the data-source provider, the shared
/// hash-build factory, and the fragment's memory budget.
///
/// The split mapping is owned by the caller (the coordinator assigns
/// concrete splits per table-scan node id); this planner only validates its
/// completeness.
pub struct LocalExecutionPlanner<'a> {
    session: &'a Session,
    functions: &'a FunctionRegistry,
    types: &'a HashMap<Symbol, DataType>,
    sources: &'a HashMap<PlanNodeId, Split>,
    data_source: Arc<dyn DataSourceProvider>,
    hash_providers: Arc<SourceHashProviderFactory>,
    memory: Arc<MemoryTracker>,
}

impl<'a> LocalExecutionPlanner<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: &'a Session,
        functions: &'a FunctionRegistry,
        types: &'a HashMap<Symbol, DataType>,
        sources: &'a HashMap<PlanNodeId, Split>,
        data_source: Arc<dyn DataSourceProvider>,
        hash_providers: Arc<SourceHashProviderFactory>,
        memory: Arc<MemoryTracker>,
    ) -> Self {
        Self {
            session,
            functions,
            types,
            sources,
            data_source,
            hash_providers,
            memory,
        }
    }

    /// Compile `root` into an operator ready to be driven to completion.
    ///
    /// # Errors
    /// `PlanCompilation` when a table scan has no assigned split or a node
    /// variant has no physical implementation.
    pub fn plan(&self, root: &PlanNode) -> Result<Operator> {
        let _span = tracing::debug_span!(
            "local_plan",
            user = self.session.user(),
            root = root.variant_name()
        )
        .entered();
        self.compile(root)
    }

    fn compile(&self, node: &PlanNode) -> Result<Operator> {
        match node {
            PlanNode::TableScan {
                id,
                table,
                assignments,
            } => {
                let split = self.sources.get(id).ok_or_else(|| {
                    QuernError::PlanCompilation(format!(
                        "no split assigned to table scan {id} of {table}"
                    ))
                })?;
                let symbols: Vec<Symbol> = assignments.iter().map(|(s, _)| s.clone()).collect();
                let columns: Vec<String> = assignments.iter().map(|(_, c)| c.clone()).collect();
                let schema = self.schema_for(&symbols)?;
                Ok(Operator::TableScan(TableScanOperator::new(
                    schema,
                    Arc::clone(&self.data_source),
                    split.clone(),
                    columns,
                )))
            }

            PlanNode::Filter {
                input, predicate, ..
            } => {
                let child = self.compile(input)?;
                let layout = input.output_symbols();
                let predicate = compile_expr(predicate, &layout, &child.schema())?;
                let schema = child.schema();
                Ok(Operator::FilterProject(FilterProjectOperator::new(
                    schema,
                    child,
                    Some(predicate),
                    None,
                )))
            }

            PlanNode::Project {
                input, assignments, ..
            } => {
                let child = self.compile(input)?;
                let layout = input.output_symbols();
                let child_schema = child.schema();
                let projections = assignments
                    .iter()
                    .map(|(_, expr)| compile_expr(expr, &layout, &child_schema))
                    .collect::<Result<Vec<_>>>()?;
                let symbols: Vec<Symbol> = assignments.iter().map(|(s, _)| s.clone()).collect();
                let schema = self.schema_for(&symbols)?;
                Ok(Operator::FilterProject(FilterProjectOperator::new(
                    schema,
                    child,
                    None,
                    Some(projections),
                )))
            }

            PlanNode::Join {
                id,
                left,
                right,
                criteria,
            } => {
                let probe = self.compile(left)?;
                let build = self.compile(right)?;
                let probe_layout = left.output_symbols();
                let build_layout = right.output_symbols();

                let probe_key_channels = criteria
                    .iter()
                    .map(|(probe_symbol, _)| channel_of(&probe_layout, probe_symbol))
                    .collect::<Result<Vec<_>>>()?;
                let build_key_channels = criteria
                    .iter()
                    .map(|(_, build_symbol)| channel_of(&build_layout, build_symbol))
                    .collect::<Result<Vec<_>>>()?;

                let schema = join_schema(&probe.schema(), &build.schema());
                let supplier = self.hash_providers.get_or_create(
                    *id,
                    BuildSideInput {
                        operator: build,
                        key_channels: build_key_channels,
                    },
                );
                Ok(Operator::HashJoinProbe(HashJoinProbeOperator::new(
                    schema,
                    probe,
                    supplier,
                    probe_key_channels,
                )))
            }

            PlanNode::Aggregate {
                input,
                group_by,
                aggregates,
                ..
            } => {
                let child = self.compile(input)?;
                let layout = input.output_symbols();
                let child_schema = child.schema();

                let group_channels = group_by
                    .iter()
                    .map(|symbol| channel_of(&layout, symbol))
                    .collect::<Result<Vec<_>>>()?;
                let specs = aggregates
                    .iter()
                    .map(|(_, call)| {
                        let info = self.functions.get_function(call.handle)?;
                        Ok(AggregateSpec {
                            implementation: info.implementation,
                            argument: compile_expr(&call.argument, &layout, &child_schema)?,
                            output_type: info.return_type.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let symbols: Vec<Symbol> = node.output_symbols();
                let schema = self.schema_for(&symbols)?;
                Ok(Operator::Aggregate(AggregateOperator::new(
                    schema,
                    child,
                    group_channels,
                    specs,
                    Arc::clone(&self.memory),
                )))
            }

            PlanNode::Output {
                input,
                column_names,
                output_symbols,
                ..
            } => {
                let child = self.compile(input)?;
                let layout = input.output_symbols();
                let channels = output_symbols
                    .iter()
                    .map(|symbol| channel_of(&layout, symbol))
                    .collect::<Result<Vec<_>>>()?;
                let fields = column_names
                    .iter()
                    .zip(output_symbols.iter())
                    .map(|(name, symbol)| {
                        Ok(Field::new(name, self.type_of(symbol)?, true))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let schema = Arc::new(Schema::new(fields));
                Ok(Operator::Output(OutputOperator::new(schema, child, channels)))
            }

            // Exchanges execute as local pass-throughs within one fragment.
            PlanNode::Exchange { input, .. } => self.compile(input),

            PlanNode::RemoteSource { id, fragment, .. } => Err(QuernError::PlanCompilation(
                format!(
                    "remote source {id} (fragment {fragment}) has no local implementation; \
                     fragment inputs are delivered by the coordinator"
                ),
            )),
        }
    }

    fn schema_for(&self, symbols: &[Symbol]) -> Result<SchemaRef> {
        let fields = symbols
            .iter()
            .map(|symbol| Ok(Field::new(symbol.name(), self.type_of(symbol)?, true)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Schema::new(fields)))
    }

    fn type_of(&self, symbol: &Symbol) -> Result<DataType> {
        self.types.get(symbol).cloned().ok_or_else(|| {
            QuernError::PlanCompilation(format!("no type binding for symbol '{symbol}'"))
        })
    }
}

fn channel_of(layout: &[Symbol], symbol: &Symbol) -> Result<usize> {
    layout.iter().position(|s| s == symbol).ok_or_else(|| {
        QuernError::PlanCompilation(format!(
            "symbol '{symbol}' is not produced by the input node"
        ))
    })
}

fn join_schema(probe: &SchemaRef, build: &SchemaRef) -> SchemaRef {
    let fields: Vec<Field> = probe
        .fields()
        .iter()
        .chain(build.fields().iter())
        .map(|f| (**f).clone())
        .collect();
    Arc::new(Schema::new(fields))
}
