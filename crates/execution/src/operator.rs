//! Pull-based physical operators.
//!
//! `Operator` is a closed sum type over the physical operator kinds; the
//! runtime contract is dispatched by match. Each instance moves through
//! `NotStarted -> Running -> Finished`; "blocked" is a side channel, not a
//! state: `get_output` returning `None` while unfinished means no data is
//! available yet and the driver should poll again. A probe-side join
//! suspends inside the shared hash supplier until its build completes.
//!
//! Operators are driven top-down by a single thread per pipeline; pages flow
//! in the order the driver pulls them. Dropping an operator chain releases
//! any memory reservations held by partially accumulated state.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::compute::filter_record_batch;
use arrow::array::BooleanArray;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, SchemaRef};

use quern_catalog::AggregateImpl;
use quern_common::{MemoryReservation, MemoryTracker, QuernError, Result};

use crate::expressions::PhysicalExpr;
use crate::join_hash::{JoinHashTable, SourceHashSupplier};
use crate::scalar::{compare_scalars, rows_to_batch, scalar_from_array, ScalarValue};
use crate::source::{DataSourceProvider, PageIterator, Split};

/// Logical progress of one operator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    NotStarted,
    Running,
    Finished,
}

/// A physical operator: a pull-based iterator over pages of tuples.
pub enum Operator {
    TableScan(TableScanOperator),
    FilterProject(FilterProjectOperator),
    HashJoinProbe(HashJoinProbeOperator),
    Aggregate(AggregateOperator),
    Output(OutputOperator),
}

impl Operator {
    /// Operator kind for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Operator::TableScan(_) => "TableScan",
            Operator::FilterProject(_) => "FilterProject",
            Operator::HashJoinProbe(_) => "HashJoinProbe",
            Operator::Aggregate(_) => "Aggregate",
            Operator::Output(_) => "Output",
        }
    }

    /// Schema of every page this operator yields.
    pub fn schema(&self) -> SchemaRef {
        match self {
            Operator::TableScan(op) => op.schema.clone(),
            Operator::FilterProject(op) => op.schema.clone(),
            Operator::HashJoinProbe(op) => op.schema.clone(),
            Operator::Aggregate(op) => op.schema.clone(),
            Operator::Output(op) => op.schema.clone(),
        }
    }

    /// Readiness check: no further pages will ever be produced.
    pub fn is_finished(&self) -> bool {
        self.state() == OperatorState::Finished
    }

    /// Current logical state.
    pub fn state(&self) -> OperatorState {
        match self {
            Operator::TableScan(op) => op.state,
            Operator::FilterProject(op) => op.state,
            Operator::HashJoinProbe(op) => op.state,
            Operator::Aggregate(op) => op.state,
            Operator::Output(op) => op.state,
        }
    }

    /// Produce the next page, `None` when finished or momentarily blocked.
    pub fn get_output(&mut self) -> Result<Option<RecordBatch>> {
        match self {
            Operator::TableScan(op) => op.get_output(),
            Operator::FilterProject(op) => op.get_output(),
            Operator::HashJoinProbe(op) => op.get_output(),
            Operator::Aggregate(op) => op.get_output(),
            Operator::Output(op) => op.get_output(),
        }
    }
}

/// Leaf scan bound to one split and a data-source provider.
pub struct TableScanOperator {
    schema: SchemaRef,
    provider: Arc<dyn DataSourceProvider>,
    split: Split,
    columns: Vec<String>,
    pages: Option<PageIterator>,
    state: OperatorState,
}

impl TableScanOperator {
    pub fn new(
        schema: SchemaRef,
        provider: Arc<dyn DataSourceProvider>,
        split: Split,
        columns: Vec<String>,
    ) -> Self {
        Self {
            schema,
            provider,
            split,
            columns,
            pages: None,
            state: OperatorState::NotStarted,
        }
    }

    fn get_output(&mut self) -> Result<Option<RecordBatch>> {
        if self.state == OperatorState::Finished {
            return Ok(None);
        }
        if self.state == OperatorState::NotStarted {
            self.pages = Some(self.provider.get_pages(&self.split, &self.columns)?);
            self.state = OperatorState::Running;
        }
        let pages = self.pages.as_mut().expect("page iterator opened on start");
        match pages.next() {
            Some(page) => {
                let page = page?;
                // Relabel provider columns with this scan's symbol names.
                let page = RecordBatch::try_new(self.schema.clone(), page.columns().to_vec())
                    .map_err(|e| {
                        QuernError::Execution(format!("scan page shape mismatch: {e}"))
                    })?;
                Ok(Some(page))
            }
            None => {
                self.state = OperatorState::Finished;
                self.pages = None;
                Ok(None)
            }
        }
    }
}

/// Row-transforming operator covering both filter and projection nodes.
pub struct FilterProjectOperator {
    schema: SchemaRef,
    child: Box<Operator>,
    predicate: Option<Arc<dyn PhysicalExpr>>,
    projections: Option<Vec<Arc<dyn PhysicalExpr>>>,
    state: OperatorState,
}

impl FilterProjectOperator {
    pub fn new(
        schema: SchemaRef,
        child: Operator,
        predicate: Option<Arc<dyn PhysicalExpr>>,
        projections: Option<Vec<Arc<dyn PhysicalExpr>>>,
    ) -> Self {
        Self {
            schema,
            child: Box::new(child),
            predicate,
            projections,
            state: OperatorState::NotStarted,
        }
    }

    fn get_output(&mut self) -> Result<Option<RecordBatch>> {
        if self.state == OperatorState::Finished {
            return Ok(None);
        }
        self.state = OperatorState::Running;
        let Some(page) = self.child.get_output()? else {
            if self.child.is_finished() {
                self.state = OperatorState::Finished;
            }
            return Ok(None);
        };

        let page = match &self.predicate {
            Some(predicate) => {
                let mask = predicate.evaluate(&page)?;
                let mask = mask
                    .as_any()
                    .downcast_ref::<BooleanArray>()
                    .ok_or_else(|| {
                        QuernError::Execution("filter predicate must yield boolean".to_string())
                    })?;
                filter_record_batch(&page, mask)
                    .map_err(|e| QuernError::Execution(format!("filter failed: {e}")))?
            }
            None => page,
        };

        let page = match &self.projections {
            Some(projections) => {
                let arrays = projections
                    .iter()
                    .map(|expr| expr.evaluate(&page))
                    .collect::<Result<Vec<_>>>()?;
                RecordBatch::try_new(self.schema.clone(), arrays)
                    .map_err(|e| QuernError::Execution(format!("projection failed: {e}")))?
            }
            None => page,
        };
        Ok(Some(page))
    }
}

/// Probe side of a hash join.
///
/// Requests the build-side table from the shared supplier on first output;
/// that call blocks until the (at most one) build completes.
pub struct HashJoinProbeOperator {
    schema: SchemaRef,
    child: Box<Operator>,
    supplier: Arc<SourceHashSupplier>,
    probe_key_channels: Vec<usize>,
    hash_table: Option<Arc<JoinHashTable>>,
    state: OperatorState,
}

impl HashJoinProbeOperator {
    pub fn new(
        schema: SchemaRef,
        child: Operator,
        supplier: Arc<SourceHashSupplier>,
        probe_key_channels: Vec<usize>,
    ) -> Self {
        Self {
            schema,
            child: Box::new(child),
            supplier,
            probe_key_channels,
            hash_table: None,
            state: OperatorState::NotStarted,
        }
    }

    fn get_output(&mut self) -> Result<Option<RecordBatch>> {
        if self.state == OperatorState::Finished {
            return Ok(None);
        }
        self.state = OperatorState::Running;
        if self.hash_table.is_none() {
            self.hash_table = Some(self.supplier.get_or_build()?);
        }
        let table = self
            .hash_table
            .as_ref()
            .expect("hash table resolved above");

        let Some(page) = self.child.get_output()? else {
            if self.child.is_finished() {
                self.state = OperatorState::Finished;
            }
            return Ok(None);
        };

        let mut out_rows: Vec<Vec<ScalarValue>> = Vec::new();
        for row in 0..page.num_rows() {
            let mut probe_values = Vec::with_capacity(page.num_columns());
            for column in 0..page.num_columns() {
                probe_values.push(scalar_from_array(page.column(column), row)?);
            }
            let key: Vec<ScalarValue> = self
                .probe_key_channels
                .iter()
                .map(|channel| probe_values[*channel].clone())
                .collect();
            if key.iter().any(ScalarValue::is_null) {
                continue;
            }
            for position in table.positions(&key) {
                let mut joined = probe_values.clone();
                joined.extend(table.row(*position).iter().cloned());
                out_rows.push(joined);
            }
        }
        Ok(Some(rows_to_batch(&self.schema, &out_rows)?))
    }
}

/// One aggregate column: execution binding, argument, and output type.
pub struct AggregateSpec {
    /// Execution binding from the function registry.
    pub implementation: AggregateImpl,
    /// Argument evaluated per input row.
    pub argument: Arc<dyn PhysicalExpr>,
    /// Finalized output type.
    pub output_type: DataType,
}

enum AggregateState {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    Avg { sum: f64, count: i64 },
}

/// Buffering hash aggregation bounded by the fragment memory budget.
///
/// Drains its child completely into a group map, then emits one output page
/// with group columns followed by aggregate columns, sorted by group key.
/// A global aggregation (no group channels) emits exactly one row.
pub struct AggregateOperator {
    schema: SchemaRef,
    child: Box<Operator>,
    group_channels: Vec<usize>,
    specs: Vec<AggregateSpec>,
    tracker: Arc<MemoryTracker>,
    state: OperatorState,
}

impl AggregateOperator {
    pub fn new(
        schema: SchemaRef,
        child: Operator,
        group_channels: Vec<usize>,
        specs: Vec<AggregateSpec>,
        tracker: Arc<MemoryTracker>,
    ) -> Self {
        Self {
            schema,
            child: Box::new(child),
            group_channels,
            specs,
            tracker,
            state: OperatorState::NotStarted,
        }
    }

    fn get_output(&mut self) -> Result<Option<RecordBatch>> {
        if self.state == OperatorState::Finished {
            return Ok(None);
        }
        self.state = OperatorState::Running;

        let mut reservation = self.tracker.try_reserve(0)?;
        let mut groups: HashMap<Vec<ScalarValue>, Vec<AggregateState>> = HashMap::new();

        while !self.child.is_finished() {
            let Some(page) = self.child.get_output()? else {
                continue;
            };
            self.accumulate(&page, &mut groups, &mut reservation)?;
        }

        // Global aggregation over zero rows still yields one row.
        if self.group_channels.is_empty() && groups.is_empty() {
            groups.insert(Vec::new(), init_states(&self.specs));
        }

        let mut entries: Vec<(Vec<ScalarValue>, Vec<AggregateState>)> = groups.into_iter().collect();
        entries.sort_by(|a, b| compare_keys(&a.0, &b.0));

        let mut rows = Vec::with_capacity(entries.len());
        for (key, states) in entries {
            let mut row = key;
            for state in states {
                row.push(finalize_state(state));
            }
            rows.push(row);
        }
        self.state = OperatorState::Finished;
        Ok(Some(rows_to_batch(&self.schema, &rows)?))
    }

    fn accumulate(
        &self,
        page: &RecordBatch,
        groups: &mut HashMap<Vec<ScalarValue>, Vec<AggregateState>>,
        reservation: &mut MemoryReservation,
    ) -> Result<()> {
        let argument_arrays = self
            .specs
            .iter()
            .map(|spec| spec.argument.evaluate(page))
            .collect::<Result<Vec<_>>>()?;

        for row in 0..page.num_rows() {
            let key: Vec<ScalarValue> = self
                .group_channels
                .iter()
                .map(|channel| scalar_from_array(page.column(*channel), row))
                .collect::<Result<Vec<_>>>()?;
            if !groups.contains_key(&key) {
                let key_bytes: usize = key.iter().map(ScalarValue::estimated_bytes).sum();
                reservation.grow(key_bytes + self.specs.len() * 16 + 64)?;
                groups.insert(key.clone(), init_states(&self.specs));
            }
            let states = groups.get_mut(&key).expect("group inserted above");
            for (idx, state) in states.iter_mut().enumerate() {
                let value = scalar_from_array(&argument_arrays[idx], row)?;
                update_state(state, value)?;
            }
        }
        Ok(())
    }
}

fn init_states(specs: &[AggregateSpec]) -> Vec<AggregateState> {
    specs
        .iter()
        .map(|spec| match spec.implementation {
            AggregateImpl::Count => AggregateState::Count(0),
            AggregateImpl::Sum => match spec.output_type {
                DataType::Int64 => AggregateState::SumInt(None),
                _ => AggregateState::SumFloat(None),
            },
            AggregateImpl::Min => AggregateState::Min(None),
            AggregateImpl::Max => AggregateState::Max(None),
            AggregateImpl::Avg => AggregateState::Avg { sum: 0.0, count: 0 },
        })
        .collect()
}

fn update_state(state: &mut AggregateState, value: ScalarValue) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    match state {
        AggregateState::Count(count) => *count += 1,
        AggregateState::SumInt(sum) => match value {
            ScalarValue::Int64(v) => *sum = Some(sum.unwrap_or(0) + v),
            other => return Err(aggregate_type_error("SUM", &other)),
        },
        AggregateState::SumFloat(sum) => match value {
            ScalarValue::Float64Bits(bits) => {
                *sum = Some(sum.unwrap_or(0.0) + f64::from_bits(bits))
            }
            other => return Err(aggregate_type_error("SUM", &other)),
        },
        AggregateState::Min(current) => {
            let replace = current
                .as_ref()
                .map_or(true, |c| compare_scalars(&value, c).is_lt());
            if replace {
                *current = Some(value);
            }
        }
        AggregateState::Max(current) => {
            let replace = current
                .as_ref()
                .map_or(true, |c| compare_scalars(&value, c).is_gt());
            if replace {
                *current = Some(value);
            }
        }
        AggregateState::Avg { sum, count } => {
            let v = match value {
                ScalarValue::Int64(v) => v as f64,
                ScalarValue::Float64Bits(bits) => f64::from_bits(bits),
                other => return Err(aggregate_type_error("AVG", &other)),
            };
            *sum += v;
            *count += 1;
        }
    }
    Ok(())
}

fn finalize_state(state: AggregateState) -> ScalarValue {
    match state {
        AggregateState::Count(count) => ScalarValue::Int64(count),
        AggregateState::SumInt(sum) => sum.map(ScalarValue::Int64).unwrap_or(ScalarValue::Null),
        AggregateState::SumFloat(sum) => sum
            .map(|v| ScalarValue::Float64Bits(v.to_bits()))
            .unwrap_or(ScalarValue::Null),
        AggregateState::Min(value) | AggregateState::Max(value) => {
            value.unwrap_or(ScalarValue::Null)
        }
        AggregateState::Avg { sum, count } => {
            if count == 0 {
                ScalarValue::Null
            } else {
                ScalarValue::Float64Bits((sum / count as f64).to_bits())
            }
        }
    }
}

fn aggregate_type_error(function: &str, value: &ScalarValue) -> QuernError {
    QuernError::Execution(format!("{function} saw unexpected value {value:?}"))
}

fn compare_keys(a: &[ScalarValue], b: &[ScalarValue]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ordering = compare_scalars(x, y);
        if !ordering.is_eq() {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

/// Final column rename/reorder to the query's declared output shape.
pub struct OutputOperator {
    schema: SchemaRef,
    child: Box<Operator>,
    channels: Vec<usize>,
    state: OperatorState,
}

impl OutputOperator {
    pub fn new(schema: SchemaRef, child: Operator, channels: Vec<usize>) -> Self {
        Self {
            schema,
            child: Box::new(child),
            channels,
            state: OperatorState::NotStarted,
        }
    }

    fn get_output(&mut self) -> Result<Option<RecordBatch>> {
        if self.state == OperatorState::Finished {
            return Ok(None);
        }
        self.state = OperatorState::Running;
        let Some(page) = self.child.get_output()? else {
            if self.child.is_finished() {
                self.state = OperatorState::Finished;
            }
            return Ok(None);
        };
        let projected = page
            .project(&self.channels)
            .map_err(|e| QuernError::Execution(format!("output projection failed: {e}")))?;
        let page = RecordBatch::try_new(self.schema.clone(), projected.columns().to_vec())
            .map_err(|e| QuernError::Execution(format!("output relabel failed: {e}")))?;
        Ok(Some(page))
    }
}
