//! Shared build-once hash tables for join build sides.
//!
//! One supplier exists per join node within a fragment execution. The first
//! probe pipeline to ask for the table takes the build input and builds
//! while holding the state lock, so there is at most one active build
//! attempt; every other probe blocks until the completed table is published,
//! then shares it by reference. A failed build is recorded and re-surfaced
//! to later callers instead of silently racing a rebuild. Build memory is
//! reserved against the fragment budget and released when the table (or a
//! failed partial build) is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quern_common::{MemoryReservation, MemoryTracker, PlanNodeId, QuernError, Result};

use crate::operator::Operator;
use crate::scalar::{scalar_from_array, ScalarValue};

/// Immutable hash table over the build side of one join.
#[derive(Debug)]
pub struct JoinHashTable {
    rows: Vec<Vec<ScalarValue>>,
    index: HashMap<Vec<ScalarValue>, Vec<usize>>,
    estimated_size_bytes: usize,
    _reservation: MemoryReservation,
}

impl JoinHashTable {
    /// Row positions matching `key`, empty when absent.
    pub fn positions(&self, key: &[ScalarValue]) -> &[usize] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Build-side row at `position`.
    pub fn row(&self, position: usize) -> &[ScalarValue] {
        &self.rows[position]
    }

    /// Number of build-side rows held.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Estimated memory footprint charged against the fragment budget.
    pub fn estimated_size_bytes(&self) -> usize {
        self.estimated_size_bytes
    }
}

/// The build side of a join: its compiled operator chain plus key channels.
pub struct BuildSideInput {
    /// Operator producing build-side pages.
    pub operator: Operator,
    /// Channels forming the join key, in criteria order.
    pub key_channels: Vec<usize>,
}

enum BuildState {
    Pending(Option<BuildSideInput>),
    Ready(Arc<JoinHashTable>),
    Failed(QuernError),
}

/// Build-once-read-many supplier for one join's hash table.
pub struct SourceHashSupplier {
    tracker: Arc<MemoryTracker>,
    state: Mutex<BuildState>,
}

impl SourceHashSupplier {
    fn new(tracker: Arc<MemoryTracker>, input: BuildSideInput) -> Self {
        Self {
            tracker,
            state: Mutex::new(BuildState::Pending(Some(input))),
        }
    }

    /// Return the completed hash table, building it on first call.
    ///
    /// Blocks while another caller is building. After a failed build every
    /// subsequent call observes the same error.
    ///
    /// # Errors
    /// `ResourceExhausted` when the build side exceeds the fragment budget;
    /// any error from driving the build-side operators.
    pub fn get_or_build(&self) -> Result<Arc<JoinHashTable>> {
        let mut state = self.state.lock().expect("hash supplier lock poisoned");
        match &mut *state {
            BuildState::Ready(table) => Ok(Arc::clone(table)),
            BuildState::Failed(error) => Err(error.clone()),
            BuildState::Pending(input) => {
                let input = input
                    .take()
                    .expect("pending build state always holds its input");
                match build_table(input, &self.tracker) {
                    Ok(table) => {
                        let table = Arc::new(table);
                        tracing::debug!(
                            rows = table.row_count(),
                            bytes = table.estimated_size_bytes(),
                            "join build side completed"
                        );
                        *state = BuildState::Ready(Arc::clone(&table));
                        Ok(table)
                    }
                    Err(error) => {
                        *state = BuildState::Failed(error.clone());
                        Err(error)
                    }
                }
            }
        }
    }
}

/// Drive the build side to completion and index it by join key.
///
/// Rows with a NULL key component never match an inner join and are skipped.
fn build_table(mut input: BuildSideInput, tracker: &Arc<MemoryTracker>) -> Result<JoinHashTable> {
    let mut reservation = tracker.try_reserve(0)?;
    let mut rows: Vec<Vec<ScalarValue>> = Vec::new();
    let mut index: HashMap<Vec<ScalarValue>, Vec<usize>> = HashMap::new();

    while !input.operator.is_finished() {
        let Some(page) = input.operator.get_output()? else {
            continue;
        };
        let mut page_rows = Vec::with_capacity(page.num_rows());
        let mut page_bytes = 0;
        for row in 0..page.num_rows() {
            let mut values = Vec::with_capacity(page.num_columns());
            for column in 0..page.num_columns() {
                values.push(scalar_from_array(page.column(column), row)?);
            }
            let key: Vec<ScalarValue> = input
                .key_channels
                .iter()
                .map(|channel| values[*channel].clone())
                .collect();
            if key.iter().any(ScalarValue::is_null) {
                continue;
            }
            page_bytes += estimated_row_bytes(&values) + estimated_row_bytes(&key);
            page_rows.push((key, values));
        }
        // Reserve before the working set actually grows.
        reservation.grow(page_bytes)?;
        for (key, values) in page_rows {
            index.entry(key).or_default().push(rows.len());
            rows.push(values);
        }
    }

    let estimated_size_bytes = reservation.reserved_bytes();
    Ok(JoinHashTable {
        rows,
        index,
        estimated_size_bytes,
        _reservation: reservation,
    })
}

fn estimated_row_bytes(values: &[ScalarValue]) -> usize {
    values
        .iter()
        .map(ScalarValue::estimated_bytes)
        .sum::<usize>()
        + 32
}

/// Per-fragment cache of hash suppliers, keyed by join node identity.
///
/// Scoped to one fragment execution: dropping the factory drops every
/// supplier (and through it any built table and its memory reservation)
/// that no probe still holds.
pub struct SourceHashProviderFactory {
    tracker: Arc<MemoryTracker>,
    suppliers: Mutex<HashMap<PlanNodeId, Arc<SourceHashSupplier>>>,
}

impl SourceHashProviderFactory {
    /// Create a factory charging builds against `tracker`.
    pub fn new(tracker: Arc<MemoryTracker>) -> Self {
        Self {
            tracker,
            suppliers: Mutex::new(HashMap::new()),
        }
    }

    /// Supplier for `join_id`, creating it from `input` on first call.
    ///
    /// Later calls return the existing supplier and discard their input; the
    /// build side is driven at most once per fragment execution.
    pub fn get_or_create(
        &self,
        join_id: PlanNodeId,
        input: BuildSideInput,
    ) -> Arc<SourceHashSupplier> {
        let mut suppliers = self.suppliers.lock().expect("hash factory lock poisoned");
        Arc::clone(
            suppliers
                .entry(join_id)
                .or_insert_with(|| Arc::new(SourceHashSupplier::new(Arc::clone(&self.tracker), input))),
        )
    }
}
