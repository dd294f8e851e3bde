//! Minimal single-pipeline driver.
//!
//! Pulls pages through an operator chain on the calling thread until the
//! root reports finished. `None` outputs while unfinished mean the operator
//! is momentarily blocked; the driver simply polls again, and the pull
//! itself makes progress in the synchronous operators below.

use arrow::record_batch::RecordBatch;

use quern_common::Result;

use crate::operator::Operator;

/// Drive `operator` to completion, collecting its non-empty pages in pull
/// order. On error the chain is dropped, releasing any partially built
/// shared state before the failure propagates.
pub fn drive(mut operator: Operator) -> Result<Vec<RecordBatch>> {
    let _span = tracing::debug_span!("drive_pipeline", root = operator.name()).entered();
    let mut pages = Vec::new();
    while !operator.is_finished() {
        if let Some(page) = operator.get_output()? {
            if page.num_rows() > 0 {
                pages.push(page);
            }
        }
    }
    tracing::debug!(pages = pages.len(), "pipeline finished");
    Ok(pages)
}
