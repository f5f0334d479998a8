use error_stack::{Report, ResultExt};
use tracing::debug;

use crate::error::StorageError;
use crate::storage::{Storage, UpsertSpec, Value};

/// Splits a row set into fixed-size batches and submits each as an
/// independent atomic upsert.
///
/// Batches are independent units of atomicity: a failure in one batch does
/// not roll back previously committed batches. This favors progress over
/// all-or-nothing semantics on large backfills; re-running the same range is
/// safe because the write is an idempotent upsert. The error for a failed
/// batch names the row range it covered, so a caller can retry, skip or
/// abort.
pub struct UpsertWriter<'a> {
    storage: &'a dyn Storage,
    batch_size: usize,
}

impl<'a> UpsertWriter<'a> {
    pub fn new(storage: &'a dyn Storage, batch_size: usize) -> Self {
        debug_assert!(batch_size > 0, "batch size validated by the caller");
        Self {
            storage,
            batch_size,
        }
    }

    /// Write all rows, returning how many were committed.
    pub async fn write(
        &self,
        spec: &UpsertSpec,
        rows: &[Vec<Value>],
    ) -> Result<usize, Report<StorageError>> {
        for (batch_index, batch) in rows.chunks(self.batch_size).enumerate() {
            let first_row = batch_index * self.batch_size;
            let last_row = first_row + batch.len() - 1;

            self.storage
                .upsert_batch(spec, batch)
                .await
                .change_context(StorageError::Batch {
                    table: spec.table.to_string(),
                    first_row,
                    last_row,
                })?;

            debug!(
                table = %spec.table,
                first_row,
                last_row,
                "batch committed"
            );
        }
        Ok(rows.len())
    }
}
