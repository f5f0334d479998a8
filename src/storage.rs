pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{Candle, TableRef};

/// A dynamically typed cell in an upsert row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Real(f64),
    Integer(i64),
    Null,
}

/// Write-time configuration for a conflict-safe batch upsert.
///
/// Rows are positional against `columns`. `conflict_columns` is the unique
/// key; on conflict every non-key column is overwritten with the incoming
/// value (`column = excluded.column`, last write wins). No soft delete, no
/// versioning.
#[derive(Debug, Clone)]
pub struct UpsertSpec {
    pub table: TableRef,
    pub columns: Vec<String>,
    pub conflict_columns: Vec<String>,
}

impl UpsertSpec {
    pub fn new(
        table: TableRef,
        columns: impl IntoIterator<Item = impl Into<String>>,
        conflict_columns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            table,
            columns: columns.into_iter().map(Into::into).collect(),
            conflict_columns: conflict_columns.into_iter().map(Into::into).collect(),
        }
    }
}

pub trait Storage: Send + Sync {
    /// All candle-shaped rows for `pair` in `table`, ascending by time.
    /// Range filtering belongs to the orchestrator, which needs the full
    /// preceding history for recurrence-based indicators anyway.
    fn fetch_candles(
        &self,
        table: &TableRef,
        pair: &str,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<StorageError>>>;

    /// Upsert one batch atomically: either every row commits or none does.
    fn upsert_batch(
        &self,
        spec: &UpsertSpec,
        rows: &[Vec<Value>],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;
}
