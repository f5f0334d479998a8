use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};

use crate::error::StorageError;
use crate::model::{Candle, TableRef};
use crate::storage::{Storage, UpsertSpec, Value};

type CandleRow = (String, String, f64, f64, f64, f64, f64, i64);

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Migration)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Migration)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Migration)
            .attach_with(|| format!("database path: {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }

    // An in-memory database is per-connection, so the pool is pinned to a
    // single connection.
    #[cfg(test)]
    pub(crate) async fn open_in_memory() -> Self {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .create_if_missing(true);
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Self { pool }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Storage for SqliteStorage {
    fn fetch_candles(
        &self,
        table: &TableRef,
        pair: &str,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<StorageError>>> {
        let table = table.clone();
        let pair = pair.to_string();
        Box::pin(async move {
            // Identifier characters are validated by TableRef, so the name
            // can be formatted into the statement directly.
            let sql = format!(
                "SELECT \"time\", \"pair\", \"open\", \"high\", \"low\", \"close\", \
                 \"volume\", \"count\" FROM \"{}\" WHERE \"pair\" = ? ORDER BY \"time\" ASC",
                table.physical()
            );

            let rows: Vec<CandleRow> = sqlx::query_as(&sql)
                .bind(&pair)
                .fetch_all(&self.pool)
                .await
                .change_context(StorageError::Read {
                    table: table.to_string(),
                })?;

            rows.into_iter()
                .map(|(time, pair, open, high, low, close, volume, trade_count)| {
                    let time = DateTime::parse_from_rfc3339(&time)
                        .map(|dt| dt.with_timezone(&Utc))
                        .change_context(StorageError::Read {
                            table: table.to_string(),
                        })
                        .attach_with(|| format!("unparseable time column: {time}"))?;
                    Ok(Candle {
                        time,
                        pair,
                        open,
                        high,
                        low,
                        close,
                        volume,
                        trade_count,
                    })
                })
                .collect()
        })
    }

    fn upsert_batch(
        &self,
        spec: &UpsertSpec,
        rows: &[Vec<Value>],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let spec = spec.clone();
        let rows = rows.to_vec();
        Box::pin(async move {
            let write_error = || StorageError::Write {
                table: spec.table.to_string(),
            };

            let sql = build_upsert_sql(&spec);
            let mut tx = self.pool.begin().await.change_context(write_error())?;

            for row in &rows {
                if row.len() != spec.columns.len() {
                    return Err(Report::new(write_error())).attach_with(|| {
                        format!(
                            "row has {} cells, spec has {} columns",
                            row.len(),
                            spec.columns.len()
                        )
                    });
                }

                let mut query = sqlx::query(&sql);
                for value in row {
                    query = match value {
                        Value::Text(s) => query.bind(s.clone()),
                        Value::Real(f) => query.bind(*f),
                        Value::Integer(i) => query.bind(*i),
                        Value::Null => query.bind(Option::<f64>::None),
                    };
                }
                query
                    .execute(&mut *tx)
                    .await
                    .change_context(write_error())?;
            }

            tx.commit().await.change_context(write_error())?;
            Ok(())
        })
    }
}

/// Compose `INSERT ... ON CONFLICT (keys) DO UPDATE SET col = excluded.col`
/// from the spec's column and conflict-key lists. Every non-key column takes
/// the incoming value; when every column is part of the key there is nothing
/// to update and the conflict is a no-op.
fn build_upsert_sql(spec: &UpsertSpec) -> String {
    let columns = quoted_list(&spec.columns);
    let placeholders = vec!["?"; spec.columns.len()].join(", ");
    let conflict = quoted_list(&spec.conflict_columns);

    let updates: Vec<String> = spec
        .columns
        .iter()
        .filter(|c| !spec.conflict_columns.contains(c))
        .map(|c| format!("\"{c}\" = excluded.\"{c}\""))
        .collect();

    if updates.is_empty() {
        format!(
            "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders}) ON CONFLICT ({conflict}) DO NOTHING",
            spec.table.physical()
        )
    } else {
        format!(
            "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders}) ON CONFLICT ({conflict}) DO UPDATE SET {}",
            spec.table.physical(),
            updates.join(", ")
        )
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bronze() -> TableRef {
        TableRef::parse("bronze.ohlc").unwrap()
    }

    fn candle_spec() -> UpsertSpec {
        UpsertSpec::new(
            bronze(),
            ["time", "pair", "open", "high", "low", "close", "volume", "count"],
            ["time", "pair"],
        )
    }

    fn candle_row(hour: u32, close: f64) -> Vec<Value> {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap();
        vec![
            Value::Text(time.to_rfc3339()),
            Value::Text("BTC-USD".into()),
            Value::Real(close),
            Value::Real(close + 1.0),
            Value::Real(close - 1.0),
            Value::Real(close),
            Value::Real(100.0),
            Value::Integer(7),
        ]
    }

    #[test]
    fn upsert_sql_shape() {
        let spec = UpsertSpec::new(bronze(), ["time", "pair", "close"], ["time", "pair"]);
        let sql = build_upsert_sql(&spec);
        assert_eq!(
            sql,
            "INSERT INTO \"bronze_ohlc\" (\"time\", \"pair\", \"close\") VALUES (?, ?, ?) \
             ON CONFLICT (\"time\", \"pair\") DO UPDATE SET \"close\" = excluded.\"close\""
        );
    }

    #[test]
    fn upsert_sql_all_key_columns_does_nothing() {
        let spec = UpsertSpec::new(bronze(), ["time", "pair"], ["time", "pair"]);
        assert!(build_upsert_sql(&spec).ends_with("DO NOTHING"));
    }

    #[tokio::test]
    async fn upsert_and_fetch_round_trip() {
        let storage = SqliteStorage::open_in_memory().await;
        storage
            .upsert_batch(&candle_spec(), &[candle_row(1, 10.0), candle_row(0, 9.0)])
            .await
            .unwrap();

        let candles = storage.fetch_candles(&bronze(), "BTC-USD").await.unwrap();
        assert_eq!(candles.len(), 2);
        // Ascending by time regardless of insert order.
        assert_eq!(candles[0].close, 9.0);
        assert_eq!(candles[1].close, 10.0);
        assert_eq!(candles[0].trade_count, 7);
    }

    #[tokio::test]
    async fn double_upsert_is_idempotent() {
        let storage = SqliteStorage::open_in_memory().await;
        let batch = vec![candle_row(0, 10.0), candle_row(1, 11.0)];

        storage.upsert_batch(&candle_spec(), &batch).await.unwrap();
        let first = storage.fetch_candles(&bronze(), "BTC-USD").await.unwrap();

        storage.upsert_batch(&candle_spec(), &batch).await.unwrap();
        let second = storage.fetch_candles(&bronze(), "BTC-USD").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn conflicting_row_overwrites_non_key_columns() {
        let storage = SqliteStorage::open_in_memory().await;
        storage
            .upsert_batch(&candle_spec(), &[candle_row(0, 10.0)])
            .await
            .unwrap();
        storage
            .upsert_batch(&candle_spec(), &[candle_row(0, 99.0)])
            .await
            .unwrap();

        let candles = storage.fetch_candles(&bronze(), "BTC-USD").await.unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 99.0);
    }

    #[tokio::test]
    async fn arity_mismatch_rolls_back_whole_batch() {
        let storage = SqliteStorage::open_in_memory().await;
        let result = storage
            .upsert_batch(
                &candle_spec(),
                &[candle_row(0, 10.0), vec![Value::Text("short".into())]],
            )
            .await;
        assert!(result.is_err());

        // The valid first row must not have been committed.
        let candles = storage.fetch_candles(&bronze(), "BTC-USD").await.unwrap();
        assert!(candles.is_empty());
    }

    #[tokio::test]
    async fn fetch_filters_by_pair() {
        let storage = SqliteStorage::open_in_memory().await;
        let mut other = candle_row(0, 5.0);
        other[1] = Value::Text("ETH-USD".into());
        storage
            .upsert_batch(&candle_spec(), &[candle_row(0, 10.0), other])
            .await
            .unwrap();

        let candles = storage.fetch_candles(&bronze(), "ETH-USD").await.unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].pair, "ETH-USD");
    }
}
