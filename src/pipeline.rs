use chrono::{DateTime, FixedOffset, Utc};
use error_stack::{Report, ResultExt};
use tracing::info;
use uuid::Uuid;

use crate::aggregate::BucketAggregator;
use crate::config::RangeBound;
use crate::error::PipelineError;
use crate::indicator::IndicatorEngine;
use crate::model::{Candle, IndicatorRow, TableRef, TimeFrame};
use crate::series::Series;
use crate::storage::{Storage, UpsertSpec, Value};
use crate::writer::UpsertWriter;

const CANDLE_COLUMNS: [&str; 8] = [
    "time", "pair", "open", "high", "low", "close", "volume", "count",
];

const INDICATOR_COLUMNS: [&str; 15] = [
    "time",
    "pair",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "count",
    "ema_fast",
    "ema_slow",
    "stoch_k",
    "stoch_d",
    "macd",
    "macd_signal",
    "macd_hist",
];

const CONFLICT_COLUMNS: [&str; 2] = ["time", "pair"];

/// Sequences read -> transform -> upsert for one stage over a bounded date
/// range. Every run is independently restartable: re-running the same range
/// recomputes and overwrites, so the pipeline is idempotent at range
/// granularity. Concurrent runs over overlapping ranges are not coordinated
/// here; last writer wins by upsert semantics.
pub struct PipelineOrchestrator<'a> {
    storage: &'a dyn Storage,
    engine: IndicatorEngine,
    batch_size: usize,
    upper_bound: RangeBound,
    offset: FixedOffset,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(
        storage: &'a dyn Storage,
        engine: IndicatorEngine,
        batch_size: usize,
        upper_bound: RangeBound,
        offset: FixedOffset,
    ) -> Self {
        Self {
            storage,
            engine,
            batch_size,
            upper_bound,
            offset,
        }
    }

    /// Upsert already-decoded raw candles into a bronze-layer table in
    /// batch-size chunks. Returns the number of rows written.
    pub async fn load(
        &self,
        target: &TableRef,
        candles: &[Candle],
    ) -> Result<usize, Report<PipelineError>> {
        let run_id = Uuid::new_v4();
        info!(%run_id, target = %target, rows = candles.len(), "load run starting");

        let spec = UpsertSpec::new(target.clone(), CANDLE_COLUMNS, CONFLICT_COLUMNS);
        let rows: Vec<Vec<Value>> = candles.iter().map(candle_values).collect();
        let written = UpsertWriter::new(self.storage, self.batch_size)
            .write(&spec, &rows)
            .await
            .change_context(PipelineError::Sink)?;

        info!(%run_id, target = %target, written, "load run complete");
        Ok(written)
    }

    /// Bronze -> silver: bucket a higher-frequency series into
    /// lower-frequency bars and upsert them keyed on (time, pair). A range
    /// containing no source rows completes as a no-op write.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_aggregate(
        &self,
        pair: &str,
        source: &TableRef,
        target: &TableRef,
        source_frame: TimeFrame,
        target_frame: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, Report<PipelineError>> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id, pair, source = %source, target = %target,
            %source_frame, %target_frame, %start, %end,
            "aggregate run starting"
        );

        let aggregator = BucketAggregator::new(source_frame, target_frame, self.offset)
            .change_context(PipelineError::Aggregate)?;

        let rows = self
            .storage
            .fetch_candles(source, pair)
            .await
            .change_context(PipelineError::Source)?;
        let in_range: Vec<Candle> = rows
            .into_iter()
            .filter(|c| self.in_range(c.time, start, end))
            .collect();
        if in_range.is_empty() {
            info!(%run_id, source = %source, "no source rows in range; nothing to write");
            return Ok(0);
        }

        let series = Series::from_rows(in_range).change_context(PipelineError::Series)?;
        let buckets = aggregator.aggregate(&series);

        let spec = UpsertSpec::new(target.clone(), CANDLE_COLUMNS, CONFLICT_COLUMNS);
        let encoded: Vec<Vec<Value>> = buckets.iter().map(candle_values).collect();
        let written = UpsertWriter::new(self.storage, self.batch_size)
            .write(&spec, &encoded)
            .await
            .change_context(PipelineError::Sink)?;

        info!(%run_id, target = %target, written, "aggregate run complete");
        Ok(written)
    }

    /// Silver -> gold: compute indicator columns over the full history up to
    /// `end` (recurrences need every preceding bar to be numerically
    /// correct), then trim to the requested range before writing.
    pub async fn run_indicators(
        &self,
        pair: &str,
        source: &TableRef,
        target: &TableRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<usize, Report<PipelineError>> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id, pair, source = %source, target = %target, %start, %end,
            "indicator run starting"
        );

        let rows = self
            .storage
            .fetch_candles(source, pair)
            .await
            .change_context(PipelineError::Source)?;
        let history: Vec<Candle> = rows
            .into_iter()
            .filter(|c| self.below_upper(c.time, end))
            .collect();

        let series = Series::from_rows(history).change_context(PipelineError::Series)?;
        let computed = self.engine.compute(&series);
        let output: Vec<&IndicatorRow> = computed
            .iter()
            .filter(|r| self.in_range(r.candle.time, start, end))
            .collect();

        let spec = UpsertSpec::new(target.clone(), INDICATOR_COLUMNS, CONFLICT_COLUMNS);
        let encoded: Vec<Vec<Value>> = output.iter().map(|r| indicator_values(r)).collect();
        let written = UpsertWriter::new(self.storage, self.batch_size)
            .write(&spec, &encoded)
            .await
            .change_context(PipelineError::Sink)?;

        info!(%run_id, target = %target, written, "indicator run complete");
        Ok(written)
    }

    fn in_range(&self, time: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        time >= start && self.below_upper(time, end)
    }

    fn below_upper(&self, time: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        match self.upper_bound {
            RangeBound::Inclusive => time <= end,
            RangeBound::Exclusive => time < end,
        }
    }
}

fn candle_values(candle: &Candle) -> Vec<Value> {
    vec![
        Value::Text(candle.time.to_rfc3339()),
        Value::Text(candle.pair.clone()),
        Value::Real(candle.open),
        Value::Real(candle.high),
        Value::Real(candle.low),
        Value::Real(candle.close),
        Value::Real(candle.volume),
        Value::Integer(candle.trade_count),
    ]
}

fn indicator_values(row: &IndicatorRow) -> Vec<Value> {
    let mut values = candle_values(&row.candle);
    values.extend([
        Value::Real(row.ema_fast),
        Value::Real(row.ema_slow),
        optional(row.stoch_k),
        optional(row.stoch_d),
        Value::Real(row.macd),
        Value::Real(row.macd_signal),
        Value::Real(row.macd_hist),
    ]);
    values
}

fn optional(value: Option<f64>) -> Value {
    match value {
        Some(v) => Value::Real(v),
        None => Value::Null,
    }
}
