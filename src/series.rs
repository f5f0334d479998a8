use error_stack::{Report, bail};

use crate::error::SeriesError;
use crate::model::Candle;

/// An ordered, gap-tolerant candle sequence for one pair.
///
/// Construction guarantees the sequence is non-empty and strictly increasing
/// by time, so consumers (the aggregator and the indicator engine) never see
/// an unsorted or duplicated series.
#[derive(Debug, Clone)]
pub struct Series {
    candles: Vec<Candle>,
}

impl Series {
    /// Validate an already-ordered candle sequence.
    ///
    /// Fails when the input is empty or not strictly increasing by time.
    /// Unsorted input is a caller bug, not a recoverable condition.
    pub fn new(candles: Vec<Candle>) -> Result<Self, Report<SeriesError>> {
        if candles.is_empty() {
            bail!(SeriesError::Empty);
        }
        for (index, pair) in candles.windows(2).enumerate() {
            if pair[1].time <= pair[0].time {
                bail!(SeriesError::Unsorted { index: index + 1 });
            }
        }
        Ok(Self { candles })
    }

    /// Sort and dedupe raw rows into a series.
    ///
    /// Duplicates on `(time, pair)` keep the first row read; sources are
    /// unique-keyed tables, so duplicates only arise from caller-merged
    /// inputs where order is the caller's contract.
    pub fn from_rows(mut rows: Vec<Candle>) -> Result<Self, Report<SeriesError>> {
        rows.sort_by_key(|c| c.time);
        rows.dedup_by(|later, earlier| later.time == earlier.time && later.pair == earlier.pair);
        Self::new(rows)
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(minute: i64, close: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Candle {
            time: base + Duration::minutes(minute),
            pair: "BTC-USD".into(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            trade_count: 1,
        }
    }

    #[test]
    fn empty_input_rejected() {
        assert!(Series::new(vec![]).is_err());
    }

    #[test]
    fn unsorted_input_rejected() {
        let result = Series::new(vec![candle(1, 1.0), candle(0, 2.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_timestamps_rejected_by_new() {
        let result = Series::new(vec![candle(0, 1.0), candle(0, 2.0)]);
        assert!(result.is_err());
    }

    #[test]
    fn from_rows_sorts_ascending() {
        let series = Series::from_rows(vec![candle(2, 3.0), candle(0, 1.0), candle(1, 2.0)])
            .unwrap();
        let closes: Vec<f64> = series.candles().iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn from_rows_dedupes_keeping_first() {
        let series =
            Series::from_rows(vec![candle(0, 1.0), candle(0, 9.0), candle(1, 2.0)]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.candles()[0].close, 1.0);
    }
}
