use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use error_stack::{Report, bail};

use crate::error::AggregateError;
use crate::model::{Candle, TimeFrame};
use crate::series::Series;

/// Buckets a higher-frequency series into lower-frequency bars.
///
/// Bucket boundaries are wall-clock boundaries in a single configured fixed
/// offset, so daily buckets align with that zone's midnight regardless of
/// the UTC timestamps on the input. Per bucket: open = first bar's open,
/// close = last bar's close, high = max, low = min, volume and trade count
/// are summed. Buckets with no input candles are omitted.
pub struct BucketAggregator {
    width: Duration,
    offset: FixedOffset,
}

impl BucketAggregator {
    /// Fails when `target` is not a positive multiple of `source`.
    pub fn new(
        source: TimeFrame,
        target: TimeFrame,
        offset: FixedOffset,
    ) -> Result<Self, Report<AggregateError>> {
        let source_secs = source.duration().num_seconds();
        let target_secs = target.duration().num_seconds();
        if target_secs < source_secs || target_secs % source_secs != 0 {
            bail!(AggregateError::InvalidBucketWidth {
                source_secs,
                target_secs,
            });
        }
        Ok(Self {
            width: target.duration(),
            offset,
        })
    }

    /// One aggregate candle per non-empty bucket, ascending by bucket start.
    pub fn aggregate(&self, series: &Series) -> Vec<Candle> {
        let mut buckets: BTreeMap<DateTime<Utc>, Vec<&Candle>> = BTreeMap::new();
        for candle in series.candles() {
            buckets
                .entry(self.bucket_start(candle.time))
                .or_default()
                .push(candle);
        }

        buckets
            .into_iter()
            .map(|(start, members)| {
                // Series order is ascending, so first/last by position is
                // first/last by time.
                let first = members[0];
                let last = members[members.len() - 1];
                Candle {
                    time: start,
                    pair: first.pair.clone(),
                    open: first.open,
                    high: members.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
                    low: members.iter().map(|c| c.low).fold(f64::INFINITY, f64::min),
                    close: last.close,
                    volume: members.iter().map(|c| c.volume).sum(),
                    trade_count: members.iter().map(|c| c.trade_count).sum(),
                }
            })
            .collect()
    }

    /// Instant at which the bucket containing `time` begins: floor the
    /// wall-clock time in the configured offset to the bucket width.
    fn bucket_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let time = time - Duration::nanoseconds(i64::from(time.timestamp_subsec_nanos()));
        let local_secs = time.timestamp() + i64::from(self.offset.local_minus_utc());
        let remainder = local_secs.rem_euclid(self.width.num_seconds());
        time - Duration::seconds(remainder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn jakarta() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn hourly(hour_utc: u32, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2025, 6, 1, hour_utc, 0, 0).unwrap(),
            pair: "BTC-USD".into(),
            open,
            high,
            low,
            close,
            volume,
            trade_count: 10,
        }
    }

    #[test]
    fn rejects_width_smaller_than_source() {
        assert!(BucketAggregator::new(TimeFrame::Day1, TimeFrame::Hour1, jakarta()).is_err());
    }

    #[test]
    fn two_hourly_bars_fold_into_one_day() {
        let aggregator =
            BucketAggregator::new(TimeFrame::Hour1, TimeFrame::Day1, jakarta()).unwrap();
        let series = Series::new(vec![
            hourly(0, 10.0, 12.0, 9.0, 11.0, 100.0),
            hourly(1, 11.0, 13.0, 10.0, 12.0, 150.0),
        ])
        .unwrap();

        let out = aggregator.aggregate(&series);
        assert_eq!(out.len(), 1);
        let bar = &out[0];
        assert_eq!(bar.open, 10.0);
        assert_eq!(bar.high, 13.0);
        assert_eq!(bar.low, 9.0);
        assert_eq!(bar.close, 12.0);
        assert_eq!(bar.volume, 250.0);
        assert_eq!(bar.trade_count, 20);
    }

    #[test]
    fn buckets_split_at_local_midnight() {
        // 16:00 UTC is 23:00 in UTC+7; 18:00 UTC is 01:00 the next local day.
        let aggregator =
            BucketAggregator::new(TimeFrame::Hour1, TimeFrame::Day1, jakarta()).unwrap();
        let series = Series::new(vec![
            hourly(16, 1.0, 1.0, 1.0, 1.0, 1.0),
            hourly(18, 2.0, 2.0, 2.0, 2.0, 1.0),
        ])
        .unwrap();

        let out = aggregator.aggregate(&series);
        assert_eq!(out.len(), 2);
        // Bucket starts are the UTC instants of local midnight (17:00 UTC
        // on the previous day for UTC+7).
        assert_eq!(out[0].time.hour(), 17);
        assert_eq!(out[1].time.hour(), 17);
        assert_eq!(out[1].time - out[0].time, Duration::days(1));
    }

    #[test]
    fn empty_buckets_are_omitted() {
        let aggregator =
            BucketAggregator::new(TimeFrame::Hour1, TimeFrame::Hour4, jakarta()).unwrap();
        // Bars at 00:00 and 12:00 UTC leave two empty 4h buckets between.
        let series = Series::new(vec![
            hourly(0, 1.0, 1.0, 1.0, 1.0, 1.0),
            hourly(12, 2.0, 2.0, 2.0, 2.0, 1.0),
        ])
        .unwrap();
        assert_eq!(aggregator.aggregate(&series).len(), 2);
    }

    #[test]
    fn same_width_aggregation_is_identity_shaped() {
        let aggregator =
            BucketAggregator::new(TimeFrame::Hour1, TimeFrame::Hour1, jakarta()).unwrap();
        let series = Series::new(vec![hourly(3, 5.0, 6.0, 4.0, 5.5, 42.0)]).unwrap();
        let out = aggregator.aggregate(&series);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].close, 5.5);
        assert_eq!(out[0].volume, 42.0);
    }
}
