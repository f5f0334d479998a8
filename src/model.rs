use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Candle bar width supported by the pipeline.
///
/// String representations match the config file format (e.g. `"1h"`, `"1d"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    Min1,
    Min5,
    Min15,
    Hour1,
    Hour4,
    Day1,
}

impl TimeFrame {
    /// Parse a config-format string into a `TimeFrame`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
        }
    }

    /// Wall-clock width of one bar at this timeframe.
    pub fn duration(self) -> Duration {
        match self {
            Self::Min1 => Duration::minutes(1),
            Self::Min5 => Duration::minutes(5),
            Self::Min15 => Duration::minutes(15),
            Self::Hour1 => Duration::hours(1),
            Self::Hour4 => Duration::hours(4),
            Self::Day1 => Duration::days(1),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A `schema.table` identifier as used by the layered tables
/// (`bronze.ohlc`, `silver.ohlc_daily`, `gold.ohlc_ta`).
///
/// SQLite has no schemas, so the physical table name is `{schema}_{table}`.
/// Both parts are restricted to `[a-z0-9_]`, which keeps the dynamically
/// composed upsert SQL safe to build by string formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: String,
    table: String,
}

impl TableRef {
    /// Parse a `schema.table` string. Returns `None` when the format or the
    /// identifier characters are invalid.
    pub fn parse(s: &str) -> Option<Self> {
        let (schema, table) = s.split_once('.')?;
        if !valid_identifier(schema) || !valid_identifier(table) {
            return None;
        }
        Some(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    /// Physical table name in the SQLite database.
    pub fn physical(&self) -> String {
        format!("{}_{}", self.schema, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// One OHLC bar for a trading pair.
///
/// Invariants expected from well-formed sources: `low <= open/close <= high`,
/// `volume >= 0`, `trade_count >= 0`. `(time, pair)` is the natural key in
/// every table that stores candles.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub pair: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub trade_count: i64,
}

/// A source candle enriched with derived indicator fields.
///
/// EMA and MACD values are defined for every row because the EMA recurrence
/// seeds from the first close. The stochastic fields stay `None` until the
/// lookback and smoothing windows are filled, and whenever the rolling
/// high-low range is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub candle: Candle,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
}
