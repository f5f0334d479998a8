pub mod ema;
pub mod macd;
pub mod stochastic;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::model::IndicatorRow;
use crate::series::Series;

/// Spans and windows for the derived fields of a gold-layer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stoch_k: usize,
    pub stoch_smoothing: usize,
    pub stoch_d: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 13,
            ema_slow: 21,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_k: 5,
            stoch_smoothing: 3,
            stoch_d: 3,
        }
    }
}

/// Computes EMA, stochastic and MACD columns over an ordered series.
///
/// A pure function of its input: the same series always produces the same
/// rows. Series construction already enforces the ordered, non-empty
/// precondition, so `compute` itself cannot fail.
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Result<Self, Report<IndicatorError>> {
        let periods = [
            ("ema_fast", params.ema_fast),
            ("ema_slow", params.ema_slow),
            ("macd_fast", params.macd_fast),
            ("macd_slow", params.macd_slow),
            ("macd_signal", params.macd_signal),
            ("stoch_k", params.stoch_k),
            ("stoch_smoothing", params.stoch_smoothing),
            ("stoch_d", params.stoch_d),
        ];
        for (name, period) in periods {
            if period == 0 {
                bail!(IndicatorError::InvalidParameter {
                    name: format!("{name} must be > 0"),
                });
            }
        }
        if params.macd_fast >= params.macd_slow {
            bail!(IndicatorError::InvalidParameter {
                name: "macd_fast must be < macd_slow".into(),
            });
        }
        Ok(Self { params })
    }

    /// Produce one `IndicatorRow` per input candle, positionally aligned.
    pub fn compute(&self, series: &Series) -> Vec<IndicatorRow> {
        let closes = series.closes();
        let candles = series.candles();

        let ema_fast = ema::ema(&closes, self.params.ema_fast);
        let ema_slow = ema::ema(&closes, self.params.ema_slow);

        let (stoch_k, stoch_d) = stochastic::stochastic(
            candles,
            self.params.stoch_k,
            self.params.stoch_smoothing,
            self.params.stoch_d,
        );

        let (macd, macd_signal, macd_hist) = macd::macd(
            &closes,
            self.params.macd_fast,
            self.params.macd_slow,
            self.params.macd_signal,
        );

        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| IndicatorRow {
                candle: candle.clone(),
                ema_fast: ema_fast[i],
                ema_slow: ema_slow[i],
                stoch_k: stoch_k[i],
                stoch_d: stoch_d[i],
                macd: macd[i],
                macd_signal: macd_signal[i],
                macd_hist: macd_hist[i],
            })
            .collect()
    }
}
