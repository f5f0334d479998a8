use crate::indicator::ema::rolling_mean;
use crate::model::Candle;

/// Raw %K over a `k`-bar lookback, as a 0-1 fraction.
///
/// `%K_raw[i] = (close[i] - min(low, k)) / (max(high, k) - min(low, k))`.
/// `None` until the lookback fills and whenever the rolling high-low range
/// is zero (the ratio is undefined, not a divide-by-zero crash).
pub fn percent_k_raw(candles: &[Candle], k: usize) -> Vec<Option<f64>> {
    debug_assert!(k > 0, "lookback validated at engine construction");
    candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            if i + 1 < k {
                return None;
            }
            let window = &candles[i + 1 - k..=i];
            let lowest = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
            let highest = window
                .iter()
                .map(|c| c.high)
                .fold(f64::NEG_INFINITY, f64::max);
            let range = highest - lowest;
            if range == 0.0 {
                return None;
            }
            Some((candle.close - lowest) / range)
        })
        .collect()
}

/// Full stochastic oscillator: smoothed %K and its %D signal.
///
/// `%K = SMA(%K_raw, smoothing)`, `%D = SMA(%K, d)`. The first
/// `k + smoothing - 2` rows of %K are `None` (insufficient history), and %D
/// trails by a further `d - 1` rows.
pub fn stochastic(
    candles: &[Candle],
    k: usize,
    smoothing: usize,
    d: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let raw = percent_k_raw(candles, k);
    let percent_k = rolling_mean(&raw, smoothing);
    let percent_d = rolling_mean(&percent_k, d);
    (percent_k, percent_d)
}
