/// Exponential moving average with `alpha = 2 / (period + 1)`.
///
/// The recurrence seeds from the first value (`ema[0] = values[0]`) rather
/// than a simple-moving-average seed, matching the pandas
/// `ewm(span, adjust=False)` convention of the reference pipeline. Early
/// values are biased toward the single-point seed; callers that need an
/// unbiased warm-up must discard a leading prefix themselves.
///
/// Returns one value per input, so output is positionally aligned.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    debug_assert!(period > 0, "period validated at engine construction");
    if values.is_empty() {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut current = values[0];
    let mut out = Vec::with_capacity(values.len());
    out.push(current);

    for &value in &values[1..] {
        current = value * alpha + current * (1.0 - alpha);
        out.push(current);
    }

    out
}

/// Simple moving average over a fixed window of optional values.
///
/// The first `window - 1` outputs are `None`, as is any output whose window
/// contains a `None` input (pandas rolling-mean NaN propagation).
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    debug_assert!(window > 0, "window validated at engine construction");
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let mut sum = 0.0;
            for v in slice {
                sum += (*v)?;
            }
            Some(sum / window as f64)
        })
        .collect()
}
