use crate::indicator::ema::ema;

/// MACD line, signal line and histogram, positionally aligned with input.
///
/// `macd = EMA(close, fast) - EMA(close, slow)`, `signal = EMA(macd,
/// signal_period)`, `hist = macd - signal`. All EMAs seed from their first
/// input, so every row carries a value; values before the slow EMA has
/// warmed up are numerically biased by the seed.
pub fn macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal = ema(&line, signal_period);

    let histogram: Vec<f64> = line
        .iter()
        .zip(signal.iter())
        .map(|(m, s)| m - s)
        .collect();

    (line, signal, histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_prices_give_zero_macd() {
        let (line, signal, histogram) = macd(&[10.0; 40], 12, 26, 9);
        for i in 0..40 {
            assert!(line[i].abs() < 1e-12);
            assert!(signal[i].abs() < 1e-12);
            assert!(histogram[i].abs() < 1e-12);
        }
    }

    #[test]
    fn histogram_is_exact_difference() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64).sin() * 5.0).collect();
        let (line, signal, histogram) = macd(&closes, 12, 26, 9);
        for i in 0..closes.len() {
            assert_eq!(histogram[i], line[i] - signal[i]);
        }
    }

    #[test]
    fn output_aligned_with_input() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let (line, signal, histogram) = macd(&closes, 12, 26, 9);
        assert_eq!(line.len(), 30);
        assert_eq!(signal.len(), 30);
        assert_eq!(histogram.len(), 30);
    }

    #[test]
    fn rising_prices_give_positive_macd() {
        let closes: Vec<f64> = (1..=60).map(|i| i as f64).collect();
        let (line, _, _) = macd(&closes, 12, 26, 9);
        // Fast EMA tracks a rising series more closely than the slow EMA.
        assert!(line.last().unwrap() > &0.0);
    }
}
