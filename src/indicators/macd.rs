use super::moving_average::calculate_ema_series;
use crate::error::EngineError;

/// One MACD reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Calculate the Moving Average Convergence Divergence (MACD) series
///
/// MACD line = EMA(fast) - EMA(slow), signal line = EMA(signal) of the MACD
/// line, histogram = MACD - signal. A point is only produced once the signal
/// line exists, so the output has `prices.len() - (slow + signal - 1) + 1`
/// values and `series[k]` belongs to `prices[k + slow + signal - 2]`.
pub fn calculate_macd_series(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<Vec<MacdPoint>, EngineError> {
    if fast == 0 || fast >= slow {
        return Err(EngineError::InvalidPeriod {
            name: "MACD fast",
            value: fast,
        });
    }
    if signal == 0 {
        return Err(EngineError::InvalidPeriod {
            name: "MACD signal",
            value: signal,
        });
    }

    let fast_ema = calculate_ema_series(prices, fast)?;
    let slow_ema = calculate_ema_series(prices, slow)?;

    if slow_ema.is_empty() {
        return Ok(Vec::new());
    }

    // fast_ema starts (slow - fast) prices earlier than slow_ema
    let offset = slow - fast;
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(k, slow_value)| fast_ema[k + offset] - slow_value)
        .collect();

    let signal_line = calculate_ema_series(&macd_line, signal)?;
    let signal_offset = signal - 1;

    Ok(signal_line
        .iter()
        .enumerate()
        .map(|(j, &signal_value)| {
            let macd = macd_line[j + signal_offset];
            MacdPoint {
                macd,
                signal: signal_value,
                histogram: macd - signal_value,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macd_length() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let series = calculate_macd_series(&prices, 12, 26, 9).unwrap();
        assert_eq!(series.len(), 60 - (26 + 9 - 1) + 1);
    }

    #[test]
    fn test_macd_flat_prices_are_zero() {
        let series = calculate_macd_series(&[50.0; 40], 12, 26, 9).unwrap();
        assert!(!series.is_empty());
        for point in series {
            assert_eq!(point.macd, 0.0);
            assert_eq!(point.signal, 0.0);
            assert_eq!(point.histogram, 0.0);
        }
    }

    #[test]
    fn test_macd_matches_ema_difference() {
        let prices: Vec<f64> = (0..50).map(|i| 10.0 + (i * i) as f64 * 0.01).collect();
        let series = calculate_macd_series(&prices, 3, 6, 4).unwrap();

        // Last point vs. directly computed EMAs
        let fast = calculate_ema_series(&prices, 3).unwrap();
        let slow = calculate_ema_series(&prices, 6).unwrap();
        let last = series.last().unwrap();
        assert!((last.macd - (fast.last().unwrap() - slow.last().unwrap())).abs() < 1e-9);
        assert!((last.histogram - (last.macd - last.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_rising_prices_positive() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = calculate_macd_series(&prices, 12, 26, 9).unwrap();
        assert!(series.iter().all(|p| p.macd > 0.0));
    }

    #[test]
    fn test_macd_rejects_inverted_periods() {
        assert!(calculate_macd_series(&[1.0; 50], 26, 12, 9).is_err());
        assert!(calculate_macd_series(&[1.0; 50], 12, 12, 9).is_err());
        assert!(calculate_macd_series(&[1.0; 50], 12, 26, 0).is_err());
    }

    #[test]
    fn test_macd_insufficient_data() {
        let series = calculate_macd_series(&[1.0; 20], 12, 26, 9).unwrap();
        assert!(series.is_empty());

        // Enough for the MACD line but not the signal line
        let series = calculate_macd_series(&[1.0; 30], 12, 26, 9).unwrap();
        assert!(series.is_empty());
    }
}
