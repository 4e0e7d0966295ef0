use super::moving_average::ensure_finite;
use crate::error::EngineError;

/// Calculate the Relative Strength Index (RSI) series
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// The window is counted in closes: the first value averages the gains and
/// losses between the first `period` prices, and later values use Wilder
/// smoothing. The output has `prices.len() - period + 1` values and
/// `series[k]` belongs to `prices[k + period - 1]`. A window with no price
/// movement at all reads 50.
///
/// The seed therefore averages `period - 1` changes, one fewer than the
/// textbook Wilder RSI, so values differ slightly from charting packages
/// until the smoothing washes the seed out.
pub fn calculate_rsi_series(prices: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    if period < 2 {
        return Err(EngineError::InvalidPeriod {
            name: "RSI",
            value: period,
        });
    }
    ensure_finite(prices)?;

    if prices.len() < period {
        return Ok(Vec::new());
    }

    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);

    // Calculate price changes
    for i in 1..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let seed = period - 1;
    let mut avg_gain = gains[..seed].iter().sum::<f64>() / seed as f64;
    let mut avg_loss = losses[..seed].iter().sum::<f64>() / seed as f64;

    let mut series = Vec::with_capacity(prices.len() - period + 1);
    series.push(rsi_from_averages(avg_gain, avg_loss));

    let smoothing = period as f64;
    for (gain, loss) in gains[seed..].iter().zip(&losses[seed..]) {
        avg_gain = (avg_gain * (smoothing - 1.0) + gain) / smoothing;
        avg_loss = (avg_loss * (smoothing - 1.0) + loss) / smoothing;
        series.push(rsi_from_averages(avg_gain, avg_loss));
    }

    Ok(series)
}

/// Latest RSI value
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    calculate_rsi_series(prices, period).ok()?.last().copied()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return 50.0;
        }
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_calculation() {
        // Test with known values
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5,
        ];

        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi.is_some());

        let rsi_value = rsi.unwrap();
        assert!(rsi_value > 0.0 && rsi_value < 100.0);
    }

    #[test]
    fn test_rsi_hand_computed() {
        // Seed: +1, +1 -> gain 1, loss 0 -> 100
        // Next: -1 -> gain (1*2 + 0)/3, loss (0*2 + 1)/3 -> RS 2 -> 66.67
        let series = calculate_rsi_series(&[1.0, 2.0, 3.0, 2.0], 3).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0], 100.0);
        assert!((series[1] - (100.0 - 100.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![100.0, 102.0, 101.0];
        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi.is_none());
    }

    #[test]
    fn test_rsi_all_gains() {
        let prices = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let rsi = calculate_rsi(&prices, 5);
        assert!(rsi.is_some());
        assert_eq!(rsi.unwrap(), 100.0); // All gains = RSI 100
    }

    #[test]
    fn test_rsi_flat_prices_are_neutral() {
        let series = calculate_rsi_series(&[100.0; 30], 14).unwrap();
        assert_eq!(series.len(), 17);
        assert!(series.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_rsi_all_losses() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi_series(&prices, 14).unwrap();
        assert!(series.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rsi_rejects_degenerate_period() {
        assert!(calculate_rsi_series(&[1.0, 2.0, 3.0], 1).is_err());
        assert!(calculate_rsi_series(&[1.0, 2.0, 3.0], 0).is_err());
    }
}
