use super::macd::{calculate_macd_series, MacdPoint};
use super::moving_average::calculate_ema_series;
use super::rsi::calculate_rsi_series;
use crate::error::EngineError;
use crate::models::{Candle, IndicatorSnapshot, StrategyParams};

/// Computes index-aligned EMA/RSI/MACD snapshots from close prices
///
/// `snapshot[i]` only depends on `closes[0..=i]`. Each series is shorter than
/// the input by its warm-up, and is right-aligned back onto the full length
/// so the leading indices stay absent instead of being padded with zeros.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorEngine {
    params: StrategyParams,
}

impl IndicatorEngine {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Snapshots for every candle, using close prices
    pub fn calculate_for_candles(&self, candles: &[Candle]) -> Vec<IndicatorSnapshot> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.calculate(&closes)
    }

    /// Snapshots for every close price
    pub fn calculate(&self, closes: &[f64]) -> Vec<IndicatorSnapshot> {
        if closes.is_empty() {
            return Vec::new();
        }

        let p = &self.params;
        let len = closes.len();

        let ema_fast = align(
            &or_absent("EMA fast", calculate_ema_series(closes, p.ema_fast)),
            p.ema_fast,
            len,
        );
        let ema_slow = align(
            &or_absent("EMA slow", calculate_ema_series(closes, p.ema_slow)),
            p.ema_slow,
            len,
        );
        let rsi = align(
            &or_absent("RSI", calculate_rsi_series(closes, p.rsi_period)),
            p.rsi_period,
            len,
        );
        let macd = align(
            &or_absent(
                "MACD",
                calculate_macd_series(closes, p.macd_fast, p.macd_slow, p.macd_signal),
            ),
            self.macd_warmup(),
            len,
        );

        let snapshots: Vec<IndicatorSnapshot> = (0..len)
            .map(|i| {
                let macd_point: Option<MacdPoint> = macd[i];
                IndicatorSnapshot {
                    ema_fast: ema_fast[i],
                    ema_slow: ema_slow[i],
                    rsi: rsi[i],
                    macd_value: macd_point.map(|m| m.macd),
                    macd_signal: macd_point.map(|m| m.signal),
                    macd_histogram: macd_point.map(|m| m.histogram),
                }
            })
            .collect();

        tracing::debug!("Calculated indicators for {} candles", len);
        snapshots
    }

    /// Number of leading prices the MACD series consumes before its first value
    pub fn macd_warmup(&self) -> usize {
        self.params
            .macd_slow
            .saturating_add(self.params.macd_signal)
            .saturating_sub(1)
    }
}

/// Latest snapshot, if any
pub fn latest_snapshot(snapshots: &[IndicatorSnapshot]) -> Option<&IndicatorSnapshot> {
    snapshots.last()
}

/// A failed sub-calculation leaves its whole series absent
fn or_absent<T>(name: &str, result: Result<Vec<T>, EngineError>) -> Vec<T> {
    result.unwrap_or_else(|e| {
        tracing::warn!("Error calculating {}: {}", name, e);
        Vec::new()
    })
}

/// Right-align a series with warm-up `warmup` onto `len` indices:
/// `out[i] = series[i - (warmup - 1)]` when that index exists.
fn align<T: Copy>(series: &[T], warmup: usize, len: usize) -> Vec<Option<T>> {
    let lead = warmup.saturating_sub(1);
    (0..len)
        .map(|i| i.checked_sub(lead).and_then(|k| series.get(k).copied()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wavy_prices(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    fn leading_absent(values: impl Iterator<Item = Option<f64>>) -> usize {
        values.take_while(|v| v.is_none()).count()
    }

    #[test]
    fn test_empty_input() {
        let engine = IndicatorEngine::new(StrategyParams::default());
        assert!(engine.calculate(&[]).is_empty());
    }

    #[test]
    fn test_output_is_index_aligned() {
        let engine = IndicatorEngine::new(StrategyParams::default());
        let prices = wavy_prices(80);
        let snapshots = engine.calculate(&prices);
        assert_eq!(snapshots.len(), prices.len());
    }

    #[test]
    fn test_absent_prefix_lengths() {
        let params = StrategyParams::default();
        let engine = IndicatorEngine::new(params);
        let snapshots = engine.calculate(&wavy_prices(80));

        assert_eq!(
            leading_absent(snapshots.iter().map(|s| s.ema_fast)),
            params.ema_fast - 1
        );
        assert_eq!(
            leading_absent(snapshots.iter().map(|s| s.ema_slow)),
            params.ema_slow - 1
        );
        assert_eq!(
            leading_absent(snapshots.iter().map(|s| s.rsi)),
            params.rsi_period - 1
        );
        let macd_prefix = params.macd_slow + params.macd_signal - 2;
        assert_eq!(
            leading_absent(snapshots.iter().map(|s| s.macd_value)),
            macd_prefix
        );
        assert_eq!(
            leading_absent(snapshots.iter().map(|s| s.macd_signal)),
            macd_prefix
        );
        assert_eq!(
            leading_absent(snapshots.iter().map(|s| s.macd_histogram)),
            macd_prefix
        );

        // Present everywhere after the prefix
        assert!(snapshots[macd_prefix..].iter().all(|s| s.is_complete()));
    }

    #[test]
    fn test_aligned_values_match_series() {
        let params = StrategyParams::default();
        let engine = IndicatorEngine::new(params);
        let prices = wavy_prices(70);
        let snapshots = engine.calculate(&prices);

        let ema_fast = calculate_ema_series(&prices, params.ema_fast).unwrap();
        let rsi = calculate_rsi_series(&prices, params.rsi_period).unwrap();
        let macd = calculate_macd_series(
            &prices,
            params.macd_fast,
            params.macd_slow,
            params.macd_signal,
        )
        .unwrap();

        for i in 0..prices.len() {
            if i + 1 >= params.ema_fast {
                let expected = ema_fast[i + 1 - params.ema_fast];
                assert!((snapshots[i].ema_fast.unwrap() - expected).abs() < 1e-9);
            }
            if i + 1 >= params.rsi_period {
                let expected = rsi[i + 1 - params.rsi_period];
                assert!((snapshots[i].rsi.unwrap() - expected).abs() < 1e-9);
            }
            if i + 1 >= engine.macd_warmup() {
                let expected = macd[i + 1 - engine.macd_warmup()];
                assert!((snapshots[i].macd_histogram.unwrap() - expected.histogram).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_no_look_ahead() {
        let engine = IndicatorEngine::new(StrategyParams::default());
        let prices = wavy_prices(90);
        let full = engine.calculate(&prices);

        for end in [1, 13, 14, 26, 34, 35, 60, 89] {
            let prefix = engine.calculate(&prices[..end]);
            let last = prefix.last().unwrap();
            let expected = &full[end - 1];

            for (a, b) in [
                (last.ema_fast, expected.ema_fast),
                (last.ema_slow, expected.ema_slow),
                (last.rsi, expected.rsi),
                (last.macd_value, expected.macd_value),
                (last.macd_signal, expected.macd_signal),
                (last.macd_histogram, expected.macd_histogram),
            ] {
                match (a, b) {
                    (Some(x), Some(y)) => assert!((x - y).abs() < 1e-9),
                    (None, None) => {}
                    _ => panic!("presence differs at prefix length {}", end),
                }
            }
        }
    }

    #[test]
    fn test_failed_series_is_absent() {
        let params = StrategyParams {
            rsi_period: 1, // degenerate
            macd_fast: 30, // inverted against macd_slow
            ..StrategyParams::default()
        };
        let engine = IndicatorEngine::new(params);
        let snapshots = engine.calculate(&wavy_prices(60));

        assert!(snapshots.iter().all(|s| s.rsi.is_none()));
        assert!(snapshots.iter().all(|s| s.macd_histogram.is_none()));
        assert!(snapshots.last().unwrap().ema_slow.is_some());
    }

    #[test]
    fn test_zero_periods_do_not_panic() {
        let params = StrategyParams {
            ema_fast: 0,
            rsi_period: 0,
            macd_fast: 0,
            macd_slow: 0,
            macd_signal: 0,
            ..StrategyParams::default()
        };
        let engine = IndicatorEngine::new(params);
        assert_eq!(engine.macd_warmup(), 0);

        let snapshots = engine.calculate(&[1.0, 2.0, 3.0]);
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots
            .iter()
            .all(|s| s.ema_fast.is_none() && s.rsi.is_none() && s.macd_histogram.is_none()));
    }

    #[test]
    fn test_short_input_is_all_absent() {
        let engine = IndicatorEngine::new(StrategyParams::default());
        let snapshots = engine.calculate(&[100.0, 101.0, 102.0]);
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots.iter().all(|s| *s == IndicatorSnapshot::default()));
    }

    #[test]
    fn test_align_offsets() {
        let aligned = align(&[10, 11, 12], 3, 5);
        assert_eq!(aligned, vec![None, None, Some(10), Some(11), Some(12)]);

        let aligned = align(&[7], 1, 2);
        assert_eq!(aligned, vec![Some(7), None]);
    }
}
