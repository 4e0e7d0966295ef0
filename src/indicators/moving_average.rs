use crate::error::EngineError;

/// Calculate Simple Moving Average (SMA) of the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate the full Exponential Moving Average (EMA) series
///
/// The first value is the SMA of the first `period` prices, so the output
/// has `prices.len() - period + 1` values and `series[k]` belongs to
/// `prices[k + period - 1]`. Returns an empty series when there are fewer
/// than `period` prices.
pub fn calculate_ema_series(prices: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    if period == 0 {
        return Err(EngineError::InvalidPeriod {
            name: "EMA",
            value: period,
        });
    }
    ensure_finite(prices)?;

    if prices.len() < period {
        return Ok(Vec::new());
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Start with SMA
    let mut ema = prices[..period].iter().sum::<f64>() / period as f64;
    let mut series = Vec::with_capacity(prices.len() - period + 1);
    series.push(ema);

    for price in &prices[period..] {
        ema = (price - ema) * multiplier + ema;
        series.push(ema);
    }

    Ok(series)
}

/// Latest EMA value
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    calculate_ema_series(prices, period).ok()?.last().copied()
}

pub(crate) fn ensure_finite(prices: &[f64]) -> Result<(), EngineError> {
    match prices.iter().position(|p| !p.is_finite()) {
        Some(index) => Err(EngineError::InvalidInput(format!(
            "non-finite price at index {}",
            index
        ))),
        None => Ok(()),
    }
}
