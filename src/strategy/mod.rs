// Trading strategy module
pub mod signals;

pub use signals::SignalGenerator;

use crate::models::{Candle, Signal};

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from the candle history, priced at `current_price`
    ///
    /// Never fails: missing history or indicators resolve to a HOLD signal.
    fn generate_signal(&self, candles: &[Candle], current_price: f64) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
