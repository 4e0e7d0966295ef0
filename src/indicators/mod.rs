// Technical indicators module
// Implements EMA, RSI and MACD series plus index alignment onto candles

pub mod engine;
pub mod macd;
pub mod moving_average;
pub mod rsi;

pub use engine::{latest_snapshot, IndicatorEngine};
pub use macd::{calculate_macd_series, MacdPoint};
pub use moving_average::{calculate_ema, calculate_ema_series, calculate_sma};
pub use rsi::{calculate_rsi, calculate_rsi_series};
