pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::BacktestResult;
pub use runner::{run_backtest, BacktestRunner, WARMUP_CANDLES};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
