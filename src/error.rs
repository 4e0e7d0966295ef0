use thiserror::Error;

/// Errors raised by the decision and simulation engine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Backtest invoked on an empty candle range
    #[error("No historical data found for the specified period")]
    NoData,

    #[error("Invalid {name} period: {value}")]
    InvalidPeriod { name: &'static str, value: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
