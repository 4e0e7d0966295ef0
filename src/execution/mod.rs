// Paper trading: position ledger, live decision rules and the trading cycle
pub mod cycle;
pub mod executor;
pub mod ledger;

pub use cycle::{record_closed, CycleReport, TradingCycle};
pub use executor::{ExecutionAction, ExecutionDecision, ExecutionOutcome, Executor};
pub use ledger::{ClosePositionResult, OpenPositionResult, PortfolioSummary, PositionLedger};
