use std::sync::Arc;
use uuid::Uuid;

use crate::execution::ledger::{ClosePositionResult, PositionLedger};
use crate::models::{PositionSide, RiskParams, Signal, SignalAction};

/// Minimum BUY confidence to open a live position
pub const LIVE_ENTRY_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Open,
    Close { position_ids: Vec<Uuid> },
    /// Qualifying BUY while the symbol already holds a position
    AlreadyOpen,
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

/// What the executor did with a signal
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub action_taken: String,
    pub opened: Option<Uuid>,
    pub closed: Vec<ClosePositionResult>,
}

/// Applies live decision rules for one symbol against the paper ledger
pub struct Executor {
    ledger: Arc<PositionLedger>,
    risk: RiskParams,
    symbol: String,
}

impl Executor {
    pub fn new(ledger: Arc<PositionLedger>, risk: RiskParams, symbol: impl Into<String>) -> Self {
        Self {
            ledger,
            risk,
            symbol: symbol.into(),
        }
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    /// Decide what to do with a signal
    pub fn process_signal(&self, signal: &Signal) -> ExecutionDecision {
        match signal.action {
            SignalAction::Buy if signal.confidence > LIVE_ENTRY_CONFIDENCE => {
                if self.ledger.get_open_positions(Some(&self.symbol)).is_empty() {
                    ExecutionDecision {
                        action: ExecutionAction::Open,
                        reason: format!("Buy signal with {:.2} confidence", signal.confidence),
                    }
                } else {
                    ExecutionDecision {
                        action: ExecutionAction::AlreadyOpen,
                        reason: "Position already open, skipping".to_string(),
                    }
                }
            }

            SignalAction::Buy => ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: format!(
                    "Buy signal confidence {:.2} below {:.2}",
                    signal.confidence, LIVE_ENTRY_CONFIDENCE
                ),
            },

            SignalAction::Sell => {
                let position_ids: Vec<Uuid> = self
                    .ledger
                    .get_open_positions(Some(&self.symbol))
                    .into_iter()
                    .filter(|p| p.side == PositionSide::Long)
                    .map(|p| p.id)
                    .collect();

                if position_ids.is_empty() {
                    ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: "No LONG position to close".to_string(),
                    }
                } else {
                    ExecutionDecision {
                        reason: format!("Sell signal closes {} LONG position(s)", position_ids.len()),
                        action: ExecutionAction::Close { position_ids },
                    }
                }
            }

            SignalAction::Hold => ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: "Hold signal".to_string(),
            },
        }
    }

    /// Decide and apply the decision to the ledger
    pub fn execute(&self, signal: &Signal, current_price: f64) -> ExecutionOutcome {
        let decision = self.process_signal(signal);
        tracing::debug!("Execution decision: {:?} ({})", decision.action, decision.reason);

        match decision.action {
            ExecutionAction::Open => {
                let result = self.ledger.open_position(signal, &self.risk, &self.symbol);
                if result.success {
                    ExecutionOutcome {
                        action_taken: format!("Opened LONG position: {}", result.message),
                        opened: result.position_id,
                        closed: Vec::new(),
                    }
                } else {
                    ExecutionOutcome {
                        action_taken: format!("Failed to open position: {}", result.message),
                        ..Default::default()
                    }
                }
            }

            ExecutionAction::Close { position_ids } => {
                let closed: Vec<ClosePositionResult> = position_ids
                    .into_iter()
                    .map(|id| self.ledger.close_position(id, current_price, "Signal reversal"))
                    .filter(|r| r.success)
                    .collect();

                let action_taken = match closed.last() {
                    Some(last) => format!("Closed LONG position: {}", last.message),
                    None => "No action".to_string(),
                };

                ExecutionOutcome {
                    action_taken,
                    opened: None,
                    closed,
                }
            }

            ExecutionAction::AlreadyOpen => ExecutionOutcome {
                action_taken: decision.reason,
                ..Default::default()
            },

            ExecutionAction::Skip => ExecutionOutcome {
                action_taken: "No action".to_string(),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndicatorSnapshot;

    fn signal(action: SignalAction, confidence: f64, price: f64) -> Signal {
        Signal {
            action,
            confidence,
            price,
            indicators: IndicatorSnapshot::default(),
            reasoning: vec![],
        }
    }

    fn executor() -> Executor {
        Executor::new(
            Arc::new(PositionLedger::new(10000.0)),
            RiskParams::default(),
            "ETH/USDT",
        )
    }

    #[test]
    fn test_execute_buy_when_valid() {
        let executor = executor();
        let decision = executor.process_signal(&signal(SignalAction::Buy, 0.7, 2000.0));
        assert_eq!(decision.action, ExecutionAction::Open);

        let outcome = executor.execute(&signal(SignalAction::Buy, 0.7, 2000.0), 2000.0);
        assert!(outcome.opened.is_some());
        assert!(outcome.action_taken.starts_with("Opened LONG position"));
        assert_eq!(executor.ledger().get_open_positions(None).len(), 1);
    }

    #[test]
    fn test_skip_low_confidence_buy() {
        let executor = executor();
        let outcome = executor.execute(&signal(SignalAction::Buy, 0.6, 2000.0), 2000.0);
        assert_eq!(outcome.action_taken, "No action");
        assert!(executor.ledger().get_open_positions(None).is_empty());
    }

    #[test]
    fn test_skip_buy_when_already_positioned() {
        let executor = executor();
        executor.execute(&signal(SignalAction::Buy, 0.9, 2000.0), 2000.0);

        let decision = executor.process_signal(&signal(SignalAction::Buy, 0.9, 2010.0));
        assert_eq!(decision.action, ExecutionAction::AlreadyOpen);

        let outcome = executor.execute(&signal(SignalAction::Buy, 0.9, 2010.0), 2010.0);
        assert_eq!(outcome.action_taken, "Position already open, skipping");
    }

    #[test]
    fn test_weak_buy_while_positioned_is_no_action() {
        let executor = executor();
        executor.execute(&signal(SignalAction::Buy, 0.9, 2000.0), 2000.0);

        let decision = executor.process_signal(&signal(SignalAction::Buy, 0.5, 2010.0));
        assert_eq!(decision.action, ExecutionAction::Skip);
        assert_eq!(
            executor
                .execute(&signal(SignalAction::Buy, 0.5, 2010.0), 2010.0)
                .action_taken,
            "No action"
        );
    }

    #[test]
    fn test_sell_closes_long_regardless_of_confidence() {
        let executor = executor();
        executor.execute(&signal(SignalAction::Buy, 0.9, 2000.0), 2000.0);

        let outcome = executor.execute(&signal(SignalAction::Sell, 0.1, 2010.0), 2010.0);
        assert_eq!(outcome.closed.len(), 1);
        assert!(outcome.action_taken.starts_with("Closed LONG position"));

        let trade = executor
            .ledger()
            .get_trade(outcome.closed[0].trade_id.unwrap())
            .unwrap();
        assert_eq!(trade.notes, "Signal reversal");
        assert!(trade.pnl > 0.0);
        assert!(executor.ledger().get_open_positions(None).is_empty());
    }

    #[test]
    fn test_skip_sell_when_no_position() {
        let executor = executor();
        let decision = executor.process_signal(&signal(SignalAction::Sell, 0.9, 2000.0));
        assert_eq!(decision.action, ExecutionAction::Skip);
        assert_eq!(
            executor
                .execute(&signal(SignalAction::Sell, 0.9, 2000.0), 2000.0)
                .action_taken,
            "No action"
        );
    }

    #[test]
    fn test_hold_signal_skips() {
        let executor = executor();
        let decision = executor.process_signal(&signal(SignalAction::Hold, 0.3, 2000.0));
        assert_eq!(decision.action, ExecutionAction::Skip);
        assert_eq!(decision.reason, "Hold signal");
    }
}
