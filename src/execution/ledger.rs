use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::models::{Position, PositionSide, RiskParams, Signal, SignalAction, Trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPositionResult {
    pub success: bool,
    pub position_id: Option<Uuid>,
    pub message: String,
}

impl OpenPositionResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            position_id: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosePositionResult {
    pub success: bool,
    pub position_id: Option<Uuid>,
    pub trade_id: Option<Uuid>,
    pub pnl: Option<f64>,
    pub pnl_pct: Option<f64>,
    pub message: String,
}

impl ClosePositionResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            position_id: None,
            trade_id: None,
            pnl: None,
            pnl_pct: None,
            message: message.into(),
        }
    }
}

/// Realized performance of live (non-backtest) trading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub open_positions: usize,
    /// Initial capital plus realized P&L minus capital reserved by open positions
    pub capital: f64,
}

#[derive(Debug, Default)]
struct LedgerBook {
    positions: Vec<Position>,
    trades: Vec<Trade>,
}

impl LedgerBook {
    fn open_for(&self, symbol: &str) -> Option<&Position> {
        self.positions
            .iter()
            .find(|p| p.is_open && p.symbol == symbol)
    }

    fn reserved_capital(&self) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.is_open)
            .map(Position::cost_basis)
            .sum()
    }

    fn close(
        &mut self,
        position_id: Uuid,
        current_price: f64,
        reason: &str,
        timestamp: DateTime<Utc>,
    ) -> ClosePositionResult {
        let Some(position) = self
            .positions
            .iter_mut()
            .find(|p| p.id == position_id && p.is_open)
        else {
            return ClosePositionResult::failed("Position not found or already closed");
        };

        let trade = Trade::close(position, current_price, timestamp, reason, false);
        position.is_open = false;

        tracing::info!(
            "Closed {} position {}: P&L ${:.2} ({:.2}%) - {}",
            trade.side,
            position_id,
            trade.pnl,
            trade.pnl_pct,
            reason
        );

        let result = ClosePositionResult {
            success: true,
            position_id: Some(position_id),
            trade_id: Some(trade.id),
            pnl: Some(trade.pnl),
            pnl_pct: Some(trade.pnl_pct),
            message: format!(
                "Position closed. PnL: ${:.2} ({:.2}%)",
                trade.pnl, trade.pnl_pct
            ),
        };
        self.trades.push(trade);
        result
    }
}

/// Paper broker holding live positions and closed trades against a capital pool
///
/// Every operation runs under one lock, so the check for an existing open
/// position and the insert of a new one cannot interleave with another caller.
/// At most one position per symbol is ever open.
#[derive(Debug)]
pub struct PositionLedger {
    initial_capital: f64,
    book: Mutex<LedgerBook>,
}

impl PositionLedger {
    pub fn new(initial_capital: f64) -> Self {
        Self::with_history(initial_capital, Vec::new(), Vec::new())
    }

    /// Restore a ledger from persisted positions and trades
    pub fn with_history(initial_capital: f64, positions: Vec<Position>, trades: Vec<Trade>) -> Self {
        tracing::info!(
            "Restored ledger: {} positions ({} open), {} trades",
            positions.len(),
            positions.iter().filter(|p| p.is_open).count(),
            trades.len()
        );

        Self {
            initial_capital,
            book: Mutex::new(LedgerBook { positions, trades }),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    fn book(&self) -> MutexGuard<'_, LedgerBook> {
        // Book state is only mutated after all checks pass, so a poisoned lock is still consistent
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a position from a BUY (LONG) or SELL (SHORT) signal at the signal's price
    pub fn open_position(&self, signal: &Signal, risk: &RiskParams, symbol: &str) -> OpenPositionResult {
        self.open_position_at(signal, risk, symbol, Utc::now())
    }

    /// Open a position with explicit timestamp
    pub fn open_position_at(
        &self,
        signal: &Signal,
        risk: &RiskParams,
        symbol: &str,
        timestamp: DateTime<Utc>,
    ) -> OpenPositionResult {
        if signal.action == SignalAction::Hold {
            return OpenPositionResult::failed("Cannot open a position on a HOLD signal");
        }
        if !(signal.price.is_finite() && signal.price > 0.0) {
            return OpenPositionResult::failed(format!("Invalid entry price: {}", signal.price));
        }

        let mut book = self.book();

        if book.open_for(symbol).is_some() {
            return OpenPositionResult::failed("Position already open for this symbol");
        }

        let available = (self.initial_capital - book.reserved_capital()).max(0.0);
        let entry_price = signal.price;
        let size = available * risk.max_position_size_pct / entry_price;
        if size <= 0.0 {
            return OpenPositionResult::failed("No capital available");
        }

        let side = PositionSide::from_action(signal.action);
        let (stop_loss, take_profit) = match side {
            PositionSide::Long => {
                let (stop, take) = risk.long_exits(entry_price);
                (Some(stop), Some(take))
            }
            PositionSide::Short => (None, None),
        };

        let position = Position {
            id: Uuid::new_v4(),
            side,
            open_time: timestamp,
            open_price: entry_price,
            size,
            stop_loss,
            take_profit,
            symbol: symbol.to_string(),
            is_open: true,
        };
        let id = position.id;
        book.positions.push(position);

        tracing::info!(
            "Opened {} position: {:.6} {} @ ${:.2}",
            side,
            size,
            symbol,
            entry_price
        );

        OpenPositionResult {
            success: true,
            position_id: Some(id),
            message: format!("Opened {} position: {:.6} {}", signal.action, size, symbol),
        }
    }

    pub fn close_position(&self, position_id: Uuid, current_price: f64, reason: &str) -> ClosePositionResult {
        self.close_position_at(position_id, current_price, reason, Utc::now())
    }

    /// Close position with explicit timestamp
    ///
    /// Creates exactly one trade. Closing an unknown or already-closed
    /// position fails without touching the book.
    pub fn close_position_at(
        &self,
        position_id: Uuid,
        current_price: f64,
        reason: &str,
        timestamp: DateTime<Utc>,
    ) -> ClosePositionResult {
        self.book().close(position_id, current_price, reason, timestamp)
    }

    pub fn check_stop_loss_and_take_profit(&self, symbol: &str, current_price: f64) -> Vec<ClosePositionResult> {
        self.check_stop_loss_and_take_profit_at(symbol, current_price, Utc::now())
    }

    /// Close every open LONG for `symbol` whose stop loss (checked first) or
    /// take profit is crossed
    pub fn check_stop_loss_and_take_profit_at(
        &self,
        symbol: &str,
        current_price: f64,
        timestamp: DateTime<Utc>,
    ) -> Vec<ClosePositionResult> {
        let mut book = self.book();

        let to_close: Vec<(Uuid, &'static str)> = book
            .positions
            .iter()
            .filter(|p| p.is_open && p.symbol == symbol && p.side == PositionSide::Long)
            .filter_map(|p| {
                if p.stop_loss.is_some_and(|stop| current_price <= stop) {
                    Some((p.id, "Stop Loss triggered"))
                } else if p.take_profit.is_some_and(|take| current_price >= take) {
                    Some((p.id, "Take Profit triggered"))
                } else {
                    None
                }
            })
            .collect();

        to_close
            .into_iter()
            .map(|(id, reason)| book.close(id, current_price, reason, timestamp))
            .collect()
    }

    /// Open positions, newest first
    pub fn get_open_positions(&self, symbol: Option<&str>) -> Vec<Position> {
        let book = self.book();
        let mut open: Vec<Position> = book
            .positions
            .iter()
            .filter(|p| p.is_open && symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect();
        open.sort_by(|a, b| b.open_time.cmp(&a.open_time));
        open
    }

    pub fn get_position(&self, position_id: Uuid) -> Option<Position> {
        self.book()
            .positions
            .iter()
            .find(|p| p.id == position_id)
            .cloned()
    }

    pub fn get_trade(&self, trade_id: Uuid) -> Option<Trade> {
        self.book().trades.iter().find(|t| t.id == trade_id).cloned()
    }

    /// Initial capital minus the notional reserved by open positions, never negative
    pub fn get_available_capital(&self) -> f64 {
        (self.initial_capital - self.book().reserved_capital()).max(0.0)
    }

    /// Closed live trades, most recent exit first
    pub fn get_trade_history(&self, symbol: Option<&str>, limit: usize) -> Vec<Trade> {
        let book = self.book();
        let mut trades: Vec<Trade> = book
            .trades
            .iter()
            .filter(|t| !t.is_backtest && symbol.map_or(true, |s| t.symbol == s))
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.exit_time.cmp(&a.exit_time));
        trades.truncate(limit);
        trades
    }

    pub fn portfolio_summary(&self, symbol: Option<&str>) -> PortfolioSummary {
        let book = self.book();
        let trades: Vec<&Trade> = book
            .trades
            .iter()
            .filter(|t| !t.is_backtest && symbol.map_or(true, |s| t.symbol == s))
            .collect();

        let total_trades = trades.len();
        let winning_trades = trades.iter().filter(|t| t.pnl > 0.0).count();
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        PortfolioSummary {
            total_trades,
            winning_trades,
            win_rate,
            total_pnl,
            total_pnl_pct: total_pnl / self.initial_capital * 100.0,
            open_positions: book
                .positions
                .iter()
                .filter(|p| p.is_open && symbol.map_or(true, |s| p.symbol == s))
                .count(),
            capital: self.initial_capital + total_pnl - book.reserved_capital(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndicatorSnapshot;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn signal(action: SignalAction, price: f64) -> Signal {
        Signal {
            action,
            confidence: 0.8,
            price,
            indicators: IndicatorSnapshot::default(),
            reasoning: vec![],
        }
    }

    fn risk(max_position_size_pct: f64) -> RiskParams {
        RiskParams {
            stop_loss_pct: 0.01,
            take_profit_pct: 0.02,
            max_position_size_pct,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_open_position() {
        let ledger = PositionLedger::new(10000.0);
        let result = ledger.open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT");

        assert!(result.success);
        let position = ledger.get_position(result.position_id.unwrap()).unwrap();
        assert_eq!(position.side, PositionSide::Long);
        assert!((position.size - 2.0).abs() < 1e-9);
        assert!((position.stop_loss.unwrap() - 99.0).abs() < 1e-9);
        assert!((position.take_profit.unwrap() - 102.0).abs() < 1e-9);
        assert!((ledger.get_available_capital() - 9800.0).abs() < 1e-9);
    }

    #[test]
    fn test_prevent_duplicate_positions() {
        let ledger = PositionLedger::new(10000.0);
        assert!(ledger
            .open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT")
            .success);

        let second = ledger.open_position(&signal(SignalAction::Sell, 100.0), &risk(0.02), "ETH/USDT");
        assert!(!second.success);
        assert_eq!(second.message, "Position already open for this symbol");
        assert_eq!(ledger.get_open_positions(Some("ETH/USDT")).len(), 1);

        // Other symbols are independent
        assert!(ledger
            .open_position(&signal(SignalAction::Buy, 50.0), &risk(0.02), "BTC/USDT")
            .success);
        assert_eq!(ledger.get_open_positions(None).len(), 2);
    }

    #[test]
    fn test_hold_signal_does_not_open() {
        let ledger = PositionLedger::new(10000.0);
        let result = ledger.open_position(&signal(SignalAction::Hold, 100.0), &risk(0.02), "ETH/USDT");
        assert!(!result.success);
        assert!(ledger.get_open_positions(None).is_empty());
    }

    #[test]
    fn test_short_has_no_exit_levels() {
        let ledger = PositionLedger::new(10000.0);
        let result = ledger.open_position(&signal(SignalAction::Sell, 100.0), &risk(0.02), "ETH/USDT");
        let position = ledger.get_position(result.position_id.unwrap()).unwrap();

        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.stop_loss, None);
        assert_eq!(position.take_profit, None);

        // Never auto-closed, whatever the price
        assert!(ledger
            .check_stop_loss_and_take_profit("ETH/USDT", 1.0)
            .is_empty());
        assert!(ledger
            .check_stop_loss_and_take_profit("ETH/USDT", 1000.0)
            .is_empty());
    }

    #[test]
    fn test_close_position_pnl() {
        let ledger = PositionLedger::new(10000.0);
        let opened = ledger.open_position_at(
            &signal(SignalAction::Buy, 100.0),
            &risk(0.02),
            "ETH/USDT",
            t0(),
        );
        let id = opened.position_id.unwrap();

        let closed = ledger.close_position_at(id, 110.0, "Manual close", t0() + Duration::hours(3));
        assert!(closed.success);
        assert!((closed.pnl.unwrap() - 20.0).abs() < 1e-9);
        assert!((closed.pnl_pct.unwrap() - 10.0).abs() < 1e-9);

        let trade = ledger.get_trade(closed.trade_id.unwrap()).unwrap();
        assert_eq!(trade.entry_time, t0());
        assert_eq!(trade.exit_time, t0() + Duration::hours(3));
        assert_eq!(trade.notes, "Manual close");
        assert!(!trade.is_backtest);
        assert!(!ledger.get_position(id).unwrap().is_open);
        assert!((ledger.get_available_capital() - 10000.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_pnl_is_mirrored() {
        let ledger = PositionLedger::new(10000.0);
        let opened = ledger.open_position(&signal(SignalAction::Sell, 100.0), &risk(0.02), "ETH/USDT");
        let closed = ledger.close_position(opened.position_id.unwrap(), 90.0, "Manual close");

        assert!((closed.pnl.unwrap() - 20.0).abs() < 1e-9);
        assert!((closed.pnl_pct.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_cannot_close_twice() {
        let ledger = PositionLedger::new(10000.0);
        let opened = ledger.open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT");
        let id = opened.position_id.unwrap();

        assert!(ledger.close_position(id, 105.0, "Manual close").success);
        let again = ledger.close_position(id, 120.0, "Manual close");
        assert!(!again.success);
        assert_eq!(again.message, "Position not found or already closed");
        assert_eq!(ledger.get_trade_history(None, 50).len(), 1);

        let unknown = ledger.close_position(Uuid::new_v4(), 120.0, "Manual close");
        assert!(!unknown.success);
    }

    #[test]
    fn test_stop_loss_checked_before_take_profit() {
        let ledger = PositionLedger::new(10000.0);
        ledger.open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT");

        assert!(ledger
            .check_stop_loss_and_take_profit("ETH/USDT", 100.5)
            .is_empty());

        let closed = ledger.check_stop_loss_and_take_profit("ETH/USDT", 98.5);
        assert_eq!(closed.len(), 1);
        assert!(closed[0].success);

        let trade = ledger.get_trade(closed[0].trade_id.unwrap()).unwrap();
        assert_eq!(trade.notes, "Stop Loss triggered");
        assert!(ledger.get_open_positions(Some("ETH/USDT")).is_empty());
    }

    #[test]
    fn test_take_profit_triggered() {
        let ledger = PositionLedger::new(10000.0);
        ledger.open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT");

        // Other symbols are not touched
        assert!(ledger
            .check_stop_loss_and_take_profit("BTC/USDT", 200.0)
            .is_empty());

        let closed = ledger.check_stop_loss_and_take_profit("ETH/USDT", 103.0);
        let trade = ledger.get_trade(closed[0].trade_id.unwrap()).unwrap();
        assert_eq!(trade.notes, "Take Profit triggered");
        assert!((trade.pnl - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_sizing_uses_reserved_capital() {
        let ledger = PositionLedger::new(1000.0);
        ledger.open_position(&signal(SignalAction::Buy, 10.0), &risk(0.5), "A");
        // 1000 - 500 reserved = 500 available
        let second = ledger.open_position(&signal(SignalAction::Buy, 10.0), &risk(0.5), "B");
        let position = ledger.get_position(second.position_id.unwrap()).unwrap();
        assert!((position.size - 25.0).abs() < 1e-9);
        assert!((ledger.get_available_capital() - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_trade_history_and_summary() {
        let ledger = PositionLedger::new(10000.0);

        for (i, exit) in [110.0, 95.0, 104.0].into_iter().enumerate() {
            let opened = ledger.open_position_at(
                &signal(SignalAction::Buy, 100.0),
                &risk(0.02),
                "ETH/USDT",
                t0() + Duration::hours(i as i64 * 2),
            );
            ledger.close_position_at(
                opened.position_id.unwrap(),
                exit,
                "Manual close",
                t0() + Duration::hours(i as i64 * 2 + 1),
            );
        }

        let history = ledger.get_trade_history(Some("ETH/USDT"), 2);
        assert_eq!(history.len(), 2);
        assert!(history[0].exit_time > history[1].exit_time);
        assert!((history[0].exit_price - 104.0).abs() < 1e-9);

        let summary = ledger.portfolio_summary(None);
        assert_eq!(summary.total_trades, 3);
        assert_eq!(summary.winning_trades, 2);
        // Sizes are all 2: +20, -10, +8
        assert!((summary.total_pnl - 18.0).abs() < 1e-9);
        assert!((summary.total_pnl_pct - 0.18).abs() < 1e-9);
        assert!((summary.capital - 10018.0).abs() < 1e-9);
        assert_eq!(summary.open_positions, 0);
    }

    #[test]
    fn test_with_history_restores_open_position() {
        let ledger = PositionLedger::new(10000.0);
        ledger.open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT");
        let positions = ledger.get_open_positions(None);

        let restored = PositionLedger::with_history(10000.0, positions, vec![]);
        let result = restored.open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT");
        assert!(!result.success);
        assert!((restored.get_available_capital() - 9800.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_opens_keep_single_position() {
        let ledger = Arc::new(PositionLedger::new(10000.0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || {
                    ledger
                        .open_position(&signal(SignalAction::Buy, 100.0), &risk(0.02), "ETH/USDT")
                        .success
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(ledger.get_open_positions(Some("ETH/USDT")).len(), 1);
    }
}
