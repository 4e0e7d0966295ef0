use crate::backtest::metrics::BacktestResult;
use crate::error::EngineError;
use crate::models::{
    Candle, EquityPoint, Position, PositionSide, RiskParams, SignalAction, StrategyParams, Trade,
};
use crate::strategy::{SignalGenerator, Strategy};
use uuid::Uuid;

/// Candles skipped before the first trading decision
pub const WARMUP_CANDLES: usize = 50;

/// Minimum confidence to open a simulated position
pub const ENTRY_CONFIDENCE: f64 = 0.5;

/// Minimum SELL confidence to close a simulated LONG
pub const REVERSAL_CONFIDENCE: f64 = 0.6;

/// Replays historical candles through a strategy with one simulated position
pub struct BacktestRunner {
    initial_capital: f64,
    risk: RiskParams,
}

impl BacktestRunner {
    /// Create a new backtest runner
    pub fn new(initial_capital: f64, risk: RiskParams) -> Self {
        Self {
            initial_capital,
            risk,
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Run a backtest with given strategy and candles
    ///
    /// # Arguments
    /// * `strategy` - The trading strategy to test
    /// * `candles` - Historical candles, ascending by timestamp
    /// * `symbol` - Symbol recorded on every simulated trade
    ///
    /// # Returns
    /// BacktestResult with one equity point per candle after the warm-up
    pub fn run<S: Strategy>(
        &self,
        strategy: &S,
        candles: &[Candle],
        symbol: &str,
    ) -> Result<BacktestResult, EngineError> {
        let (first, last) = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(EngineError::NoData),
        };

        tracing::info!(
            "Starting backtest: {} candles, strategy {}",
            candles.len(),
            strategy.name()
        );

        let mut capital = self.initial_capital;
        let mut position: Option<Position> = None;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> =
            Vec::with_capacity(candles.len().saturating_sub(WARMUP_CANDLES));
        let mut max_equity = self.initial_capital;

        for i in WARMUP_CANDLES..candles.len() {
            let candle = &candles[i];
            let current_price = candle.close;

            // Only history up to and including this candle is visible
            let signal = strategy.generate_signal(&candles[..=i], current_price);

            match position.take() {
                None => {
                    if signal.action != SignalAction::Hold && signal.confidence > ENTRY_CONFIDENCE
                    {
                        let opened =
                            self.open(signal.action, current_price, capital, candle, symbol);
                        tracing::debug!(
                            "Opened {} @ ${:.4} size {:.6} (confidence {:.2})",
                            opened.side,
                            current_price,
                            opened.size,
                            signal.confidence
                        );
                        position = Some(opened);
                    }
                }
                Some(open) => match exit_reason(
                    &open,
                    current_price,
                    signal.action,
                    signal.confidence,
                ) {
                    Some(reason) => {
                        let trade =
                            Trade::close(&open, current_price, candle.timestamp, reason, true);
                        capital += trade.pnl;
                        tracing::debug!(
                            "Closed {} @ ${:.4}: {} (P&L ${:.2})",
                            trade.side,
                            current_price,
                            reason,
                            trade.pnl
                        );
                        trades.push(trade);
                    }
                    None => position = Some(open),
                },
            }

            // Mark-to-market only counts an open LONG
            let unrealized = match &position {
                Some(p) if p.side == PositionSide::Long => p.unrealized_pnl(current_price),
                _ => 0.0,
            };

            let equity = capital + unrealized;
            max_equity = max_equity.max(equity);
            let drawdown_pct = (max_equity - equity) / max_equity * 100.0;

            equity_curve.push(EquityPoint {
                timestamp: candle.timestamp,
                equity,
                drawdown_pct,
            });
        }

        let result = BacktestResult::from_run(
            trades,
            equity_curve,
            self.initial_capital,
            first.timestamp,
            last.timestamp,
        );

        tracing::info!(
            "Backtest complete: {} trades, P&L: ${:.2} ({:.2}%)",
            result.total_trades,
            result.total_pnl,
            result.total_pnl_pct
        );

        Ok(result)
    }

    /// Run backtest and print report
    pub fn run_and_report<S: Strategy>(
        &self,
        strategy: &S,
        candles: &[Candle],
        symbol: &str,
        scenario_name: &str,
    ) -> Result<BacktestResult, EngineError> {
        println!("\n🔬 Running backtest: {}", scenario_name);
        println!("   Strategy: {}", strategy.name());
        println!("   Candles: {}", candles.len());
        println!("   Initial Capital: ${:.2}", self.initial_capital);

        let result = self.run(strategy, candles, symbol)?;
        result.print_report();

        Ok(result)
    }

    fn open(
        &self,
        action: SignalAction,
        price: f64,
        capital: f64,
        candle: &Candle,
        symbol: &str,
    ) -> Position {
        let side = PositionSide::from_action(action);
        // SHORT entries carry no exit levels
        let (stop_loss, take_profit) = match side {
            PositionSide::Long => {
                let (stop, take) = self.risk.long_exits(price);
                (Some(stop), Some(take))
            }
            PositionSide::Short => (None, None),
        };

        Position {
            id: Uuid::new_v4(),
            side,
            open_time: candle.timestamp,
            open_price: price,
            size: capital * self.risk.max_position_size_pct / price,
            stop_loss,
            take_profit,
            symbol: symbol.to_string(),
            is_open: true,
        }
    }
}

/// Exit precedence for a simulated position: stop loss, take profit, then
/// a confident SELL. Only LONG positions are ever exited.
fn exit_reason(
    position: &Position,
    price: f64,
    action: SignalAction,
    confidence: f64,
) -> Option<&'static str> {
    if position.side != PositionSide::Long {
        return None;
    }

    if position.stop_loss.is_some_and(|stop| price <= stop) {
        Some("Stop Loss")
    } else if position.take_profit.is_some_and(|take| price >= take) {
        Some("Take Profit")
    } else if action == SignalAction::Sell && confidence > REVERSAL_CONFIDENCE {
        Some("Signal Reversal")
    } else {
        None
    }
}

/// Backtest `candles` with the default EMA/RSI/MACD signal generator
pub fn run_backtest(
    candles: &[Candle],
    strategy_params: StrategyParams,
    risk_params: RiskParams,
    initial_capital: f64,
    symbol: &str,
) -> Result<BacktestResult, EngineError> {
    let generator = SignalGenerator::new(strategy_params);
    BacktestRunner::new(initial_capital, risk_params).run(&generator, candles, symbol)
}
