use chrono::Utc;
use std::sync::Arc;

use crate::api::CandleSource;
use crate::config::AppConfig;
use crate::execution::executor::Executor;
use crate::execution::ledger::{ClosePositionResult, PositionLedger};
use crate::models::{Signal, Timeframe};
use crate::persistence::{CandleRange, StoredSignal, TradingStore};
use crate::strategy::SignalGenerator;
use crate::Result;

/// Candles requested from the exchange each cycle
pub const FETCH_LIMIT: usize = 100;
/// Stored candles fed to the signal generator
pub const HISTORY_WINDOW: usize = 200;
/// Below this many stored candles no signal is generated
pub const MIN_HISTORY: usize = 50;

const NOT_ENOUGH_DATA: &str = "Not enough historical data, skipping signal generation";

/// Summary of one trading cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub signal: Option<Signal>,
    pub action_taken: String,
    /// Positions closed by the stop-loss / take-profit sweep before signal generation
    pub closed_by_risk: Vec<ClosePositionResult>,
    pub message: String,
}

/// One fetch, sweep, signal, execute pass for a single symbol
pub struct TradingCycle<C, S> {
    source: C,
    store: Arc<S>,
    generator: SignalGenerator,
    executor: Executor,
    symbol: String,
    timeframe: Timeframe,
}

impl<C: CandleSource, S: TradingStore> TradingCycle<C, S> {
    pub fn new(source: C, store: Arc<S>, ledger: Arc<PositionLedger>, config: &AppConfig) -> Self {
        Self {
            source,
            store,
            generator: SignalGenerator::new(config.strategy_params()),
            executor: Executor::new(ledger, config.risk_params(), config.symbol.clone()),
            symbol: config.symbol.clone(),
            timeframe: config.timeframe,
        }
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        self.executor.ledger()
    }

    pub async fn run_once(&self) -> Result<CycleReport> {
        tracing::info!("Running trading cycle for {} {}", self.symbol, self.timeframe);

        // A failed fetch still lets the cycle run on stored history
        match self
            .source
            .fetch_candles(&self.symbol, self.timeframe, FETCH_LIMIT)
            .await
        {
            Ok(candles) => match self
                .store
                .save_candles(&self.symbol, self.timeframe, &candles)
                .await
            {
                Ok(inserted) => {
                    tracing::debug!("Fetched {} candles, {} new", candles.len(), inserted)
                }
                Err(e) => tracing::warn!("Failed to store candles for {}: {}", self.symbol, e),
            },
            Err(e) => tracing::warn!("Failed to fetch candles for {}: {:#}", self.symbol, e),
        }

        let candles = self
            .store
            .load_candles(&self.symbol, self.timeframe, CandleRange::latest(HISTORY_WINDOW))
            .await?;

        if candles.len() < MIN_HISTORY {
            tracing::warn!(
                "Only {} candles stored for {}, need {}",
                candles.len(),
                self.symbol,
                MIN_HISTORY
            );
            return Ok(CycleReport {
                signal: None,
                action_taken: "No action".to_string(),
                closed_by_risk: Vec::new(),
                message: NOT_ENOUGH_DATA.to_string(),
            });
        }

        let current_price = self.source.current_price(&self.symbol).await?;

        let closed_by_risk = self
            .ledger()
            .check_stop_loss_and_take_profit(&self.symbol, current_price);
        self.persist_closed(&closed_by_risk).await?;

        let signal = self.generator.generate(&candles, current_price);
        tracing::info!(
            "{} signal for {} @ ${:.2} (confidence {:.2})",
            signal.action,
            self.symbol,
            current_price,
            signal.confidence
        );

        self.store
            .save_signal(&StoredSignal {
                symbol: self.symbol.clone(),
                timestamp: Utc::now(),
                signal: signal.clone(),
            })
            .await?;

        let outcome = self.executor.execute(&signal, current_price);
        if let Some(id) = outcome.opened {
            if let Some(position) = self.ledger().get_position(id) {
                self.store.save_position(&position).await?;
            }
        }
        self.persist_closed(&outcome.closed).await?;

        let message = format!(
            "{} {} (confidence {:.2}): {}",
            self.symbol, signal.action, signal.confidence, outcome.action_taken
        );

        Ok(CycleReport {
            signal: Some(signal),
            action_taken: outcome.action_taken,
            closed_by_risk,
            message,
        })
    }

    async fn persist_closed(&self, closed: &[ClosePositionResult]) -> Result<()> {
        for result in closed {
            record_closed(self.store.as_ref(), self.ledger(), result).await?;
        }
        Ok(())
    }
}

/// Persist a ledger close through [`TradingStore::record_close`]
///
/// Returns `false` when the close was not recorded: the result was a failure,
/// or another process already closed the stored position.
pub async fn record_closed<S: TradingStore>(
    store: &S,
    ledger: &PositionLedger,
    result: &ClosePositionResult,
) -> Result<bool> {
    if !result.success {
        return Ok(false);
    }
    let position = result.position_id.and_then(|id| ledger.get_position(id));
    let trade = result.trade_id.and_then(|id| ledger.get_trade(id));
    let (Some(position), Some(trade)) = (position, trade) else {
        return Ok(false);
    };

    store.record_close(&position, &trade).await
}
