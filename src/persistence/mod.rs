use crate::models::{Candle, Position, Signal, Timeframe, Trade};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Signal as recorded by the trading cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSignal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub signal: Signal,
}

impl StoredSignal {
    /// Reasoning lines joined the way they are persisted
    pub fn notes(&self) -> String {
        self.signal.reasoning.join("; ")
    }
}

/// Inclusive time range filter for stored candles
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CandleRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` candles of the range
    pub limit: Option<usize>,
}

impl CandleRange {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| timestamp >= from) && self.to.map_or(true, |to| timestamp <= to)
    }
}

/// Storage for candles, signals, positions and trades
#[allow(async_fn_in_trait)]
pub trait TradingStore {
    /// Insert candles, skipping timestamps already stored for (symbol, timeframe).
    /// Returns the number of new candles.
    async fn save_candles(&self, symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> Result<usize>;

    /// Candles in `range`, ascending by timestamp
    async fn load_candles(&self, symbol: &str, timeframe: Timeframe, range: CandleRange) -> Result<Vec<Candle>>;

    async fn save_signal(&self, signal: &StoredSignal) -> Result<()>;

    /// Most recent signals for a symbol, newest first
    async fn load_signals(&self, symbol: &str, limit: usize) -> Result<Vec<StoredSignal>>;

    /// Insert or update a position by id. A stored close is never reopened.
    async fn save_position(&self, position: &Position) -> Result<()>;

    /// Atomically mark `position` closed and insert its `trade`.
    ///
    /// Returns `false` without writing anything when the stored position is
    /// already closed, so concurrent closers produce exactly one trade.
    async fn record_close(&self, position: &Position, trade: &Trade) -> Result<bool>;

    async fn load_positions(&self) -> Result<Vec<Position>>;

    async fn save_trade(&self, trade: &Trade) -> Result<()>;

    /// Trades, optionally filtered by the backtest flag
    async fn load_trades(&self, is_backtest: Option<bool>) -> Result<Vec<Trade>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    candles: HashMap<(String, Timeframe), BTreeMap<DateTime<Utc>, Candle>>,
    signals: Vec<StoredSignal>,
    positions: Vec<Position>,
    trades: Vec<Trade>,
}

/// In-process store for tests and offline runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradingStore for MemoryStore {
    async fn save_candles(&self, symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> Result<usize> {
        let mut state = self.state.write().await;
        let series = state
            .candles
            .entry((symbol.to_string(), timeframe))
            .or_default();

        let mut inserted = 0;
        for candle in candles {
            if !series.contains_key(&candle.timestamp) {
                series.insert(candle.timestamp, candle.clone());
                inserted += 1;
            }
        }

        tracing::debug!("Stored {} new candles for {} {}", inserted, symbol, timeframe);
        Ok(inserted)
    }

    async fn load_candles(&self, symbol: &str, timeframe: Timeframe, range: CandleRange) -> Result<Vec<Candle>> {
        let state = self.state.read().await;
        let Some(series) = state.candles.get(&(symbol.to_string(), timeframe)) else {
            return Ok(Vec::new());
        };

        let mut candles: Vec<Candle> = series
            .values()
            .filter(|c| range.contains(c.timestamp))
            .cloned()
            .collect();

        if let Some(limit) = range.limit {
            let skip = candles.len().saturating_sub(limit);
            candles.drain(..skip);
        }

        Ok(candles)
    }

    async fn save_signal(&self, signal: &StoredSignal) -> Result<()> {
        self.state.write().await.signals.push(signal.clone());
        Ok(())
    }

    async fn load_signals(&self, symbol: &str, limit: usize) -> Result<Vec<StoredSignal>> {
        let state = self.state.read().await;
        let mut signals: Vec<StoredSignal> = state
            .signals
            .iter()
            .filter(|s| s.symbol == symbol)
            .cloned()
            .collect();
        signals.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        signals.truncate(limit);
        Ok(signals)
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        let mut state = self.state.write().await;
        match state.positions.iter_mut().find(|p| p.id == position.id) {
            Some(existing) => {
                let is_open = existing.is_open && position.is_open;
                *existing = position.clone();
                existing.is_open = is_open;
            }
            None => state.positions.push(position.clone()),
        }
        Ok(())
    }

    async fn record_close(&self, position: &Position, trade: &Trade) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.trades.iter().any(|t| t.id == trade.id) {
            return Err(format!("Trade {} already recorded", trade.id).into());
        }

        match state.positions.iter_mut().find(|p| p.id == position.id) {
            Some(existing) if !existing.is_open => {
                tracing::warn!("Position {} already closed, dropping duplicate trade", position.id);
                return Ok(false);
            }
            Some(existing) => existing.is_open = false,
            None => state.positions.push(Position {
                is_open: false,
                ..position.clone()
            }),
        }

        state.trades.push(trade.clone());
        Ok(true)
    }

    async fn load_positions(&self) -> Result<Vec<Position>> {
        Ok(self.state.read().await.positions.clone())
    }

    async fn save_trade(&self, trade: &Trade) -> Result<()> {
        let mut state = self.state.write().await;
        if state.trades.iter().any(|t| t.id == trade.id) {
            return Err(format!("Trade {} already recorded", trade.id).into());
        }
        state.trades.push(trade.clone());
        Ok(())
    }

    async fn load_trades(&self, is_backtest: Option<bool>) -> Result<Vec<Trade>> {
        let state = self.state.read().await;
        Ok(state
            .trades
            .iter()
            .filter(|t| is_backtest.map_or(true, |flag| t.is_backtest == flag))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndicatorSnapshot, PositionSide, SignalAction};
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle::flat(start + Duration::hours(i as i64), 100.0 + i as f64, 10.0))
            .collect()
    }

    #[tokio::test]
    async fn test_save_candles_skips_duplicates() {
        let store = MemoryStore::new();
        let batch = candles(5);

        assert_eq!(store.save_candles("ETH/USDT", Timeframe::Hour1, &batch).await.unwrap(), 5);
        assert_eq!(store.save_candles("ETH/USDT", Timeframe::Hour1, &batch[3..]).await.unwrap(), 0);
        assert_eq!(store.save_candles("ETH/USDT", Timeframe::Hour4, &batch).await.unwrap(), 5);

        let loaded = store
            .load_candles("ETH/USDT", Timeframe::Hour1, CandleRange::default())
            .await
            .unwrap();
        assert_eq!(loaded, batch);
    }

    #[tokio::test]
    async fn test_load_candles_range_and_latest() {
        let store = MemoryStore::new();
        let batch = candles(10);
        store.save_candles("ETH/USDT", Timeframe::Hour1, &batch).await.unwrap();

        let latest = store
            .load_candles("ETH/USDT", Timeframe::Hour1, CandleRange::latest(3))
            .await
            .unwrap();
        assert_eq!(latest, batch[7..].to_vec());

        let range = CandleRange {
            from: Some(batch[2].timestamp),
            to: Some(batch[4].timestamp),
            limit: None,
        };
        let ranged = store.load_candles("ETH/USDT", Timeframe::Hour1, range).await.unwrap();
        assert_eq!(ranged, batch[2..=4].to_vec());

        let missing = store
            .load_candles("BTC/USDT", Timeframe::Hour1, CandleRange::default())
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_position_upsert_and_trades() {
        let store = MemoryStore::new();
        let mut position = Position {
            id: Uuid::new_v4(),
            side: PositionSide::Long,
            open_time: Utc::now(),
            open_price: 100.0,
            size: 2.0,
            stop_loss: Some(99.0),
            take_profit: Some(102.0),
            symbol: "ETH/USDT".to_string(),
            is_open: true,
        };
        store.save_position(&position).await.unwrap();

        position.is_open = false;
        store.save_position(&position).await.unwrap();

        let positions = store.load_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert!(!positions[0].is_open);

        let live = Trade::close(&position, 110.0, Utc::now(), "Manual close", false);
        let simulated = Trade::close(&position, 105.0, Utc::now(), "Take Profit", true);
        store.save_trade(&live).await.unwrap();
        store.save_trade(&simulated).await.unwrap();
        assert!(store.save_trade(&live).await.is_err());

        assert_eq!(store.load_trades(None).await.unwrap().len(), 2);
        let backtest = store.load_trades(Some(true)).await.unwrap();
        assert_eq!(backtest.len(), 1);
        assert_eq!(backtest[0].id, simulated.id);
    }

    #[tokio::test]
    async fn test_closed_position_is_never_reopened() {
        let store = MemoryStore::new();
        let mut position = Position {
            id: Uuid::new_v4(),
            side: PositionSide::Long,
            open_time: Utc::now(),
            open_price: 100.0,
            size: 1.0,
            stop_loss: None,
            take_profit: None,
            symbol: "ETH/USDT".to_string(),
            is_open: false,
        };
        store.save_position(&position).await.unwrap();

        position.is_open = true;
        store.save_position(&position).await.unwrap();
        assert!(!store.load_positions().await.unwrap()[0].is_open);
    }

    #[tokio::test]
    async fn test_record_close_only_once() {
        let store = MemoryStore::new();
        let position = Position {
            id: Uuid::new_v4(),
            side: PositionSide::Long,
            open_time: Utc::now(),
            open_price: 100.0,
            size: 2.0,
            stop_loss: Some(99.0),
            take_profit: Some(102.0),
            symbol: "ETH/USDT".to_string(),
            is_open: true,
        };
        store.save_position(&position).await.unwrap();

        let first = Trade::close(&position, 98.0, Utc::now(), "Stop Loss triggered", false);
        let second = Trade::close(&position, 98.5, Utc::now(), "Manual close", false);

        assert!(store.record_close(&position, &first).await.unwrap());
        assert!(!store.record_close(&position, &second).await.unwrap());

        let trades = store.load_trades(None).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, first.id);
        assert!(!store.load_positions().await.unwrap()[0].is_open);
    }

    #[tokio::test]
    async fn test_signals_newest_first() {
        let store = MemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        for i in 0..3 {
            let signal = Signal {
                action: SignalAction::Hold,
                confidence: 0.3,
                price: 100.0,
                indicators: IndicatorSnapshot::default(),
                reasoning: vec!["a".to_string(), "b".to_string()],
            };
            store
                .save_signal(&StoredSignal {
                    symbol: "ETH/USDT".to_string(),
                    timestamp: t0 + Duration::hours(i),
                    signal,
                })
                .await
                .unwrap();
        }

        let signals = store.load_signals("ETH/USDT", 2).await.unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].timestamp, t0 + Duration::hours(2));
        assert_eq!(signals[0].notes(), "a; b");
    }
}
