use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// OHLCV candlestick data
///
/// Candles are immutable once fetched and are always handled in ascending
/// timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Candle with all prices equal to `price` (useful for price-only feeds)
    pub fn flat(timestamp: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }
}

/// Candle interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Min30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
        }
    }

    /// Length of one candle
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Min1 => Duration::minutes(1),
            Timeframe::Min5 => Duration::minutes(5),
            Timeframe::Min15 => Duration::minutes(15),
            Timeframe::Min30 => Duration::minutes(30),
            Timeframe::Hour1 => Duration::hours(1),
            Timeframe::Hour4 => Duration::hours(4),
            Timeframe::Day1 => Duration::days(1),
            Timeframe::Week1 => Duration::weeks(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::Min1),
            "5m" => Ok(Timeframe::Min5),
            "15m" => Ok(Timeframe::Min15),
            "30m" => Ok(Timeframe::Min30),
            "1h" => Ok(Timeframe::Hour1),
            "4h" => Ok(Timeframe::Hour4),
            "1d" => Ok(Timeframe::Day1),
            "1w" => Ok(Timeframe::Week1),
            other => Err(format!("Unsupported timeframe: {}", other)),
        }
    }
}

/// Indicator values for a single candle index
///
/// `None` means the indicator has not finished warming up at that index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_value: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
}

impl IndicatorSnapshot {
    /// True when every indicator has a value
    pub fn is_complete(&self) -> bool {
        self.ema_fast.is_some()
            && self.ema_slow.is_some()
            && self.rsi.is_some()
            && self.macd_value.is_some()
            && self.macd_signal.is_some()
            && self.macd_histogram.is_some()
    }
}

/// Trading action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(SignalAction::Buy),
            "SELL" => Ok(SignalAction::Sell),
            "HOLD" => Ok(SignalAction::Hold),
            other => Err(format!("Invalid signal action: {}", other)),
        }
    }
}

/// Scored trading signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: SignalAction,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub price: f64,
    pub indicators: IndicatorSnapshot,
    pub reasoning: Vec<String>,
}

impl Signal {
    /// HOLD with zero confidence and a single reasoning line
    pub fn hold(price: f64, indicators: IndicatorSnapshot, reason: &str) -> Self {
        Self {
            action: SignalAction::Hold,
            confidence: 0.0,
            price,
            indicators,
            reasoning: vec![reason.to_string()],
        }
    }
}

/// Indicator periods and RSI thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_low: f64,
    pub rsi_high: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            ema_fast: 12,
            ema_slow: 26,
            rsi_period: 14,
            rsi_low: 30.0,
            rsi_high: 70.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

/// Risk limits as fractions (0.02 = 2%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_position_size_pct: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.01,
            take_profit_pct: 0.02,
            max_position_size_pct: 0.05,
        }
    }
}

impl RiskParams {
    /// Stop-loss and take-profit levels for a LONG entry
    pub fn long_exits(&self, entry_price: f64) -> (f64, f64) {
        (
            entry_price * (1.0 - self.stop_loss_pct),
            entry_price * (1.0 + self.take_profit_pct),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// BUY opens LONG, anything else opens SHORT
    pub fn from_action(action: SignalAction) -> Self {
        match action {
            SignalAction::Buy => PositionSide::Long,
            _ => PositionSide::Short,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    /// Realized P&L of closing `size` units opened at `entry_price`
    pub fn pnl(&self, entry_price: f64, exit_price: f64, size: f64) -> f64 {
        match self {
            PositionSide::Long => (exit_price - entry_price) * size,
            PositionSide::Short => (entry_price - exit_price) * size,
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LONG" => Ok(PositionSide::Long),
            "SHORT" => Ok(PositionSide::Short),
            other => Err(format!("Invalid position side: {}", other)),
        }
    }
}

/// P&L as a percentage of the entry notional
pub fn pnl_pct(pnl: f64, entry_price: f64, size: f64) -> f64 {
    (pnl / (entry_price * size)) * 100.0
}

/// Open or closed position
///
/// Only `is_open` ever changes after creation, and only from true to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub side: PositionSide,
    pub open_time: DateTime<Utc>,
    pub open_price: f64,
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub symbol: String,
    pub is_open: bool,
}

impl Position {
    /// Notional reserved by this position
    pub fn cost_basis(&self) -> f64 {
        self.open_price * self.size
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.side.pnl(self.open_price, current_price, self.size)
    }
}

/// Closed round trip, created exactly once per closed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub side: PositionSide,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub symbol: String,
    pub notes: String,
    pub is_backtest: bool,
}

impl Trade {
    /// Build the trade record for closing `position` at `exit_price`
    pub fn close(
        position: &Position,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        notes: &str,
        is_backtest: bool,
    ) -> Self {
        let pnl = position
            .side
            .pnl(position.open_price, exit_price, position.size);

        Self {
            id: Uuid::new_v4(),
            side: position.side,
            entry_time: position.open_time,
            exit_time,
            entry_price: position.open_price,
            exit_price,
            size: position.size,
            pnl,
            pnl_pct: pnl_pct(pnl, position.open_price, position.size),
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            symbol: position.symbol.clone(),
            notes: notes.to_string(),
            is_backtest,
        }
    }
}

/// One point of a simulated equity curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub drawdown_pct: f64,
}
