//! Application configuration
//!
//! Loaded once at start-up from defaults, an optional `signalbot.toml`, and
//! environment variables (a `.env` file is read first). Environment names are
//! the flat upper-case field names, e.g. `EMA_FAST=9` or `SL_PCT=0.015`.

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::EngineError;
use crate::models::{RiskParams, StrategyParams, Timeframe};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,

    // Strategy
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_lo: f64,
    pub rsi_hi: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,

    // Risk (fractions, 0.02 = 2%)
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub max_position_size_pct: f64,
    pub initial_capital: f64,

    pub binance_base_url: String,
}

impl AppConfig {
    /// Builder pre-populated with every default
    pub fn defaults() -> std::result::Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database_url", "postgres://localhost/signalbot")?
            .set_default("exchange", "binance")?
            .set_default("symbol", "ETH/USDT")?
            .set_default("timeframe", "1h")?
            .set_default("ema_fast", 12)?
            .set_default("ema_slow", 26)?
            .set_default("rsi_period", 14)?
            .set_default("rsi_lo", 30.0)?
            .set_default("rsi_hi", 70.0)?
            .set_default("macd_fast", 12)?
            .set_default("macd_slow", 26)?
            .set_default("macd_signal", 9)?
            .set_default("tp_pct", 0.02)?
            .set_default("sl_pct", 0.01)?
            .set_default("max_position_size_pct", 0.05)?
            .set_default("initial_capital", 10000.0)?
            .set_default("binance_base_url", crate::api::binance::BINANCE_API_BASE)
    }

    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::defaults()
            .context("Failed to set configuration defaults")?
            .add_source(File::with_name("signalbot").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        tracing::debug!("Loaded configuration: {}", app_config.digest());
        Ok(app_config)
    }

    /// Reject parameter sets the indicator math cannot use
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        for (name, value) in [
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
        ] {
            if value == 0 {
                return invalid(format!("{} must be positive", name));
            }
        }
        if self.rsi_period < 2 {
            return invalid(format!("rsi_period must be at least 2, got {}", self.rsi_period));
        }
        if self.ema_fast >= self.ema_slow {
            return invalid(format!(
                "ema_fast ({}) must be below ema_slow ({})",
                self.ema_fast, self.ema_slow
            ));
        }
        if self.macd_fast >= self.macd_slow {
            return invalid(format!(
                "macd_fast ({}) must be below macd_slow ({})",
                self.macd_fast, self.macd_slow
            ));
        }
        if self.rsi_lo >= self.rsi_hi {
            return invalid(format!(
                "rsi_lo ({}) must be below rsi_hi ({})",
                self.rsi_lo, self.rsi_hi
            ));
        }
        for (name, value) in [
            ("tp_pct", self.tp_pct),
            ("sl_pct", self.sl_pct),
            ("max_position_size_pct", self.max_position_size_pct),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return invalid(format!("{} must be in (0, 1], got {}", name, value));
            }
        }
        if !(self.initial_capital > 0.0) {
            return invalid(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            ));
        }

        Ok(())
    }

    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            ema_fast: self.ema_fast,
            ema_slow: self.ema_slow,
            rsi_period: self.rsi_period,
            rsi_low: self.rsi_lo,
            rsi_high: self.rsi_hi,
            macd_fast: self.macd_fast,
            macd_slow: self.macd_slow,
            macd_signal: self.macd_signal,
        }
    }

    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            stop_loss_pct: self.sl_pct,
            take_profit_pct: self.tp_pct,
            max_position_size_pct: self.max_position_size_pct,
        }
    }

    /// One-line summary for logging (no credentials)
    pub fn digest(&self) -> String {
        format!(
            "{} {} {} ema={}/{} rsi={}({}-{}) macd={}/{}/{} tp={} sl={} size={} capital={}",
            self.exchange,
            self.symbol,
            self.timeframe,
            self.ema_fast,
            self.ema_slow,
            self.rsi_period,
            self.rsi_lo,
            self.rsi_hi,
            self.macd_fast,
            self.macd_slow,
            self.macd_signal,
            self.tp_pct,
            self.sl_pct,
            self.max_position_size_pct,
            self.initial_capital
        )
    }
}
