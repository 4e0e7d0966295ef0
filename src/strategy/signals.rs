use super::Strategy;
use crate::indicators::IndicatorEngine;
use crate::models::{Candle, IndicatorSnapshot, Signal, SignalAction, StrategyParams};

/// Extra candles required beyond the longest indicator period
pub const WARMUP_MARGIN: usize = 10;

/// Minimum winning score for BUY/SELL
const MIN_SCORE: u32 = 4;
/// Score that maps to full confidence
const FULL_CONFIDENCE_SCORE: f64 = 6.0;
/// Confidence reported for mixed signals
const MIXED_CONFIDENCE: f64 = 0.3;

/// Buy/sell points accumulated across indicator families
#[derive(Debug, Default)]
struct Scorecard {
    buy: u32,
    sell: u32,
    reasoning: Vec<String>,
}

impl Scorecard {
    fn buy(&mut self, points: u32, reason: String) {
        self.buy += points;
        self.reasoning.push(reason);
    }

    fn sell(&mut self, points: u32, reason: String) {
        self.sell += points;
        self.reasoning.push(reason);
    }

    fn note(&mut self, reason: String) {
        self.reasoning.push(reason);
    }
}

/// EMA crossover + RSI + MACD scoring strategy
///
/// Each indicator family adds points independently:
/// - EMA: golden/death cross +3, plain trend +1
/// - RSI: oversold/overbought +2, above/below 50 +1
/// - MACD: histogram sign change +2, plain sign +1
///
/// BUY fires when the buy score is at least 4 and beats the sell score by
/// more than one point (SELL symmetric); confidence is `score / 6` capped at 1.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    params: StrategyParams,
    engine: IndicatorEngine,
}

impl SignalGenerator {
    pub fn new(params: StrategyParams) -> Self {
        Self {
            params,
            engine: IndicatorEngine::new(params),
        }
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    /// Candles needed before any scoring happens
    pub fn min_history(&self) -> usize {
        let p = &self.params;
        p.ema_slow.max(p.rsi_period).max(p.macd_slow) + WARMUP_MARGIN
    }

    /// Score the latest candle of `candles` and emit a signal priced at `current_price`
    pub fn generate(&self, candles: &[Candle], current_price: f64) -> Signal {
        if candles.len() < self.min_history() {
            return Signal::hold(
                current_price,
                IndicatorSnapshot::default(),
                "Insufficient historical data for analysis",
            );
        }

        let snapshots = self.engine.calculate_for_candles(candles);
        let latest = snapshots[snapshots.len() - 1];
        let previous = snapshots[snapshots.len() - 2];

        if !latest.is_complete() {
            return Signal::hold(current_price, latest, "Missing required indicator values");
        }

        let mut card = Scorecard::default();
        self.score_ema(&latest, &previous, &mut card);
        self.score_rsi(&latest, &mut card);
        self.score_macd(&latest, &previous, &mut card);

        let (action, confidence) = if card.buy >= MIN_SCORE && card.buy > card.sell + 1 {
            (SignalAction::Buy, confidence_for(card.buy))
        } else if card.sell >= MIN_SCORE && card.sell > card.buy + 1 {
            (SignalAction::Sell, confidence_for(card.sell))
        } else {
            card.note(format!(
                "Signals mixed: Buy({}) vs Sell({})",
                card.buy, card.sell
            ));
            (SignalAction::Hold, MIXED_CONFIDENCE)
        };

        tracing::debug!(
            "Signal generated: {} with confidence {:.2} (buy {}, sell {})",
            action,
            confidence,
            card.buy,
            card.sell
        );

        Signal {
            action,
            confidence,
            price: current_price,
            indicators: latest,
            reasoning: card.reasoning,
        }
    }

    fn score_ema(&self, latest: &IndicatorSnapshot, previous: &IndicatorSnapshot, card: &mut Scorecard) {
        let (Some(fast), Some(slow)) = (latest.ema_fast, latest.ema_slow) else {
            return;
        };
        let prev = previous.ema_fast.zip(previous.ema_slow);

        if fast > slow {
            if matches!(prev, Some((pf, ps)) if pf <= ps) {
                card.buy(
                    3,
                    format!("EMA Golden Cross: Fast({:.2}) > Slow({:.2})", fast, slow),
                );
            } else {
                card.buy(1, format!("EMA Bullish: Fast({:.2}) > Slow({:.2})", fast, slow));
            }
        } else if fast < slow {
            if matches!(prev, Some((pf, ps)) if pf >= ps) {
                card.sell(
                    3,
                    format!("EMA Death Cross: Fast({:.2}) < Slow({:.2})", fast, slow),
                );
            } else {
                card.sell(1, format!("EMA Bearish: Fast({:.2}) < Slow({:.2})", fast, slow));
            }
        } else {
            card.note(format!("EMA Neutral: Fast({:.2}) = Slow({:.2})", fast, slow));
        }
    }

    fn score_rsi(&self, latest: &IndicatorSnapshot, card: &mut Scorecard) {
        let Some(rsi) = latest.rsi else {
            return;
        };
        let p = &self.params;

        if rsi < p.rsi_low {
            card.buy(2, format!("RSI Oversold: {:.2} < {}", rsi, p.rsi_low));
        } else if rsi > p.rsi_high {
            card.sell(2, format!("RSI Overbought: {:.2} > {}", rsi, p.rsi_high));
        } else if rsi > 50.0 {
            card.buy(1, format!("RSI Bullish: {:.2} > 50", rsi));
        } else {
            card.sell(1, format!("RSI Bearish: {:.2} <= 50", rsi));
        }
    }

    fn score_macd(&self, latest: &IndicatorSnapshot, previous: &IndicatorSnapshot, card: &mut Scorecard) {
        let Some(histogram) = latest.macd_histogram else {
            return;
        };
        let prev = previous.macd_histogram;

        if histogram > 0.0 {
            if matches!(prev, Some(h) if h <= 0.0) {
                card.buy(
                    2,
                    format!("MACD Bullish Crossover: Histogram {:.4}", histogram),
                );
            } else {
                card.buy(1, format!("MACD Bullish: Histogram {:.4} > 0", histogram));
            }
        } else if histogram < 0.0 {
            if matches!(prev, Some(h) if h >= 0.0) {
                card.sell(
                    2,
                    format!("MACD Bearish Crossover: Histogram {:.4}", histogram),
                );
            } else {
                card.sell(1, format!("MACD Bearish: Histogram {:.4} < 0", histogram));
            }
        } else {
            card.note(format!("MACD Neutral: Histogram {:.4}", histogram));
        }
    }
}

impl Default for SignalGenerator {
    fn default() -> Self {
        Self::new(StrategyParams::default())
    }
}

impl Strategy for SignalGenerator {
    fn generate_signal(&self, candles: &[Candle], current_price: f64) -> Signal {
        self.generate(candles, current_price)
    }

    fn name(&self) -> &str {
        "EmaRsiMacdStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.min_history()
    }
}

fn confidence_for(score: u32) -> f64 {
    (score as f64 / FULL_CONFIDENCE_SCORE).min(1.0)
}
