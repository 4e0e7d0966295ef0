use crate::models::Candle;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
    /// Decline for the first half, recovery for the second
    Reversal,
    /// Gentle growth, then a 25% crash over the second half
    Crash,
}

impl MarketScenario {
    pub const ALL: [MarketScenario; 6] = [
        MarketScenario::Uptrend,
        MarketScenario::Downtrend,
        MarketScenario::Sideways,
        MarketScenario::Volatile,
        MarketScenario::Reversal,
        MarketScenario::Crash,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MarketScenario::Uptrend => "Uptrend",
            MarketScenario::Downtrend => "Downtrend",
            MarketScenario::Sideways => "Sideways",
            MarketScenario::Volatile => "Volatile",
            MarketScenario::Reversal => "Reversal",
            MarketScenario::Crash => "Crash",
        }
    }
}

/// Generates reproducible synthetic candles for backtesting
///
/// Same seed, scenario and length always give the same candles, timestamps
/// included (they start at a fixed anchor instead of the wall clock).
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start_time: DateTime<Utc>,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 2000.0,
            base_volume: 5_000.0,
            start_time: Utc.timestamp_opt(1_704_067_200, 0).single().unwrap_or_default(), // 2024-01-01
        }
    }

    pub fn with_base_price(mut self, base_price: f64) -> Self {
        self.base_price = base_price;
        self
    }

    /// Generate candles for a specific market scenario
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_candles` - Number of candles to generate
    /// * `interval_minutes` - Minutes between candles
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let intervals_per_day = 24.0 * 60.0 / interval_minutes as f64;
        let half = num_candles / 2;
        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;

        for i in 0..num_candles {
            let timestamp = self.start_time + Duration::minutes(i as i64 * interval_minutes);

            let change = match scenario {
                // Drift dominates the ±0.1% noise
                MarketScenario::Uptrend => {
                    price * (0.02 / intervals_per_day + self.rng.gen_range(-0.001..0.001))
                }
                MarketScenario::Downtrend => {
                    price * (-0.02 / intervals_per_day + self.rng.gen_range(-0.001..0.001))
                }
                // 10% pull to the mean plus ±1% noise
                MarketScenario::Sideways => {
                    (self.base_price - price) * 0.1 + price * self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => price * self.rng.gen_range(-0.05..0.05),
                MarketScenario::Reversal => {
                    let drift = if i < half { -0.004 } else { 0.006 };
                    price * (drift + self.rng.gen_range(-0.001..0.001))
                }
                MarketScenario::Crash => {
                    if i < half {
                        price * self.rng.gen_range(-0.005..0.01)
                    } else {
                        let drop_rate = -0.25 / (num_candles as f64 / 2.0);
                        price * (drop_rate + self.rng.gen_range(-0.005..0.005))
                    }
                }
            };
            price += change;

            // Volatile walks are floored at half the base price
            if scenario == MarketScenario::Volatile {
                price = price.max(self.base_price * 0.5);
            }

            candles.push(self.create_candle(price, timestamp));
        }

        tracing::debug!(
            "Generated {} {} candles from ${:.2}",
            candles.len(),
            scenario.name(),
            self.base_price
        );

        candles
    }

    /// Realistic OHLC around a close price
    fn create_candle(&mut self, close: f64, timestamp: DateTime<Utc>) -> Candle {
        let noise_pct = 0.002; // ±0.2% intrabar movement

        let high = close * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = close * (1.0 - self.rng.gen_range(0.0..noise_pct));

        let open_raw = close * (1.0 + self.rng.gen_range(-noise_pct..noise_pct));
        let open = open_raw.clamp(low, high);

        // Vary volume ±30%
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}
