pub mod binance;

pub use binance::BinanceClient;

use crate::models::{Candle, Timeframe};

/// Market data provider for one exchange
#[allow(async_fn_in_trait)]
pub trait CandleSource {
    /// Latest `limit` candles, ascending by timestamp
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    /// Last traded price
    async fn current_price(&self, symbol: &str) -> anyhow::Result<f64>;
}
