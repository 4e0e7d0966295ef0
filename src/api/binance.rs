use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::api::CandleSource;
use crate::models::{Candle, Timeframe};

pub const BINANCE_API_BASE: &str = "https://api.binance.com";
const RATE_LIMIT_RPM: u32 = 600; // Well under the 1200 weight/min spot limit
const MAX_RETRIES: u32 = 3;
const MAX_KLINES_PER_REQUEST: usize = 1000;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot REST client with rate limiting and retries
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
    backoff_base: Duration,
}

/// Response from /api/v3/ticker/24hr
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let rpm = NonZeroU32::new(RATE_LIMIT_RPM).context("Rate limit must be non-zero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the retry backoff unit (delay is `base * 2^attempt`)
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// "ETH/USDT" -> "ETHUSDT"
    pub fn market_symbol(symbol: &str) -> String {
        symbol.replace('/', "").to_uppercase()
    }

    /// Make a rate-limited GET with retry on 429, 5xx and network errors
    async fn make_request(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            let backoff = self.backoff_base * 2u32.pow(attempt);

            match self.client.get(&url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(
                            "Binance returned {}, retrying in {:?} (attempt {}/{})",
                            status,
                            backoff,
                            attempt,
                            MAX_RETRIES
                        );
                        if attempt < MAX_RETRIES {
                            tokio::time::sleep(backoff).await;
                        }
                        continue;
                    }

                    // Other 4xx: don't retry
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    anyhow::bail!("Binance API error ({}): {}", status, error_text);
                }
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error: {}, retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => anyhow::bail!("Network error after {} retries: {}", MAX_RETRIES, e),
            }
        }

        anyhow::bail!("Failed after {} retries", MAX_RETRIES)
    }
}

/// Parse one kline row: [open_time, open, high, low, close, volume, close_time, ...]
fn parse_kline(kline: &[serde_json::Value]) -> Option<Candle> {
    if kline.len() < 6 {
        return None;
    }

    let open_time = kline[0].as_i64()?;
    let number = |v: &serde_json::Value| -> Option<f64> {
        match v {
            serde_json::Value::String(s) => s.parse().ok(),
            other => other.as_f64(),
        }
    };

    Some(Candle {
        timestamp: Utc.timestamp_millis_opt(open_time).single()?,
        open: number(&kline[1])?,
        high: number(&kline[2])?,
        low: number(&kline[3])?,
        close: number(&kline[4])?,
        volume: number(&kline[5])?,
    })
}

impl CandleSource for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        tracing::debug!("Fetching latest {} {} candles for {}", limit, timeframe, symbol);

        let response = self
            .make_request(
                "/api/v3/klines",
                &[
                    ("symbol", Self::market_symbol(symbol)),
                    ("interval", timeframe.as_str().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let klines: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Binance klines response")?;

        let total = klines.len();
        let mut candles: Vec<Candle> = klines.iter().filter_map(|k| parse_kline(k)).collect();
        if candles.len() < total {
            tracing::warn!("Skipped {} malformed klines", total - candles.len());
        }
        candles.sort_by_key(|c| c.timestamp);

        tracing::info!("Fetched {} candles for {} {}", candles.len(), symbol, timeframe);
        Ok(candles)
    }

    async fn current_price(&self, symbol: &str) -> Result<f64> {
        let response = self
            .make_request("/api/v3/ticker/24hr", &[("symbol", Self::market_symbol(symbol))])
            .await?;

        let ticker: Ticker24h = response
            .json()
            .await
            .context("Failed to parse Binance ticker response")?;

        ticker
            .last_price
            .parse::<f64>()
            .with_context(|| format!("Invalid lastPrice: {}", ticker.last_price))
    }
}
