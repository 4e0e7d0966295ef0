use crate::models::{
    Candle, IndicatorSnapshot, Position, PositionSide, Signal, SignalAction, Timeframe, Trade,
};
use crate::persistence::{CandleRange, StoredSignal, TradingStore};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgExecutor, PgPool, Row};
use uuid::Uuid;

/// Postgres storage for candles, signals, positions and trades
pub struct PostgresStore {
    pool: PgPool,
    exchange: String,
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| format!("Cannot store {} as NUMERIC", value).into())
}

fn opt_decimal(value: Option<f64>) -> Result<Option<Decimal>> {
    value.map(to_decimal).transpose()
}

fn to_f64(value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| format!("NUMERIC {} out of f64 range", value).into())
}

fn decimal_col(row: &PgRow, column: &str) -> Result<f64> {
    to_f64(row.try_get::<Decimal, _>(column)?)
}

fn opt_decimal_col(row: &PgRow, column: &str) -> Result<Option<f64>> {
    row.try_get::<Option<Decimal>, _>(column)?
        .map(to_f64)
        .transpose()
}

async fn insert_trade<'e>(executor: impl PgExecutor<'e>, trade: &Trade) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trades (
            id, side, entry_time, exit_time, entry_price, exit_price, size,
            pnl, pnl_pct, stop_loss, take_profit, symbol, notes, is_backtest
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(trade.id)
    .bind(trade.side.as_str())
    .bind(trade.entry_time)
    .bind(trade.exit_time)
    .bind(to_decimal(trade.entry_price)?)
    .bind(to_decimal(trade.exit_price)?)
    .bind(to_decimal(trade.size)?)
    .bind(to_decimal(trade.pnl)?)
    .bind(to_decimal(trade.pnl_pct)?)
    .bind(opt_decimal(trade.stop_loss)?)
    .bind(opt_decimal(trade.take_profit)?)
    .bind(&trade.symbol)
    .bind(&trade.notes)
    .bind(trade.is_backtest)
    .execute(executor)
    .await?;

    Ok(())
}

impl PostgresStore {
    /// Connect to Postgres and run migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    /// * `exchange` - Exchange name recorded with every stored candle
    pub async fn new(database_url: &str, exchange: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self {
            pool,
            exchange: exchange.to_string(),
        })
    }

    /// Delete every row for a symbol (test helper for shared databases)
    pub async fn clear_symbol(&self, symbol: &str) -> Result<()> {
        for table in ["candles", "signals", "positions", "trades"] {
            sqlx::query(&format!("DELETE FROM {} WHERE symbol = $1", table))
                .bind(symbol)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    fn position_from_row(row: &PgRow) -> Result<Position> {
        let side: String = row.try_get("side")?;
        Ok(Position {
            id: row.try_get("id")?,
            side: side.parse::<PositionSide>()?,
            open_time: row.try_get("open_time")?,
            open_price: decimal_col(row, "open_price")?,
            size: decimal_col(row, "size")?,
            stop_loss: opt_decimal_col(row, "stop_loss")?,
            take_profit: opt_decimal_col(row, "take_profit")?,
            symbol: row.try_get("symbol")?,
            is_open: row.try_get("is_open")?,
        })
    }

    fn trade_from_row(row: &PgRow) -> Result<Trade> {
        let side: String = row.try_get("side")?;
        Ok(Trade {
            id: row.try_get("id")?,
            side: side.parse::<PositionSide>()?,
            entry_time: row.try_get("entry_time")?,
            exit_time: row.try_get("exit_time")?,
            entry_price: decimal_col(row, "entry_price")?,
            exit_price: decimal_col(row, "exit_price")?,
            size: decimal_col(row, "size")?,
            pnl: decimal_col(row, "pnl")?,
            pnl_pct: decimal_col(row, "pnl_pct")?,
            stop_loss: opt_decimal_col(row, "stop_loss")?,
            take_profit: opt_decimal_col(row, "take_profit")?,
            symbol: row.try_get("symbol")?,
            notes: row.try_get("notes")?,
            is_backtest: row.try_get("is_backtest")?,
        })
    }
}

impl TradingStore for PostgresStore {
    async fn save_candles(&self, symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for candle in candles {
            let result = sqlx::query(
                r#"
                INSERT INTO candles (exchange, symbol, timeframe, time, open, high, low, close, volume)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (exchange, symbol, timeframe, time) DO NOTHING
                "#,
            )
            .bind(&self.exchange)
            .bind(symbol)
            .bind(timeframe.as_str())
            .bind(candle.timestamp)
            .bind(to_decimal(candle.open)?)
            .bind(to_decimal(candle.high)?)
            .bind(to_decimal(candle.low)?)
            .bind(to_decimal(candle.close)?)
            .bind(to_decimal(candle.volume)?)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        tracing::debug!(
            "Stored {} new candles for {} {} ({} received)",
            inserted,
            symbol,
            timeframe,
            candles.len()
        );

        Ok(inserted as usize)
    }

    async fn load_candles(&self, symbol: &str, timeframe: Timeframe, range: CandleRange) -> Result<Vec<Candle>> {
        // Newest `limit` rows of the range, returned oldest first
        let rows = sqlx::query(
            r#"
            SELECT time, open, high, low, close, volume FROM (
                SELECT time, open, high, low, close, volume
                FROM candles
                WHERE exchange = $1 AND symbol = $2 AND timeframe = $3
                  AND ($4::timestamptz IS NULL OR time >= $4)
                  AND ($5::timestamptz IS NULL OR time <= $5)
                ORDER BY time DESC
                LIMIT $6
            ) recent
            ORDER BY time ASC
            "#,
        )
        .bind(&self.exchange)
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(range.from)
        .bind(range.to)
        .bind(range.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Candle> {
                Ok(Candle {
                    timestamp: row.try_get("time")?,
                    open: decimal_col(row, "open")?,
                    high: decimal_col(row, "high")?,
                    low: decimal_col(row, "low")?,
                    close: decimal_col(row, "close")?,
                    volume: decimal_col(row, "volume")?,
                })
            })
            .collect()
    }

    async fn save_signal(&self, stored: &StoredSignal) -> Result<()> {
        let signal = &stored.signal;
        let ind = &signal.indicators;

        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, action, confidence, price, timestamp,
                ema_fast, ema_slow, rsi, macd_value, macd_signal, macd_hist, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&stored.symbol)
        .bind(signal.action.as_str())
        .bind(signal.confidence)
        .bind(to_decimal(signal.price)?)
        .bind(stored.timestamp)
        .bind(ind.ema_fast)
        .bind(ind.ema_slow)
        .bind(ind.rsi)
        .bind(ind.macd_value)
        .bind(ind.macd_signal)
        .bind(ind.macd_histogram)
        .bind(stored.notes())
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved {} signal for {}", signal.action, stored.symbol);
        Ok(())
    }

    async fn load_signals(&self, symbol: &str, limit: usize) -> Result<Vec<StoredSignal>> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, action, confidence, price, timestamp,
                   ema_fast, ema_slow, rsi, macd_value, macd_signal, macd_hist, notes
            FROM signals
            WHERE symbol = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut signals = Vec::with_capacity(rows.len());
        for row in rows {
            let action: String = row.try_get("action")?;
            let notes: String = row.try_get("notes")?;
            let timestamp: DateTime<Utc> = row.try_get("timestamp")?;

            signals.push(StoredSignal {
                symbol: row.try_get("symbol")?,
                timestamp,
                signal: Signal {
                    action: action.parse::<SignalAction>()?,
                    confidence: row.try_get("confidence")?,
                    price: decimal_col(&row, "price")?,
                    indicators: IndicatorSnapshot {
                        ema_fast: row.try_get("ema_fast")?,
                        ema_slow: row.try_get("ema_slow")?,
                        rsi: row.try_get("rsi")?,
                        macd_value: row.try_get("macd_value")?,
                        macd_signal: row.try_get("macd_signal")?,
                        macd_histogram: row.try_get("macd_hist")?,
                    },
                    reasoning: notes
                        .split("; ")
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                },
            });
        }

        Ok(signals)
    }

    async fn save_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, side, open_time, open_price, size, stop_loss, take_profit, symbol, is_open
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                is_open = positions.is_open AND EXCLUDED.is_open,
                updated_at = NOW()
            "#,
        )
        .bind(position.id)
        .bind(position.side.as_str())
        .bind(position.open_time)
        .bind(to_decimal(position.open_price)?)
        .bind(to_decimal(position.size)?)
        .bind(opt_decimal(position.stop_loss)?)
        .bind(opt_decimal(position.take_profit)?)
        .bind(&position.symbol)
        .bind(position.is_open)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            "Saved position {} for {} to Postgres (open: {})",
            position.id,
            position.symbol,
            position.is_open
        );

        Ok(())
    }

    async fn load_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT id, side, open_time, open_price, size, stop_loss, take_profit, symbol, is_open
            FROM positions
            ORDER BY open_time ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let positions = rows
            .iter()
            .map(Self::position_from_row)
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Loaded {} positions from Postgres", positions.len());
        Ok(positions)
    }

    async fn save_trade(&self, trade: &Trade) -> Result<()> {
        insert_trade(&self.pool, trade).await
    }

    async fn record_close(&self, position: &Position, trade: &Trade) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Row lock on conflict: a concurrent closer waits, then sees is_open = FALSE
        let closed = sqlx::query(
            r#"
            INSERT INTO positions (
                id, side, open_time, open_price, size, stop_loss, take_profit, symbol, is_open
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE)
            ON CONFLICT (id) DO UPDATE SET
                is_open = FALSE,
                updated_at = NOW()
            WHERE positions.is_open
            RETURNING id
            "#,
        )
        .bind(position.id)
        .bind(position.side.as_str())
        .bind(position.open_time)
        .bind(to_decimal(position.open_price)?)
        .bind(to_decimal(position.size)?)
        .bind(opt_decimal(position.stop_loss)?)
        .bind(opt_decimal(position.take_profit)?)
        .bind(&position.symbol)
        .fetch_optional(&mut *tx)
        .await?;

        if closed.is_none() {
            tx.rollback().await?;
            tracing::warn!(
                "Position {} already closed in Postgres, dropping duplicate trade",
                position.id
            );
            return Ok(false);
        }

        insert_trade(&mut *tx, trade).await?;
        tx.commit().await?;

        tracing::debug!("Recorded close of position {} as trade {}", position.id, trade.id);
        Ok(true)
    }

    async fn load_trades(&self, is_backtest: Option<bool>) -> Result<Vec<Trade>> {
        let rows = sqlx::query(
            r#"
            SELECT id, side, entry_time, exit_time, entry_price, exit_price, size,
                   pnl, pnl_pct, stop_loss, take_profit, symbol, notes, is_backtest
            FROM trades
            WHERE ($1::boolean IS NULL OR is_backtest = $1)
            ORDER BY exit_time ASC
            "#,
        )
        .bind(is_backtest)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::trade_from_row).collect()
    }
}
