use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use signalbot::api::{BinanceClient, CandleSource};
use signalbot::backtest::run_backtest;
use signalbot::db::PostgresStore;
use signalbot::execution::{record_closed, PositionLedger, TradingCycle};
use signalbot::persistence::{CandleRange, MemoryStore, TradingStore};
use signalbot::{AppConfig, Result, SignalGenerator, Timeframe};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SIGNAL_HISTORY: usize = 200;
const BACKTEST_FETCH_LIMIT: usize = 1000;

#[derive(Parser)]
#[command(name = "signalbot")]
#[command(about = "Rule-based EMA/RSI/MACD signal generator with paper trading", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate and print the current signal from stored candles
    Signal,

    /// Run one trading cycle: fetch, check exits, signal, execute
    Tick,

    /// Backtest the strategy over stored candles
    Backtest {
        /// Start of the range (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_date)]
        from: Option<DateTime<Utc>>,

        /// End of the range (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_date)]
        to: Option<DateTime<Utc>>,

        /// Initial capital, defaults to the configured value
        #[arg(long)]
        capital: Option<f64>,

        /// Trading pair, e.g. ETH/USDT
        #[arg(long)]
        symbol: Option<String>,

        /// Candle timeframe (1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w)
        #[arg(long)]
        timeframe: Option<Timeframe>,
    },

    /// List open positions and the portfolio summary
    Positions,

    /// Close a position at the current price
    Close {
        /// Position id
        id: Uuid,
    },
}

fn parse_date(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| format!("Invalid date: {}", s));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid date '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = AppConfig::load()?;
    tracing::info!("🚀 SignalBot starting: {}", config.digest());

    match PostgresStore::new(&config.database_url, &config.exchange).await {
        Ok(store) => {
            tracing::info!("Postgres persistence enabled at {}", config.database_url);
            run(cli.command, config, Arc::new(store)).await
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), continuing with in-memory store",
                e
            );
            run(cli.command, config, Arc::new(MemoryStore::new())).await
        }
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("signalbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run<S: TradingStore>(command: Command, config: AppConfig, store: Arc<S>) -> Result<()> {
    let client = BinanceClient::new(config.binance_base_url.clone())?;

    match command {
        Command::Signal => show_signal(&config, store.as_ref()).await,
        Command::Tick => {
            let ledger = restore_ledger(&config, store.as_ref()).await?;
            let cycle = TradingCycle::new(client, store, ledger, &config);
            let report = cycle.run_once().await?;

            for closed in &report.closed_by_risk {
                println!("Risk exit: {}", closed.message);
            }
            println!("{}", report.message);
            Ok(())
        }
        Command::Backtest {
            from,
            to,
            capital,
            symbol,
            timeframe,
        } => {
            let symbol = symbol.unwrap_or_else(|| config.symbol.clone());
            let timeframe = timeframe.unwrap_or(config.timeframe);
            let capital = capital.unwrap_or(config.initial_capital);
            let range = CandleRange {
                from,
                to,
                limit: None,
            };
            backtest(&config, &client, store.as_ref(), &symbol, timeframe, range, capital).await
        }
        Command::Positions => {
            let ledger = restore_ledger(&config, store.as_ref()).await?;
            let open = ledger.get_open_positions(None);

            println!("\n📂 Open positions: {}", open.len());
            for p in &open {
                println!(
                    "   {} {} {} {:.6} @ ${:.2} (SL {} / TP {}) opened {}",
                    p.id,
                    p.side,
                    p.symbol,
                    p.size,
                    p.open_price,
                    fmt_level(p.stop_loss),
                    fmt_level(p.take_profit),
                    p.open_time.format("%Y-%m-%d %H:%M")
                );
            }

            let summary = ledger.portfolio_summary(None);
            println!("\n💼 Portfolio");
            println!(
                "   Trades: {} ({} winners, {:.1}% win rate)",
                summary.total_trades, summary.winning_trades, summary.win_rate
            );
            println!(
                "   Realized P&L: ${:.2} ({:.2}%)",
                summary.total_pnl, summary.total_pnl_pct
            );
            println!("   Capital: ${:.2}", summary.capital);
            Ok(())
        }
        Command::Close { id } => {
            let ledger = restore_ledger(&config, store.as_ref()).await?;
            let Some(position) = ledger.get_position(id) else {
                return Err(format!("Position {} not found", id).into());
            };

            let price = client.current_price(&position.symbol).await?;
            let result = ledger.close_position(id, price, "Manual close");
            if !result.success {
                return Err(result.message.into());
            }

            if !record_closed(store.as_ref(), &ledger, &result).await? {
                return Err(format!("Position {} was already closed", id).into());
            }
            println!("{}", result.message);
            Ok(())
        }
    }
}

async fn restore_ledger<S: TradingStore>(config: &AppConfig, store: &S) -> Result<Arc<PositionLedger>> {
    let positions = store.load_positions().await?;
    let trades = store.load_trades(Some(false)).await?;
    Ok(Arc::new(PositionLedger::with_history(
        config.initial_capital,
        positions,
        trades,
    )))
}

async fn show_signal<S: TradingStore>(config: &AppConfig, store: &S) -> Result<()> {
    let candles = store
        .load_candles(&config.symbol, config.timeframe, CandleRange::latest(SIGNAL_HISTORY))
        .await?;
    let Some(last) = candles.last() else {
        println!("No candles stored for {} {}", config.symbol, config.timeframe);
        return Ok(());
    };

    let generator = SignalGenerator::new(config.strategy_params());
    let signal = generator.generate(&candles, last.close);

    println!(
        "\n📡 {} {} @ ${:.2} (confidence {:.2})",
        config.symbol, signal.action, signal.price, signal.confidence
    );
    for reason in &signal.reasoning {
        println!("   - {}", reason);
    }
    Ok(())
}

async fn backtest<S: TradingStore>(
    config: &AppConfig,
    client: &BinanceClient,
    store: &S,
    symbol: &str,
    timeframe: Timeframe,
    range: CandleRange,
    capital: f64,
) -> Result<()> {
    match client.fetch_candles(symbol, timeframe, BACKTEST_FETCH_LIMIT).await {
        Ok(candles) => match store.save_candles(symbol, timeframe, &candles).await {
            Ok(inserted) => {
                tracing::info!("Fetched {} candles ({} new)", candles.len(), inserted)
            }
            Err(e) => tracing::warn!("Failed to store candles, using stored data: {}", e),
        },
        Err(e) => tracing::warn!("Failed to fetch candles, using stored data: {:#}", e),
    }

    let candles = store.load_candles(symbol, timeframe, range).await?;
    tracing::info!("Backtesting {} {} over {} candles", symbol, timeframe, candles.len());

    let result = run_backtest(
        &candles,
        config.strategy_params(),
        config.risk_params(),
        capital,
        symbol,
    )?;

    for trade in &result.trades {
        if let Err(e) = store.save_trade(trade).await {
            tracing::warn!("Failed to save backtest trade {}: {}", trade.id, e);
        }
    }

    result.print_report();
    Ok(())
}

fn fmt_level(level: Option<f64>) -> String {
    level.map_or_else(|| "-".to_string(), |l| format!("${:.2}", l))
}
