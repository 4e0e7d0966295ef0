use crate::models::{EquityPoint, Trade};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Annualization factor for the Sharpe ratio, applied regardless of candle timeframe
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Complete backtest result: performance metrics, trade list and equity curve
///
/// Output-only: an infinite profit factor serializes as JSON `null`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BacktestResult {
    // Trade Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // P&L Metrics
    #[serde(rename = "totalPnL")]
    pub total_pnl: f64,
    #[serde(rename = "totalPnLPct")]
    pub total_pnl_pct: f64,

    // Risk Metrics
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,

    // P&L Distribution
    pub profit_factor: f64, // Gross profit / gross loss
    pub average_win: f64,
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,

    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub periods: usize,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl BacktestResult {
    /// Calculate metrics once over the full trade list and equity curve
    pub fn from_run(
        trades: Vec<Trade>,
        equity_curve: Vec<EquityPoint>,
        initial_capital: f64,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        let total_trades = trades.len();

        // Win/Loss statistics (break-even trades count as neither)
        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|&p| p < 0.0).collect();

        let win_rate = if total_trades > 0 {
            (wins.len() as f64 / total_trades as f64) * 100.0
        } else {
            0.0
        };

        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let total_pnl_pct = (total_pnl / initial_capital) * 100.0;

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum::<f64>().abs();

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let average_win = if wins.is_empty() {
            0.0
        } else {
            gross_profit / wins.len() as f64
        };
        let average_loss = if losses.is_empty() {
            0.0
        } else {
            gross_loss / losses.len() as f64
        };

        let largest_win = wins.iter().copied().fold(None, max_of).unwrap_or(0.0);
        let largest_loss = losses.iter().copied().fold(None, min_of).unwrap_or(0.0);

        let max_drawdown_pct = equity_curve
            .iter()
            .map(|e| e.drawdown_pct)
            .fold(None, max_of)
            .unwrap_or(0.0);
        let peak_equity = equity_curve
            .iter()
            .map(|e| e.equity)
            .fold(None, max_of)
            .unwrap_or(0.0);
        let max_drawdown = (max_drawdown_pct / 100.0) * peak_equity;

        let sharpe_ratio = Self::calculate_sharpe_ratio(&equity_curve);

        Self {
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            total_pnl,
            total_pnl_pct,
            max_drawdown,
            max_drawdown_pct,
            sharpe_ratio,
            profit_factor,
            average_win,
            average_loss,
            largest_win,
            largest_loss,
            trades,
            periods: equity_curve.len(),
            equity_curve,
            start_date,
            end_date,
        }
    }

    /// Annualized Sharpe ratio of step-to-step equity returns
    ///
    /// Risk-free rate of 0 and a fixed 252-period year.
    fn calculate_sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
        let returns: Vec<f64> = equity_curve
            .windows(2)
            .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
            .collect();

        if returns.is_empty() {
            return 0.0;
        }

        let mean_return = returns.iter().sum::<f64>() / returns.len() as f64;

        // Population standard deviation
        let variance = returns
            .iter()
            .map(|r| {
                let diff = r - mean_return;
                diff * diff
            })
            .sum::<f64>()
            / returns.len() as f64;

        let std_dev = variance.sqrt();

        if std_dev > 0.0 {
            (mean_return * PERIODS_PER_YEAR) / (std_dev * PERIODS_PER_YEAR.sqrt())
        } else {
            0.0
        }
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!(
            "📅 PERIOD: {} → {} ({} steps)",
            self.start_date.format("%Y-%m-%d %H:%M"),
            self.end_date.format("%Y-%m-%d %H:%M"),
            self.periods
        );

        println!("\n📊 P&L SUMMARY");
        println!(
            "  Total P&L:             ${:.2} ({:+.2}%)",
            self.total_pnl, self.total_pnl_pct
        );

        println!("\n📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);

        if self.total_trades > 0 {
            println!("\n💰 WIN/LOSS ANALYSIS");
            println!("  Average Win:           ${:.2}", self.average_win);
            println!("  Average Loss:          ${:.2}", self.average_loss);
            println!("  Largest Win:           ${:.2}", self.largest_win);
            println!("  Largest Loss:          ${:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
        }

        println!("\n⚠️  RISK METRICS");
        println!(
            "  Max Drawdown:          ${:.2} ({:.2}%)",
            self.max_drawdown, self.max_drawdown_pct
        );
        println!("  Sharpe Ratio:          {:.2}", self.sharpe_ratio);

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}

fn max_of(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}

fn min_of(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.min(v)))
}
