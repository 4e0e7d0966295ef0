use signalbot::backtest::{BacktestResult, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use signalbot::{Result, RiskParams, SignalGenerator, StrategyParams};

const CANDLES_PER_SCENARIO: usize = 500;
const INTERVAL_MINUTES: i64 = 60;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("signalbot=info")
        .init();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║          SIGNALBOT BACKTESTING SUITE                  ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let initial_capital = 10000.0;
    let strategy = SignalGenerator::new(StrategyParams::default());
    let runner = BacktestRunner::new(initial_capital, RiskParams::default());

    let mut all_results = Vec::new();

    for scenario in MarketScenario::ALL {
        // Same seed per scenario so runs are comparable
        let mut generator = SyntheticDataGenerator::new(42);
        let candles = generator.generate(scenario, CANDLES_PER_SCENARIO, INTERVAL_MINUTES);

        match runner.run_and_report(&strategy, &candles, "SYNTH/USDT", scenario.name()) {
            Ok(result) => all_results.push((scenario.name(), result)),
            Err(e) => eprintln!("❌ Backtest failed for {}: {}", scenario.name(), e),
        }
    }

    print_summary_comparison(&all_results);

    Ok(())
}

fn print_summary_comparison(results: &[(&str, BacktestResult)]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SCENARIO COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<14} {:>10} {:>9} {:>7} {:>7} {:>8} {:>8}",
        "Scenario", "P&L", "Return%", "Trades", "Win%", "MaxDD%", "Sharpe"
    );
    println!("{}", "─".repeat(70));

    for (name, result) in results {
        println!(
            "{:<14} {:>10.2} {:>9.2} {:>7} {:>7.1} {:>8.2} {:>8.2}",
            name,
            result.total_pnl,
            result.total_pnl_pct,
            result.total_trades,
            result.win_rate,
            result.max_drawdown_pct,
            result.sharpe_ratio
        );
    }

    println!();

    let by_return = |a: &&(&str, BacktestResult), b: &&(&str, BacktestResult)| {
        a.1.total_pnl_pct.total_cmp(&b.1.total_pnl_pct)
    };

    if let Some((name, best)) = results.iter().max_by(by_return) {
        println!("🏆 Best Scenario: {} ({:+.2}%)", name, best.total_pnl_pct);
    }
    if let Some((name, worst)) = results.iter().min_by(by_return) {
        println!("⚠️  Worst Scenario: {} ({:+.2}%)", name, worst.total_pnl_pct);
    }

    let total_trades: usize = results.iter().map(|(_, r)| r.total_trades).sum();
    let avg_win_rate = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|(_, r)| r.win_rate).sum::<f64>() / results.len() as f64
    };

    println!("\n📊 Overall Statistics:");
    println!("   Total Trades Across All Scenarios: {}", total_trades);
    println!("   Average Win Rate: {:.1}%", avg_win_rate);

    println!("\n═══════════════════════════════════════════════════════\n");
}
