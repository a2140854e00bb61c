mod bars;
mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use price_action_engine::trading_core::{
    AccountConfig, EngineConfig, ImpliedFvgDetector, LiquidityTracker,
};

use replay::ReplayOptions;

#[derive(Parser, Debug)]
#[command(name = "pipeline")]
#[command(about = "Price-action engine replay & liquidity scan pipeline")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON engine config (missing fields use defaults)
    #[arg(short, long, global = true, env = "ENGINE_CONFIG")]
    config: Option<PathBuf>,

    /// Instrument symbol (overrides config and SYMBOL)
    #[arg(long, global = true)]
    symbol: Option<String>,

    /// Tick size (overrides config and TICK_SIZE)
    #[arg(long, global = true)]
    tick_size: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay 1-minute OHLC files through the engine with paper execution
    Replay {
        /// Bar file (.csv / .csv.zst) or directory of them
        #[arg(short, long, default_value = "data")]
        data: PathBuf,

        /// Only replay files whose name contains this string (e.g., a date)
        #[arg(short = 'D', long)]
        date: Option<String>,

        /// Leading days of each file used only to seed history
        #[arg(long, default_value = "1")]
        warmup_days: usize,

        /// Write per-file results and trades as JSON (.zst to compress)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Starting balance (overrides ACCT_START_BALANCE)
        #[arg(long)]
        starting_balance: Option<f64>,

        /// Units per lot (overrides LOT_SIZE)
        #[arg(long)]
        lot_size: Option<f64>,
    },

    /// Detect liquidity zones and implied FVGs on 5-minute bars
    Scan {
        /// Bar file (.csv / .csv.zst)
        #[arg(short, long)]
        data: PathBuf,

        /// Max implied FVGs to list
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let engine_config = load_engine_config(&args)?;

    match args.command {
        Commands::Replay { data, date, warmup_days, output, starting_balance, lot_size } => {
            let mut account = AccountConfig::default();
            account.apply_env()?;
            if let Some(balance) = starting_balance {
                account.starting_balance = balance;
            }
            if let Some(lot) = lot_size {
                account.lot_size = lot;
            }
            account.validate()?;

            let opts = ReplayOptions {
                engine: engine_config,
                account,
                warmup_days,
            };
            run_replay(&data, date.as_deref(), output.as_deref(), &opts)?;
        }
        Commands::Scan { data, limit } => {
            run_scan(&data, limit, &engine_config)?;
        }
    }

    Ok(())
}

/// Defaults, then JSON file, then environment, then flags
fn load_engine_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => EngineConfig::default(),
    };
    config.apply_env()?;
    if let Some(symbol) = &args.symbol {
        config.symbol = symbol.clone();
    }
    if let Some(tick) = args.tick_size {
        config.tick_size = tick;
    }
    config.validate()?;
    Ok(config)
}

fn run_replay(data: &Path, date: Option<&str>, output: Option<&Path>, opts: &ReplayOptions) -> Result<()> {
    let files = bars::find_bar_files(data, date)?;
    info!("Found {} bar files in {:?}", files.len(), data);

    let results = replay::run_replay(&files, opts)?;
    replay::print_results(&results);

    if let Some(path) = output {
        replay::write_trade_log(&results, path)?;
    }
    Ok(())
}

fn run_scan(data: &Path, limit: usize, config: &EngineConfig) -> Result<()> {
    let clock = config.session_clock();
    let bars_1min = bars::load_bars(data, config.session_tz)?;
    let bars_5min = bars::resample_5min(&bars_1min, &clock);
    info!("Loaded {} 1min bars -> {} 5min bars", bars_1min.len(), bars_5min.len());

    let mut tracker = LiquidityTracker::new(config);
    let added = tracker.add_historical_data(&bars_5min, &config.symbol);
    let ifvgs = ImpliedFvgDetector::scan(&bars_5min);

    println!("\n═══════════════════════════════════════════════════════════");
    println!("  LIQUIDITY SCAN: {}", data.display());
    println!("═══════════════════════════════════════════════════════════\n");
    println!("Zones detected:    {}", added);
    println!("Summary:           {}", tracker.liquidity_summary());
    println!();
    println!("Implied FVGs:      {}", ifvgs.len());

    for gap in ifvgs.iter().rev().take(limit) {
        println!(
            "  {} {:<8} [{:.2} - {:.2}] mid {:.2}",
            gap.timestamp, gap.direction, gap.price_low, gap.price_high, gap.midpoint
        );
    }

    println!("\n═══════════════════════════════════════════════════════════\n");
    Ok(())
}
