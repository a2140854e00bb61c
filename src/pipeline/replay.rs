//! Replay Module
//!
//! Runs historical 1-minute bars through the live engine code path with the
//! paper `PositionManager` as observer.
//!
//! - Files are independent and replayed in parallel (one engine per file)
//! - Days inside a file run in order; every rollover flattens and resets
//! - The first `warmup_days` of each file only seed history (no trading)

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use price_action_engine::trading_core::position::ClosedTrade;
use price_action_engine::trading_core::{
    AccountConfig, Engine, EngineConfig, PositionManager, TradeAction, TradingSummary,
};

use super::bars::{load_bars, resample_5min, split_sessions};

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub engine: EngineConfig,
    pub account: AccountConfig,
    pub warmup_days: usize,
}

#[derive(Debug, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub days: usize,
    pub bars: usize,
    pub entries: usize,
    pub summary: TradingSummary,
    pub trades: Vec<ClosedTrade>,
}

/// Replay one bar file end to end
pub fn replay_file(path: &Path, opts: &ReplayOptions) -> Result<FileResult> {
    let clock = opts.engine.session_clock();
    let bars = load_bars(path, opts.engine.session_tz)?;
    let days = split_sessions(&bars, &clock);

    let mut engine = Engine::new(opts.engine.clone(), PositionManager::new(opts.account.clone()))
        .with_context(|| format!("Failed to build engine for {:?}", path))?;

    let warmup = opts.warmup_days.min(days.len().saturating_sub(1));
    if warmup > 0 {
        let history: Vec<_> = days[..warmup].iter().flat_map(|(_, day)| day.iter().cloned()).collect();
        let history_5min = resample_5min(&history, &clock);
        engine.initialize_with_history(&history_5min, &history)?;
        info!("{:?}: warmed up on {} days ({} bars)", path, warmup, history.len());
    }

    let mut total_bars = 0;
    let mut entries = 0;

    for (date, day) in &days[warmup..] {
        for bar in day {
            total_bars += 1;
            entries += count_entries(&engine.ingest_bar(bar.ohlc(), bar.timestamp));
        }
        entries += count_entries(&engine.flush());

        let last_price = day.last().map(|b| b.close);
        engine.reset_for_new_day(last_price);

        let in_trade = engine.manager().in_trade();
        if !engine.observer().validate_state(in_trade) {
            warn!("{}: paper position out of sync at rollover", date);
            engine.observer_mut().cleanup_orphaned();
        }
    }

    let positions = engine.into_observer();
    Ok(FileResult {
        file: path.to_path_buf(),
        days: days.len() - warmup,
        bars: total_bars,
        entries,
        summary: positions.summary(),
        trades: positions.history().to_vec(),
    })
}

fn count_entries(actions: &[TradeAction]) -> usize {
    actions.iter().filter(|a| matches!(a, TradeAction::Entered(_))).count()
}

/// Replay all files in parallel; any file error fails the run
pub fn run_replay(files: &[PathBuf], opts: &ReplayOptions) -> Result<Vec<FileResult>> {
    info!("=== REPLAY ===");
    info!("Symbol: {} | Tick: {}", opts.engine.symbol, opts.engine.tick_size);
    info!(
        "Starting balance: {:.2} | Risk/trade: {:.1}% | Lot: {}",
        opts.account.starting_balance, opts.account.fixed_sl_percentage, opts.account.lot_size
    );

    if files.is_empty() {
        anyhow::bail!("No bar files found");
    }

    files
        .par_iter()
        .map(|path| {
            let result = replay_file(path, opts);
            if let Ok(ref r) = result {
                info!(
                    "Replayed {:?}: {} days, {} bars, {} trades",
                    r.file, r.days, r.bars, r.summary.total_trades
                );
            }
            result
        })
        .collect()
}

pub fn print_results(results: &[FileResult]) {
    for r in results {
        let s = &r.summary;

        println!("\n═══════════════════════════════════════════════════════════");
        println!("  REPLAY RESULTS: {}", r.file.display());
        println!("═══════════════════════════════════════════════════════════\n");

        println!("Days / Bars:       {} / {}", r.days, r.bars);
        println!("Entries:           {} ({} rejected by sizing)", r.entries, s.entries_rejected);
        println!("Total Trades:      {}", s.total_trades);
        println!("Wins:              {} ({:.1}%)", s.wins, s.win_rate);
        println!("Losses:            {}", s.losses);
        println!("Breakevens:        {}", s.breakevens);
        println!();
        println!("Profit Factor:     {:.2}", s.profit_factor);
        println!("Avg Win:           {:.2}", s.avg_win);
        println!("Avg Loss:          {:.2}", s.avg_loss);
        println!();
        println!("Net P&L:           {:+.2}", s.net_pnl);
        println!("Final Balance:     {:.2}", s.final_balance);
        println!("Max Drawdown:      {:.2}", s.max_drawdown);
    }

    if results.len() > 1 {
        let trades: u32 = results.iter().map(|r| r.summary.total_trades).sum();
        let wins: u32 = results.iter().map(|r| r.summary.wins).sum();
        let pnl: f64 = results.iter().map(|r| r.summary.net_pnl).sum();
        println!("\n─── All files ───");
        println!("Total Trades:      {}", trades);
        println!("Wins:              {}", wins);
        println!("Net P&L:           {:+.2}", pnl);
    }

    println!("\n═══════════════════════════════════════════════════════════\n");
}

/// Write the per-file results as JSON; `.zst` paths are compressed
pub fn write_trade_log(results: &[FileResult], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(results)?;
    let bytes = if path.extension().is_some_and(|ext| ext == "zst") {
        zstd::encode_all(&json[..], 3)?
    } else {
        json
    };
    std::fs::write(path, bytes).with_context(|| format!("Failed to write trade log: {:?}", path))?;

    info!("Trade log written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SESSION: &str = "timestamp,open,high,low,close
2025-09-01 09:15:00,24730,24731,24720,24721
2025-09-01 09:16:00,24721,24722,24712,24713
2025-09-01 09:17:00,24713,24714,24706,24707
2025-09-01 09:18:00,24707,24708,24702,24703
2025-09-01 09:19:00,24703,24704,24700,24701
2025-09-01 09:20:00,24699,24700,24695,24698
2025-09-01 09:21:00,24700,24706,24700,24705
2025-09-01 09:22:00,24702,24708,24701.5,24707
";

    fn temp_file(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    fn opts() -> ReplayOptions {
        ReplayOptions {
            engine: EngineConfig::default(),
            account: AccountConfig::default(),
            warmup_days: 1,
        }
    }

    #[test]
    fn test_replay_single_session_flattens_at_close() {
        let path = temp_file("session.csv", SESSION);
        let result = replay_file(&path, &opts()).unwrap();

        // one day: no warmup, the IMPS entry is flattened at the 24707 close
        assert_eq!(result.days, 1);
        assert_eq!(result.bars, 8);
        assert_eq!(result.entries, 1);
        assert_eq!(result.summary.total_trades, 1);
        assert_eq!(result.summary.wins, 1);
        let trade = &result.trades[0];
        assert!((trade.entry - 24702.0).abs() < 1e-6);
        assert!((trade.exit - 24707.0).abs() < 1e-6);

        let log = std::env::temp_dir().join(format!("{}-log.json.zst", uuid::Uuid::new_v4()));
        write_trade_log(std::slice::from_ref(&result), &log).unwrap();
        let json = zstd::decode_all(&std::fs::read(&log).unwrap()[..]).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed[0]["summary"]["total_trades"], 1);

        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(log);
    }

    #[test]
    fn test_run_replay_requires_files() {
        assert!(run_replay(&[], &opts()).is_err());
    }
}
