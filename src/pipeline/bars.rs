//! 1-minute OHLC bar files
//!
//! Reads `timestamp,open,high,low,close[,volume]` CSVs, plain or zstd
//! compressed (`.csv.zst`). Timestamps are RFC 3339, or naive
//! `YYYY-MM-DD HH:MM:SS` interpreted in the session timezone.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use price_action_engine::trading_core::{Candle, EngineError, SessionClock, Timeframe};

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

fn is_bar_file(path: &Path) -> bool {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.ends_with(".csv") || name.ends_with(".csv.zst")
}

/// Bar files under `data` (a file or a directory), optionally filtered by a
/// substring of the file name
pub fn find_bar_files(data: &Path, filter: Option<&str>) -> Result<Vec<PathBuf>> {
    if data.is_file() {
        return Ok(vec![data.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(data)
        .with_context(|| format!("Failed to read directory: {:?}", data))?
    {
        let path = entry?.path();
        if !is_bar_file(&path) {
            continue;
        }
        if let Some(filter) = filter {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if !name.contains(filter) {
                continue;
            }
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}

pub fn parse_timestamp(raw: &str, tz: Tz) -> Result<DateTime<Utc>, EngineError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| EngineError::InvalidTimestamp(raw.to_string()))
}

/// Parse bars from any reader; output is sorted by timestamp
pub fn read_bars<R: Read>(reader: R, tz: Tz) -> Result<Vec<Candle>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();

    for (line, result) in csv_reader.deserialize().enumerate() {
        let row: BarRow = result.with_context(|| format!("Failed to parse CSV row {}", line + 1))?;
        let timestamp = parse_timestamp(&row.timestamp, tz)?;
        bars.push(Candle::new(timestamp, row.open, row.high, row.low, row.close));
    }

    bars.sort_by_key(|c| c.timestamp);
    Ok(bars)
}

pub fn load_bars(path: &Path, tz: Tz) -> Result<Vec<Candle>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;

    let compressed = path.extension().is_some_and(|ext| ext == "zst");
    let bars = if compressed {
        let decoder = zstd::stream::Decoder::new(file)
            .with_context(|| format!("Failed to create zstd decoder for: {:?}", path))?;
        read_bars(BufReader::new(decoder), tz)
    } else {
        read_bars(BufReader::new(file), tz)
    }
    .with_context(|| format!("Failed to load bars from {:?}", path))?;

    tracing::debug!("Loaded {} bars from {:?}", bars.len(), path);
    Ok(bars)
}

/// Group sorted bars by local trading date
pub fn split_sessions(bars: &[Candle], clock: &SessionClock) -> Vec<(NaiveDate, Vec<Candle>)> {
    let mut days: Vec<(NaiveDate, Vec<Candle>)> = Vec::new();
    for bar in bars {
        let date = clock.session_date(bar.timestamp);
        match days.last_mut() {
            Some((d, day)) if *d == date => day.push(bar.clone()),
            _ => days.push((date, vec![bar.clone()])),
        }
    }
    days
}

/// Fold 1-minute bars into session-anchored 5-minute bars; pre-open bars are dropped
pub fn resample_5min(bars: &[Candle], clock: &SessionClock) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();
    for bar in bars {
        let Some(bucket) = clock.bucket_start(bar.timestamp, Timeframe::FiveMinute.duration()) else {
            continue;
        };
        match out.last_mut() {
            Some(five) if five.timestamp == bucket => {
                five.high = five.high.max(bar.high);
                five.low = five.low.min(bar.low);
                five.close = bar.close;
            }
            _ => out.push(Candle::new(bucket, bar.open, bar.high, bar.low, bar.close)),
        }
    }
    out
}
