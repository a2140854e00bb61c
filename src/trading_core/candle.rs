//! Candle types for trading core
//!
//! - `Candle`: OHLC bar with body/range classification
//! - `Ohlc`: bare price tuple used when feeding pre-formed bars
//! - `Timeframe`: the two bar widths the engine tracks

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Body percentage at or above which a candle is directional
pub const DIRECTIONAL_BODY_PCT: f64 = 70.0;

/// Candle classification by body-to-range ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleType {
    Bull,
    Bear,
    Neutral,
}

impl CandleType {
    /// Bear and neutral bars both arm sweep targets and extend bear runs
    pub fn is_bear_or_neutral(self) -> bool {
        matches!(self, CandleType::Bear | CandleType::Neutral)
    }
}

impl std::fmt::Display for CandleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandleType::Bull => write!(f, "BULL"),
            CandleType::Bear => write!(f, "BEAR"),
            CandleType::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Bar width tracked by the aggregator and the liquidity tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinute,
}

impl Timeframe {
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::OneMinute => Duration::minutes(1),
            Timeframe::FiveMinute => Duration::minutes(5),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeframe::OneMinute => write!(f, "1min"),
            Timeframe::FiveMinute => write!(f, "5min"),
        }
    }
}

/// Open/high/low/close without a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Ohlc {
    pub fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { open, high, low, close }
    }

    /// Degenerate bar for a single price
    pub fn flat(price: f64) -> Self {
        Self::new(price, price, price, price)
    }
}

/// OHLC candle. Only the forming candle is ever mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { timestamp, open, high, low, close }
    }

    pub fn from_ohlc(timestamp: DateTime<Utc>, ohlc: Ohlc) -> Self {
        Self::new(timestamp, ohlc.open, ohlc.high, ohlc.low, ohlc.close)
    }

    pub fn ohlc(&self) -> Ohlc {
        Ohlc::new(self.open, self.high, self.low, self.close)
    }

    /// Fold a new trade price into the forming candle
    pub fn update_price(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    /// Body as a percentage of range (0 for a zero-range candle)
    pub fn body_pct(&self) -> f64 {
        let range = self.range();
        if range == 0.0 {
            0.0
        } else {
            self.body() / range * 100.0
        }
    }

    pub fn classify(&self) -> CandleType {
        let body_pct = self.body_pct();
        if self.close > self.open && body_pct >= DIRECTIONAL_BODY_PCT {
            CandleType::Bull
        } else if self.open > self.close && body_pct >= DIRECTIONAL_BODY_PCT {
            CandleType::Bear
        } else {
            CandleType::Neutral
        }
    }

    /// Raw close-over-open direction, independent of body size
    pub fn closed_up(&self) -> bool {
        self.close > self.open
    }

    pub fn closed_down(&self) -> bool {
        self.close < self.open
    }
}

impl std::fmt::Display for Candle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} O:{:.2} H:{:.2} L:{:.2} C:{:.2}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.open,
            self.high,
            self.low,
            self.close
        )
    }
}
