//! Implied Fair Value Gap detection
//!
//! An implied FVG is a three-bar pattern where the wicks of the outer bars
//! leave an unfilled half-wick imbalance even though their ranges overlap.
//! Window: A = bar i-2, B = bar i-1, C = bar i. Detection is pure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapDirection {
    Bullish,
    Bearish,
}

impl std::fmt::Display for GapDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapDirection::Bullish => write!(f, "bullish"),
            GapDirection::Bearish => write!(f, "bearish"),
        }
    }
}

/// Search side for `find_nearest_implied_fvg`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchSide {
    Above,
    Below,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedFvg {
    /// Index of bar A in the scanned slice
    pub index: usize,
    pub candle: Candle,
    pub price_high: f64,
    pub price_low: f64,
    pub midpoint: f64,
    pub timestamp: DateTime<Utc>,
    pub direction: GapDirection,
}

pub struct ImpliedFvgDetector;

impl ImpliedFvgDetector {
    pub fn is_bullish(a: &Candle, b: &Candle, c: &Candle) -> bool {
        let a_body_high = a.body_high();
        let c_body_low = c.body_low();

        c.high > a.high
            && a.low < c.low
            && c.low <= a.high
            && a.high - a_body_high > a.body() / 2.0
            && c_body_low - c.low > c.body() / 2.0
            && c.low > b.low
            && (a.high + a_body_high) / 2.0 < (c_body_low + c.low) / 2.0
            && c.high > b.high
            && b.close > b.open
    }

    pub fn is_bearish(a: &Candle, b: &Candle, c: &Candle) -> bool {
        let a_body_low = a.body_low();
        let c_body_high = c.body_high();

        c.low < a.low
            && a.high > c.high
            && c.high >= a.low
            && a_body_low - a.low > a.body() / 2.0
            && c.high - c_body_high > c.body() / 2.0
            && c.high < b.high
            && (a_body_low + a.low) / 2.0 > (c.high + c_body_high) / 2.0
            && c.low < b.low
            && b.close < b.open
    }

    /// Check one window; `index_a` is the slice index of bar A
    pub fn detect(a: &Candle, b: &Candle, c: &Candle, index_a: usize) -> Option<ImpliedFvg> {
        let (direction, price_high, price_low) = if Self::is_bullish(a, b, c) {
            (
                GapDirection::Bullish,
                c.close - (c.close - c.low) * 0.5,
                a.close + (a.high - a.close) * 0.5,
            )
        } else if Self::is_bearish(a, b, c) {
            (
                GapDirection::Bearish,
                a.close - (a.close - a.low) * 0.5,
                c.close + (c.high - c.close) * 0.5,
            )
        } else {
            return None;
        };

        Some(ImpliedFvg {
            index: index_a,
            candle: a.clone(),
            price_high,
            price_low,
            midpoint: (price_high + price_low) / 2.0,
            timestamp: a.timestamp,
            direction,
        })
    }

    pub fn scan(candles: &[Candle]) -> Vec<ImpliedFvg> {
        candles
            .windows(3)
            .enumerate()
            .filter_map(|(i, w)| Self::detect(&w[0], &w[1], &w[2], i))
            .collect()
    }

    /// Nearest IFVG whose midpoint is strictly above/below `price`
    pub fn find_nearest_implied_fvg(
        ifvgs: &[ImpliedFvg],
        price: f64,
        side: SearchSide,
    ) -> Option<&ImpliedFvg> {
        ifvgs
            .iter()
            .filter(|g| match side {
                SearchSide::Above => g.midpoint > price,
                SearchSide::Below => g.midpoint < price,
            })
            .min_by(|x, y| {
                (x.midpoint - price)
                    .abs()
                    .total_cmp(&(y.midpoint - price).abs())
            })
    }
}
