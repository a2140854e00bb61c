//! Liquidity Tracker
//!
//! Registry of liquidity zones per timeframe:
//! - FVG / implied FVG (bullish and bearish), mitigated once price trades
//!   through their midpoint after a cooldown
//! - previous bar highs/lows (one-tick bands)
//! - confirmed swing highs/lows
//!
//! Zones are append-only; the only mutation is the one-way mitigation flag,
//! so a `ZoneId` (kind + index) stays valid for the tracker's lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use super::aggregator::push_bounded;
use super::candle::{Candle, Timeframe};
use super::config::EngineConfig;
use super::implied_fvg::{GapDirection, ImpliedFvgDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    BullishFvg,
    BearishFvg,
    BullishIfvg,
    BearishIfvg,
    PreviousHigh,
    PreviousLow,
    SwingHigh,
    SwingLow,
}

impl ZoneKind {
    pub const ALL: [ZoneKind; 8] = [
        ZoneKind::BullishFvg,
        ZoneKind::BearishFvg,
        ZoneKind::BullishIfvg,
        ZoneKind::BearishIfvg,
        ZoneKind::PreviousHigh,
        ZoneKind::PreviousLow,
        ZoneKind::SwingHigh,
        ZoneKind::SwingLow,
    ];

    /// Kinds subject to mitigation
    pub const GAPS: [ZoneKind; 4] = [
        ZoneKind::BullishFvg,
        ZoneKind::BearishFvg,
        ZoneKind::BullishIfvg,
        ZoneKind::BearishIfvg,
    ];

    pub fn is_bullish_gap(self) -> bool {
        matches!(self, ZoneKind::BullishFvg | ZoneKind::BullishIfvg)
    }

    pub fn is_bearish_gap(self) -> bool {
        matches!(self, ZoneKind::BearishFvg | ZoneKind::BearishIfvg)
    }
}

impl std::fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ZoneKind::BullishFvg => "bullish_fvg",
            ZoneKind::BearishFvg => "bearish_fvg",
            ZoneKind::BullishIfvg => "bullish_ifvg",
            ZoneKind::BearishIfvg => "bearish_ifvg",
            ZoneKind::PreviousHigh => "previous_high",
            ZoneKind::PreviousLow => "previous_low",
            ZoneKind::SwingHigh => "swing_high",
            ZoneKind::SwingLow => "swing_low",
        };
        write!(f, "{}", s)
    }
}

/// Stable handle to a zone in the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId {
    pub kind: ZoneKind,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub kind: ZoneKind,
    pub timeframe: Timeframe,
    pub price_high: f64,
    pub price_low: f64,
    pub midpoint: f64,
    pub created_at: DateTime<Utc>,
    pub source_candle: Candle,
    pub mitigated: bool,
    pub mitigated_at: Option<DateTime<Utc>>,
    pub symbol: String,
}

impl LiquidityZone {
    /// Build a zone from two edges in either order; midpoint is their average
    pub fn new(
        kind: ZoneKind,
        timeframe: Timeframe,
        edge_a: f64,
        edge_b: f64,
        created_at: DateTime<Utc>,
        source_candle: Candle,
        symbol: &str,
    ) -> Self {
        let price_high = edge_a.max(edge_b);
        let price_low = edge_a.min(edge_b);
        Self {
            kind,
            timeframe,
            price_high,
            price_low,
            midpoint: (price_high + price_low) / 2.0,
            created_at,
            source_candle,
            mitigated: false,
            mitigated_at: None,
            symbol: symbol.to_string(),
        }
    }

    pub fn with_midpoint(mut self, midpoint: f64) -> Self {
        self.midpoint = midpoint;
        self
    }

    pub fn contains(&self, price: f64) -> bool {
        self.price_low <= price && price <= self.price_high
    }

    fn mark_mitigated(&mut self, at: DateTime<Utc>) {
        self.mitigated = true;
        self.mitigated_at = Some(at);
    }
}

/// Unmitigated gap counts plus structural zone counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySummary {
    pub bullish_fvg: usize,
    pub bearish_fvg: usize,
    pub bullish_ifvg: usize,
    pub bearish_ifvg: usize,
    pub previous_highs: usize,
    pub previous_lows: usize,
    pub swing_highs: usize,
    pub swing_lows: usize,
    pub total_active: usize,
}

impl std::fmt::Display for LiquiditySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FVG +{}/-{} | IFVG +{}/-{} | PrevH {} PrevL {} | SwingH {} SwingL {} | Active {}",
            self.bullish_fvg,
            self.bearish_fvg,
            self.bullish_ifvg,
            self.bearish_ifvg,
            self.previous_highs,
            self.previous_lows,
            self.swing_highs,
            self.swing_lows,
            self.total_active
        )
    }
}

/// Classic three-bar FVG between bar A and bar C
pub fn detect_fvg(a: &Candle, c: &Candle, timeframe: Timeframe, symbol: &str) -> Option<LiquidityZone> {
    if c.low > a.high {
        let gap = c.low - a.high;
        Some(
            LiquidityZone::new(ZoneKind::BullishFvg, timeframe, c.low, a.high, a.timestamp, a.clone(), symbol)
                .with_midpoint(a.high + gap / 2.0),
        )
    } else if c.high < a.low {
        let gap = a.low - c.high;
        Some(
            LiquidityZone::new(ZoneKind::BearishFvg, timeframe, a.low, c.high, a.timestamp, a.clone(), symbol)
                .with_midpoint(a.low - gap / 2.0),
        )
    } else {
        None
    }
}

/// Low at `k` strictly below the `look_back` bars on each side
pub fn is_swing_low(candles: &[Candle], k: usize, look_back: usize) -> bool {
    if look_back == 0 || candles.len() < 2 * look_back + 1 || k < look_back || k + look_back >= candles.len() {
        return false;
    }
    let low = candles[k].low;
    (1..=look_back).all(|j| low < candles[k - j].low && low < candles[k + j].low)
}

pub fn is_swing_high(candles: &[Candle], k: usize, look_back: usize) -> bool {
    if look_back == 0 || candles.len() < 2 * look_back + 1 || k < look_back || k + look_back >= candles.len() {
        return false;
    }
    let high = candles[k].high;
    (1..=look_back).all(|j| high > candles[k - j].high && high > candles[k + j].high)
}

pub struct LiquidityTracker {
    tick_size: f64,
    look_back: usize,
    cooldown: Duration,
    zones: HashMap<ZoneKind, Vec<LiquidityZone>>,
    history_1min: VecDeque<Candle>,
    history_5min: VecDeque<Candle>,
    max_1min: usize,
    max_5min: usize,
}

impl LiquidityTracker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tick_size: config.tick_size,
            look_back: config.swing_look_back,
            cooldown: config.mitigation_cooldown(),
            zones: ZoneKind::ALL.iter().map(|k| (*k, Vec::new())).collect(),
            history_1min: VecDeque::with_capacity(config.max_1min_history),
            history_5min: VecDeque::with_capacity(config.max_5min_history),
            max_1min: config.max_1min_history,
            max_5min: config.max_5min_history,
        }
    }

    /// Register an externally supplied zone (or a detected one)
    pub fn add_zone(&mut self, zone: LiquidityZone) {
        debug!(
            "ZONE: {} {} [{:.2} - {:.2}] mid {:.2}",
            zone.timeframe, zone.kind, zone.price_low, zone.price_high, zone.midpoint
        );
        self.zones.entry(zone.kind).or_default().push(zone);
    }

    fn previous_extreme_zones(&self, candle: &Candle, timeframe: Timeframe, symbol: &str) -> [LiquidityZone; 2] {
        [
            LiquidityZone::new(
                ZoneKind::PreviousHigh,
                timeframe,
                candle.high - self.tick_size,
                candle.high,
                candle.timestamp,
                candle.clone(),
                symbol,
            )
            .with_midpoint(candle.high),
            LiquidityZone::new(
                ZoneKind::PreviousLow,
                timeframe,
                candle.low,
                candle.low + self.tick_size,
                candle.timestamp,
                candle.clone(),
                symbol,
            )
            .with_midpoint(candle.low),
        ]
    }

    fn swing_zones(&self, candles: &[Candle], k: usize, timeframe: Timeframe, symbol: &str) -> Vec<LiquidityZone> {
        let mut zones = Vec::new();
        let c = &candles[k];
        if is_swing_high(candles, k, self.look_back) {
            zones.push(LiquidityZone::new(ZoneKind::SwingHigh, timeframe, c.high, c.high, c.timestamp, c.clone(), symbol));
        }
        if is_swing_low(candles, k, self.look_back) {
            zones.push(LiquidityZone::new(ZoneKind::SwingLow, timeframe, c.low, c.low, c.timestamp, c.clone(), symbol));
        }
        zones
    }

    /// Batch-load closed 5-minute bars, then replay them for mitigation.
    ///
    /// Returns the number of zones added.
    pub fn add_historical_data(&mut self, candles: &[Candle], symbol: &str) -> usize {
        let timeframe = Timeframe::FiveMinute;
        let mut found = Vec::new();

        for i in 0..candles.len().saturating_sub(2) {
            if let Some(zone) = detect_fvg(&candles[i], &candles[i + 2], timeframe, symbol) {
                found.push(zone);
            }
        }

        for gap in ImpliedFvgDetector::scan(candles) {
            found.push(ifvg_zone(&gap, timeframe, symbol));
        }

        for candle in candles {
            found.extend(self.previous_extreme_zones(candle, timeframe, symbol));
        }

        for k in 0..candles.len() {
            found.extend(self.swing_zones(candles, k, timeframe, symbol));
        }

        let added = found.len();
        for zone in found {
            self.add_zone(zone);
        }

        let mut mitigated = 0;
        for candle in candles {
            mitigated += self.check_and_mark_mitigation(candle);
        }

        for candle in candles {
            push_bounded(&mut self.history_5min, candle.clone(), self.max_5min);
        }

        info!(
            "Loaded {} historical 5min bars: {} zones, {} mitigated",
            candles.len(),
            added,
            mitigated
        );
        added
    }

    /// Seed closed-bar history without running detection
    pub fn seed_history(&mut self, timeframe: Timeframe, candles: &[Candle]) {
        for candle in candles {
            match timeframe {
                Timeframe::OneMinute => push_bounded(&mut self.history_1min, candle.clone(), self.max_1min),
                Timeframe::FiveMinute => push_bounded(&mut self.history_5min, candle.clone(), self.max_5min),
            }
        }
    }

    /// Incremental detection for one closed bar. Returns zones added.
    pub fn process_candle(&mut self, candle: &Candle, timeframe: Timeframe, symbol: &str) -> usize {
        let window = (2 * self.look_back + 1).max(3);
        let tail: Vec<Candle> = {
            let (history, cap) = match timeframe {
                Timeframe::OneMinute => (&mut self.history_1min, self.max_1min),
                Timeframe::FiveMinute => (&mut self.history_5min, self.max_5min),
            };
            push_bounded(history, candle.clone(), cap);
            let skip = history.len().saturating_sub(window);
            history.iter().skip(skip).cloned().collect()
        };

        let mut found = Vec::new();
        let len = tail.len();

        if len >= 3 {
            let (a, b, c) = (&tail[len - 3], &tail[len - 2], &tail[len - 1]);
            if let Some(zone) = detect_fvg(a, c, timeframe, symbol) {
                found.push(zone);
            }
            if let Some(gap) = ImpliedFvgDetector::detect(a, b, c, 0) {
                found.push(ifvg_zone(&gap, timeframe, symbol));
            }
        }

        if len >= 2 * self.look_back + 1 {
            found.extend(self.swing_zones(&tail, len - 1 - self.look_back, timeframe, symbol));
        }

        found.extend(self.previous_extreme_zones(candle, timeframe, symbol));

        let added = found.len();
        for zone in found {
            self.add_zone(zone);
        }
        added
    }

    /// Mark gaps whose midpoint this bar traded through. Returns the count marked.
    pub fn check_and_mark_mitigation(&mut self, candle: &Candle) -> usize {
        let cutoff = candle.timestamp - self.cooldown;
        let mut marked = 0;

        for kind in ZoneKind::GAPS {
            if let Some(zones) = self.zones.get_mut(&kind) {
                for zone in zones.iter_mut() {
                    if zone.mitigated || zone.created_at >= cutoff {
                        continue;
                    }
                    if candle.low <= zone.midpoint && zone.midpoint <= candle.high {
                        zone.mark_mitigated(candle.timestamp);
                        marked += 1;
                        debug!(
                            "MITIGATED: {} {} mid {:.2} by bar {}",
                            zone.timeframe, zone.kind, zone.midpoint, candle.timestamp
                        );
                    }
                }
            }
        }
        marked
    }

    fn active_gaps<'a>(
        &'a self,
        bullish: bool,
        timeframe: Option<Timeframe>,
    ) -> impl Iterator<Item = (ZoneId, &'a LiquidityZone)> + 'a {
        ZoneKind::GAPS
            .into_iter()
            .filter(move |k| if bullish { k.is_bullish_gap() } else { k.is_bearish_gap() })
            .flat_map(move |kind| {
                self.zones(kind)
                    .iter()
                    .enumerate()
                    .map(move |(index, zone)| (ZoneId { kind, index }, zone))
            })
            .filter(move |(_, z)| !z.mitigated && timeframe.map_or(true, |tf| z.timeframe == tf))
    }

    /// Nearest unmitigated bullish gap with midpoint below `price`
    pub fn find_nearest_bullish_target(&self, price: f64, timeframe: Option<Timeframe>) -> Option<&LiquidityZone> {
        self.active_gaps(true, timeframe)
            .map(|(_, z)| z)
            .filter(|z| z.midpoint < price)
            .min_by(|a, b| (price - a.midpoint).total_cmp(&(price - b.midpoint)))
    }

    /// Nearest unmitigated bearish gap with midpoint above `price`
    pub fn find_nearest_bearish_target(&self, price: f64, timeframe: Option<Timeframe>) -> Option<&LiquidityZone> {
        self.active_gaps(false, timeframe)
            .map(|(_, z)| z)
            .filter(|z| z.midpoint > price)
            .min_by(|a, b| (a.midpoint - price).total_cmp(&(b.midpoint - price)))
    }

    /// Unmitigated bullish FVG + IFVG zones
    pub fn bullish_zones(&self, timeframe: Option<Timeframe>) -> Vec<(ZoneId, &LiquidityZone)> {
        self.active_gaps(true, timeframe).collect()
    }

    pub fn zone(&self, id: ZoneId) -> Option<&LiquidityZone> {
        self.zones.get(&id.kind).and_then(|z| z.get(id.index))
    }

    pub fn zones(&self, kind: ZoneKind) -> &[LiquidityZone] {
        self.zones.get(&kind).map(|z| z.as_slice()).unwrap_or(&[])
    }

    pub fn swing_lows(&self, timeframe: Timeframe) -> impl Iterator<Item = &LiquidityZone> {
        self.zones(ZoneKind::SwingLow)
            .iter()
            .filter(move |z| z.timeframe == timeframe)
    }

    /// Swing high prices across both timeframes
    pub fn swing_high_prices(&self) -> Vec<f64> {
        self.zones(ZoneKind::SwingHigh).iter().map(|z| z.price_high).collect()
    }

    pub fn history(&self, timeframe: Timeframe) -> &VecDeque<Candle> {
        match timeframe {
            Timeframe::OneMinute => &self.history_1min,
            Timeframe::FiveMinute => &self.history_5min,
        }
    }

    pub fn liquidity_summary(&self) -> LiquiditySummary {
        let unmitigated = |kind| self.zones(kind).iter().filter(|z| !z.mitigated).count();
        let mut summary = LiquiditySummary {
            bullish_fvg: unmitigated(ZoneKind::BullishFvg),
            bearish_fvg: unmitigated(ZoneKind::BearishFvg),
            bullish_ifvg: unmitigated(ZoneKind::BullishIfvg),
            bearish_ifvg: unmitigated(ZoneKind::BearishIfvg),
            previous_highs: self.zones(ZoneKind::PreviousHigh).len(),
            previous_lows: self.zones(ZoneKind::PreviousLow).len(),
            swing_highs: self.zones(ZoneKind::SwingHigh).len(),
            swing_lows: self.zones(ZoneKind::SwingLow).len(),
            total_active: 0,
        };
        summary.total_active = summary.bullish_fvg
            + summary.bearish_fvg
            + summary.bullish_ifvg
            + summary.bearish_ifvg
            + summary.previous_highs
            + summary.previous_lows
            + summary.swing_highs
            + summary.swing_lows;
        summary
    }
}

fn ifvg_zone(gap: &super::implied_fvg::ImpliedFvg, timeframe: Timeframe, symbol: &str) -> LiquidityZone {
    let kind = match gap.direction {
        GapDirection::Bullish => ZoneKind::BullishIfvg,
        GapDirection::Bearish => ZoneKind::BearishIfvg,
    };
    LiquidityZone::new(kind, timeframe, gap.price_high, gap.price_low, gap.timestamp, gap.candle.clone(), symbol)
        .with_midpoint(gap.midpoint)
}
