//! Sweep state
//!
//! Tracks the sell-side liquidity level the strategy waits to see taken:
//! - armed from the low of the latest BEAR/NEUTRAL 5m bar
//! - swept when a later 1m bar trades below it
//! - refined on unswept 5m closes, invalidated by consecutive 5m closes below
//!
//! Also keeps the recent bear run and session extremes used by CISD and the
//! target ratio.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info};

use super::candle::{Candle, CandleType, Timeframe};
use super::config::EngineConfig;

#[derive(Debug, Clone, Serialize)]
pub struct SweepState {
    pub sweep_target: Option<f64>,
    pub sweep_set_time: Option<DateTime<Utc>>,
    pub target_swept: bool,
    pub sweep_invalidated: bool,
    pub closes_below_target: u32,
    pub deepest_sweep_candle: Option<Candle>,
    /// Lowest low traded below the target since it was swept
    pub sweep_low: Option<f64>,
    /// Timestamp of the 5m bar that invalidated the last target
    pub invalidated_at: Option<DateTime<Utc>>,
    pub bear_run: VecDeque<Candle>,
    pub session_high: Option<f64>,
    pub session_low: Option<f64>,
    #[serde(skip)]
    max_bear_run: usize,
    #[serde(skip)]
    invalidation_closes: u32,
}

impl SweepState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sweep_target: None,
            sweep_set_time: None,
            target_swept: false,
            sweep_invalidated: false,
            closes_below_target: 0,
            deepest_sweep_candle: None,
            sweep_low: None,
            invalidated_at: None,
            bear_run: VecDeque::with_capacity(config.max_bear_run),
            session_high: None,
            session_low: None,
            max_bear_run: config.max_bear_run,
            invalidation_closes: config.sweep_invalidation_closes,
        }
    }

    /// Armed target that has been swept and not invalidated
    pub fn is_swept(&self) -> bool {
        self.sweep_target.is_some() && self.target_swept && !self.sweep_invalidated
    }

    fn set_target(&mut self, level: f64, set_time: DateTime<Utc>) {
        self.sweep_target = Some(level);
        self.sweep_set_time = Some(set_time);
        self.target_swept = false;
        self.sweep_invalidated = false;
        self.closes_below_target = 0;
        self.deepest_sweep_candle = None;
        self.sweep_low = None;
        self.invalidated_at = None;
    }

    /// True when the sweep took out the session low itself
    pub fn swept_session_low(&self, tick_size: f64) -> bool {
        match (self.sweep_low, self.session_low) {
            (Some(swept), Some(low)) if self.is_swept() => (swept - low).abs() < tick_size,
            _ => false,
        }
    }

    /// Arm from a historical 5m bar: target is its low, live from the next bucket
    pub fn set_initial_5min_candle(&mut self, candle: &Candle) {
        self.set_target(candle.low, candle.timestamp + Timeframe::FiveMinute.duration());
        info!("SWEEP TARGET: {:.2} (initial 5min bar {})", candle.low, candle.timestamp);
    }

    /// Arm on a 1m close when there is no target and the latest 5m bar is BEAR/NEUTRAL.
    /// After an invalidation only a 5m bar closed later can arm.
    pub fn arm(&mut self, last_5min: Option<&Candle>, now: DateTime<Utc>) -> bool {
        if self.sweep_target.is_some() {
            return false;
        }
        let invalidated_at = self.invalidated_at;
        let fresh = |c: &Candle| invalidated_at.map_or(true, |at| c.timestamp > at);
        match last_5min {
            Some(c) if fresh(c) && c.classify().is_bear_or_neutral() => {
                self.set_target(c.low, now);
                info!("SWEEP TARGET: {:.2} armed from {} 5min bar", c.low, c.classify());
                true
            }
            _ => false,
        }
    }

    /// Update session extremes, bear run and sweep status for a closed 1m bar.
    ///
    /// Returns true when this bar traded below the armed target.
    pub fn on_1min_close(&mut self, candle: &Candle) -> bool {
        self.session_high = Some(self.session_high.map_or(candle.high, |h| h.max(candle.high)));
        self.session_low = Some(self.session_low.map_or(candle.low, |l| l.min(candle.low)));

        match candle.classify() {
            CandleType::Bull => self.bear_run.clear(),
            CandleType::Bear | CandleType::Neutral => {
                self.bear_run.push_back(candle.clone());
                while self.bear_run.len() > self.max_bear_run {
                    self.bear_run.pop_front();
                }
            }
        }

        let (Some(target), Some(set_time)) = (self.sweep_target, self.sweep_set_time) else {
            return false;
        };
        if self.sweep_invalidated || candle.timestamp < set_time || candle.low >= target {
            return false;
        }

        if !self.target_swept {
            info!("SWEEP: {:.2} taken by bar {} (low {:.2})", target, candle.timestamp, candle.low);
        }
        self.target_swept = true;
        self.sweep_low = Some(self.sweep_low.map_or(candle.low, |l| l.min(candle.low)));

        if candle.closed_up() {
            let deeper = match &self.deepest_sweep_candle {
                Some(existing) if existing.low <= candle.low => existing.clone(),
                _ => candle.clone(),
            };
            self.deepest_sweep_candle = Some(deeper);
        } else {
            self.deepest_sweep_candle = None;
        }
        true
    }

    /// Invalidate or refine the target on a closed 5m bar
    pub fn on_5min_close(&mut self, candle: &Candle) {
        let Some(target) = self.sweep_target else {
            return;
        };

        if self.target_swept {
            if candle.close < target {
                self.closes_below_target += 1;
                debug!(
                    "5min close {:.2} below swept target {:.2} ({}/{})",
                    candle.close, target, self.closes_below_target, self.invalidation_closes
                );
            } else {
                self.closes_below_target = 0;
            }

            if self.closes_below_target >= self.invalidation_closes {
                info!(
                    "SWEEP INVALIDATED: {} consecutive 5min closes below {:.2}",
                    self.closes_below_target, target
                );
                self.sweep_invalidated = true;
                self.invalidated_at = Some(candle.timestamp);
                self.sweep_target = None;
                self.sweep_set_time = None;
                self.target_swept = false;
                self.deepest_sweep_candle = None;
                self.sweep_low = None;
            }
        } else if candle.classify().is_bear_or_neutral() {
            self.set_target(candle.low, candle.timestamp + Timeframe::FiveMinute.duration());
            debug!("SWEEP TARGET moved to {:.2} ({} 5min bar)", candle.low, candle.classify());
        }
    }

    /// Clear the target after an entry so the next 1m close re-arms
    pub fn reset_after_entry(&mut self) {
        self.sweep_target = None;
        self.sweep_set_time = None;
        self.target_swept = false;
        self.sweep_invalidated = false;
        self.closes_below_target = 0;
        self.deepest_sweep_candle = None;
        self.sweep_low = None;
        self.invalidated_at = None;
        self.bear_run.clear();
    }

    pub fn reset_session(&mut self) {
        self.reset_after_entry();
        self.session_high = None;
        self.session_low = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 3, 45, 0).unwrap() + Duration::minutes(minutes)
    }

    fn bar(minutes: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(at(minutes), open, high, low, close)
    }

    fn state() -> SweepState {
        SweepState::new(&EngineConfig::default())
    }

    #[test]
    fn test_arm_from_bear_5min() {
        let mut s = state();
        let bull = bar(0, 100.0, 110.0, 99.0, 109.0);
        assert!(!s.arm(Some(&bull), at(5)));
        assert!(s.sweep_target.is_none());

        let bear = bar(0, 109.0, 110.0, 99.0, 100.0);
        assert!(s.arm(Some(&bear), at(5)));
        assert_eq!(s.sweep_target, Some(99.0));
        assert_eq!(s.sweep_set_time, Some(at(5)));

        // already armed
        assert!(!s.arm(Some(&bar(5, 100.0, 101.0, 90.0, 91.0)), at(10)));
        assert_eq!(s.sweep_target, Some(99.0));
    }

    #[test]
    fn test_sweep_requires_set_time() {
        let mut s = state();
        s.set_initial_5min_candle(&bar(0, 101.0, 102.0, 100.0, 100.5));
        // 1m bar inside the arming 5m bucket
        assert!(!s.on_1min_close(&bar(4, 100.5, 100.6, 99.0, 99.5)));
        assert!(s.on_1min_close(&bar(5, 100.5, 100.6, 99.0, 99.5)));
        assert!(s.is_swept());
    }

    #[test]
    fn test_deepest_sweep_candle_only_for_up_closes() {
        let mut s = state();
        s.set_initial_5min_candle(&bar(0, 101.0, 102.0, 100.0, 100.5));

        s.on_1min_close(&bar(5, 99.5, 100.2, 99.0, 100.0));
        assert_eq!(s.deepest_sweep_candle.as_ref().map(|c| c.low), Some(99.0));

        // shallower up-close keeps the deeper candle
        s.on_1min_close(&bar(6, 99.6, 100.3, 99.4, 100.1));
        assert_eq!(s.deepest_sweep_candle.as_ref().map(|c| c.low), Some(99.0));

        // deeper up-close replaces it
        s.on_1min_close(&bar(7, 98.7, 99.9, 98.5, 99.8));
        assert_eq!(s.deepest_sweep_candle.as_ref().map(|c| c.low), Some(98.5));

        // a sweeping down-close clears it
        s.on_1min_close(&bar(8, 99.8, 99.9, 98.0, 98.2));
        assert!(s.deepest_sweep_candle.is_none());
    }

    #[test]
    fn test_invalidation_needs_consecutive_closes() {
        let mut s = state();
        s.set_initial_5min_candle(&bar(0, 101.0, 102.0, 100.0, 100.5));
        s.on_1min_close(&bar(5, 100.5, 100.6, 99.0, 99.5));

        s.on_5min_close(&bar(5, 100.5, 100.6, 99.0, 99.5));
        assert_eq!(s.closes_below_target, 1);
        s.on_5min_close(&bar(10, 99.5, 101.0, 99.4, 100.0));
        assert_eq!(s.closes_below_target, 0);
        s.on_5min_close(&bar(15, 100.0, 100.2, 99.0, 99.2));
        assert!(s.is_swept());
        s.on_5min_close(&bar(20, 99.2, 99.5, 98.0, 98.5));

        assert!(s.sweep_invalidated);
        assert!(s.sweep_target.is_none());
        assert!(!s.is_swept());
    }

    #[test]
    fn test_invalidating_bar_cannot_rearm() {
        let mut s = state();
        s.set_initial_5min_candle(&bar(0, 101.0, 102.0, 100.0, 100.5));
        s.on_1min_close(&bar(5, 100.5, 100.6, 99.0, 99.5));

        s.on_5min_close(&bar(5, 100.5, 100.6, 98.0, 98.5));
        let invalidating = bar(10, 98.5, 98.7, 96.0, 96.5);
        s.on_5min_close(&invalidating);
        assert!(s.sweep_target.is_none());
        assert_eq!(s.invalidated_at, Some(at(10)));

        // same 5m bar is still the latest on the next 1m closes
        assert!(!s.arm(Some(&invalidating), at(14)));
        assert!(!s.arm(Some(&invalidating), at(16)));
        assert!(s.sweep_invalidated);

        // a fresh bear 5m bar re-arms
        let fresh = bar(15, 96.5, 96.8, 95.0, 95.2);
        assert!(s.arm(Some(&fresh), at(19)));
        assert_eq!(s.sweep_target, Some(95.0));
        assert!(!s.sweep_invalidated);
        assert!(s.invalidated_at.is_none());
    }

    #[test]
    fn test_sweep_low_tracks_session_low() {
        let mut s = state();
        s.set_initial_5min_candle(&bar(0, 101.0, 102.0, 100.0, 100.5));
        s.on_1min_close(&bar(5, 101.0, 101.5, 100.5, 101.2));
        assert!(!s.swept_session_low(0.05));

        // sweep makes the new session low
        s.on_1min_close(&bar(6, 100.5, 100.6, 99.5, 99.6));
        assert_eq!(s.sweep_low, Some(99.5));
        assert!(s.swept_session_low(0.05));

        // a deeper sweeping bar keeps them together
        s.on_1min_close(&bar(7, 99.6, 99.7, 99.0, 99.1));
        assert_eq!(s.sweep_low, Some(99.0));
        assert!(s.swept_session_low(0.05));
    }

    #[test]
    fn test_sweep_above_earlier_session_low() {
        let mut s = state();
        s.on_1min_close(&bar(0, 99.0, 101.0, 98.0, 100.8));
        s.set_initial_5min_candle(&bar(0, 101.0, 102.0, 100.0, 100.5));
        s.on_1min_close(&bar(6, 100.5, 100.6, 99.5, 99.6));
        assert!(s.is_swept());
        assert_eq!(s.session_low, Some(98.0));
        assert!(!s.swept_session_low(0.05));
    }

    #[test]
    fn test_unswept_target_follows_bear_bars() {
        let mut s = state();
        s.set_initial_5min_candle(&bar(0, 101.0, 102.0, 100.0, 100.5));
        s.on_5min_close(&bar(5, 100.5, 101.0, 100.2, 100.4));
        assert_eq!(s.sweep_target, Some(100.2));
        assert_eq!(s.sweep_set_time, Some(at(10)));

        // bull bar leaves the target alone
        s.on_5min_close(&bar(10, 100.4, 103.0, 100.3, 102.8));
        assert_eq!(s.sweep_target, Some(100.2));
    }

    #[test]
    fn test_bear_run_and_session_extremes() {
        let mut s = state();
        s.on_1min_close(&bar(0, 101.0, 101.2, 99.0, 99.1));
        s.on_1min_close(&bar(1, 99.1, 99.5, 98.5, 99.0));
        assert_eq!(s.bear_run.len(), 2);
        s.on_1min_close(&bar(2, 99.0, 102.0, 98.9, 101.9));
        assert!(s.bear_run.is_empty());
        assert_eq!(s.session_high, Some(102.0));
        assert_eq!(s.session_low, Some(98.5));

        for i in 3..20 {
            s.on_1min_close(&bar(i, 100.0, 100.1, 98.9, 99.0));
        }
        assert_eq!(s.bear_run.len(), 10);

        s.reset_session();
        assert!(s.session_low.is_none());
        assert!(s.bear_run.is_empty());
    }
}
