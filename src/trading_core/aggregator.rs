//! Candle Aggregator
//!
//! Builds session-anchored 1-minute and 5-minute bars from either:
//! - individual trade prices (`update`), rounded to tick size
//! - pre-formed 1-minute OHLC bars (`update_with_ohlc`)
//!
//! A bar is closed when data for a later bucket arrives, so OHLC input closes
//! each bar one bar late; `flush` closes whatever is still forming. 5-minute
//! bars are folded from closed 1-minute bars and close early once their final
//! minute has been folded in.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::debug;

use super::candle::{Candle, Ohlc, Timeframe};
use super::config::EngineConfig;
use super::session::SessionClock;
use super::ticks::round_to_tick;

/// Emitted whenever a bar completes
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatorEvent {
    BarClosed { timeframe: Timeframe, candle: Candle },
}

impl AggregatorEvent {
    pub fn timeframe(&self) -> Timeframe {
        match self {
            AggregatorEvent::BarClosed { timeframe, .. } => *timeframe,
        }
    }

    pub fn candle(&self) -> &Candle {
        match self {
            AggregatorEvent::BarClosed { candle, .. } => candle,
        }
    }
}

pub struct CandleAggregator {
    clock: SessionClock,
    tick_size: f64,
    current_1min: Option<Candle>,
    current_5min: Option<Candle>,
    candles_1min: VecDeque<Candle>,
    candles_5min: VecDeque<Candle>,
    max_1min: usize,
    max_5min: usize,
}

impl CandleAggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            clock: config.session_clock(),
            tick_size: config.tick_size,
            current_1min: None,
            current_5min: None,
            candles_1min: VecDeque::with_capacity(config.max_1min_history),
            candles_5min: VecDeque::with_capacity(config.max_5min_history),
            max_1min: config.max_1min_history,
            max_5min: config.max_5min_history,
        }
    }

    /// Process a trade price; returns any bars it closed
    pub fn update(&mut self, price: f64, timestamp: DateTime<Utc>) -> Vec<AggregatorEvent> {
        let price = round_to_tick(price, self.tick_size);
        self.ingest(Ohlc::flat(price), timestamp)
    }

    /// Process a 1-minute OHLC bar; returns any bars it closed
    pub fn update_with_ohlc(&mut self, ohlc: Ohlc, timestamp: DateTime<Utc>) -> Vec<AggregatorEvent> {
        self.ingest(ohlc, timestamp)
    }

    /// Close the forming 1-minute and 5-minute bars
    pub fn flush(&mut self) -> Vec<AggregatorEvent> {
        let mut events = Vec::new();
        if let Some(bar) = self.current_1min.take() {
            self.close_1min(bar, &mut events);
        }
        if let Some(bar) = self.current_5min.take() {
            self.close_5min(bar, &mut events);
        }
        events
    }

    fn ingest(&mut self, ohlc: Ohlc, timestamp: DateTime<Utc>) -> Vec<AggregatorEvent> {
        let mut events = Vec::new();

        let Some(bucket) = self.clock.bucket_start(timestamp, Duration::minutes(1)) else {
            debug!("Dropping pre-session data at {}", timestamp);
            return events;
        };

        match &mut self.current_1min {
            Some(bar) if bar.timestamp == bucket => {
                bar.high = bar.high.max(ohlc.high);
                bar.low = bar.low.min(ohlc.low);
                bar.close = ohlc.close;
            }
            _ => {
                if let Some(done) = self.current_1min.take() {
                    self.close_1min(done, &mut events);
                }
                self.current_1min = Some(Candle::from_ohlc(bucket, ohlc));
            }
        }

        events
    }

    fn close_1min(&mut self, bar: Candle, events: &mut Vec<AggregatorEvent>) {
        let five = Timeframe::FiveMinute.duration();
        let bucket_5 = self.clock.bucket_start(bar.timestamp, five).unwrap_or(bar.timestamp);

        // A 1m bar from a later bucket closes a 5m bar that never saw its last minute
        if let Some(prev) = self.current_5min.take_if(|c| c.timestamp != bucket_5) {
            self.close_5min(prev, events);
        }

        push_bounded(&mut self.candles_1min, bar.clone(), self.max_1min);
        events.push(AggregatorEvent::BarClosed {
            timeframe: Timeframe::OneMinute,
            candle: bar.clone(),
        });

        match &mut self.current_5min {
            Some(five_bar) => {
                five_bar.high = five_bar.high.max(bar.high);
                five_bar.low = five_bar.low.min(bar.low);
                five_bar.close = bar.close;
            }
            None => {
                self.current_5min = Some(Candle::new(bucket_5, bar.open, bar.high, bar.low, bar.close));
            }
        }

        if bar.timestamp + Timeframe::OneMinute.duration() >= bucket_5 + five {
            if let Some(full) = self.current_5min.take() {
                self.close_5min(full, events);
            }
        }
    }

    fn close_5min(&mut self, bar: Candle, events: &mut Vec<AggregatorEvent>) {
        push_bounded(&mut self.candles_5min, bar.clone(), self.max_5min);
        events.push(AggregatorEvent::BarClosed {
            timeframe: Timeframe::FiveMinute,
            candle: bar,
        });
    }

    /// Seed closed-bar history (historical initialisation)
    pub fn prime_history(&mut self, timeframe: Timeframe, candles: &[Candle]) {
        let (history, cap) = match timeframe {
            Timeframe::OneMinute => (&mut self.candles_1min, self.max_1min),
            Timeframe::FiveMinute => (&mut self.candles_5min, self.max_5min),
        };
        for candle in candles {
            push_bounded(history, candle.clone(), cap);
        }
    }

    pub fn history(&self, timeframe: Timeframe) -> &VecDeque<Candle> {
        match timeframe {
            Timeframe::OneMinute => &self.candles_1min,
            Timeframe::FiveMinute => &self.candles_5min,
        }
    }

    pub fn last_closed(&self, timeframe: Timeframe) -> Option<&Candle> {
        self.history(timeframe).back()
    }

    pub fn forming(&self, timeframe: Timeframe) -> Option<&Candle> {
        match timeframe {
            Timeframe::OneMinute => self.current_1min.as_ref(),
            Timeframe::FiveMinute => self.current_5min.as_ref(),
        }
    }

    /// Drop forming bars (history is kept across sessions)
    pub fn reset_forming(&mut self) {
        self.current_1min = None;
        self.current_5min = None;
    }
}

pub(crate) fn push_bounded<T>(history: &mut VecDeque<T>, item: T, cap: usize) {
    history.push_back(item);
    while history.len() > cap {
        history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Kolkata
            .with_ymd_and_hms(2025, 9, 1, h, m, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn closed(events: &[AggregatorEvent], tf: Timeframe) -> Vec<Candle> {
        events
            .iter()
            .filter(|e| e.timeframe() == tf)
            .map(|e| e.candle().clone())
            .collect()
    }

    #[test]
    fn test_ticks_within_one_bucket() {
        let mut agg = CandleAggregator::new(&EngineConfig::default());
        assert!(agg.update(100.0, ist(9, 15, 1)).is_empty());
        assert!(agg.update(103.0, ist(9, 15, 20)).is_empty());
        assert!(agg.update(98.0, ist(9, 15, 40)).is_empty());
        assert!(agg.update(101.0, ist(9, 15, 59)).is_empty());

        let events = agg.update(102.0, ist(9, 16, 0));
        let bars = closed(&events, Timeframe::OneMinute);
        assert_eq!(bars.len(), 1);
        let bar = &bars[0];
        assert_eq!(bar.timestamp, ist(9, 15, 0));
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (100.0, 103.0, 98.0, 101.0));
    }

    #[test]
    fn test_ticks_are_rounded() {
        let mut agg = CandleAggregator::new(&EngineConfig::default());
        agg.update(100.03, ist(9, 15, 1));
        let bar = agg.forming(Timeframe::OneMinute).unwrap();
        assert!((bar.open - 100.05).abs() < 1e-9);
    }

    #[test]
    fn test_ticks_spanning_buckets_close_in_order() {
        let mut agg = CandleAggregator::new(&EngineConfig::default());
        let mut events = Vec::new();
        for (i, minute) in [15, 16, 17, 18].iter().enumerate() {
            events.extend(agg.update(100.0 + i as f64, ist(9, *minute, 5)));
        }
        let bars = closed(&events, Timeframe::OneMinute);
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, ist(9, 15, 0));
        assert_eq!(bars[1].timestamp, ist(9, 16, 0));
        assert_eq!(bars[2].timestamp, ist(9, 17, 0));
        assert_eq!(agg.history(Timeframe::OneMinute).len(), 3);
    }

    #[test]
    fn test_pre_session_ticks_dropped() {
        let mut agg = CandleAggregator::new(&EngineConfig::default());
        assert!(agg.update(100.0, ist(9, 10, 0)).is_empty());
        assert!(agg.forming(Timeframe::OneMinute).is_none());
    }

    #[test]
    fn test_five_minute_fold_closes_on_final_minute() {
        let mut agg = CandleAggregator::new(&EngineConfig::default());
        let mut events = Vec::new();
        let bars = [
            (15, Ohlc::new(100.0, 101.0, 99.0, 100.5)),
            (16, Ohlc::new(100.5, 104.0, 100.0, 103.0)),
            (17, Ohlc::new(103.0, 103.5, 97.0, 98.0)),
            (18, Ohlc::new(98.0, 99.0, 97.5, 98.5)),
            (19, Ohlc::new(98.5, 99.5, 98.0, 99.0)),
            (20, Ohlc::new(99.0, 99.0, 99.0, 99.0)),
        ];
        for (minute, ohlc) in bars {
            events.extend(agg.update_with_ohlc(ohlc, ist(9, minute, 0)));
        }

        // The 09:20 bar closes 09:19, which completes the 09:15 5m bar
        let five = closed(&events, Timeframe::FiveMinute);
        assert_eq!(five.len(), 1);
        assert_eq!(five[0].timestamp, ist(9, 15, 0));
        assert_eq!(
            (five[0].open, five[0].high, five[0].low, five[0].close),
            (100.0, 104.0, 97.0, 99.0)
        );
        assert_eq!(events.last().map(|e| e.timeframe()), Some(Timeframe::FiveMinute));
        assert!(agg.forming(Timeframe::FiveMinute).is_none());
    }

    #[test]
    fn test_gap_closes_partial_five_minute_bar() {
        let mut agg = CandleAggregator::new(&EngineConfig::default());
        agg.update_with_ohlc(Ohlc::new(100.0, 101.0, 99.0, 100.0), ist(9, 15, 0));
        agg.update_with_ohlc(Ohlc::new(100.0, 102.0, 99.5, 101.0), ist(9, 16, 0));
        agg.update_with_ohlc(Ohlc::new(101.0, 101.0, 95.0, 96.0), ist(9, 27, 0));
        let events = agg.update_with_ohlc(Ohlc::new(96.0, 97.0, 95.5, 96.5), ist(9, 28, 0));

        // Closing 09:27 first flushes the stale 09:15 5m bar, then emits 09:27
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timeframe(), Timeframe::FiveMinute);
        assert_eq!(events[0].candle().timestamp, ist(9, 15, 0));
        assert_eq!(events[1].timeframe(), Timeframe::OneMinute);
        assert_eq!(events[1].candle().timestamp, ist(9, 27, 0));
    }

    #[test]
    fn test_flush() {
        let mut agg = CandleAggregator::new(&EngineConfig::default());
        agg.update_with_ohlc(Ohlc::new(100.0, 101.0, 99.0, 100.0), ist(9, 15, 0));
        agg.update_with_ohlc(Ohlc::new(100.0, 102.0, 99.5, 101.0), ist(9, 16, 0));
        let events = agg.flush();
        assert_eq!(closed(&events, Timeframe::OneMinute).len(), 1);
        assert_eq!(closed(&events, Timeframe::FiveMinute).len(), 1);
        assert!(agg.flush().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = EngineConfig {
            max_1min_history: 3,
            ..Default::default()
        };
        let mut agg = CandleAggregator::new(&config);
        for minute in 15..25 {
            agg.update(100.0, ist(9, minute, 0));
        }
        assert_eq!(agg.history(Timeframe::OneMinute).len(), 3);
        assert_eq!(agg.last_closed(Timeframe::OneMinute).unwrap().timestamp, ist(9, 23, 0));
    }
}
