//! Engine
//!
//! Glue between the data feed and the strategy manager. Ticks or 1-minute
//! OHLC bars go into the `CandleAggregator`; every closed bar it reports is
//! dispatched in a fixed order:
//!
//! 1. sweep state sees the closed 1m bar (session extremes, bear run, sweep)
//! 2. if a 5m bar closed with it: sweep invalidation/refinement, then 5m
//!    structure detection and mitigation
//! 3. arm a new sweep target from the last 5m bar when none is set
//! 4. strategy manager: trade management or strategy evaluation
//!
//! A 5m bar closed on its own (gap before its final minute) only runs step 2.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::aggregator::{AggregatorEvent, CandleAggregator};
use super::candle::{Candle, Ohlc, Timeframe};
use super::config::EngineConfig;
use super::error::EngineError;
use super::events::{ExitSignal, TradeObserver};
use super::manager::{ManagerStatus, StrategyManager, TradeAction};

pub struct Engine<O: TradeObserver> {
    aggregator: CandleAggregator,
    manager: StrategyManager,
    observer: O,
    last_price: Option<f64>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl<O: TradeObserver> Engine<O> {
    pub fn new(config: EngineConfig, observer: O) -> Result<Self, EngineError> {
        let aggregator = CandleAggregator::new(&config);
        let manager = StrategyManager::new(config)?;
        Ok(Self::with_manager(aggregator, manager, observer))
    }

    /// Engine around a manager with a custom strategy list
    pub fn with_manager(aggregator: CandleAggregator, manager: StrategyManager, observer: O) -> Self {
        Self {
            aggregator,
            manager,
            observer,
            last_price: None,
            last_timestamp: None,
        }
    }

    /// Seed zones, bar histories and the first sweep target from closed history
    pub fn initialize_with_history(
        &mut self,
        candles_5min: &[Candle],
        candles_1min: &[Candle],
    ) -> Result<(), EngineError> {
        self.manager.initialize_with_historical_data(candles_5min, candles_1min)?;
        self.aggregator.prime_history(Timeframe::FiveMinute, candles_5min);
        self.aggregator.prime_history(Timeframe::OneMinute, candles_1min);
        Ok(())
    }

    pub fn ingest_tick(&mut self, price: f64, timestamp: DateTime<Utc>) -> Vec<TradeAction> {
        if !price.is_finite() {
            debug!("Skipping non-finite tick at {}", timestamp);
            return Vec::new();
        }
        self.mark(price, timestamp);
        let events = self.aggregator.update(price, timestamp);
        self.dispatch(events)
    }

    pub fn ingest_bar(&mut self, ohlc: Ohlc, timestamp: DateTime<Utc>) -> Vec<TradeAction> {
        self.mark(ohlc.close, timestamp);
        let events = self.aggregator.update_with_ohlc(ohlc, timestamp);
        self.dispatch(events)
    }

    /// Close whatever bars are still forming (end of data)
    pub fn flush(&mut self) -> Vec<TradeAction> {
        let events = self.aggregator.flush();
        self.dispatch(events)
    }

    fn mark(&mut self, price: f64, timestamp: DateTime<Utc>) {
        self.last_price = Some(price);
        self.last_timestamp = Some(timestamp);
    }

    fn dispatch(&mut self, events: Vec<AggregatorEvent>) -> Vec<TradeAction> {
        let mut actions = Vec::new();
        let mut events = events.into_iter().peekable();

        while let Some(event) = events.next() {
            match event {
                AggregatorEvent::BarClosed { timeframe: Timeframe::OneMinute, candle } => {
                    let five = events
                        .next_if(|e| e.timeframe() == Timeframe::FiveMinute)
                        .map(|e| e.candle().clone());
                    if let Some(action) = self.process_1min(&candle, five.as_ref()) {
                        actions.push(action);
                    }
                }
                AggregatorEvent::BarClosed { timeframe: Timeframe::FiveMinute, candle } => {
                    self.process_5min(&candle);
                }
            }
        }
        actions
    }

    fn process_5min(&mut self, candle: &Candle) {
        debug!("5min close: {}", candle);
        self.manager.sweep_mut().on_5min_close(candle);
        self.manager.on_5min_close(candle);
    }

    fn process_1min(&mut self, candle: &Candle, five: Option<&Candle>) -> Option<TradeAction> {
        self.manager.sweep_mut().on_1min_close(candle);
        if let Some(five) = five {
            self.process_5min(five);
        }
        self.manager.arm_sweep(candle.timestamp);
        self.manager.on_1min_close(candle, &mut self.observer)
    }

    /// Session rollover: flatten at `last_price`, clear sweep and session state
    pub fn reset_for_new_day(&mut self, last_price: Option<f64>) -> Option<ExitSignal> {
        let exit = match (last_price.or(self.last_price), self.last_timestamp) {
            (Some(price), Some(ts)) => self.manager.force_exit(price, ts, &mut self.observer),
            _ => None,
        };
        self.manager.reset_session();
        self.aggregator.reset_forming();
        info!("Session reset{}", if exit.is_some() { " (position flattened)" } else { "" });
        exit
    }

    pub fn force_exit(&mut self, price: f64, timestamp: DateTime<Utc>) -> Option<ExitSignal> {
        self.manager.force_exit(price, timestamp, &mut self.observer)
    }

    pub fn enable_strategy(&mut self, name: &str) -> bool {
        self.manager.enable_strategy(name)
    }

    pub fn disable_strategy(&mut self, name: &str) -> bool {
        self.manager.disable_strategy(name)
    }

    pub fn status(&self) -> ManagerStatus {
        self.manager.status()
    }

    pub fn manager(&self) -> &StrategyManager {
        &self.manager
    }

    pub fn aggregator(&self) -> &CandleAggregator {
        &self.aggregator
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::events::{ExitReason, RecordingObserver, TradeSignal, TriggerType};
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn ist(hour: u32, minute: u32) -> DateTime<Utc> {
        Kolkata
            .with_ymd_and_hms(2025, 9, 1, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn engine() -> Engine<RecordingObserver> {
        Engine::new(EngineConfig::default(), RecordingObserver::default()).unwrap()
    }

    const SESSION: [(u32, f64, f64, f64, f64); 8] = [
        (15, 24730.0, 24731.0, 24720.0, 24721.0),
        (16, 24721.0, 24722.0, 24712.0, 24713.0),
        (17, 24713.0, 24714.0, 24706.0, 24707.0),
        (18, 24707.0, 24708.0, 24702.0, 24703.0),
        (19, 24703.0, 24704.0, 24700.0, 24701.0),
        (20, 24699.0, 24700.0, 24695.0, 24698.0),
        (21, 24700.0, 24706.0, 24700.0, 24705.0),
        (22, 24702.0, 24708.0, 24701.5, 24707.0),
    ];

    /// Bullish first five minutes that sets a lower session low (24690)
    const OPENING_DIP: [(u32, f64, f64, f64, f64); 5] = [
        (15, 24691.0, 24700.0, 24690.0, 24699.0),
        (16, 24699.0, 24712.0, 24698.0, 24711.0),
        (17, 24711.0, 24720.0, 24710.0, 24719.0),
        (18, 24719.0, 24726.0, 24718.0, 24725.0),
        (19, 24724.0, 24731.0, 24723.0, 24730.0),
    ];

    fn ingest(engine: &mut Engine<RecordingObserver>, bars: &[(u32, f64, f64, f64, f64)], shift: u32) -> Vec<TradeAction> {
        bars.iter()
            .flat_map(|&(minute, o, h, l, c)| engine.ingest_bar(Ohlc::new(o, h, l, c), ist(9, minute + shift)))
            .collect()
    }

    fn feed(engine: &mut Engine<RecordingObserver>) -> Vec<TradeAction> {
        let mut actions = ingest(engine, &SESSION, 0);
        actions.extend(engine.flush());
        actions
    }

    fn entries(actions: &[TradeAction]) -> Vec<&TradeSignal> {
        actions
            .iter()
            .filter_map(|a| match a {
                TradeAction::Entered(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_session_low_sweep_then_imps_entry() {
        let mut engine = engine();
        let actions = feed(&mut engine);

        let entries = entries(&actions);
        assert_eq!(entries.len(), 1);

        let signal = entries[0];
        assert_eq!(signal.trigger, TriggerType::Imps);
        assert_eq!(signal.strategy, "ERLtoIRL");
        assert!((signal.entry - 24702.0).abs() < 1e-6);
        assert!((signal.stop_loss - 24698.0).abs() < 1e-6);
        // the 09:20 sweep bar made the day's low: 3R
        assert!((signal.target.unwrap() - 24714.0).abs() < 1e-6);
        assert_eq!(signal.timestamp, ist(9, 22));

        assert!(engine.manager().in_trade());
        assert_eq!(engine.observer().entries.len(), 1);
        // entry consumes the sweep
        assert!(engine.manager().sweep().sweep_target.is_none());
    }

    #[test]
    fn test_sweep_above_session_low_then_imps_entry() {
        let mut engine = engine();
        let mut actions = ingest(&mut engine, &OPENING_DIP, 0);
        // bullish 09:15 bar does not arm
        assert!(engine.manager().sweep().sweep_target.is_none());

        actions.extend(ingest(&mut engine, &SESSION, 5));
        actions.extend(engine.flush());
        assert_eq!(engine.manager().sweep().session_low, Some(24690.0));

        let entries = entries(&actions);
        assert_eq!(entries.len(), 1);
        let signal = entries[0];
        assert_eq!(signal.trigger, TriggerType::Imps);
        assert!((signal.entry - 24702.0).abs() < 1e-6);
        assert!((signal.stop_loss - 24698.0).abs() < 1e-6);
        assert!((signal.target.unwrap() - 24710.0).abs() < 1e-6);
        assert_eq!(signal.timestamp, ist(9, 27));
    }

    #[test]
    fn test_sweep_armed_from_bear_five_minute_bar() {
        let mut engine = engine();
        for (minute, o, h, l, c) in SESSION.iter().take(6) {
            engine.ingest_bar(Ohlc::new(*o, *h, *l, *c), ist(9, *minute));
        }
        // 09:15-09:19 closed early as a BEAR bar; armed on the 09:19 close
        let five = engine.aggregator().last_closed(Timeframe::FiveMinute).unwrap();
        assert_eq!(five.timestamp, ist(9, 15));
        assert_eq!(five.low, 24700.0);

        let sweep = engine.manager().sweep();
        assert_eq!(sweep.sweep_target, Some(24700.0));
        assert_eq!(sweep.sweep_set_time, Some(ist(9, 19)));
        // the 09:20 bar is still forming
        assert!(!sweep.target_swept);

        engine.flush();
        assert!(engine.manager().sweep().is_swept());
        assert!(!engine.manager().in_trade());
    }

    #[test]
    fn test_disabled_strategy_does_not_trade() {
        let mut engine = engine();
        assert!(engine.disable_strategy("ERLtoIRL"));
        let actions = feed(&mut engine);
        assert!(actions.is_empty());
        assert!(!engine.manager().in_trade());
    }

    #[test]
    fn test_reset_for_new_day_flattens() {
        let mut engine = engine();
        feed(&mut engine);
        assert!(engine.manager().in_trade());

        let exit = engine.reset_for_new_day(Some(24704.0)).unwrap();
        assert_eq!(exit.reason, ExitReason::Forced);
        assert!((exit.exit_price - 24704.0).abs() < 1e-6);
        assert!(!engine.manager().in_trade());
        assert!(engine.manager().sweep().session_low.is_none());
        assert!(engine.aggregator().forming(Timeframe::OneMinute).is_none());
        assert_eq!(engine.observer().exits.len(), 1);
    }

    #[test]
    fn test_ticks_build_bars() {
        let mut engine = engine();
        let base = ist(9, 15);
        for (secs, price) in [(0, 100.0), (10, 102.0), (20, 99.0), (50, 101.02)] {
            assert!(engine.ingest_tick(price, base + chrono::Duration::seconds(secs)).is_empty());
        }
        engine.ingest_tick(101.5, ist(9, 16));

        let bar = engine.aggregator().last_closed(Timeframe::OneMinute).unwrap();
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 102.0);
        assert_eq!(bar.low, 99.0);
        assert!((bar.close - 101.0).abs() < 1e-9);

        assert!(engine.ingest_tick(f64::NAN, ist(9, 16)).is_empty());
    }

    #[test]
    fn test_initialize_with_history() {
        let mut engine = engine();
        let five = vec![
            Candle::new(ist(9, 5), 24740.0, 24745.0, 24731.0, 24735.0),
            Candle::new(ist(9, 10), 24735.0, 24736.0, 24725.0, 24726.0),
        ];
        engine.initialize_with_history(&five, &[]).unwrap();
        assert_eq!(engine.aggregator().history(Timeframe::FiveMinute).len(), 2);
        assert_eq!(engine.manager().sweep().sweep_target, Some(24725.0));
        assert_eq!(engine.manager().sweep().sweep_set_time, Some(ist(9, 15)));
        assert!(engine.status().initialized);

        assert!(engine.initialize_with_history(&[], &[]).is_err());
    }
}
