//! Strategy Manager
//!
//! Owns the liquidity tracker, the shared sweep state and the ordered
//! strategy list, and runs the single-trade state machine:
//!
//! FLAT --(first strategy signal accepted by the observer)--> IN_TRADE
//! IN_TRADE --(stop / target / forced exit)--> FLAT
//!
//! While in a trade each closed 1m bar trails the stop to swing lows,
//! migrates the target in R steps and checks for exits.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::candle::{Candle, Timeframe};
use super::config::EngineConfig;
use super::error::EngineError;
use super::events::{ExitReason, ExitSignal, TradeObserver, TradeSignal, TriggerType};
use super::liquidity::{LiquiditySummary, LiquidityTracker};
use super::strategy::{ErlToIrl, IrlToErl, Strategy, StrategyContext};
use super::sweep::SweepState;
use super::ticks::round_to_tick;

/// The one open trade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveTrade {
    pub id: Uuid,
    pub strategy_name: String,
    pub trigger: TriggerType,
    pub entry: f64,
    pub stop_loss: f64,
    /// None once 1m trailing has engaged
    pub target: Option<f64>,
    pub initial_stop_loss: f64,
    pub initial_risk: f64,
    pub timestamp: DateTime<Utc>,
    pub target_moved_2r: bool,
    pub target_moved_4r: bool,
}

impl ActiveTrade {
    fn from_signal(signal: &TradeSignal) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy_name: signal.strategy.clone(),
            trigger: signal.trigger,
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            target: signal.target,
            initial_stop_loss: signal.stop_loss,
            initial_risk: signal.entry - signal.stop_loss,
            timestamp: signal.timestamp,
            target_moved_2r: false,
            target_moved_4r: false,
        }
    }
}

/// Outcome of a closed 1m bar
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    Entered(TradeSignal),
    Exited(ExitSignal),
}

struct StrategySlot {
    strategy: Box<dyn Strategy + Send>,
    enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub name: String,
    pub enabled: bool,
}

/// Serializable snapshot of the manager
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub initialized: bool,
    pub in_trade: bool,
    pub current_trade: Option<ActiveTrade>,
    pub sweep: SweepState,
    pub liquidity: LiquiditySummary,
    pub strategies: Vec<StrategyStatus>,
}

pub struct StrategyManager {
    config: EngineConfig,
    tracker: LiquidityTracker,
    sweep: SweepState,
    strategies: Vec<StrategySlot>,
    current_trade: Option<ActiveTrade>,
    last_exit_ts: Option<DateTime<Utc>>,
    initialized: bool,
}

impl StrategyManager {
    /// Manager with the default strategy order: ERL→IRL, then IRL→ERL
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_strategies(config, vec![Box::new(ErlToIrl), Box::new(IrlToErl::default())])
    }

    pub fn with_strategies(
        config: EngineConfig,
        strategies: Vec<Box<dyn Strategy + Send>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            tracker: LiquidityTracker::new(&config),
            sweep: SweepState::new(&config),
            strategies: strategies
                .into_iter()
                .map(|strategy| StrategySlot { strategy, enabled: true })
                .collect(),
            current_trade: None,
            last_exit_ts: None,
            initialized: false,
            config,
        })
    }

    /// Seed zones from 5m history, prime 1m history and arm the first sweep target
    pub fn initialize_with_historical_data(
        &mut self,
        candles_5min: &[Candle],
        candles_1min: &[Candle],
    ) -> Result<(), EngineError> {
        let Some(last_5min) = candles_5min.last() else {
            return Err(EngineError::InsufficientHistory {
                what: "5min initialisation".to_string(),
                have: 0,
                need: 1,
            });
        };

        self.tracker.add_historical_data(candles_5min, &self.config.symbol);
        self.tracker.seed_history(Timeframe::OneMinute, candles_1min);
        self.sweep.set_initial_5min_candle(last_5min);
        self.initialized = true;

        info!(
            "Strategy manager initialised: {} 5min / {} 1min bars | {}",
            candles_5min.len(),
            candles_1min.len(),
            self.tracker.liquidity_summary()
        );
        Ok(())
    }

    /// Structural detection and mitigation for a closed 5m bar
    pub fn on_5min_close(&mut self, candle: &Candle) {
        self.tracker.process_candle(candle, Timeframe::FiveMinute, &self.config.symbol);
        let mitigated = self.tracker.check_and_mark_mitigation(candle);
        if mitigated > 0 {
            debug!("5min bar {} mitigated {} zones", candle.timestamp, mitigated);
        }
        self.initialized = true;
    }

    /// Arm the sweep target from the latest closed 5m bar if none is set
    pub fn arm_sweep(&mut self, now: DateTime<Utc>) -> bool {
        let last_5min = self.tracker.history(Timeframe::FiveMinute).back();
        self.sweep.arm(last_5min, now)
    }

    /// Manage the open trade or look for an entry on a closed 1m bar
    pub fn on_1min_close(&mut self, candle: &Candle, observer: &mut dyn TradeObserver) -> Option<TradeAction> {
        self.tracker.check_and_mark_mitigation(candle);
        self.tracker.process_candle(candle, Timeframe::OneMinute, &self.config.symbol);

        if self.current_trade.is_some() {
            self.trail_stop(candle, observer);
            self.migrate_target(candle, observer);
            return self.check_exit(candle, observer).map(TradeAction::Exited);
        }

        let signal = self.evaluate_strategies(candle)?;
        self.open_trade(signal, observer).map(TradeAction::Entered)
    }

    fn evaluate_strategies(&mut self, candle: &Candle) -> Option<TradeSignal> {
        let ctx = StrategyContext {
            candle,
            candles_1min: self.tracker.history(Timeframe::OneMinute),
            sweep: &self.sweep,
            tracker: &self.tracker,
            config: &self.config,
        };

        for slot in self.strategies.iter_mut().filter(|s| s.enabled) {
            match slot.strategy.evaluate(&ctx) {
                Ok(Some(signal)) => return Some(signal),
                Ok(None) => {}
                Err(e) => {
                    error!("Strategy {} failed on {}: {}", slot.strategy.name(), candle.timestamp, e);
                }
            }
        }
        None
    }

    /// Open a trade from a signal. Returns false when already in a trade or
    /// when the observer rejects the entry.
    pub fn enter_trade(&mut self, signal: TradeSignal, observer: &mut dyn TradeObserver) -> bool {
        self.open_trade(signal, observer).is_some()
    }

    fn open_trade(&mut self, mut signal: TradeSignal, observer: &mut dyn TradeObserver) -> Option<TradeSignal> {
        if let Some(trade) = &self.current_trade {
            warn!(
                "Entry from {} ignored: already in {} trade @ {:.2}",
                signal.strategy, trade.strategy_name, trade.entry
            );
            return None;
        }

        let tick = self.config.tick_size;
        signal.entry = round_to_tick(signal.entry, tick);
        signal.stop_loss = round_to_tick(signal.stop_loss, tick);
        signal.target = signal.target.map(|t| round_to_tick(t, tick));

        if !observer.on_entry(&signal) {
            info!(
                "Entry rejected by observer: {} {} @ {:.2}",
                signal.strategy, signal.trigger, signal.entry
            );
            return None;
        }

        let trade = ActiveTrade::from_signal(&signal);
        info!(
            "ENTRY: {} {} @ {:.2} | Stop: {:.2} | Target: {} | Risk: {:.2}",
            trade.strategy_name,
            trade.trigger,
            trade.entry,
            trade.stop_loss,
            fmt_target(trade.target),
            trade.initial_risk
        );
        self.current_trade = Some(trade);
        self.sweep.reset_after_entry();
        for slot in &mut self.strategies {
            slot.strategy.on_entry();
        }
        Some(signal)
    }

    fn trail_stop(&mut self, candle: &Candle, observer: &mut dyn TradeObserver) {
        let Some(trade) = self.current_trade.as_mut() else {
            return;
        };
        let close = candle.close;
        let risk = trade.entry - trade.stop_loss;
        let profit_ratio = if risk > 0.0 { (close - trade.entry) / risk } else { 0.0 };
        let timeframe = if profit_ratio >= self.config.trailing_activation_ratio {
            Timeframe::OneMinute
        } else {
            Timeframe::FiveMinute
        };

        let best = self
            .tracker
            .swing_lows(timeframe)
            .filter(|z| z.price_low > trade.stop_loss && z.price_low < close && z.created_at > trade.timestamp)
            .map(|z| z.price_low)
            .max_by(|a, b| a.total_cmp(b));

        let Some(level) = best else {
            return;
        };
        let new_stop = round_to_tick(level, self.config.tick_size);
        if new_stop <= trade.stop_loss {
            return;
        }

        info!(
            "TRAIL: {} swing low {:.2} -> stop {:.2} (was {:.2}, profit {:.2}R)",
            timeframe, level, new_stop, trade.stop_loss, profit_ratio
        );
        trade.stop_loss = new_stop;
        observer.update_trailing_stop(close, new_stop);

        if timeframe == Timeframe::OneMinute {
            if let Some(old) = trade.target.take() {
                info!("TARGET REMOVED: {:.2}, trailing only", old);
                observer.on_target_update(Some(old), None);
            }
        }
    }

    fn migrate_target(&mut self, candle: &Candle, observer: &mut dyn TradeObserver) {
        let Some(trade) = self.current_trade.as_mut() else {
            return;
        };
        let Some(old_target) = trade.target else {
            return;
        };
        let r = trade.initial_risk;
        if r <= 0.0 {
            return;
        }

        let moved = (candle.close - trade.entry) / r;
        let new_target = if moved >= self.config.target_move_2r_threshold
            && !trade.target_moved_2r
            && !trade.target_moved_4r
        {
            trade.target_moved_2r = true;
            trade.entry + 2.0 * r
        } else if moved >= self.config.target_move_4r_threshold && !trade.target_moved_4r {
            trade.target_moved_4r = true;
            trade.entry + 4.0 * r
        } else {
            return;
        };

        let new_target = round_to_tick(new_target, self.config.tick_size);
        if (new_target - old_target).abs() > f64::EPSILON {
            info!("TARGET MOVED: {:.2} -> {:.2} (move {:.2}R)", old_target, new_target, moved);
            trade.target = Some(new_target);
            observer.on_target_update(Some(old_target), Some(new_target));
        }
    }

    fn check_exit(&mut self, candle: &Candle, observer: &mut dyn TradeObserver) -> Option<ExitSignal> {
        if self.last_exit_ts == Some(candle.timestamp) {
            return None;
        }
        let trade = self.current_trade.as_ref()?;
        let close = candle.close;

        let reason = if close <= trade.stop_loss {
            ExitReason::StopLoss
        } else if trade.target.is_some_and(|t| close >= t) {
            ExitReason::Target
        } else {
            return None;
        };

        Some(self.close_trade(close, reason, candle.timestamp, observer))
    }

    /// Flatten the open trade at `price` (session close, manual exit)
    pub fn force_exit(
        &mut self,
        price: f64,
        timestamp: DateTime<Utc>,
        observer: &mut dyn TradeObserver,
    ) -> Option<ExitSignal> {
        if self.current_trade.is_none() {
            return None;
        }
        Some(self.close_trade(price, ExitReason::Forced, timestamp, observer))
    }

    fn close_trade(
        &mut self,
        price: f64,
        reason: ExitReason,
        timestamp: DateTime<Utc>,
        observer: &mut dyn TradeObserver,
    ) -> ExitSignal {
        let trade = self.current_trade.take();
        let (entry, stop_loss, target) = trade
            .as_ref()
            .map_or((price, price, None), |t| (t.entry, t.stop_loss, t.target));

        let exit = ExitSignal {
            exit_price: round_to_tick(price, self.config.tick_size),
            reason,
            entry,
            stop_loss,
            target,
            timestamp,
        };

        match reason {
            ExitReason::StopLoss => info!("EXIT STOP: {:.2} | Entry: {:.2} | Stop: {:.2}", exit.exit_price, entry, stop_loss),
            ExitReason::Target => info!("EXIT TARGET: {:.2} | Entry: {:.2} | Target: {}", exit.exit_price, entry, fmt_target(target)),
            ExitReason::Forced => info!("EXIT FORCED: {:.2} | Entry: {:.2}", exit.exit_price, entry),
        }

        self.last_exit_ts = Some(timestamp);
        observer.on_exit(&exit);
        exit
    }

    pub fn enable_strategy(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable_strategy(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.strategies.iter_mut().find(|s| s.strategy.name() == name) {
            Some(slot) => {
                slot.enabled = enabled;
                info!("Strategy {} {}", name, if enabled { "enabled" } else { "disabled" });
                true
            }
            None => {
                warn!("Unknown strategy: {}", name);
                false
            }
        }
    }

    pub fn active_strategies(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.strategy.name().to_string())
            .collect()
    }

    /// Clear session-scoped state; zones and bar history carry over
    pub fn reset_session(&mut self) {
        self.sweep.reset_session();
        for slot in &mut self.strategies {
            slot.strategy.reset();
        }
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            initialized: self.initialized,
            in_trade: self.in_trade(),
            current_trade: self.current_trade.clone(),
            sweep: self.sweep.clone(),
            liquidity: self.tracker.liquidity_summary(),
            strategies: self
                .strategies
                .iter()
                .map(|s| StrategyStatus {
                    name: s.strategy.name().to_string(),
                    enabled: s.enabled,
                })
                .collect(),
        }
    }

    pub fn in_trade(&self) -> bool {
        self.current_trade.is_some()
    }

    pub fn current_trade(&self) -> Option<&ActiveTrade> {
        self.current_trade.as_ref()
    }

    pub fn tracker(&self) -> &LiquidityTracker {
        &self.tracker
    }

    pub fn sweep(&self) -> &SweepState {
        &self.sweep
    }

    pub fn sweep_mut(&mut self) -> &mut SweepState {
        &mut self.sweep
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn fmt_target(target: Option<f64>) -> String {
    target.map_or_else(|| "none".to_string(), |t| format!("{:.2}", t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading_core::events::RecordingObserver;
    use crate::trading_core::liquidity::{LiquidityZone, ZoneKind};
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 4, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn bar(minutes: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle::new(at(minutes), open, high, low, close)
    }

    fn signal(entry: f64, stop: f64, target: f64) -> TradeSignal {
        TradeSignal {
            trigger: TriggerType::Imps,
            strategy: "ERLtoIRL".to_string(),
            entry,
            stop_loss: stop,
            target: Some(target),
            symbol: "NIFTY".to_string(),
            timestamp: at(0),
        }
    }

    fn manager() -> StrategyManager {
        StrategyManager::new(EngineConfig::default()).unwrap()
    }

    fn swing_low(tf: Timeframe, price: f64, minutes: i64) -> LiquidityZone {
        LiquidityZone::new(ZoneKind::SwingLow, tf, price, price, at(minutes), bar(minutes, price, price, price, price), "NIFTY")
    }

    struct FailingStrategy;

    impl Strategy for FailingStrategy {
        fn name(&self) -> &str {
            "failing"
        }

        fn evaluate(&mut self, _ctx: &StrategyContext<'_>) -> Result<Option<TradeSignal>, EngineError> {
            Err(EngineError::strategy("failing", "boom"))
        }
    }

    struct AlwaysLong;

    impl Strategy for AlwaysLong {
        fn name(&self) -> &str {
            "always"
        }

        fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Result<Option<TradeSignal>, EngineError> {
            let mut s = signal(ctx.candle.close, ctx.candle.close - 5.0, ctx.candle.close + 10.0);
            s.strategy = "always".to_string();
            s.timestamp = ctx.candle.timestamp;
            Ok(Some(s))
        }
    }

    #[test]
    fn test_second_entry_is_noop() {
        let mut m = manager();
        let mut obs = RecordingObserver::default();
        assert!(m.enter_trade(signal(100.0, 95.0, 110.0), &mut obs));
        assert!(!m.enter_trade(signal(200.0, 195.0, 210.0), &mut obs));
        assert_eq!(obs.entries.len(), 1);
        assert_eq!(m.current_trade().unwrap().entry, 100.0);
    }

    #[test]
    fn test_rejected_entry_stays_flat() {
        let mut m = manager();
        let mut obs = RecordingObserver {
            reject_entries: true,
            ..Default::default()
        };
        assert!(!m.enter_trade(signal(100.0, 95.0, 110.0), &mut obs));
        assert!(!m.in_trade());
    }

    #[test]
    fn test_stop_loss_exit() {
        let mut m = manager();
        let mut obs = RecordingObserver::default();
        m.enter_trade(signal(100.0, 95.0, 110.0), &mut obs);

        let action = m.on_1min_close(&bar(1, 99.0, 99.5, 94.0, 95.0), &mut obs);
        match action {
            Some(TradeAction::Exited(exit)) => {
                assert_eq!(exit.reason, ExitReason::StopLoss);
                assert!((exit.exit_price - 95.0).abs() < 1e-9);
            }
            other => panic!("expected stop exit, got {:?}", other),
        }
        assert!(!m.in_trade());
        assert_eq!(obs.exits.len(), 1);
    }

    #[test]
    fn test_target_exit_and_migration() {
        let mut m = manager();
        let mut obs = RecordingObserver::default();
        // 3R target: a 0.5R move pulls it in to 2R
        m.enter_trade(signal(100.0, 95.0, 115.0), &mut obs);

        assert!(m.on_1min_close(&bar(1, 100.0, 103.0, 99.5, 102.5), &mut obs).is_none());
        let trade = m.current_trade().unwrap();
        assert!(trade.target_moved_2r);
        assert!((trade.target.unwrap() - 110.0).abs() < 1e-9);

        // 1R move -> 4R
        assert!(m.on_1min_close(&bar(2, 102.5, 105.5, 102.0, 105.0), &mut obs).is_none());
        let trade = m.current_trade().unwrap();
        assert!(trade.target_moved_4r);
        assert!((trade.target.unwrap() - 120.0).abs() < 1e-9);
        assert_eq!(obs.target_updates.len(), 2);

        match m.on_1min_close(&bar(3, 105.0, 121.0, 104.5, 120.5), &mut obs) {
            Some(TradeAction::Exited(exit)) => assert_eq!(exit.reason, ExitReason::Target),
            other => panic!("expected target exit, got {:?}", other),
        }
    }

    #[test]
    fn test_one_migration_step_per_bar() {
        let mut m = manager();
        let mut obs = RecordingObserver::default();
        m.enter_trade(signal(100.0, 95.0, 130.0), &mut obs);
        // a 1.2R move qualifies for both steps but only takes the 2R one
        m.on_1min_close(&bar(1, 100.0, 106.5, 99.5, 106.0), &mut obs);
        let trade = m.current_trade().unwrap();
        assert!(trade.target_moved_2r);
        assert!(!trade.target_moved_4r);
    }

    #[test]
    fn test_trailing_to_five_minute_swing_keeps_target() {
        let mut m = manager();
        let mut obs = RecordingObserver::default();
        m.enter_trade(signal(100.0, 95.0, 110.0), &mut obs);
        m.tracker.add_zone(swing_low(Timeframe::FiveMinute, 97.0, 5));
        m.tracker.add_zone(swing_low(Timeframe::FiveMinute, 98.0, -5)); // before entry

        m.on_1min_close(&bar(10, 100.0, 101.0, 99.8, 100.5), &mut obs);
        let trade = m.current_trade().unwrap();
        assert_eq!(trade.stop_loss, 97.0);
        assert!(trade.target.is_some());
        assert_eq!(obs.trailing_updates, vec![(100.5, 97.0)]);
    }

    #[test]
    fn test_profit_trailing_removes_target_permanently() {
        let mut m = manager();
        let mut obs = RecordingObserver::default();
        m.enter_trade(signal(100.0, 95.0, 200.0), &mut obs);
        m.tracker.add_zone(swing_low(Timeframe::OneMinute, 104.0, 5));

        // 1.6R in profit
        m.on_1min_close(&bar(10, 107.0, 108.5, 106.5, 108.0), &mut obs);
        let trade = m.current_trade().unwrap();
        assert_eq!(trade.stop_loss, 104.0);
        assert!(trade.target.is_none());

        // target never comes back, and migration is skipped
        m.on_1min_close(&bar(11, 108.0, 110.0, 107.5, 109.0), &mut obs);
        assert!(m.current_trade().unwrap().target.is_none());
        assert!(obs.target_updates.contains(&(Some(200.0), None)));
    }

    #[test]
    fn test_force_exit() {
        let mut m = manager();
        let mut obs = RecordingObserver::default();
        assert!(m.force_exit(100.0, at(1), &mut obs).is_none());
        m.enter_trade(signal(100.0, 95.0, 110.0), &mut obs);
        let exit = m.force_exit(101.0, at(1), &mut obs).unwrap();
        assert_eq!(exit.reason, ExitReason::Forced);
        assert!(!m.in_trade());
    }

    #[test]
    fn test_strategy_errors_are_skipped() {
        let mut m = StrategyManager::with_strategies(
            EngineConfig::default(),
            vec![Box::new(FailingStrategy), Box::new(AlwaysLong)],
        )
        .unwrap();
        let mut obs = RecordingObserver::default();
        match m.on_1min_close(&bar(1, 100.0, 101.0, 99.0, 100.0), &mut obs) {
            Some(TradeAction::Entered(s)) => assert_eq!(s.strategy, "always"),
            other => panic!("expected entry, got {:?}", other),
        }
    }

    #[test]
    fn test_enable_disable() {
        let mut m = manager();
        assert_eq!(m.active_strategies(), vec!["ERLtoIRL", "IRLtoERL"]);
        assert!(m.disable_strategy("ERLtoIRL"));
        assert_eq!(m.active_strategies(), vec!["IRLtoERL"]);
        assert!(m.enable_strategy("ERLtoIRL"));
        assert!(!m.disable_strategy("nope"));

        let status = m.status();
        assert!(!status.in_trade);
        assert_eq!(status.strategies.len(), 2);
        assert!(serde_json::to_string(&status).is_ok());
    }

    #[test]
    fn test_initialize_requires_history() {
        let mut m = manager();
        assert!(matches!(
            m.initialize_with_historical_data(&[], &[]),
            Err(EngineError::InsufficientHistory { .. })
        ));

        let five = vec![bar(-10, 101.0, 102.0, 99.0, 99.5), bar(-5, 99.5, 100.0, 98.0, 98.2)];
        m.initialize_with_historical_data(&five, &[]).unwrap();
        assert_eq!(m.sweep().sweep_target, Some(98.0));
        assert_eq!(m.sweep().sweep_set_time, Some(at(0)));
        assert!(m.status().initialized);
    }

    #[test]
    fn test_invalidated_sweep_waits_for_fresh_five_minute_bar() {
        let mut m = manager();
        let five = vec![bar(-10, 101.0, 102.0, 99.0, 99.5), bar(-5, 99.5, 100.0, 98.0, 98.2)];
        m.initialize_with_historical_data(&five, &[]).unwrap();
        m.sweep_mut().on_1min_close(&bar(1, 98.5, 98.6, 97.0, 97.2));
        assert!(m.sweep().is_swept());

        for c in [bar(0, 98.2, 98.4, 96.8, 97.0), bar(5, 97.0, 97.1, 95.8, 95.9)] {
            m.sweep_mut().on_5min_close(&c);
            m.on_5min_close(&c);
        }
        assert!(m.sweep().sweep_invalidated);

        // the invalidating bar is still the latest 5m bar
        assert!(!m.arm_sweep(at(9)));
        assert!(m.sweep().sweep_target.is_none());

        let fresh = bar(10, 96.0, 96.2, 94.5, 94.7);
        m.sweep_mut().on_5min_close(&fresh);
        m.on_5min_close(&fresh);
        assert!(m.arm_sweep(at(14)));
        assert_eq!(m.sweep().sweep_target, Some(94.5));
    }
}
