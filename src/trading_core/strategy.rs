//! Pluggable entry strategies
//!
//! Strategies are evaluated by the `StrategyManager` on every closed 1m bar
//! while flat. They share the trigger detectors and only differ in which
//! liquidity event qualifies a setup and where the target goes:
//! - `ErlToIrl`: external liquidity (sweep of a 5m low) into internal targets
//! - `IrlToErl`: internal liquidity (sting into a bullish 5m gap) out to the
//!   nearest swing high

use std::collections::VecDeque;
use tracing::{debug, info};

use super::candle::{Candle, Timeframe};
use super::config::EngineConfig;
use super::error::EngineError;
use super::events::TradeSignal;
use super::liquidity::{LiquidityTracker, ZoneId};
use super::sweep::SweepState;
use super::ticks::round_to_tick;
use super::triggers::{detect_cisd, detect_imps, target_ratio, TriggerSetup};

/// Read-only view handed to strategies for one closed 1m bar
pub struct StrategyContext<'a> {
    pub candle: &'a Candle,
    pub candles_1min: &'a VecDeque<Candle>,
    pub sweep: &'a SweepState,
    pub tracker: &'a LiquidityTracker,
    pub config: &'a EngineConfig,
}

impl StrategyContext<'_> {
    /// Up to `n` most recent closed 1m bars, oldest first
    pub fn recent_bars(&self, n: usize) -> Vec<Candle> {
        let skip = self.candles_1min.len().saturating_sub(n);
        self.candles_1min.iter().skip(skip).cloned().collect()
    }

    /// IMPS on the last three bars, then CISD on the current bar
    pub fn find_trigger(&self) -> Option<TriggerSetup> {
        detect_imps(&self.recent_bars(3)).or_else(|| detect_cisd(self.candle, self.sweep))
    }

    fn signal(&self, strategy: &str, setup: &TriggerSetup, target: f64) -> Result<TradeSignal, EngineError> {
        let tick = self.config.tick_size;
        let (entry, stop_loss, target) = (
            round_to_tick(setup.entry, tick),
            round_to_tick(setup.stop_loss, tick),
            round_to_tick(target, tick),
        );
        if !(entry.is_finite() && stop_loss.is_finite() && target.is_finite()) {
            return Err(EngineError::strategy(
                strategy,
                format!("non-finite prices entry={} stop={} target={}", entry, stop_loss, target),
            ));
        }
        Ok(TradeSignal {
            trigger: setup.trigger,
            strategy: strategy.to_string(),
            entry,
            stop_loss,
            target: Some(target),
            symbol: self.config.symbol.clone(),
            timestamp: self.candle.timestamp,
        })
    }
}

pub trait Strategy {
    fn name(&self) -> &str;

    /// Inspect the closed bar; `Ok(Some)` requests a long entry
    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Result<Option<TradeSignal>, EngineError>;

    /// Called after any strategy's entry is accepted
    fn on_entry(&mut self) {}

    /// Called at the session rollover
    fn reset(&mut self) {}
}

/// Sweep of external liquidity confirmed by IMPS or CISD
#[derive(Debug, Default)]
pub struct ErlToIrl;

impl ErlToIrl {
    pub const NAME: &'static str = "ERLtoIRL";
}

impl Strategy for ErlToIrl {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Result<Option<TradeSignal>, EngineError> {
        if !ctx.sweep.is_swept() {
            return Ok(None);
        }
        let Some(setup) = ctx.find_trigger() else {
            debug!("{}: swept, no confirmation on {}", Self::NAME, ctx.candle.timestamp);
            return Ok(None);
        };

        let ratio = target_ratio(ctx.sweep, ctx.config);
        let target = setup.entry + setup.risk() * ratio;
        ctx.signal(Self::NAME, &setup, target).map(Some)
    }
}

/// Sting into an unmitigated bullish 5m gap, targeting the next swing high
#[derive(Debug, Default)]
pub struct IrlToErl {
    stung_zone: Option<ZoneId>,
}

impl IrlToErl {
    pub const NAME: &'static str = "IRLtoERL";

    pub fn stung_zone(&self) -> Option<ZoneId> {
        self.stung_zone
    }
}

impl Strategy for IrlToErl {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evaluate(&mut self, ctx: &StrategyContext<'_>) -> Result<Option<TradeSignal>, EngineError> {
        if let Some(id) = self.stung_zone {
            if ctx.tracker.zone(id).map_or(true, |z| z.mitigated) {
                debug!("{}: stung zone {:?} mitigated, clearing", Self::NAME, id);
                self.stung_zone = None;
            }
        }

        if self.stung_zone.is_none() {
            let low = ctx.candle.low;
            self.stung_zone = ctx
                .tracker
                .bullish_zones(Some(Timeframe::FiveMinute))
                .into_iter()
                .find(|(_, zone)| zone.contains(low))
                .map(|(id, zone)| {
                    info!(
                        "STING: {:.2} into {} [{:.2} - {:.2}]",
                        low, zone.kind, zone.price_low, zone.price_high
                    );
                    id
                });
        }

        let Some(id) = self.stung_zone else {
            return Ok(None);
        };
        let Some(zone) = ctx.tracker.zone(id) else {
            return Err(EngineError::strategy(Self::NAME, format!("unknown zone {:?}", id)));
        };
        let Some(setup) = ctx.find_trigger() else {
            return Ok(None);
        };

        let target = ctx
            .tracker
            .swing_high_prices()
            .into_iter()
            .filter(|p| *p > setup.entry)
            .min_by(|a, b| a.total_cmp(b))
            .unwrap_or(setup.entry + 2.0 * (setup.entry - zone.price_low));

        ctx.signal(Self::NAME, &setup, target).map(Some)
    }

    fn on_entry(&mut self) {
        self.stung_zone = None;
    }

    fn reset(&mut self) {
        self.stung_zone = None;
    }
}
