//! Entry triggers shared by all strategies
//!
//! - IMPS: upward body gap across the last three closed 1m bars
//! - CISD: close reclaiming the open of the current bear run, or the close
//!   of the deepest up-closing sweep candle
//!
//! Both produce a long setup (entry above stop); targets are filled in by the
//! caller from a reward multiple or a structural level.

use serde::{Deserialize, Serialize};

use super::candle::Candle;
use super::config::EngineConfig;
use super::events::TriggerType;
use super::sweep::SweepState;
use super::ticks::round_to_tick;

/// Raw entry/stop pair before a target is attached
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerSetup {
    pub trigger: TriggerType,
    pub entry: f64,
    pub stop_loss: f64,
}

impl TriggerSetup {
    pub fn risk(&self) -> f64 {
        self.entry - self.stop_loss
    }

    /// Target at `ratio` times the risk above entry, everything tick-rounded
    pub fn priced(&self, ratio: f64, tick_size: f64) -> (f64, f64, f64) {
        let entry = round_to_tick(self.entry, tick_size);
        let stop = round_to_tick(self.stop_loss, tick_size);
        let target = round_to_tick(self.entry + self.risk() * ratio, tick_size);
        (entry, stop, target)
    }
}

/// IMPS on the last three closed 1m bars (c0, c1, c2).
///
/// c0 closes below c1's open, c1 closes above c2's open, and c2 opens above
/// c0's close. Entry is the gap's upper edge (c2 open), stop its lower edge
/// (c0 close).
pub fn detect_imps(candles: &[Candle]) -> Option<TriggerSetup> {
    let [c0, c1, c2] = candles.get(candles.len().checked_sub(3)?..)? else {
        return None;
    };

    if !(c0.close < c1.open && c1.close > c2.open) {
        return None;
    }

    let upper = c0.close.max(c2.open);
    let lower = c0.close.min(c2.open);
    if c2.open <= c0.close || upper <= lower {
        return None;
    }

    Some(TriggerSetup {
        trigger: TriggerType::Imps,
        entry: upper,
        stop_loss: lower,
    })
}

/// CISD for the just-closed 1m bar against the sweep state
pub fn detect_cisd(current: &Candle, sweep: &SweepState) -> Option<TriggerSetup> {
    if let (Some(first), Some(last)) = (sweep.bear_run.front(), sweep.bear_run.back()) {
        if current.close >= first.open {
            return valid(TriggerSetup {
                trigger: TriggerType::Cisd,
                entry: first.open,
                stop_loss: last.low,
            });
        }
    }

    match &sweep.deepest_sweep_candle {
        Some(deepest) if current.close >= deepest.close => valid(TriggerSetup {
            trigger: TriggerType::Cisd,
            entry: deepest.close,
            stop_loss: deepest.low,
        }),
        _ => None,
    }
}

fn valid(setup: TriggerSetup) -> Option<TriggerSetup> {
    (setup.stop_loss < setup.entry).then_some(setup)
}

/// Reward multiple: higher when the sweep took out the session low
pub fn target_ratio(sweep: &SweepState, config: &EngineConfig) -> f64 {
    if sweep.swept_session_low(config.tick_size) {
        config.session_low_target_ratio
    } else {
        config.base_target_ratio
    }
}
