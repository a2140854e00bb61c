//! Trade events and the observer boundary
//!
//! The engine never executes orders itself. Entries, exits and stop/target
//! changes are pushed to a `TradeObserver` (paper `PositionManager` in the
//! replay binary, a broker adapter elsewhere).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confirmation pattern that produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    Imps,
    Cisd,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Imps => write!(f, "IMPS"),
            TriggerType::Cisd => write!(f, "CISD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    Target,
    /// Session close or manual flatten
    Forced,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "STOP_LOSS"),
            ExitReason::Target => write!(f, "TARGET"),
            ExitReason::Forced => write!(f, "FORCED"),
        }
    }
}

/// Long entry request, prices already tick-rounded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub trigger: TriggerType,
    pub strategy: String,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: Option<f64>,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
}

impl TradeSignal {
    pub fn risk(&self) -> f64 {
        self.entry - self.stop_loss
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    pub exit_price: f64,
    pub reason: ExitReason,
    pub entry: f64,
    pub stop_loss: f64,
    pub target: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Receives trade lifecycle callbacks from the strategy manager
pub trait TradeObserver {
    /// Return false to reject the entry; the engine then stays flat
    fn on_entry(&mut self, signal: &TradeSignal) -> bool;

    fn on_exit(&mut self, signal: &ExitSignal);

    fn update_trailing_stop(&mut self, current_price: f64, new_stop: f64);

    fn on_target_update(&mut self, _old_target: Option<f64>, _new_target: Option<f64>) {}
}

/// Observer that accepts every entry and records all callbacks
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub entries: Vec<TradeSignal>,
    pub exits: Vec<ExitSignal>,
    pub trailing_updates: Vec<(f64, f64)>,
    pub target_updates: Vec<(Option<f64>, Option<f64>)>,
    /// When set, every entry is rejected
    pub reject_entries: bool,
}

impl TradeObserver for RecordingObserver {
    fn on_entry(&mut self, signal: &TradeSignal) -> bool {
        if self.reject_entries {
            return false;
        }
        self.entries.push(signal.clone());
        true
    }

    fn on_exit(&mut self, signal: &ExitSignal) {
        self.exits.push(signal.clone());
    }

    fn update_trailing_stop(&mut self, current_price: f64, new_stop: f64) {
        self.trailing_updates.push((current_price, new_stop));
    }

    fn on_target_update(&mut self, old_target: Option<f64>, new_target: Option<f64>) {
        self.target_updates.push((old_target, new_target));
    }
}
