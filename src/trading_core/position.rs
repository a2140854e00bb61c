//! Paper Position & Account Management
//!
//! `PositionManager` is the replay-side `TradeObserver`: it fills entries and
//! exits at the signal prices, sizes them with fixed-risk lots and keeps the
//! running P&L, win/loss counts and drawdown.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::config::AccountConfig;
use super::events::{ExitReason, ExitSignal, TradeObserver, TradeSignal, TriggerType};

/// Fixed-risk position sizing and cash balance
#[derive(Debug, Clone)]
pub struct AccountManager {
    config: AccountConfig,
    balance: f64,
}

impl AccountManager {
    pub fn new(config: AccountConfig) -> Self {
        Self {
            balance: config.starting_balance,
            config,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Cash risked per trade at the current balance
    pub fn fixed_sl_amount(&self) -> f64 {
        self.balance * self.config.fixed_sl_percentage / 100.0
    }

    /// Lots for a long entry, or None when the trade must be skipped
    /// (stop too wide relative to price, or risk budget below one lot)
    pub fn calculate_lots(&self, entry: f64, stop_loss: f64) -> Option<u32> {
        let sl_distance = entry - stop_loss;
        if sl_distance <= 0.0 || entry <= 0.0 {
            warn!("Invalid stop distance: entry {:.2} stop {:.2}", entry, stop_loss);
            return None;
        }

        let sl_pct = sl_distance / entry * 100.0;
        if sl_pct >= self.config.max_sl_percentage_of_price {
            warn!(
                "Stop {:.2}% of price exceeds max {:.2}%",
                sl_pct, self.config.max_sl_percentage_of_price
            );
            return None;
        }

        let lots = (self.fixed_sl_amount() / (sl_distance * self.config.lot_size)).floor();
        if lots < 1.0 {
            warn!(
                "Risk budget {:.2} too small for stop distance {:.2} x lot {}",
                self.fixed_sl_amount(),
                sl_distance,
                self.config.lot_size
            );
            return None;
        }
        Some(lots as u32)
    }

    pub fn calculate_pnl(&self, entry: f64, exit: f64, lots: u32) -> f64 {
        (exit - entry) * lots as f64 * self.config.lot_size
    }

    pub fn update_balance(&mut self, pnl: f64) {
        self.balance += pnl;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub id: Uuid,
    pub strategy: String,
    pub trigger: TriggerType,
    pub entry: f64,
    pub stop_loss: f64,
    pub initial_stop: f64,
    pub target: Option<f64>,
    pub lots: u32,
    pub opened_at: DateTime<Utc>,
}

/// A completed round trip, as written to the trade log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub id: Uuid,
    pub strategy: String,
    pub trigger: TriggerType,
    pub entry: f64,
    pub exit: f64,
    pub initial_stop: f64,
    pub lots: u32,
    pub pnl: f64,
    pub reason: ExitReason,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TradingSummary {
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub breakevens: u32,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub net_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_drawdown: f64,
    pub final_balance: f64,
    pub entries_rejected: u32,
}

pub struct PositionManager {
    account: AccountManager,
    position: Option<OpenPosition>,
    history: Vec<ClosedTrade>,
    wins: u32,
    losses: u32,
    breakevens: u32,
    gross_profit: f64,
    gross_loss: f64,
    peak_balance: f64,
    max_drawdown: f64,
    entries_rejected: u32,
}

impl PositionManager {
    pub fn new(config: AccountConfig) -> Self {
        let account = AccountManager::new(config);
        Self {
            peak_balance: account.balance(),
            account,
            position: None,
            history: Vec::new(),
            wins: 0,
            losses: 0,
            breakevens: 0,
            gross_profit: 0.0,
            gross_loss: 0.0,
            max_drawdown: 0.0,
            entries_rejected: 0,
        }
    }

    pub fn position(&self) -> Option<&OpenPosition> {
        self.position.as_ref()
    }

    pub fn history(&self) -> &[ClosedTrade] {
        &self.history
    }

    pub fn account(&self) -> &AccountManager {
        &self.account
    }

    /// True when the paper position agrees with the engine's view
    pub fn validate_state(&self, engine_in_trade: bool) -> bool {
        let consistent = self.position.is_some() == engine_in_trade;
        if !consistent {
            warn!(
                "Position state mismatch: engine in_trade={} position={}",
                engine_in_trade,
                self.position.is_some()
            );
        }
        consistent
    }

    /// Drop a position the engine no longer knows about; no P&L is booked
    pub fn cleanup_orphaned(&mut self) -> Option<OpenPosition> {
        let orphan = self.position.take()?;
        warn!(
            "Orphaned position {} ({} @ {:.2}, {} lots) discarded",
            orphan.id, orphan.strategy, orphan.entry, orphan.lots
        );
        Some(orphan)
    }

    pub fn summary(&self) -> TradingSummary {
        let total = self.history.len() as u32;
        let win_rate = if total > 0 { self.wins as f64 / total as f64 * 100.0 } else { 0.0 };

        let profit_factor = if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if self.wins > 0 { self.gross_profit / self.wins as f64 } else { 0.0 };
        let avg_loss = if self.losses > 0 { -(self.gross_loss / self.losses as f64) } else { 0.0 };

        TradingSummary {
            total_trades: total,
            wins: self.wins,
            losses: self.losses,
            breakevens: self.breakevens,
            win_rate,
            profit_factor,
            net_pnl: self.gross_profit - self.gross_loss,
            avg_win,
            avg_loss,
            max_drawdown: self.max_drawdown,
            final_balance: self.account.balance(),
            entries_rejected: self.entries_rejected,
        }
    }
}

impl TradeObserver for PositionManager {
    fn on_entry(&mut self, signal: &TradeSignal) -> bool {
        if self.position.is_some() {
            warn!("Entry while a paper position is open; engine reports flat");
            self.cleanup_orphaned();
        }

        let Some(lots) = self.account.calculate_lots(signal.entry, signal.stop_loss) else {
            self.entries_rejected += 1;
            return false;
        };

        let position = OpenPosition {
            id: Uuid::new_v4(),
            strategy: signal.strategy.clone(),
            trigger: signal.trigger,
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            initial_stop: signal.stop_loss,
            target: signal.target,
            lots,
            opened_at: signal.timestamp,
        };
        info!(
            "FILL: {} lots @ {:.2} ({} {}) risk {:.2}",
            lots,
            position.entry,
            position.strategy,
            position.trigger,
            self.account.fixed_sl_amount()
        );
        self.position = Some(position);
        true
    }

    fn on_exit(&mut self, signal: &ExitSignal) {
        let Some(position) = self.position.take() else {
            warn!("Exit at {:.2} with no open paper position", signal.exit_price);
            return;
        };

        let pnl = self.account.calculate_pnl(position.entry, signal.exit_price, position.lots);
        self.account.update_balance(pnl);

        if pnl > 0.0 {
            self.wins += 1;
            self.gross_profit += pnl;
        } else if pnl < 0.0 {
            self.losses += 1;
            self.gross_loss += -pnl;
        } else {
            self.breakevens += 1;
        }

        let balance = self.account.balance();
        self.peak_balance = self.peak_balance.max(balance);
        self.max_drawdown = self.max_drawdown.max(self.peak_balance - balance);

        info!(
            "CLOSED: {} @ {:.2} -> {:.2} | P&L: {:+.2} | Balance: {:.2}",
            signal.reason, position.entry, signal.exit_price, pnl, balance
        );

        self.history.push(ClosedTrade {
            id: position.id,
            strategy: position.strategy,
            trigger: position.trigger,
            entry: position.entry,
            exit: signal.exit_price,
            initial_stop: position.initial_stop,
            lots: position.lots,
            pnl,
            reason: signal.reason,
            opened_at: position.opened_at,
            closed_at: signal.timestamp,
        });
    }

    fn update_trailing_stop(&mut self, _current_price: f64, new_stop: f64) {
        match self.position.as_mut() {
            Some(position) => position.stop_loss = new_stop,
            None => warn!("Trailing stop {:.2} with no open paper position", new_stop),
        }
    }

    fn on_target_update(&mut self, _old_target: Option<f64>, new_target: Option<f64>) {
        if let Some(position) = self.position.as_mut() {
            position.target = new_target;
        }
    }
}
