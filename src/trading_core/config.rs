//! Configuration for the price-action engine and the paper account
//!
//! Load order: defaults, then an optional JSON file, then environment
//! variables (`.env` via dotenvy), then CLI flags applied by the binary.

use chrono::{Duration, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::EngineError;
use super::session::{SessionClock, DEFAULT_SESSION_OPEN};

/// Engine configuration, passed explicitly at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Instrument label carried on zones and signals (e.g., "NIFTY")
    pub symbol: String,

    /// Minimum price increment; every emitted price is rounded to it
    pub tick_size: f64,

    /// Bars required on each side of a swing point
    pub swing_look_back: usize,

    /// Reward multiple for IMPS/CISD targets
    pub base_target_ratio: f64,

    /// Reward multiple when the swept level is the session low
    pub session_low_target_ratio: f64,

    /// Minutes an FVG/IFVG must age before it can be mitigated
    pub mitigation_cooldown_mins: i64,

    /// Profit ratio at which trailing switches to 1m swing lows and drops the target
    pub trailing_activation_ratio: f64,

    /// Price move (in R) that moves the target to entry + 2R
    pub target_move_2r_threshold: f64,

    /// Price move (in R) that moves the target to entry + 4R
    pub target_move_4r_threshold: f64,

    /// Consecutive 5m closes below a swept target that invalidate it
    pub sweep_invalidation_closes: u32,

    /// Max bars kept in the bear run used by CISD
    pub max_bear_run: usize,

    /// Max closed 1m bars kept by the aggregator and tracker
    pub max_1min_history: usize,

    /// Max closed 5m bars kept by the aggregator and tracker
    pub max_5min_history: usize,

    /// Session open; bars are bucketed from this anchor
    pub session_open: NaiveTime,

    /// Exchange timezone used for the anchor and day rollovers
    pub session_tz: Tz,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "NIFTY".to_string(),
            tick_size: 0.05,
            swing_look_back: 2,
            base_target_ratio: 2.0,
            session_low_target_ratio: 3.0,
            mitigation_cooldown_mins: 10,
            trailing_activation_ratio: 1.5,
            target_move_2r_threshold: 0.5,
            target_move_4r_threshold: 1.0,
            sweep_invalidation_closes: 2,
            max_bear_run: 10,
            max_1min_history: 1500,
            max_5min_history: 300,
            session_open: DEFAULT_SESSION_OPEN,
            session_tz: chrono_tz::Asia::Kolkata,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file; missing fields fall back to defaults
    pub fn from_json_file(path: &Path) -> Result<Self, EngineError> {
        let file = std::fs::File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(config)
    }

    /// Overlay process environment variables
    pub fn apply_env(&mut self) -> Result<(), EngineError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup (TICK_SIZE, SWING_LOOK_BACK, SESSION_TZ, SYMBOL)
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TICK_SIZE") {
            self.tick_size = parse_field("TICK_SIZE", &v)?;
        }
        if let Some(v) = lookup("SWING_LOOK_BACK") {
            self.swing_look_back = parse_field("SWING_LOOK_BACK", &v)?;
        }
        if let Some(v) = lookup("SESSION_TZ") {
            self.session_tz = v
                .parse::<Tz>()
                .map_err(|e| EngineError::config("SESSION_TZ", e.to_string()))?;
        }
        if let Some(v) = lookup("SYMBOL") {
            self.symbol = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.tick_size > 0.0) || !self.tick_size.is_finite() {
            return Err(EngineError::InvalidTickSize(self.tick_size));
        }
        if self.swing_look_back == 0 {
            return Err(EngineError::config("swing_look_back", "must be at least 1"));
        }
        if self.base_target_ratio <= 0.0 || self.session_low_target_ratio <= 0.0 {
            return Err(EngineError::config("target_ratio", "must be positive"));
        }
        if self.mitigation_cooldown_mins < 0 {
            return Err(EngineError::config("mitigation_cooldown_mins", "must not be negative"));
        }
        if self.trailing_activation_ratio <= 0.0 {
            return Err(EngineError::config("trailing_activation_ratio", "must be positive"));
        }
        if self.target_move_2r_threshold > self.target_move_4r_threshold {
            return Err(EngineError::config(
                "target_move_2r_threshold",
                "must not exceed target_move_4r_threshold",
            ));
        }
        if self.sweep_invalidation_closes == 0 {
            return Err(EngineError::config("sweep_invalidation_closes", "must be at least 1"));
        }
        if self.max_1min_history < 3 || self.max_5min_history < 3 {
            return Err(EngineError::config("history", "must keep at least 3 bars"));
        }
        Ok(())
    }

    pub fn mitigation_cooldown(&self) -> Duration {
        Duration::minutes(self.mitigation_cooldown_mins)
    }

    pub fn session_clock(&self) -> SessionClock {
        SessionClock::new(self.session_tz, self.session_open)
    }
}

/// Fixed-risk paper account settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Starting cash balance
    pub starting_balance: f64,

    /// Percent of balance risked per trade
    pub fixed_sl_percentage: f64,

    /// Units per lot
    pub lot_size: f64,

    /// Trades whose stop is this percent of price or wider are rejected
    pub max_sl_percentage_of_price: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            starting_balance: 50_000.0,
            fixed_sl_percentage: 20.0,
            lot_size: 75.0,
            max_sl_percentage_of_price: 25.0,
        }
    }
}

impl AccountConfig {
    pub fn apply_env(&mut self) -> Result<(), EngineError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay LOT_SIZE, ACCT_START_BALANCE, FIXED_SL_PERCENTAGE, MAX_SL_PERCENTAGE_OF_PRICE
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("LOT_SIZE") {
            self.lot_size = parse_field("LOT_SIZE", &v)?;
        }
        if let Some(v) = lookup("ACCT_START_BALANCE") {
            self.starting_balance = parse_field("ACCT_START_BALANCE", &v)?;
        }
        if let Some(v) = lookup("FIXED_SL_PERCENTAGE") {
            self.fixed_sl_percentage = parse_field("FIXED_SL_PERCENTAGE", &v)?;
        }
        if let Some(v) = lookup("MAX_SL_PERCENTAGE_OF_PRICE") {
            self.max_sl_percentage_of_price = parse_field("MAX_SL_PERCENTAGE_OF_PRICE", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.starting_balance <= 0.0 {
            return Err(EngineError::config("starting_balance", "must be positive"));
        }
        if self.lot_size <= 0.0 {
            return Err(EngineError::config("lot_size", "must be positive"));
        }
        if !(0.0..=100.0).contains(&self.fixed_sl_percentage) {
            return Err(EngineError::config("fixed_sl_percentage", "must be within 0..=100"));
        }
        if self.max_sl_percentage_of_price <= 0.0 {
            return Err(EngineError::config("max_sl_percentage_of_price", "must be positive"));
        }
        Ok(())
    }
}

fn parse_field<T>(field: &str, raw: &str) -> Result<T, EngineError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| EngineError::config(field, format!("{:?}: {}", raw, e)))
}
