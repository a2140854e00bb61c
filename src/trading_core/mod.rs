//! Trading Core - price-action engine shared by the library and the pipeline
//!
//! This module contains:
//! - Candle aggregation (ticks or 1m OHLC into session-anchored 1m/5m bars)
//! - Liquidity zone tracking (FVG, implied FVG, previous highs/lows, swings)
//! - Sweep state and the IMPS/CISD entry triggers
//! - Pluggable strategies and the single-trade strategy manager
//! - Paper position/account management for replay

pub mod aggregator;
pub mod candle;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod implied_fvg;
pub mod liquidity;
pub mod manager;
pub mod position;
pub mod session;
pub mod strategy;
pub mod sweep;
pub mod ticks;
pub mod triggers;

// Re-export commonly used types
pub use aggregator::{AggregatorEvent, CandleAggregator};
pub use candle::{Candle, CandleType, Ohlc, Timeframe};
pub use config::{AccountConfig, EngineConfig};
pub use engine::Engine;
pub use error::EngineError;
pub use events::{ExitReason, ExitSignal, TradeObserver, TradeSignal, TriggerType};
pub use implied_fvg::{ImpliedFvg, ImpliedFvgDetector};
pub use liquidity::{LiquiditySummary, LiquidityTracker, LiquidityZone, ZoneKind};
pub use manager::{ActiveTrade, ManagerStatus, StrategyManager, TradeAction};
pub use position::{AccountManager, PositionManager, TradingSummary};
pub use session::SessionClock;
pub use strategy::{ErlToIrl, IrlToErl, Strategy, StrategyContext};
pub use sweep::SweepState;
pub use ticks::round_to_tick;
