// Library crate - exports the price-action engine

pub mod trading_core;

// Re-export commonly used types
pub use trading_core::*;
