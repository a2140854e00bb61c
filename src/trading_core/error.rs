//! Engine error types

/// Errors surfaced by the trading core.
///
/// Data irregularities (gaps, out-of-order bars, degenerate candles) are not
/// errors; they re-bucket or short-circuit quietly.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid config field {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("invalid tick size {0}")]
    InvalidTickSize(f64),

    #[error("insufficient history for {what}: have {have} bars, need {need}")]
    InsufficientHistory {
        what: String,
        have: usize,
        need: usize,
    },

    #[error("strategy {strategy} failed: {reason}")]
    Strategy { strategy: String, reason: String },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn strategy(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Strategy {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}
