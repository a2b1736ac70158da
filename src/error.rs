use thiserror::Error;

use crate::models::EventKey;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum BacktestError {
    /// A PIT snapshot used information that was not available before the event
    #[error("leakage detected for {event} (player {player}): {detail}")]
    LeakageDetected {
        event: EventKey,
        player: String,
        detail: String,
    },

    #[error("no cutoff date can be determined for {0}")]
    MissingCutoff(EventKey),

    #[error("experiment {0} not found")]
    ExperimentNotFound(i64),

    #[error("experiment {id} cannot move from {from} to {to}")]
    InvalidTransition { id: i64, from: String, to: String },

    #[error("experiment {id} failed: {message}")]
    ExperimentFailed { id: i64, message: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("data loading error: {0}")]
    Data(#[from] polars::prelude::PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BacktestError>;

pub fn validate_odds(decimal_odds: f64) -> Result<()> {
    if !decimal_odds.is_finite() || decimal_odds < 1.0 {
        return Err(BacktestError::Validation(format!(
            "Decimal odds must be at least 1.0, got {}",
            decimal_odds
        )));
    }
    Ok(())
}

pub fn validate_probability(prob: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&prob) {
        return Err(BacktestError::Validation(format!(
            "Probability must be between 0 and 1, got {}",
            prob
        )));
    }
    Ok(())
}

pub fn validate_weight(name: &str, weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(BacktestError::Validation(format!(
            "Weight {} must be a non-negative number, got {}",
            name, weight
        )));
    }
    Ok(())
}
