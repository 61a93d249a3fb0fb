//! Error types for signal analysis

use crate::types::Timeframe;
use thiserror::Error;

/// Failures that abort a single analysis call.
///
/// Short candle histories are not errors: detectors return empty results.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No candle data for {symbol} {timeframe}")]
    DataUnavailable { symbol: String, timeframe: Timeframe },

    #[error("Candle fetch for {symbol} timed out after {secs}s")]
    FetchTimeout { symbol: String, secs: u64 },

    #[error("Ambiguous input: {message}")]
    AmbiguousInput { message: String },

    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),
}

impl AnalysisError {
    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::AmbiguousInput {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
