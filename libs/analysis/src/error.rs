//! Fatal errors for an analysis run

use thiserror::Error;

/// Conditions that halt a run before any chart is composed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Caller configuration violates a precondition that cannot be auto-corrected
    #[error("invalid input: {0}")]
    Input(String),

    /// The fetch produced nothing usable
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Every requested ticker came back without usable prices
    #[error("nothing to analyze: no usable price data for {}", tickers.join(", "))]
    NothingToAnalyze { tickers: Vec<String> },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
