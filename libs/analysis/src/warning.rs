use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chart::PanelKind;

/// Non-fatal condition collected during a run and handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Warning {
    /// Adjusted close was missing from the fetch, close was used instead
    CloseFallback,
    TickersTruncated {
        kept: Vec<String>,
        dropped: Vec<String>,
    },
    DuplicateTicker {
        ticker: String,
    },
    LongWindowRaised {
        short: usize,
        requested: usize,
        adjusted: usize,
    },
    /// Whole price series undefined; no derived series computed
    IndicatorUnavailable {
        ticker: String,
    },
    NothingToPlot {
        ticker: String,
    },
    InsufficientData {
        ticker: String,
        panel: PanelKind,
    },
    MissingMovingAverages {
        ticker: String,
    },
}

impl Warning {
    /// Ticker the warning is about, `None` for request-wide notes.
    pub fn ticker(&self) -> Option<&str> {
        match self {
            Warning::IndicatorUnavailable { ticker }
            | Warning::NothingToPlot { ticker }
            | Warning::InsufficientData { ticker, .. }
            | Warning::MissingMovingAverages { ticker }
            | Warning::DuplicateTicker { ticker } => Some(ticker),
            Warning::CloseFallback
            | Warning::TickersTruncated { .. }
            | Warning::LongWindowRaised { .. } => None,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::CloseFallback => {
                write!(f, "using 'Close' price as 'Adj Close' is not available")
            }
            Warning::TickersTruncated { kept, dropped } => write!(
                f,
                "at most two tickers are analyzed; using {} and ignoring {}",
                kept.join(", "),
                dropped.join(", ")
            ),
            Warning::DuplicateTicker { ticker } => {
                write!(f, "ticker {ticker} was given more than once")
            }
            Warning::LongWindowRaised {
                short,
                requested,
                adjusted,
            } => write!(
                f,
                "long MA window {requested} is not above short window {short}; adjusted long window to {adjusted}"
            ),
            Warning::IndicatorUnavailable { ticker } => write!(
                f,
                "skipping indicator calculation for {ticker} due to missing price data"
            ),
            Warning::NothingToPlot { ticker } => write!(f, "nothing to plot for ticker {ticker}"),
            Warning::InsufficientData { ticker, panel } => {
                write!(f, "{ticker}: not enough data for the {panel} panel")
            }
            Warning::MissingMovingAverages { ticker } => write!(
                f,
                "{ticker}: moving averages not available for the trend panel"
            ),
        }
    }
}

/// Log and collect in one step so every warning also reaches the tracing output.
pub(crate) fn push(warnings: &mut Vec<Warning>, warning: Warning) {
    tracing::warn!(ticker = ?warning.ticker(), "{warning}");
    warnings.push(warning);
}
