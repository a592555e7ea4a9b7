//! Caller configuration and its validation at the pipeline boundary

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::warning::{self, Warning};

pub const MAX_TICKERS: usize = 2;
pub const DEFAULT_TICKERS: &str = "AAPL, MSFT";
pub const DEFAULT_SHORT_WINDOW: usize = 20;
pub const DEFAULT_LONG_WINDOW: usize = 50;
/// Gap added to the short window when the long window has to be raised
pub const LONG_WINDOW_BUMP: usize = 30;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 365 * 2;
/// Symbols as the market-data API accepts them, e.g. `BRK.B` or `BF-B`
const SYMBOL_PATTERN: &str = r"^[A-Z0-9][A-Z0-9.\-]{0,14}$";

/// Split a comma-separated ticker list, trimming and upper-casing each symbol.
pub fn parse_tickers(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Moving-average windows with `short >= 1` and `long > short`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowConfig {
    short: usize,
    long: usize,
}

impl WindowConfig {
    pub fn new(short: usize, long: usize) -> Result<Self> {
        if short == 0 {
            return Err(AnalysisError::Input(
                "short MA window must be at least 1".to_string(),
            ));
        }
        if long <= short {
            return Err(AnalysisError::Input(format!(
                "long MA window {long} must be greater than short window {short}"
            )));
        }
        Ok(Self { short, long })
    }

    pub fn short(&self) -> usize {
        self.short
    }

    pub fn long(&self) -> usize {
        self.long
    }

    pub fn short_label(&self) -> String {
        format!("MA_{}", self.short)
    }

    pub fn long_label(&self) -> String {
        format!("MA_{}", self.long)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            short: DEFAULT_SHORT_WINDOW,
            long: DEFAULT_LONG_WINDOW,
        }
    }
}

/// Unvalidated request as it arrives from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub short_window: usize,
    pub long_window: usize,
    pub include_returns: bool,
    pub include_trend: bool,
}

impl AnalysisRequest {
    /// Request with the dashboard defaults, ending at `today`.
    pub fn with_defaults(tickers: Vec<String>, today: NaiveDate) -> Self {
        Self {
            tickers,
            start: today - Duration::days(DEFAULT_LOOKBACK_DAYS),
            end: today,
            short_window: DEFAULT_SHORT_WINDOW,
            long_window: DEFAULT_LONG_WINDOW,
            include_returns: false,
            include_trend: true,
        }
    }

    /// Reject what cannot be fixed, correct what can, and warn about every correction.
    pub fn validate(self) -> Result<(ValidatedRequest, Vec<Warning>)> {
        let mut warnings = Vec::new();
        let symbol = Regex::new(SYMBOL_PATTERN)
            .map_err(|e| AnalysisError::Input(format!("ticker pattern: {e}")))?;

        let mut tickers: Vec<String> = Vec::with_capacity(self.tickers.len());
        for ticker in self.tickers.iter().map(|t| t.trim().to_uppercase()) {
            if ticker.is_empty() {
                continue;
            }
            if !symbol.is_match(&ticker) {
                return Err(AnalysisError::Input(format!(
                    "invalid ticker symbol `{ticker}`"
                )));
            }
            if tickers.contains(&ticker) {
                warning::push(&mut warnings, Warning::DuplicateTicker { ticker });
            } else {
                tickers.push(ticker);
            }
        }

        if tickers.is_empty() {
            return Err(AnalysisError::Input(
                "please enter at least one stock ticker".to_string(),
            ));
        }
        if tickers.len() > MAX_TICKERS {
            let dropped = tickers.split_off(MAX_TICKERS);
            warning::push(
                &mut warnings,
                Warning::TickersTruncated {
                    kept: tickers.clone(),
                    dropped,
                },
            );
        }

        if self.start >= self.end {
            return Err(AnalysisError::Input(format!(
                "end date {} must fall after start date {}",
                self.end, self.start
            )));
        }

        let short = self.short_window;
        let mut long = self.long_window;
        if short >= 1 && long <= short {
            long = short.checked_add(LONG_WINDOW_BUMP).ok_or_else(|| {
                AnalysisError::Input(format!("short MA window {short} is too large"))
            })?;
            warning::push(
                &mut warnings,
                Warning::LongWindowRaised {
                    short,
                    requested: self.long_window,
                    adjusted: long,
                },
            );
        }
        let windows = WindowConfig::new(short, long)?;

        Ok((
            ValidatedRequest {
                tickers,
                start: self.start,
                end: self.end,
                windows,
                include_returns: self.include_returns,
                include_trend: self.include_trend,
            },
            warnings,
        ))
    }
}

/// Request whose invariants hold; also serves as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedRequest {
    pub tickers: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub windows: WindowConfig,
    pub include_returns: bool,
    pub include_trend: bool,
}

impl ValidatedRequest {
    /// Stable textual key, e.g. `AAPL,MSFT:2024-01-01:2024-06-01:20:50:r0:t1`
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:r{}:t{}",
            self.tickers.join(","),
            self.start,
            self.end,
            self.windows.short(),
            self.windows.long(),
            u8::from(self.include_returns),
            u8::from(self.include_trend)
        )
    }
}
