use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::warning::{self, Warning};

/// Named price column of a fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

impl PriceField {
    pub fn label(&self) -> &'static str {
        match self {
            PriceField::Open => "Open",
            PriceField::High => "High",
            PriceField::Low => "Low",
            PriceField::Close => "Close",
            PriceField::AdjClose => "Adj Close",
            PriceField::Volume => "Volume",
        }
    }
}

/// One fetched observation keyed by (date, field, ticker).
///
/// `ticker` is `None` when the provider answered a single-symbol request without a
/// per-ticker dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub date: NaiveDate,
    pub field: PriceField,
    pub ticker: Option<String>,
    pub value: Option<f64>,
}

impl RawRow {
    pub fn new(date: NaiveDate, field: PriceField, ticker: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            field,
            ticker: Some(ticker.into()),
            value: Some(value),
        }
    }

    /// Row from a single-symbol response
    pub fn untagged(date: NaiveDate, field: PriceField, value: f64) -> Self {
        Self {
            date,
            field,
            ticker: None,
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TickerSeries {
    ticker: String,
    values: Vec<Option<f64>>,
}

/// Aligned daily prices for up to two tickers over a shared date index.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeriesStore {
    dates: Vec<NaiveDate>,
    field: PriceField,
    series: Vec<TickerSeries>,
}

impl PriceSeriesStore {
    /// Build from already aligned columns.
    ///
    /// Dates must be strictly increasing and every column as long as the date index.
    pub fn new(
        dates: Vec<NaiveDate>,
        field: PriceField,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnalysisError::DataUnavailable(
                "trading dates are not strictly increasing".to_string(),
            ));
        }

        let mut series = Vec::with_capacity(columns.len());
        for (ticker, values) in columns {
            if values.len() != dates.len() {
                return Err(AnalysisError::DataUnavailable(format!(
                    "series for {ticker} has {} values for {} dates",
                    values.len(),
                    dates.len()
                )));
            }
            let values = values
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            series.push(TickerSeries { ticker, values });
        }

        Ok(Self {
            dates,
            field,
            series,
        })
    }

    /// Normalize raw fetch rows into a store for `tickers`.
    ///
    /// Prefers adjusted close and falls back to close with a warning. Requested tickers
    /// without rows get an all-missing series; rows for other symbols are ignored.
    pub fn from_rows(rows: Vec<RawRow>, tickers: &[String]) -> Result<(Self, Vec<Warning>)> {
        if rows.is_empty() {
            return Err(AnalysisError::DataUnavailable(
                "no rows downloaded, check tickers and date range".to_string(),
            ));
        }

        let mut warnings = Vec::new();
        let rows = tag_rows(rows, tickers)?;

        let fields: BTreeSet<PriceField> = rows.iter().map(|(_, field, _, _)| *field).collect();
        let field = if fields.contains(&PriceField::AdjClose) {
            PriceField::AdjClose
        } else if fields.contains(&PriceField::Close) {
            warning::push(&mut warnings, Warning::CloseFallback);
            PriceField::Close
        } else {
            return Err(AnalysisError::DataUnavailable(
                "neither 'Adj Close' nor 'Close' price found in data".to_string(),
            ));
        };

        let mut cells: BTreeMap<(String, NaiveDate), Option<f64>> = BTreeMap::new();
        let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
        for (date, row_field, ticker, value) in rows {
            if row_field != field {
                continue;
            }
            if !tickers.contains(&ticker) {
                debug!(ticker = %ticker, "ignoring rows for unrequested ticker");
                continue;
            }
            dates.insert(date);
            cells.insert((ticker, date), value);
        }

        let dates: Vec<NaiveDate> = dates.into_iter().collect();
        let columns = tickers
            .iter()
            .map(|ticker| {
                let values = dates
                    .iter()
                    .map(|date| cells.get(&(ticker.clone(), *date)).copied().flatten())
                    .collect();
                (ticker.clone(), values)
            })
            .collect();

        let store = Self::new(dates, field, columns)?;
        debug!(
            dates = store.len(),
            tickers = store.series.len(),
            field = field.label(),
            "built price series store"
        );
        Ok((store, warnings))
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn field(&self) -> PriceField {
        self.field
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.iter().map(|s| s.ticker.as_str())
    }

    pub fn series(&self, ticker: &str) -> Option<&[Option<f64>]> {
        self.series
            .iter()
            .find(|s| s.ticker == ticker)
            .map(|s| s.values.as_slice())
    }

    /// Number of trading dates
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Give every row a ticker, upper-cased, so single and multi-symbol fetches look the same.
fn tag_rows(
    rows: Vec<RawRow>,
    tickers: &[String],
) -> Result<Vec<(NaiveDate, PriceField, String, Option<f64>)>> {
    rows.into_iter()
        .map(|row| {
            let ticker = match row.ticker {
                Some(t) => t.trim().to_uppercase(),
                None => match tickers {
                    [only] => only.clone(),
                    _ => {
                        return Err(AnalysisError::DataUnavailable(format!(
                            "rows without a ticker cannot be assigned among {} tickers",
                            tickers.len()
                        )));
                    }
                },
            };
            Ok((row.date, row.field, ticker, row.value.filter(|v| v.is_finite())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_prefers_adjusted_close() {
        let rows = vec![
            RawRow::new(day(1), PriceField::Close, "AAPL", 10.0),
            RawRow::new(day(1), PriceField::AdjClose, "AAPL", 9.5),
            RawRow::new(day(4), PriceField::AdjClose, "AAPL", 9.8),
        ];

        let (store, warnings) = PriceSeriesStore::from_rows(rows, &tickers(&["AAPL"])).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(store.field(), PriceField::AdjClose);
        assert_eq!(store.dates(), &[day(1), day(4)]);
        assert_eq!(store.series("AAPL").unwrap(), &[Some(9.5), Some(9.8)]);
    }

    #[test]
    fn test_falls_back_to_close_with_warning() {
        let rows = vec![
            RawRow::new(day(1), PriceField::Open, "AAPL", 9.0),
            RawRow::new(day(1), PriceField::Close, "AAPL", 10.0),
        ];

        let (store, warnings) = PriceSeriesStore::from_rows(rows, &tickers(&["AAPL"])).unwrap();
        assert_eq!(store.field(), PriceField::Close);
        assert_eq!(warnings, vec![Warning::CloseFallback]);
    }

    #[test]
    fn test_no_price_field_is_data_unavailable() {
        let rows = vec![RawRow::new(day(1), PriceField::Volume, "AAPL", 1000.0)];
        let err = PriceSeriesStore::from_rows(rows, &tickers(&["AAPL"])).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }

    #[test]
    fn test_empty_rows_is_data_unavailable() {
        let err = PriceSeriesStore::from_rows(Vec::new(), &tickers(&["AAPL"])).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }

    #[test]
    fn test_untagged_rows_take_the_single_ticker() {
        let rows = vec![
            RawRow::untagged(day(2), PriceField::Close, 1.0),
            RawRow::untagged(day(1), PriceField::Close, 2.0),
        ];

        let (store, _) = PriceSeriesStore::from_rows(rows, &tickers(&["TSLA"])).unwrap();
        assert_eq!(store.tickers().collect::<Vec<_>>(), vec!["TSLA"]);
        assert_eq!(store.dates(), &[day(1), day(2)]);
        assert_eq!(store.series("TSLA").unwrap(), &[Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_untagged_rows_with_two_tickers_fail() {
        let rows = vec![RawRow::untagged(day(1), PriceField::Close, 1.0)];
        let err = PriceSeriesStore::from_rows(rows, &tickers(&["AAPL", "MSFT"])).unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }

    #[test]
    fn test_gaps_align_to_shared_index() {
        let rows = vec![
            RawRow::new(day(1), PriceField::AdjClose, "aapl", 1.0),
            RawRow::new(day(2), PriceField::AdjClose, "AAPL", 2.0),
            RawRow::new(day(2), PriceField::AdjClose, "MSFT", 20.0),
            RawRow {
                date: day(3),
                field: PriceField::AdjClose,
                ticker: Some("MSFT".to_string()),
                value: Some(f64::NAN),
            },
            RawRow::new(day(3), PriceField::AdjClose, "GOOG", 5.0),
        ];

        let (store, _) =
            PriceSeriesStore::from_rows(rows, &tickers(&["AAPL", "MSFT"])).unwrap();
        assert_eq!(store.dates(), &[day(1), day(2), day(3)]);
        assert_eq!(store.series("AAPL").unwrap(), &[Some(1.0), Some(2.0), None]);
        assert_eq!(store.series("MSFT").unwrap(), &[None, Some(20.0), None]);
        assert!(store.series("GOOG").is_none());
    }

    #[test]
    fn test_missing_ticker_gets_empty_series() {
        let rows = vec![RawRow::new(day(1), PriceField::AdjClose, "AAPL", 1.0)];
        let (store, _) =
            PriceSeriesStore::from_rows(rows, &tickers(&["AAPL", "MSFT"])).unwrap();
        assert_eq!(store.series("MSFT").unwrap(), &[None]);
    }

    #[test]
    fn test_new_rejects_misaligned_columns() {
        let err = PriceSeriesStore::new(
            vec![day(1), day(2)],
            PriceField::Close,
            vec![("AAPL".to_string(), vec![Some(1.0)])],
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));

        let err = PriceSeriesStore::new(vec![day(2), day(1)], PriceField::Close, Vec::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::DataUnavailable(_)));
    }
}
