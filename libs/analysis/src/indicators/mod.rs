mod moving_average;
mod returns;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ta::Next;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::request::WindowConfig;
use crate::series_store::PriceSeriesStore;
use crate::warning::{self, Warning};

pub use moving_average::RollingMean;
pub use returns::SimpleReturn;

/// Series derived from one ticker's prices, aligned to the store's dates.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerIndicators {
    pub short_ma: Vec<Option<f64>>,
    pub long_ma: Vec<Option<f64>>,
    pub returns: Vec<Option<f64>>,
}

/// Price store plus per-ticker moving averages and returns.
///
/// A ticker present in the prices but absent from `indicators` is indicator-unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedSeriesStore {
    prices: PriceSeriesStore,
    windows: WindowConfig,
    indicators: BTreeMap<String, TickerIndicators>,
}

/// One ticker's values on a single date of the tail table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub price: Option<f64>,
    pub short_ma: Option<f64>,
    pub long_ma: Option<f64>,
    pub simple_return: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailRow {
    pub date: NaiveDate,
    pub values: BTreeMap<String, TickerSnapshot>,
}

impl AugmentedSeriesStore {
    pub(crate) fn from_parts(
        prices: PriceSeriesStore,
        windows: WindowConfig,
        indicators: BTreeMap<String, TickerIndicators>,
    ) -> Self {
        Self {
            prices,
            windows,
            indicators,
        }
    }

    pub fn prices(&self) -> &PriceSeriesStore {
        &self.prices
    }

    pub fn dates(&self) -> &[NaiveDate] {
        self.prices.dates()
    }

    pub fn windows(&self) -> WindowConfig {
        self.windows
    }

    pub fn indicators(&self, ticker: &str) -> Option<&TickerIndicators> {
        self.indicators.get(ticker)
    }

    /// Tickers with derived series, in store order
    pub fn usable_tickers(&self) -> Vec<&str> {
        self.prices
            .tickers()
            .filter(|t| self.indicators.contains_key(*t))
            .collect()
    }

    /// Last `n` rows for tabular display.
    pub fn tail(&self, n: usize) -> Vec<TailRow> {
        let dates = self.dates();
        let start = dates.len().saturating_sub(n);

        (start..dates.len())
            .map(|i| {
                let values = self
                    .prices
                    .tickers()
                    .map(|ticker| {
                        let price = self.prices.series(ticker).and_then(|s| s[i]);
                        let derived = self.indicators.get(ticker);
                        let snapshot = TickerSnapshot {
                            price,
                            short_ma: derived.and_then(|d| d.short_ma[i]),
                            long_ma: derived.and_then(|d| d.long_ma[i]),
                            simple_return: derived.and_then(|d| d.returns[i]),
                        };
                        (ticker.to_string(), snapshot)
                    })
                    .collect();
                TailRow {
                    date: dates[i],
                    values,
                }
            })
            .collect()
    }
}

fn run<I>(indicator: &mut I, input: &[Option<f64>]) -> Vec<Option<f64>>
where
    I: Next<Option<f64>, Output = Option<f64>>,
{
    input.iter().map(|&x| indicator.next(x)).collect()
}

/// Derive moving averages and simple returns for every ticker independently.
///
/// Output depends only on the arguments. Tickers whose prices are entirely missing are
/// left without derived series and reported as indicator-unavailable.
pub fn compute_indicators(
    store: PriceSeriesStore,
    windows: WindowConfig,
) -> Result<(AugmentedSeriesStore, Vec<Warning>)> {
    let mut warnings = Vec::new();
    let mut indicators = BTreeMap::new();

    for ticker in store.tickers() {
        let prices = store.series(ticker).unwrap_or_default();

        if prices.iter().all(Option::is_none) {
            warning::push(
                &mut warnings,
                Warning::IndicatorUnavailable {
                    ticker: ticker.to_string(),
                },
            );
            continue;
        }

        let mut short = RollingMean::new(windows.short()).map_err(|e| {
            AnalysisError::Input(format!("short window {}: {e:?}", windows.short()))
        })?;
        let mut long = RollingMean::new(windows.long()).map_err(|e| {
            AnalysisError::Input(format!("long window {}: {e:?}", windows.long()))
        })?;

        let derived = TickerIndicators {
            short_ma: run(&mut short, prices),
            long_ma: run(&mut long, prices),
            returns: run(&mut SimpleReturn::new(), prices),
        };
        debug!(
            ticker,
            short = windows.short(),
            long = windows.long(),
            "computed indicators"
        );
        indicators.insert(ticker.to_string(), derived);
    }

    Ok((
        AugmentedSeriesStore::from_parts(store, windows, indicators),
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series_store::PriceField;

    fn store(columns: Vec<(&str, Vec<Option<f64>>)>) -> PriceSeriesStore {
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = start.iter_days().take(len).collect();
        PriceSeriesStore::new(
            dates,
            PriceField::AdjClose,
            columns
                .into_iter()
                .map(|(t, v)| (t.to_string(), v))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_first_value_equals_price() {
        let prices = vec![Some(10.0), Some(12.0), Some(14.0)];
        let (aug, warnings) =
            compute_indicators(store(vec![("AAPL", prices)]), WindowConfig::new(2, 3).unwrap())
                .unwrap();

        assert!(warnings.is_empty());
        let ind = aug.indicators("AAPL").unwrap();
        assert_eq!(ind.short_ma, vec![Some(10.0), Some(11.0), Some(13.0)]);
        assert_eq!(ind.long_ma, vec![Some(10.0), Some(11.0), Some(12.0)]);
        assert_eq!(ind.returns[0], None);
        assert_eq!(ind.returns[1], Some(0.2));
    }

    #[test]
    fn test_all_missing_ticker_is_unavailable() {
        let (aug, warnings) = compute_indicators(
            store(vec![
                ("AAPL", vec![Some(1.0), Some(2.0)]),
                ("MSFT", vec![None, None]),
            ]),
            WindowConfig::new(1, 2).unwrap(),
        )
        .unwrap();

        assert_eq!(
            warnings,
            vec![Warning::IndicatorUnavailable {
                ticker: "MSFT".to_string()
            }]
        );
        assert!(aug.indicators("MSFT").is_none());
        assert_eq!(aug.usable_tickers(), vec!["AAPL"]);
    }

    #[test]
    fn test_lengths_match_input() {
        let prices = vec![Some(1.0), None, Some(3.0), None, Some(5.0)];
        let (aug, _) =
            compute_indicators(store(vec![("AAPL", prices)]), WindowConfig::new(2, 4).unwrap())
                .unwrap();
        let ind = aug.indicators("AAPL").unwrap();
        assert_eq!(ind.short_ma.len(), 5);
        assert_eq!(ind.long_ma.len(), 5);
        assert_eq!(ind.returns, vec![None, None, None, None, None]);
    }

    #[test]
    fn test_deterministic() {
        let prices: Vec<Option<f64>> = (0..60)
            .map(|i| (i % 7 != 3).then(|| 100.0 + (i as f64 * 0.37).sin() * 5.0))
            .collect();
        let input = store(vec![("AAPL", prices)]);
        let windows = WindowConfig::new(5, 21).unwrap();

        let (a, _) = compute_indicators(input.clone(), windows).unwrap();
        let (b, _) = compute_indicators(input, windows).unwrap();

        let bits = |v: &[Option<f64>]| v.iter().map(|x| x.map(f64::to_bits)).collect::<Vec<_>>();
        let (a, b) = (a.indicators("AAPL").unwrap(), b.indicators("AAPL").unwrap());
        assert_eq!(bits(&a.short_ma), bits(&b.short_ma));
        assert_eq!(bits(&a.long_ma), bits(&b.long_ma));
        assert_eq!(bits(&a.returns), bits(&b.returns));
    }

    #[test]
    fn test_tail_rows() {
        let (aug, _) = compute_indicators(
            store(vec![
                ("AAPL", vec![Some(1.0), Some(2.0), Some(4.0)]),
                ("MSFT", vec![None, None, None]),
            ]),
            WindowConfig::new(1, 2).unwrap(),
        )
        .unwrap();

        let tail = aug.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].date, aug.dates()[2]);

        let aapl = &tail[1].values["AAPL"];
        assert_eq!(aapl.price, Some(4.0));
        assert_eq!(aapl.short_ma, Some(4.0));
        assert_eq!(aapl.long_ma, Some(3.0));
        assert_eq!(aapl.simple_return, Some(1.0));

        let msft = &tail[1].values["MSFT"];
        assert_eq!(msft.price, None);
        assert_eq!(msft.short_ma, None);

        assert_eq!(aug.tail(10).len(), 3);
    }
}
