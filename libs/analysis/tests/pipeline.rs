//! End-to-end runs of the analysis pipeline against an in-process price source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use analysis::cache::{CacheBackend, MemoryCache};
use analysis::chart::{PanelContent, PanelKind, PlaceholderReason};
use analysis::indicators::compute_indicators;
use analysis::{
    AnalysisError, AnalysisPipeline, AnalysisRequest, PriceField, PriceSeriesStore, PriceSource,
    RawRow, Warning, WindowConfig,
};
use chrono::{Datelike, NaiveDate, Weekday};

struct FakeSource {
    rows: Vec<RawRow>,
    calls: AtomicUsize,
}

impl FakeSource {
    fn new(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceSource for FakeSource {
    async fn fetch(
        &self,
        _tickers: &[String],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> anyhow::Result<Vec<RawRow>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}

struct FailingSource;

impl PriceSource for FailingSource {
    async fn fetch(
        &self,
        _tickers: &[String],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> anyhow::Result<Vec<RawRow>> {
        anyhow::bail!("connection refused")
    }
}

fn trading_days(n: usize) -> Vec<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .collect()
}

fn rising_rows(ticker: Option<&str>, n: usize) -> Vec<RawRow> {
    trading_days(n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| RawRow {
            date,
            field: PriceField::AdjClose,
            ticker: ticker.map(str::to_string),
            value: Some(100.0 + i as f64),
        })
        .collect()
}

fn missing_rows(ticker: &str, n: usize) -> Vec<RawRow> {
    trading_days(n)
        .into_iter()
        .map(|date| RawRow {
            date,
            field: PriceField::AdjClose,
            ticker: Some(ticker.to_string()),
            value: None,
        })
        .collect()
}

fn request(tickers: &[&str], short: usize, long: usize) -> AnalysisRequest {
    AnalysisRequest {
        tickers: tickers.iter().map(|t| t.to_string()).collect(),
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        short_window: short,
        long_window: long,
        include_returns: true,
        include_trend: true,
    }
}

fn pipeline(rows: Vec<RawRow>) -> AnalysisPipeline<FakeSource, CacheBackend> {
    AnalysisPipeline::new(FakeSource::new(rows), CacheBackend::Disabled)
}

#[test]
fn test_rising_prices_give_rising_averages() {
    let rows = rising_rows(None, 40);
    let tickers = vec!["AAPL".to_string()];
    let (store, warnings) = PriceSeriesStore::from_rows(rows, &tickers).unwrap();
    assert!(warnings.is_empty());

    let prices: Vec<f64> = store
        .series("AAPL")
        .unwrap()
        .iter()
        .flatten()
        .copied()
        .collect();
    let (aug, warnings) = compute_indicators(store, WindowConfig::new(5, 10).unwrap()).unwrap();
    assert!(warnings.is_empty());

    let ind = aug.indicators("AAPL").unwrap();
    let short: Vec<f64> = ind.short_ma.iter().flatten().copied().collect();
    let long: Vec<f64> = ind.long_ma.iter().flatten().copied().collect();
    assert_eq!(short.len(), 40);
    assert_eq!(long.len(), 40);
    assert_eq!(short[0], prices[0]);
    assert_eq!(long[0], prices[0]);

    assert!(short.iter().zip(&prices).all(|(ma, p)| ma <= p));
    assert!(short.windows(2).all(|w| w[1] > w[0]));
    assert!(long.windows(2).all(|w| w[1] > w[0]));
}

#[tokio::test]
async fn test_single_ticker_report() {
    let pipeline = pipeline(rising_rows(None, 40));
    let report = pipeline.run(request(&["aapl"], 5, 10)).await.unwrap();

    assert!(
        !report
            .warnings
            .iter()
            .any(|w| matches!(w, Warning::IndicatorUnavailable { .. }))
    );
    assert_eq!(report.price_field, PriceField::AdjClose);
    assert_eq!(report.tail.len(), 5);

    let chart = &report.charts["AAPL"];
    let kinds: Vec<_> = chart.panels.iter().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        vec![
            PanelKind::PriceAndAverages,
            PanelKind::Returns,
            PanelKind::Trend
        ]
    );
    assert!(chart.panels.iter().all(|p| p.is_ready()));

    let PanelContent::Bars(bars) = &chart.panels[2].content else {
        panic!("expected trend bars");
    };
    assert_eq!(bars.len(), 7);
}

#[tokio::test]
async fn test_ticker_without_prices_is_excluded() {
    let mut rows = rising_rows(Some("AAPL"), 40);
    rows.extend(missing_rows("MSFT", 40));

    let report = pipeline(rows)
        .run(request(&["AAPL", "MSFT"], 5, 10))
        .await
        .unwrap();

    assert!(report.charts.contains_key("AAPL"));
    assert!(!report.charts.contains_key("MSFT"));
    assert!(report.warnings.contains(&Warning::IndicatorUnavailable {
        ticker: "MSFT".to_string()
    }));
    assert_eq!(report.ordered_charts().count(), 1);
}

#[tokio::test]
async fn test_short_range_marks_trend_insufficient() {
    let mut rows = rising_rows(Some("AAPL"), 5);
    rows.extend(rising_rows(Some("MSFT"), 5));

    let report = pipeline(rows)
        .run(request(&["AAPL", "MSFT"], 2, 4))
        .await
        .unwrap();

    assert_eq!(report.charts.len(), 2);
    for chart in report.charts.values() {
        let trend = chart.panel(PanelKind::Trend).unwrap();
        assert_eq!(
            trend.placeholder_reason(),
            Some(PlaceholderReason::InsufficientData)
        );
    }
}

#[tokio::test]
async fn test_empty_fetch_is_data_unavailable() {
    let err = pipeline(Vec::new())
        .run(request(&["AAPL"], 5, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::DataUnavailable(_)));

    let failing = AnalysisPipeline::new(FailingSource, CacheBackend::Disabled);
    let err = failing.run(request(&["AAPL"], 5, 10)).await.unwrap_err();
    assert!(matches!(
        err,
        AnalysisError::DataUnavailable(msg) if msg.contains("connection refused")
    ));
}

#[tokio::test]
async fn test_inverted_windows_are_corrected() {
    let report = pipeline(rising_rows(None, 100))
        .run(request(&["AAPL"], 50, 20))
        .await
        .unwrap();

    assert_eq!(
        report.warnings.first(),
        Some(&Warning::LongWindowRaised {
            short: 50,
            requested: 20,
            adjusted: 80
        })
    );
    assert_eq!(report.request.windows.long(), 80);

    let PanelContent::Lines { series, .. } = &report.charts["AAPL"].panels[0].content else {
        panic!("expected price lines");
    };
    let labels: Vec<_> = series.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["AAPL Adj Close", "MA_50", "MA_80"]);
}

#[tokio::test]
async fn test_no_usable_ticker_is_nothing_to_analyze() {
    let err = pipeline(missing_rows("MSFT", 10))
        .run(request(&["MSFT"], 2, 4))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AnalysisError::NothingToAnalyze {
            tickers: vec!["MSFT".to_string()]
        }
    );
}

#[tokio::test]
async fn test_input_errors_skip_the_fetch() {
    let pipeline = pipeline(rising_rows(None, 10));
    let err = pipeline.run(request(&[], 5, 10)).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Input(_)));
}

#[tokio::test]
async fn test_cached_reports_skip_the_fetch() {
    let mut rows = rising_rows(Some("AAPL"), 30);
    rows.extend(rising_rows(Some("MSFT"), 30));

    let cache = MemoryCache::new(Duration::from_secs(60));
    let pipeline = AnalysisPipeline::new(FakeSource::new(rows), CacheBackend::Memory(cache));

    let first = pipeline.run(request(&["AAPL", "MSFT"], 5, 10)).await.unwrap();
    let second = pipeline
        .run(request(&["AAPL", "MSFT", "GOOG"], 5, 10))
        .await
        .unwrap();

    assert_eq!(pipeline_calls(&pipeline), 1);
    assert_eq!(first.charts, second.charts);
    assert!(first.warnings.is_empty());
    assert_eq!(
        second.warnings,
        vec![Warning::TickersTruncated {
            kept: vec!["AAPL".to_string(), "MSFT".to_string()],
            dropped: vec!["GOOG".to_string()],
        }]
    );
}

fn pipeline_calls(pipeline: &AnalysisPipeline<FakeSource, CacheBackend>) -> usize {
    pipeline.source().calls()
}
