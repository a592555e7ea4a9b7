use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::ResultCache;
use crate::chart::{ChartSpec, PanelToggles, compose_charts};
use crate::error::{AnalysisError, Result};
use crate::indicators::{TailRow, compute_indicators};
use crate::request::{AnalysisRequest, ValidatedRequest};
use crate::series_store::{PriceField, PriceSeriesStore, RawRow};
use crate::warning::Warning;

/// Rows of the augmented store handed over for tabular display
pub const TAIL_ROWS: usize = 5;

/// Market-data transport consumed by the pipeline, awaited once per run.
///
/// An empty row set is a failure signal, not an empty success.
pub trait PriceSource {
    fn fetch(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = anyhow::Result<Vec<RawRow>>> + Send;
}

/// Everything the presentation layer needs from one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub request: ValidatedRequest,
    pub price_field: PriceField,
    pub charts: BTreeMap<String, ChartSpec>,
    pub warnings: Vec<Warning>,
    pub tail: Vec<TailRow>,
}

impl AnalysisReport {
    /// Charts in request order
    pub fn ordered_charts(&self) -> impl Iterator<Item = &ChartSpec> {
        self.request
            .tickers
            .iter()
            .filter_map(|t| self.charts.get(t))
    }
}

/// Turn fetched rows into a report: store, indicators, then charts.
///
/// Synchronous and free of I/O; fails before composing anything when the rows are
/// unusable or no ticker has prices.
pub fn analyze_rows(request: &ValidatedRequest, rows: Vec<RawRow>) -> Result<AnalysisReport> {
    let (store, mut warnings) = PriceSeriesStore::from_rows(rows, &request.tickers)?;
    let price_field = store.field();

    let (augmented, indicator_warnings) = compute_indicators(store, request.windows)?;
    warnings.extend(indicator_warnings);

    if augmented.usable_tickers().is_empty() {
        return Err(AnalysisError::NothingToAnalyze {
            tickers: request.tickers.clone(),
        });
    }

    let toggles = PanelToggles {
        returns: request.include_returns,
        trend: request.include_trend,
    };
    let (charts, chart_warnings) = compose_charts(&augmented, &request.tickers, toggles);
    warnings.extend(chart_warnings);

    Ok(AnalysisReport {
        request: request.clone(),
        price_field,
        charts,
        warnings,
        tail: augmented.tail(TAIL_ROWS),
    })
}

pub struct AnalysisPipeline<S, C> {
    source: S,
    cache: C,
}

impl<S, C> AnalysisPipeline<S, C>
where
    S: PriceSource,
    C: ResultCache,
{
    pub fn new(source: S, cache: C) -> Self {
        Self { source, cache }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Validate, fetch, compute and compose for one request.
    ///
    /// Warnings from validation come first in the report, followed by those of the run.
    #[instrument(name = "analysis", skip(self, request), fields(tickers = ?request.tickers))]
    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisReport> {
        let (request, request_warnings) = request.validate()?;
        let key = request.cache_key();

        let cached = match self.cache.get(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = ?e, "cache lookup failed");
                None
            }
        };

        let mut report = match cached {
            Some(report) => {
                debug!(key = %key, "cache hit");
                report
            }
            None => {
                debug!(key = %key, "cache miss");
                let rows = self
                    .source
                    .fetch(&request.tickers, request.start, request.end)
                    .await
                    .map_err(|e| AnalysisError::DataUnavailable(format!("fetch failed: {e}")))?;
                info!(rows = rows.len(), "fetched price rows");

                let report = analyze_rows(&request, rows)?;
                if let Err(e) = self.cache.put(&key, &report).await {
                    warn!(error = ?e, "cache store failed");
                }
                report
            }
        };

        report.warnings.splice(0..0, request_warnings);
        info!(
            charts = report.charts.len(),
            warnings = report.warnings.len(),
            "analysis complete"
        );
        Ok(report)
    }
}
