//! Per-ticker chart layout, independent of any rendering backend

pub mod render;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::AugmentedSeriesStore;
use crate::warning::{self, Warning};

/// Number of trailing trend deltas shown; fewer valid points means no trend panel.
pub const TREND_DAYS: usize = 7;

pub mod colors {
    pub const PRICE: &str = "#87ceeb";
    pub const SHORT_MA: &str = "#ffa500";
    pub const LONG_MA: &str = "#90ee90";
    pub const RETURNS: &str = "#808080";
    pub const TREND_POSITIVE: &str = "#2ca02c";
    pub const TREND_NEGATIVE: &str = "#d62728";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PanelKind {
    PriceAndAverages,
    Returns,
    Trend,
}

impl fmt::Display for PanelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PanelKind::PriceAndAverages => "price",
            PanelKind::Returns => "returns",
            PanelKind::Trend => "trend",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStroke {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSeries {
    pub label: String,
    pub color: String,
    pub stroke: LineStroke,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarSign {
    Positive,
    /// Includes an exact zero
    Negative,
}

impl BarSign {
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            BarSign::Positive
        } else {
            BarSign::Negative
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            BarSign::Positive => colors::TREND_POSITIVE,
            BarSign::Negative => colors::TREND_NEGATIVE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBar {
    pub date: NaiveDate,
    pub delta: f64,
    pub sign: BarSign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceholderReason {
    InsufficientData,
    MissingMovingAverages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PanelContent {
    Lines {
        dates: Vec<NaiveDate>,
        series: Vec<LineSeries>,
        /// Draw a horizontal rule at zero
        zero_line: bool,
    },
    Bars(Vec<TrendBar>),
    Placeholder {
        reason: PlaceholderReason,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub kind: PanelKind,
    pub title: String,
    pub y_label: String,
    pub content: PanelContent,
}

impl Panel {
    /// False when the panel carries placeholder text instead of data.
    pub fn is_ready(&self) -> bool {
        !matches!(self.content, PanelContent::Placeholder { .. })
    }

    pub fn placeholder_reason(&self) -> Option<PlaceholderReason> {
        match self.content {
            PanelContent::Placeholder { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Ordered panels for one ticker: price, then returns, then trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub ticker: String,
    pub panels: Vec<Panel>,
}

impl ChartSpec {
    pub fn panel(&self, kind: PanelKind) -> Option<&Panel> {
        self.panels.iter().find(|p| p.kind == kind)
    }
}

/// Which optional panels to include after the always-present price panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PanelToggles {
    pub returns: bool,
    pub trend: bool,
}

/// Build one chart per ticker that has price data.
///
/// Tickers missing from the store or without a single price are skipped with a
/// warning. Panels lacking data become placeholders, never errors.
pub fn compose_charts(
    augmented: &AugmentedSeriesStore,
    tickers: &[String],
    toggles: PanelToggles,
) -> (BTreeMap<String, ChartSpec>, Vec<Warning>) {
    let mut warnings = Vec::new();
    let mut charts = BTreeMap::new();

    for ticker in tickers {
        let has_prices = augmented
            .prices()
            .series(ticker)
            .is_some_and(|s| s.iter().any(Option::is_some));
        if !has_prices {
            warning::push(
                &mut warnings,
                Warning::NothingToPlot {
                    ticker: ticker.clone(),
                },
            );
            continue;
        }

        let mut panels = vec![price_panel(augmented, ticker)];
        if toggles.returns {
            panels.push(returns_panel(augmented, ticker, &mut warnings));
        }
        if toggles.trend {
            panels.push(trend_panel(augmented, ticker, &mut warnings));
        }

        debug!(ticker = %ticker, panels = panels.len(), "composed chart");
        charts.insert(
            ticker.clone(),
            ChartSpec {
                ticker: ticker.clone(),
                panels,
            },
        );
    }

    (charts, warnings)
}

fn price_panel(augmented: &AugmentedSeriesStore, ticker: &str) -> Panel {
    let windows = augmented.windows();
    let prices = augmented.prices();

    let mut series = vec![LineSeries {
        label: format!("{ticker} {}", prices.field().label()),
        color: colors::PRICE.to_string(),
        stroke: LineStroke::Solid,
        values: prices.series(ticker).unwrap_or_default().to_vec(),
    }];
    if let Some(ind) = augmented.indicators(ticker) {
        series.push(LineSeries {
            label: windows.short_label(),
            color: colors::SHORT_MA.to_string(),
            stroke: LineStroke::Dashed,
            values: ind.short_ma.clone(),
        });
        series.push(LineSeries {
            label: windows.long_label(),
            color: colors::LONG_MA.to_string(),
            stroke: LineStroke::Dotted,
            values: ind.long_ma.clone(),
        });
    }

    Panel {
        kind: PanelKind::PriceAndAverages,
        title: format!("{ticker} Price and Moving Averages"),
        y_label: "Price ($)".to_string(),
        content: PanelContent::Lines {
            dates: augmented.dates().to_vec(),
            series,
            zero_line: false,
        },
    }
}

fn returns_panel(
    augmented: &AugmentedSeriesStore,
    ticker: &str,
    warnings: &mut Vec<Warning>,
) -> Panel {
    let returns = augmented
        .indicators(ticker)
        .map(|ind| &ind.returns)
        .filter(|r| r.iter().any(Option::is_some));

    let Some(returns) = returns else {
        warning::push(
            warnings,
            Warning::InsufficientData {
                ticker: ticker.to_string(),
                panel: PanelKind::Returns,
            },
        );
        return Panel {
            kind: PanelKind::Returns,
            title: format!("{ticker} Daily Simple Returns (No Data)"),
            y_label: "Return (%)".to_string(),
            content: PanelContent::Placeholder {
                reason: PlaceholderReason::InsufficientData,
                message: "No return data to display".to_string(),
            },
        };
    };

    Panel {
        kind: PanelKind::Returns,
        title: format!("{ticker} Daily Simple Returns"),
        y_label: "Return (%)".to_string(),
        content: PanelContent::Lines {
            dates: augmented.dates().to_vec(),
            series: vec![LineSeries {
                label: format!("{ticker} Simple Return"),
                color: colors::RETURNS.to_string(),
                stroke: LineStroke::Solid,
                values: returns.clone(),
            }],
            zero_line: true,
        },
    }
}

/// Last `TREND_DAYS` points of short MA minus long MA, skipping dates where either is missing.
pub fn trend_deltas(
    dates: &[NaiveDate],
    short_ma: &[Option<f64>],
    long_ma: &[Option<f64>],
) -> Option<Vec<TrendBar>> {
    let deltas: Vec<(NaiveDate, f64)> = dates
        .iter()
        .zip(short_ma.iter().zip(long_ma))
        .filter_map(|(date, pair)| match pair {
            (Some(s), Some(l)) => Some((*date, s - l)),
            _ => None,
        })
        .collect();

    if deltas.len() < TREND_DAYS {
        return None;
    }

    let bars = deltas[deltas.len() - TREND_DAYS..]
        .iter()
        .map(|&(date, delta)| TrendBar {
            date,
            delta,
            sign: BarSign::of(delta),
        })
        .collect();
    Some(bars)
}

fn trend_panel(
    augmented: &AugmentedSeriesStore,
    ticker: &str,
    warnings: &mut Vec<Warning>,
) -> Panel {
    let windows = augmented.windows();
    let y_label = "MA Difference".to_string();

    let Some(ind) = augmented.indicators(ticker) else {
        warning::push(
            warnings,
            Warning::MissingMovingAverages {
                ticker: ticker.to_string(),
            },
        );
        return Panel {
            kind: PanelKind::Trend,
            title: format!("{ticker} Exploratory Trend (Missing MAs)"),
            y_label,
            content: PanelContent::Placeholder {
                reason: PlaceholderReason::MissingMovingAverages,
                message: "Moving averages not available for trend plot".to_string(),
            },
        };
    };

    match trend_deltas(augmented.dates(), &ind.short_ma, &ind.long_ma) {
        Some(bars) => Panel {
            kind: PanelKind::Trend,
            title: format!(
                "{ticker} Exploratory Trend ({TREND_DAYS}d: {} - {})",
                windows.short_label(),
                windows.long_label()
            ),
            y_label,
            content: PanelContent::Bars(bars),
        },
        None => {
            warning::push(
                warnings,
                Warning::InsufficientData {
                    ticker: ticker.to_string(),
                    panel: PanelKind::Trend,
                },
            );
            Panel {
                kind: PanelKind::Trend,
                title: format!("{ticker} Exploratory Trend (Insufficient Data)"),
                y_label,
                content: PanelContent::Placeholder {
                    reason: PlaceholderReason::InsufficientData,
                    message: format!("Not enough data (< {TREND_DAYS} days) for trend plot"),
                },
            }
        }
    }
}
