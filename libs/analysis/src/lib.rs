mod error;
mod pipeline;
mod price_client;
mod series_store;
mod warning;

pub mod cache;
pub mod chart;
pub mod indicators;
pub mod request;

pub use error::{AnalysisError, Result};
pub use pipeline::{AnalysisPipeline, AnalysisReport, PriceSource, TAIL_ROWS, analyze_rows};
pub use price_client::{Adjustment, Bar, PriceClient, bars_to_rows};
pub use request::{AnalysisRequest, ValidatedRequest, WindowConfig, parse_tickers};
pub use series_store::{PriceField, PriceSeriesStore, RawRow};
pub use warning::Warning;
