use std::collections::BTreeMap;

use anyhow::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue},
};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::pipeline::PriceSource;
use crate::series_store::{PriceField, RawRow};

const PAGE_LIMIT: usize = 10_000;

/// Alpaca market-data client for daily bars.
#[derive(Clone)]
pub struct PriceClient {
    client: Client,
    base_api: String,
}

impl PriceClient {
    pub fn new(base_api: String, key_id: String, secret: String) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("APCA-API-KEY-ID", HeaderValue::from_str(&key_id)?);
        headers.insert("APCA-API-SECRET-KEY", HeaderValue::from_str(&secret)?);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_api })
    }

    pub fn from_env() -> Result<Self> {
        let base_api = std::env::var("APCA_API_BASE_URL")?;
        let key_id = std::env::var("APCA_API_KEY_ID")?;
        let secret = std::env::var("APCA_API_SECRET_KEY")?;
        Self::new(base_api, key_id, secret)
    }

    fn query(
        start: NaiveDate,
        end: NaiveDate,
        adjustment: Adjustment,
        page_token: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("feed", "iex".to_string()),
            ("timeframe", "1Day".to_string()),
            ("start", start.to_string()),
            ("end", last_day(start, end).to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("adjustment", adjustment.as_str().to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }
        query
    }

    /// Daily bars for one symbol from the per-symbol endpoint, following pagination.
    pub async fn fetch_symbol_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        adjustment: Adjustment,
    ) -> Result<Vec<Bar>, Error> {
        let url = format!(
            "{}/v2/stocks/{}/bars",
            self.base_api.trim_end_matches('/'),
            symbol
        );

        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let res: SymbolBarsResponse = self
                .client
                .get(&url)
                .query(&Self::query(start, end, adjustment, page_token.as_deref()))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            bars.extend(res.bars.unwrap_or_default());
            page_token = res.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(bars)
    }

    /// Daily bars for several symbols from the multi-symbol endpoint, keyed by symbol.
    pub async fn fetch_multi_bars(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        adjustment: Adjustment,
    ) -> Result<BTreeMap<String, Vec<Bar>>, Error> {
        let url = format!("{}/v2/stocks/bars", self.base_api.trim_end_matches('/'));

        let mut bars: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = Self::query(start, end, adjustment, page_token.as_deref());
            query.push(("symbols", symbols.join(",")));

            let res: MultiBarsResponse = self
                .client
                .get(&url)
                .query(&query)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            for (symbol, page) in res.bars.unwrap_or_default() {
                bars.entry(symbol).or_default().extend(page);
            }
            page_token = res.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(bars)
    }

    async fn fetch_rows(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
        adjustment: Adjustment,
    ) -> Result<Vec<RawRow>> {
        match tickers {
            [symbol] => {
                let bars = self
                    .fetch_symbol_bars(symbol, start, end, adjustment)
                    .await?;
                Ok(bars_to_rows(&bars, None, adjustment))
            }
            _ => {
                let bars = self
                    .fetch_multi_bars(tickers, start, end, adjustment)
                    .await?;
                Ok(bars
                    .iter()
                    .flat_map(|(symbol, bars)| {
                        bars_to_rows(bars, Some(symbol.as_str()), adjustment)
                    })
                    .collect())
            }
        }
    }
}

impl PriceSource for PriceClient {
    #[instrument(
        name = "fetch_prices",
        skip(self, tickers),
        fields(tickers = %tickers.join(","))
    )]
    async fn fetch(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawRow>> {
        let mut rows = self.fetch_rows(tickers, start, end, Adjustment::Raw).await?;
        debug!(rows = rows.len(), "fetched raw bars");

        match self.fetch_rows(tickers, start, end, Adjustment::All).await {
            Ok(adjusted) => {
                debug!(rows = adjusted.len(), "fetched adjusted bars");
                rows.extend(adjusted);
            }
            Err(e) => warn!(error = ?e, "adjusted bars unavailable"),
        }

        Ok(rows)
    }
}

/// The requested range excludes `end`, while Alpaca treats its `end` as inclusive.
fn last_day(start: NaiveDate, end: NaiveDate) -> NaiveDate {
    end.pred_opt().filter(|day| *day >= start).unwrap_or(end)
}

/// Convert bars into rows. Raw bars yield OHLCV fields, fully adjusted bars yield adjusted close.
pub fn bars_to_rows(bars: &[Bar], symbol: Option<&str>, adjustment: Adjustment) -> Vec<RawRow> {
    let row = |date: NaiveDate, field: PriceField, value: f64| RawRow {
        date,
        field,
        ticker: symbol.map(str::to_string),
        value: Some(value),
    };

    bars.iter()
        .flat_map(|bar| {
            let date = bar.timestamp.date_naive();
            match adjustment {
                Adjustment::All => vec![row(date, PriceField::AdjClose, bar.close)],
                Adjustment::Raw => vec![
                    row(date, PriceField::Open, bar.open),
                    row(date, PriceField::High, bar.high),
                    row(date, PriceField::Low, bar.low),
                    row(date, PriceField::Close, bar.close),
                    row(date, PriceField::Volume, bar.volume as f64),
                ],
            }
        })
        .collect()
}

//
// Match Alpaca API JSON
// https://docs.alpaca.markets/reference/stockbars
//
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Raw,
    /// Split and dividend adjusted
    All,
}

impl Adjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjustment::Raw => "raw",
            Adjustment::All => "all",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SymbolBarsResponse {
    #[serde(default)]
    pub bars: Option<Vec<Bar>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MultiBarsResponse {
    #[serde(default)]
    pub bars: Option<BTreeMap<String, Vec<Bar>>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Bar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "o")]
    pub open: f64,

    #[serde(rename = "h")]
    pub high: f64,

    #[serde(rename = "l")]
    pub low: f64,

    #[serde(rename = "c")]
    pub close: f64,

    #[serde(rename = "v")]
    pub volume: i64,
}
