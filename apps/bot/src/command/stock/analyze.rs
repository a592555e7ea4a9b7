use analysis::chart::render::render_chart;
use analysis::chart::{BarSign, ChartSpec, PanelContent, PanelKind};
use analysis::request::DEFAULT_TICKERS;
use analysis::{AnalysisReport, AnalysisRequest, PriceField, parse_tickers};
use anyhow::anyhow;
use chrono::NaiveDate;
use poise::CreateReply;
use serenity::all::{CreateAttachment, CreateEmbed};
use tracing::{debug, error, info, info_span};
use tracing_futures::Instrument;

use crate::{Context, Error};

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Discord rejects message content above this many characters
const CONTENT_LIMIT: usize = 2000;

/// Moving averages, returns and MA trend for up to two tickers
#[poise::command(slash_command)]
#[allow(clippy::too_many_arguments)]
pub async fn analyze(
    ctx: Context<'_>,
    #[description = "Ticker symbols, comma-separated, max 2 (default AAPL, MSFT)"] tickers: Option<String>,
    #[description = "Start date (YYYY-MM-DD), defaults to two years ago"] start: Option<String>,
    #[description = "End date (YYYY-MM-DD), defaults to today"] end: Option<String>,
    #[description = "Short moving average window in days (default 20)"]
    #[min = 1]
    #[max = 100]
    short_window: Option<u32>,
    #[description = "Long moving average window in days (default 50)"]
    #[min = 2]
    #[max = 250]
    long_window: Option<u32>,
    #[description = "Show daily simple returns (default off)"] returns: Option<bool>,
    #[description = "Show the 7-day moving average difference (default on)"] trend: Option<bool>,
) -> Result<(), Error> {
    let tickers = tickers.unwrap_or_else(|| DEFAULT_TICKERS.to_string());
    info!("Received analyze command for tickers: {}", tickers);
    ctx.defer().await?;

    let today = chrono::Local::now().date_naive();
    let mut request = AnalysisRequest::with_defaults(parse_tickers(&tickers), today);

    match (parse_date(start.as_deref()), parse_date(end.as_deref())) {
        (Ok(start), Ok(end)) => {
            request.start = start.unwrap_or(request.start);
            request.end = end.unwrap_or(request.end);
        }
        (Err(e), _) | (_, Err(e)) => {
            ctx.say(format!("⚠️ {e}")).await?;
            return Ok(());
        }
    }
    if let Some(short) = short_window {
        request.short_window = short as usize;
    }
    if let Some(long) = long_window {
        request.long_window = long as usize;
    }
    request.include_returns = returns.unwrap_or(request.include_returns);
    request.include_trend = trend.unwrap_or(request.include_trend);

    let report = match ctx.data().pipeline.run(request).await {
        Ok(report) => report,
        Err(e) => {
            error!("Analysis failed for {}: {}", tickers, e);
            ctx.say(format!("❌ Analysis failed: {e}")).await?;
            return Ok(());
        }
    };

    let mut reply = CreateReply::default().content(summary(&report));

    for chart in report.ordered_charts() {
        let span = info_span!("render_chart", ticker = %chart.ticker);
        let images = render(chart.clone()).instrument(span).await?;

        for (panel, bytes) in chart.panels.iter().zip(images) {
            let filename = format!("{}_{}.png", chart.ticker, panel.kind);
            let mut embed = CreateEmbed::default()
                .title(&panel.title)
                .image(format!("attachment://{}", filename))
                .color(embed_color(chart));
            if panel.kind == PanelKind::PriceAndAverages {
                embed = embed.description(format!(
                    "{} from `{}` to `{}`",
                    report.price_field.label(),
                    report.request.start,
                    report.request.end
                ));
            }

            reply = reply
                .embed(embed)
                .attachment(CreateAttachment::bytes(bytes, filename));
        }
    }

    info!("Sending analysis for: {}", report.request.tickers.join(", "));
    ctx.send(reply).await?;

    Ok(())
}

/// Rendering is CPU bound, keep it off the async workers.
async fn render(chart: ChartSpec) -> Result<Vec<Vec<u8>>, Error> {
    debug!("Rendering {} panels", chart.panels.len());
    tokio::task::spawn_blocking(move || render_chart(&chart))
        .await
        .map_err(|e| anyhow!("render task failed: {e}"))?
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>, Error> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|_| anyhow!("Invalid date `{s}`, expected YYYY-MM-DD"))
        })
        .transpose()
}

/// Green when the latest trend bar is positive, red when negative.
fn embed_color(chart: &ChartSpec) -> u32 {
    let latest = chart
        .panel(PanelKind::Trend)
        .and_then(|panel| match &panel.content {
            PanelContent::Bars(bars) => bars.last().map(|bar| bar.sign),
            _ => None,
        });

    match latest {
        Some(BarSign::Positive) => 0x2ca02c,
        Some(BarSign::Negative) => 0xd62728,
        None => 0xffffff,
    }
}

fn summary(report: &AnalysisReport) -> String {
    let mut content = format!(
        "**Analysis for:** {}\n**Date Range:** `{}` to `{}`\n",
        report.request.tickers.join(", "),
        report.request.start,
        report.request.end
    );

    let table = if report.tail.is_empty() {
        String::new()
    } else {
        format!("```\n{}```", tail_table(report))
    };

    // Room for the table and the "more warnings" line
    let budget = CONTENT_LIMIT.saturating_sub(table.chars().count() + 64);
    let mut omitted = 0;
    for warning in &report.warnings {
        let line = format!("⚠️ {warning}\n");
        if omitted == 0 && content.chars().count() + line.chars().count() <= budget {
            content.push_str(&line);
        } else {
            omitted += 1;
        }
    }
    if omitted > 0 {
        content.push_str(&format!("⚠️ ...and {omitted} more warnings\n"));
    }

    content.push_str(&table);
    if content.chars().count() > CONTENT_LIMIT {
        content = content.chars().take(CONTENT_LIMIT).collect();
    }
    content
}

fn tail_table(report: &AnalysisReport) -> String {
    let windows = report.request.windows;
    let price = match report.price_field {
        PriceField::AdjClose => "Adj",
        _ => "Close",
    };

    let mut table = String::new();
    for ticker in &report.request.tickers {
        if !report.charts.contains_key(ticker) {
            continue;
        }
        table.push_str(&format!(
            "{:<10} {:>10} {:>10} {:>10} {:>8}\n",
            ticker,
            price,
            windows.short_label(),
            windows.long_label(),
            "Return"
        ));
        for row in &report.tail {
            let Some(snapshot) = row.values.get(ticker) else {
                continue;
            };
            table.push_str(&format!(
                "{:<10} {:>10} {:>10} {:>10} {:>8}\n",
                row.date,
                number(snapshot.price),
                number(snapshot.short_ma),
                number(snapshot.long_ma),
                percent(snapshot.simple_return)
            ));
        }
    }
    table
}

fn number(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

fn percent(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:+.2}%", v * 100.0))
}
