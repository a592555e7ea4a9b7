use anyhow::{Error, ensure};
use charming::{
    Chart, ImageFormat, ImageRenderer,
    component::{Axis, Legend, Title},
    datatype::DataPointItem,
    element::{
        AxisLabel, AxisType, ItemStyle, LineStyle, LineStyleType, SplitLine, Symbol, TextStyle,
    },
    series::{Bar, Line},
};

use super::{ChartSpec, LineSeries, LineStroke, Panel, PanelContent};

pub const WIDTH: u32 = 1200;
pub const PANEL_HEIGHT: u32 = 420;

const BACKGROUND: &str = "#0b0c17";
const GRID_LINE: &str = "#2d2f45";
const AXIS_TEXT: &str = "#a0a0a0";

/// Render every panel of `chart` to PNG, in panel order.
pub fn render_chart(chart: &ChartSpec) -> Result<Vec<Vec<u8>>, Error> {
    chart.panels.iter().map(render_panel).collect()
}

pub fn render_panel(panel: &Panel) -> Result<Vec<u8>, Error> {
    let chart = panel_chart(panel)?;
    let mut renderer = ImageRenderer::new(WIDTH, PANEL_HEIGHT);
    let png_bytes = renderer.render_format(ImageFormat::Png, &chart)?;
    Ok(png_bytes)
}

/// Build the charming chart for a panel without rasterizing it.
pub fn panel_chart(panel: &Panel) -> Result<Chart, Error> {
    let chart = Chart::new().background_color(BACKGROUND);

    let chart = match &panel.content {
        PanelContent::Lines {
            dates,
            series,
            zero_line,
        } => {
            for s in series {
                ensure!(
                    s.values.len() == dates.len(),
                    "length mismatch: {}={}, dates={}",
                    s.label,
                    s.values.len(),
                    dates.len()
                );
            }

            let labels: Vec<String> = dates
                .iter()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .collect();
            let interval = (labels.len() / 10).max(1) - 1;

            let mut chart = chart
                .title(title(&panel.title))
                .legend(
                    Legend::new()
                        .top("9%")
                        .text_style(TextStyle::new().color(AXIS_TEXT)),
                )
                .x_axis(category_axis(labels, interval, 0))
                .y_axis(value_axis(&panel.y_label));

            for s in series {
                chart = chart.series(line(s));
            }
            if *zero_line {
                chart = chart.series(
                    Line::new()
                        .name("zero")
                        .data(vec![0.0; dates.len()])
                        .symbol(Symbol::None)
                        .line_style(
                            LineStyle::new()
                                .width(1)
                                .color("#ffffff")
                                .type_(LineStyleType::Dashed),
                        ),
                );
            }
            chart
        }
        PanelContent::Bars(bars) => {
            ensure!(!bars.is_empty(), "no trend bars to display");

            let labels: Vec<String> = bars
                .iter()
                .map(|b| b.date.format("%m-%d").to_string())
                .collect();
            let data: Vec<DataPointItem> = bars
                .iter()
                .map(|b| {
                    DataPointItem::new(b.delta).item_style(ItemStyle::new().color(b.sign.color()))
                })
                .collect();

            chart
                .title(title(&panel.title))
                .x_axis(category_axis(labels, 0, 45))
                .y_axis(value_axis(&panel.y_label))
                .series(Bar::new().name("MA Difference").data(data))
        }
        PanelContent::Placeholder { message, .. } => chart.title(
            title(&panel.title)
                .top("40%")
                .subtext(message.as_str())
                .subtext_style(TextStyle::new().color(AXIS_TEXT).font_size(13)),
        ),
    };

    Ok(chart)
}

fn title(text: &str) -> Title {
    Title::new()
        .text(text)
        .left("center")
        .top("2%")
        .text_style(TextStyle::new().color("#ffffff").font_size(14))
}

fn category_axis(labels: Vec<String>, interval: usize, rotate: i32) -> Axis {
    Axis::new()
        .type_(AxisType::Category)
        .data(labels)
        .axis_label(
            AxisLabel::new()
                .rotate(rotate)
                .interval(interval as f64)
                .color(AXIS_TEXT),
        )
        .split_line(SplitLine::new().line_style(LineStyle::new().color(GRID_LINE)))
}

fn value_axis(name: &str) -> Axis {
    Axis::new()
        .type_(AxisType::Value)
        .name(name)
        .scale(true)
        .axis_label(AxisLabel::new().color(AXIS_TEXT))
        .split_line(SplitLine::new().line_style(LineStyle::new().color(GRID_LINE)))
}

fn line(series: &LineSeries) -> Line {
    // gaps become NaN, which charming serializes as null and draws as a break
    let values: Vec<f64> = series
        .values
        .iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();

    let stroke = match series.stroke {
        LineStroke::Solid => LineStyleType::Solid,
        LineStroke::Dashed => LineStyleType::Dashed,
        LineStroke::Dotted => LineStyleType::Dotted,
    };
    let width = if series.stroke == LineStroke::Solid { 2 } else { 1 };

    Line::new()
        .name(series.label.as_str())
        .data(values)
        .symbol(Symbol::None)
        .line_style(
            LineStyle::new()
                .width(width)
                .color(series.color.as_str())
                .type_(stroke),
        )
}
