//! Chart rendering using Plotters
//!
//! Each report section becomes one figure made of 2–3 panels. The renderer
//! only reads from [`BillingReport`]; it never recomputes a statistic.
//!
//! Drawing is generic over the Plotters [`DrawingBackend`]: [`render_all`]
//! writes PNG files through [`BitMapBackend`], and [`draw_figure`] accepts
//! any other backend. All text is measured and drawn through the backend.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::element::Pie;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::info;

use crate::analysis::{BillingReport, RevenueRow, Signal};
use crate::data::{CustomerType, Status};
use crate::format::format_money;
use crate::report::customer_type_label;
use crate::stats::HistogramBin;
use crate::style::{ChartStyle, HexColor};

type Area<DB> = DrawingArea<DB, Shift>;
type Chart<'c, DB> = ChartContext<'c, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Extra pixels on top of the panels for the figure title
const TITLE_HEIGHT: u32 = 60;

/// Width of a legend swatch in pixels
const KEY_SWATCH: i32 = 16;

/// One report figure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Figure {
    StatusOverview,
    Consumption,
    Revenue,
    DueDays,
    PeriodTrend,
    TopCustomers,
    Delinquency,
    Correlations,
}

impl Figure {
    /// Every figure, in report order
    pub const ALL: [Figure; 8] = [
        Figure::StatusOverview,
        Figure::Consumption,
        Figure::Revenue,
        Figure::DueDays,
        Figure::PeriodTrend,
        Figure::TopCustomers,
        Figure::Delinquency,
        Figure::Correlations,
    ];

    /// Output file name inside the chart directory
    pub fn file_name(self) -> &'static str {
        match self {
            Figure::StatusOverview => "fig1_status_overview.png",
            Figure::Consumption => "fig2_consumption.png",
            Figure::Revenue => "fig3_revenue_by_type.png",
            Figure::DueDays => "fig4_due_days.png",
            Figure::PeriodTrend => "fig5_period_trend.png",
            Figure::TopCustomers => "fig6_top_customers.png",
            Figure::Delinquency => "fig7_delinquency.png",
            Figure::Correlations => "fig8_correlations_kpis.png",
        }
    }

    pub fn title(self, report: &BillingReport) -> String {
        match self {
            Figure::StatusOverview => "1 - OVERDUE OVERVIEW".to_string(),
            Figure::Consumption => "2 - ENERGY CONSUMPTION".to_string(),
            Figure::Revenue => "3 - REVENUE BY CUSTOMER TYPE".to_string(),
            Figure::DueDays => "4 - DUE DATES".to_string(),
            Figure::PeriodTrend => "5 - OVERDUE TREND BY PERIOD".to_string(),
            Figure::TopCustomers => format!("6 - TOP {} CUSTOMERS BY REVENUE", report.options.top_n),
            Figure::Delinquency => "7 - OVERDUE FREQUENCY PER CUSTOMER".to_string(),
            Figure::Correlations => "8 - CORRELATIONS AND RISK PANEL".to_string(),
        }
    }

    fn panels(self) -> usize {
        match self {
            Figure::DueDays | Figure::PeriodTrend | Figure::TopCustomers | Figure::Correlations => 2,
            _ => 3,
        }
    }

    /// Pixel size of the whole figure: panels side by side under a title strip
    pub fn size(self, style: &ChartStyle) -> (u32, u32) {
        (
            style.panel_width * self.panels() as u32,
            style.panel_height + TITLE_HEIGHT,
        )
    }
}

fn text(style: &ChartStyle, size: u32, color: HexColor) -> TextStyle<'_> {
    (style.font_family.as_str(), size).into_font().color(&color.rgb())
}

/// Linear mix of two colors, `amount` in 0..=1
fn blend(base: HexColor, tint: HexColor, amount: f64) -> RGBColor {
    let mix = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * amount).round() as u8;
    RGBColor(mix(base.0, tint.0), mix(base.1, tint.1), mix(base.2, tint.2))
}

/// Yellow → orange → red ramp for correlations in -1..=1
fn heat_color(value: f64) -> RGBColor {
    const STOPS: [HexColor; 3] = [
        HexColor(0xff, 0xed, 0xa0),
        HexColor(0xfe, 0xb2, 0x4c),
        HexColor(0xf0, 0x3b, 0x20),
    ];
    let t = ((value + 1.0) / 2.0).clamp(0.0, 1.0);
    if t < 0.5 {
        blend(STOPS[0], STOPS[1], t * 2.0)
    } else {
        blend(STOPS[1], STOPS[2], (t - 0.5) * 2.0)
    }
}

fn status_color(style: &ChartStyle, status: Status) -> RGBColor {
    match status {
        Status::Paid => style.positive.rgb(),
        Status::Overdue => style.negative.rgb(),
        Status::Open => style.secondary.rgb(),
    }
}

fn type_color(style: &ChartStyle, customer_type: CustomerType) -> RGBColor {
    match customer_type {
        CustomerType::Individual => style.highlight.rgb(),
        CustomerType::Business => style.secondary.rgb(),
    }
}

/// Green, yellow, red, then repeating: one color per chronological period
fn period_colors(style: &ChartStyle, n: usize) -> Vec<RGBColor> {
    let cycle = [style.positive.rgb(), style.highlight.rgb(), style.negative.rgb()];
    (0..n).map(|i| cycle[i % cycle.len()]).collect()
}

/// Upper axis bound leaving headroom for annotations
fn headroom(max: f64) -> f64 {
    if max > 0.0 {
        max * 1.2
    } else {
        1.0
    }
}

fn category_range(n: usize) -> Range<f64> {
    -0.5..(n.max(1) as f64 - 0.5)
}

/// Label for a category axis tick; blank between categories
fn category_label(labels: &[String], value: f64) -> String {
    let idx = value.round();
    if (value - idx).abs() > 1e-6 || idx < 0.0 {
        return String::new();
    }
    labels.get(idx as usize).cloned().unwrap_or_default()
}

fn money_axis(value: &f64) -> String {
    format!("R${value:.0}")
}

fn percent_axis(value: &f64) -> String {
    format!("{value:.0}%")
}

fn integer_axis(value: &f64) -> String {
    format!("{value:.0}")
}

fn panel<'c, DB>(
    area: &Area<DB>,
    style: &ChartStyle,
    caption: &str,
    x: Range<f64>,
    y: Range<f64>,
) -> crate::Result<Chart<'c, DB>>
where
    DB: DrawingBackend + 'c,
    DB::ErrorType: 'static,
{
    area.fill(&style.surface.rgb())?;
    let chart = ChartBuilder::on(area)
        .caption(caption, text(style, style.caption_size, style.highlight))
        .margin(14)
        .x_label_area_size(44)
        .y_label_area_size(72)
        .build_cartesian_2d(x, y)?;
    Ok(chart)
}

struct Axes<'f> {
    x_desc: &'f str,
    y_desc: &'f str,
    x_labels: usize,
    y_labels: usize,
    x_fmt: Option<&'f dyn Fn(&f64) -> String>,
    y_fmt: Option<&'f dyn Fn(&f64) -> String>,
    x_grid: bool,
    y_grid: bool,
}

impl Default for Axes<'_> {
    fn default() -> Self {
        Axes {
            x_desc: "",
            y_desc: "",
            x_labels: 10,
            y_labels: 8,
            x_fmt: None,
            y_fmt: None,
            x_grid: true,
            y_grid: true,
        }
    }
}

fn draw_mesh<DB>(chart: &mut Chart<'_, DB>, style: &ChartStyle, axes: &Axes<'_>) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let label_font = text(style, style.label_size, style.muted);
    let mut mesh = chart.configure_mesh();
    mesh.bold_line_style(style.grid.rgb().mix(0.6))
        .light_line_style(style.grid.rgb().mix(0.2))
        .axis_style(style.grid.rgb())
        .label_style(label_font.clone())
        .axis_desc_style(label_font)
        .x_labels(axes.x_labels)
        .y_labels(axes.y_labels)
        .x_desc(axes.x_desc)
        .y_desc(axes.y_desc);
    if !axes.x_grid {
        mesh.disable_x_mesh();
    }
    if !axes.y_grid {
        mesh.disable_y_mesh();
    }
    if let Some(fmt) = axes.x_fmt {
        mesh.x_label_formatter(fmt);
    }
    if let Some(fmt) = axes.y_fmt {
        mesh.y_label_formatter(fmt);
    }
    mesh.draw()?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Swatch {
    Block,
    Line,
    Dot,
}

struct KeyEntry {
    label: String,
    color: RGBColor,
    swatch: Swatch,
}

impl KeyEntry {
    fn new(label: impl Into<String>, color: RGBColor, swatch: Swatch) -> Self {
        KeyEntry {
            label: label.into(),
            color,
            swatch,
        }
    }
}

/// Legend box in the upper right corner of a panel, below its caption.
///
/// Labels are sized with the backend's text metrics, like every other
/// piece of text in a figure.
fn draw_key<DB>(area: &Area<DB>, style: &ChartStyle, entries: &[KeyEntry]) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if entries.is_empty() {
        return Ok(());
    }
    let font = text(style, style.label_size, style.text);
    let mut label_width = 0;
    for entry in entries {
        let (w, _) = area.estimate_text_size(&entry.label, &font)?;
        label_width = label_width.max(w as i32);
    }

    let line_height = style.label_size as i32 + 8;
    let width = KEY_SWATCH + label_width + 20;
    let height = line_height * entries.len() as i32 + 8;
    let (area_width, _) = area.dim_in_pixel();
    let x0 = area_width as i32 - width - 24;
    let y0 = style.caption_size as i32 + 40;
    let frame = [(x0, y0), (x0 + width, y0 + height)];
    area.draw(&Rectangle::new(frame, style.surface.rgb().filled()))?;
    area.draw(&Rectangle::new(frame, style.muted.rgb()))?;

    let left = font.pos(Pos::new(HPos::Left, VPos::Center));
    for (i, entry) in entries.iter().enumerate() {
        let x = x0 + 6;
        let y = y0 + 4 + line_height * i as i32 + line_height / 2;
        match entry.swatch {
            Swatch::Block => area.draw(&Rectangle::new(
                [(x, y - 5), (x + KEY_SWATCH, y + 5)],
                entry.color.filled(),
            ))?,
            Swatch::Line => area.draw(&PathElement::new(
                vec![(x, y), (x + KEY_SWATCH, y)],
                entry.color.stroke_width(2),
            ))?,
            Swatch::Dot => area.draw(&Circle::new((x + KEY_SWATCH / 2, y), 4, entry.color.filled()))?,
        }
        area.draw(&Text::new(entry.label.clone(), (x + KEY_SWATCH + 8, y), left.clone()))?;
    }
    Ok(())
}

fn draw_no_data<DB>(area: &Area<DB>, style: &ChartStyle, caption: &str) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    area.fill(&style.surface.rgb())?;
    let (w, h) = area.dim_in_pixel();
    let centered = Pos::new(HPos::Center, VPos::Center);
    area.draw(&Text::new(
        caption.to_string(),
        (w as i32 / 2, h as i32 / 3),
        text(style, style.caption_size, style.highlight).pos(centered),
    ))?;
    area.draw(&Text::new(
        "no data".to_string(),
        (w as i32 / 2, h as i32 / 2),
        text(style, style.label_size, style.muted).pos(centered),
    ))?;
    Ok(())
}

struct Bar {
    label: String,
    value: f64,
    color: RGBColor,
    annotation: String,
}

fn vertical_bars<DB>(
    area: &Area<DB>,
    style: &ChartStyle,
    caption: &str,
    y_desc: &str,
    bars: &[Bar],
    y_fmt: &dyn Fn(&f64) -> String,
) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if bars.is_empty() {
        return draw_no_data(area, style, caption);
    }
    let labels: Vec<String> = bars.iter().map(|b| b.label.clone()).collect();
    let max = bars.iter().map(|b| b.value).fold(0.0, f64::max);

    let mut chart = panel(area, style, caption, category_range(bars.len()), 0.0..headroom(max))?;
    let x_fmt = |x: &f64| category_label(&labels, *x);
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            y_desc,
            x_labels: bars.len(),
            x_fmt: Some(&x_fmt),
            y_fmt: Some(y_fmt),
            x_grid: false,
            ..Axes::default()
        },
    )?;

    chart.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        let x = i as f64;
        Rectangle::new([(x - 0.3, 0.0), (x + 0.3, bar.value)], bar.color.filled())
    }))?;
    let above = text(style, style.label_size, style.text).pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        Text::new(bar.annotation.clone(), (i as f64, bar.value), above.clone())
    }))?;
    Ok(())
}

fn horizontal_bars<DB>(
    area: &Area<DB>,
    style: &ChartStyle,
    caption: &str,
    x_desc: &str,
    bars: &[Bar],
    x_fmt: &dyn Fn(&f64) -> String,
) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if bars.is_empty() {
        return draw_no_data(area, style, caption);
    }
    let labels: Vec<String> = bars.iter().map(|b| b.label.clone()).collect();
    let max = bars.iter().map(|b| b.value).fold(0.0, f64::max);

    let mut chart = panel(area, style, caption, 0.0..headroom(max) * 1.1, category_range(bars.len()))?;
    let y_fmt = |y: &f64| category_label(&labels, *y);
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            x_desc,
            y_labels: bars.len(),
            x_fmt: Some(x_fmt),
            y_fmt: Some(&y_fmt),
            y_grid: false,
            ..Axes::default()
        },
    )?;

    chart.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        let y = i as f64;
        Rectangle::new([(0.0, y - 0.3), (bar.value, y + 0.3)], bar.color.filled())
    }))?;
    let beside = text(style, style.label_size, style.text).pos(Pos::new(HPos::Left, VPos::Center));
    chart.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        Text::new(format!(" {}", bar.annotation), (bar.value, i as f64), beside.clone())
    }))?;
    Ok(())
}

fn donut<DB>(
    area: &Area<DB>,
    style: &ChartStyle,
    caption: &str,
    slices: &[(String, f64, RGBColor)],
    center_label: &str,
) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    if slices.iter().map(|s| s.1).sum::<f64>() <= 0.0 {
        return draw_no_data(area, style, caption);
    }
    area.fill(&style.surface.rgb())?;
    let inner = area.titled(caption, text(style, style.caption_size, style.highlight))?;
    let (w, h) = inner.dim_in_pixel();

    let center = (w as i32 / 2, h as i32 / 2);
    let radius = f64::from(w.min(h)) * 0.32;
    let sizes: Vec<f64> = slices.iter().map(|s| s.1).collect();
    let colors: Vec<RGBColor> = slices.iter().map(|s| s.2).collect();
    let labels: Vec<String> = slices.iter().map(|s| s.0.clone()).collect();

    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.start_angle(-90.0);
    pie.donut_hole(radius * 0.45);
    pie.label_style(text(style, style.label_size, style.text));
    inner.draw(&pie)?;

    inner.draw(&Text::new(
        center_label.to_string(),
        center,
        text(style, style.label_size, style.text).pos(Pos::new(HPos::Center, VPos::Center)),
    ))?;
    Ok(())
}

struct Marker<'m> {
    value: f64,
    color: RGBColor,
    label: &'m str,
}

fn histogram_panel<DB>(
    area: &Area<DB>,
    style: &ChartStyle,
    caption: &str,
    (x_desc, y_desc): (&str, &str),
    bins: &[HistogramBin],
    color: RGBColor,
    markers: &[Marker<'_>],
) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
        return draw_no_data(area, style, caption);
    };
    let max = bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;

    let mut chart = panel(area, style, caption, first.start..last.end, 0.0..headroom(max))?;
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            x_desc,
            y_desc,
            x_fmt: Some(&integer_axis),
            y_fmt: Some(&integer_axis),
            ..Axes::default()
        },
    )?;

    let fill = color.mix(0.75).filled();
    chart.draw_series(
        bins.iter()
            .map(|b| Rectangle::new([(b.start, 0.0), (b.end, b.count as f64)], fill)),
    )?;

    let top = headroom(max);
    chart.draw_series(markers.iter().map(|marker| {
        PathElement::new(
            vec![(marker.value, 0.0), (marker.value, top)],
            marker.color.stroke_width(2),
        )
    }))?;
    let key: Vec<KeyEntry> = markers
        .iter()
        .map(|marker| KeyEntry::new(marker.label, marker.color, Swatch::Line))
        .collect();
    draw_key(area, style, &key)
}

// ---------------------------------------------------------------------------
// Figures
// ---------------------------------------------------------------------------

/// Status shares, overdue rate and overdue amount per billing period
fn draw_status_overview<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let slices: Vec<(String, f64, RGBColor)> = report
        .status
        .overall
        .shares
        .iter()
        .map(|s| (format!("{} {:.1}%", s.status, s.pct), s.count as f64, status_color(style, s.status)))
        .collect();
    donut(
        &areas[0],
        style,
        "Invoice status",
        &slices,
        &format!("{} invoices", report.status.overall.total),
    )?;

    let trend = &report.trend.rows;
    let colors = period_colors(style, trend.len());
    let rate_bars: Vec<Bar> = trend
        .iter()
        .zip(&colors)
        .map(|(row, &color)| Bar {
            label: row.period.short_label(),
            value: row.rate,
            color,
            annotation: format!("{:.1}%", row.rate),
        })
        .collect();
    vertical_bars(&areas[1], style, "Overdue rate by period", "% overdue", &rate_bars, &percent_axis)?;

    let amount_bars: Vec<Bar> = trend
        .iter()
        .zip(&colors)
        .map(|(row, &color)| Bar {
            label: row.period.short_label(),
            value: row.overdue_amount,
            color,
            annotation: format_money(row.overdue_amount),
        })
        .collect();
    vertical_bars(&areas[2], style, "Overdue amount by period", "amount", &amount_bars, &money_axis)
}

fn boxplot_panel<DB>(area: &Area<DB>, style: &ChartStyle, report: &BillingReport) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let dists = &report.consumption.distribution_by_type;
    let labels: Vec<String> = dists
        .iter()
        .map(|d| customer_type_label(d.customer_type).to_string())
        .collect();
    let max = dists
        .iter()
        .flat_map(|d| d.box_stats.outliers.iter().copied().chain([d.box_stats.whisker_high]))
        .fold(0.0, f64::max);

    let mut chart = panel(
        area,
        style,
        "Consumption by customer type",
        category_range(dists.len()),
        0.0..headroom(max),
    )?;
    let x_fmt = |x: &f64| category_label(&labels, *x);
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            y_desc: "kWh",
            x_labels: dists.len(),
            x_fmt: Some(&x_fmt),
            y_fmt: Some(&integer_axis),
            x_grid: false,
            ..Axes::default()
        },
    )?;

    let whisker = style.muted.rgb().stroke_width(1);
    for (i, dist) in dists.iter().enumerate() {
        let x = i as f64;
        let b = &dist.box_stats;
        let color = type_color(style, dist.customer_type);

        chart.draw_series([
            PathElement::new(vec![(x, b.q3), (x, b.whisker_high)], whisker),
            PathElement::new(vec![(x, b.q1), (x, b.whisker_low)], whisker),
            PathElement::new(vec![(x - 0.1, b.whisker_high), (x + 0.1, b.whisker_high)], whisker),
            PathElement::new(vec![(x - 0.1, b.whisker_low), (x + 0.1, b.whisker_low)], whisker),
        ])?;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - 0.25, b.q1), (x + 0.25, b.q3)],
            color.mix(0.7).filled(),
        )))?;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x - 0.25, b.median), (x + 0.25, b.median)],
            style.background.rgb().stroke_width(2),
        )))?;
        chart.draw_series(
            b.outliers
                .iter()
                .map(|&v| Circle::new((x, v), 2, style.muted.rgb().mix(0.6).filled())),
        )?;
    }
    Ok(())
}

/// Consumption distribution per type, mean per status, overall histogram
fn draw_consumption<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let consumption = &report.consumption;

    boxplot_panel(&areas[0], style, report)?;

    let mut by_status: Vec<_> = consumption.by_status.iter().filter(|r| r.stats.count > 0).collect();
    by_status.sort_by(|a, b| a.stats.mean.total_cmp(&b.stats.mean));
    let bars: Vec<Bar> = by_status
        .iter()
        .map(|row| Bar {
            label: row.key.to_string(),
            value: row.stats.mean,
            color: status_color(style, row.key),
            annotation: format!("{:.0} kWh", row.stats.mean),
        })
        .collect();
    horizontal_bars(&areas[1], style, "Mean consumption by status", "mean kWh", &bars, &integer_axis)?;

    let median_label = format!("Median: {:.0}", consumption.overall_median);
    let mean_label = format!("Mean: {:.0}", consumption.overall_mean);
    histogram_panel(
        &areas[2],
        style,
        "Consumption distribution (all)",
        ("kWh", "invoices"),
        &consumption.histogram,
        style.secondary.rgb(),
        &[
            Marker {
                value: consumption.overall_median,
                color: style.highlight.rgb(),
                label: &median_label,
            },
            Marker {
                value: consumption.overall_mean,
                color: style.extra.rgb(),
                label: &mean_label,
            },
        ],
    )
}

/// Revenue, average ticket and overdue rate per customer type
fn draw_revenue<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let rows = &report.revenue.rows;

    let bars = |value: fn(&RevenueRow) -> f64, annotate: fn(f64) -> String| -> Vec<Bar> {
        rows.iter()
            .map(|row| Bar {
                label: customer_type_label(row.customer_type).to_string(),
                value: value(row),
                color: type_color(style, row.customer_type),
                annotation: annotate(value(row)),
            })
            .collect()
    };

    vertical_bars(
        &areas[0],
        style,
        "Total revenue by type",
        "revenue",
        &bars(|r| r.total, format_money),
        &money_axis,
    )?;
    vertical_bars(
        &areas[1],
        style,
        "Average ticket by type",
        "mean invoice",
        &bars(|r| r.mean, format_money),
        &money_axis,
    )?;
    vertical_bars(
        &areas[2],
        style,
        "Overdue rate by type",
        "% overdue",
        &bars(|r| r.overdue_rate, |v| format!("{v:.1}%")),
        &percent_axis,
    )
}

/// Invoice volume per due day and overdue rate of the significant due days
fn draw_due_days<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let due_days = &report.due_days;
    let worst = due_days.worst().map(|d| d.day);
    let best = due_days.best().map(|d| d.day);

    // volume
    let max = due_days.volume.iter().map(|v| v.count).max().unwrap_or(0) as f64;
    let mut chart = panel(&areas[0], style, "Invoices per due day", 0.5..31.5, 0.0..headroom(max))?;
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            x_desc: "day of month",
            y_desc: "invoices",
            x_labels: 16,
            x_fmt: Some(&integer_axis),
            y_fmt: Some(&integer_axis),
            x_grid: false,
            ..Axes::default()
        },
    )?;
    let groups = [
        ("Lowest overdue rate", style.highlight.rgb(), Some(best)),
        ("Highest overdue rate", style.negative.rgb(), Some(worst)),
        ("Other days", style.secondary.rgb(), None),
    ];
    let mut key = Vec::new();
    for (label, color, day) in groups {
        let selected = due_days.volume.iter().filter(|v| match day {
            Some(target) => target == Some(v.day),
            None => Some(v.day) != best && Some(v.day) != worst,
        });
        chart.draw_series(selected.map(|v| {
            let x = f64::from(v.day);
            Rectangle::new([(x - 0.35, 0.0), (x + 0.35, v.count as f64)], color.filled())
        }))?;
        key.push(KeyEntry::new(label, color, Swatch::Block));
    }
    draw_key(&areas[0], style, &key)?;

    // overdue rate, bubble size = volume
    let caption = format!("Overdue rate per due day (>= {} invoices)", due_days.min_invoices);
    if due_days.rates.is_empty() {
        return draw_no_data(&areas[1], style, &caption);
    }
    let max_rate = due_days
        .rates
        .iter()
        .map(|r| r.rate)
        .fold(due_days.overall_rate, f64::max);
    let mut chart = panel(&areas[1], style, &caption, 0.5..31.5, 0.0..headroom(max_rate))?;
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            x_desc: "day of month",
            y_desc: "% overdue",
            x_labels: 16,
            x_fmt: Some(&integer_axis),
            y_fmt: Some(&percent_axis),
            ..Axes::default()
        },
    )?;

    let bubble_color = |day: u32| {
        if day >= 22 {
            style.negative.rgb()
        } else if day < 18 {
            style.highlight.rgb()
        } else {
            style.secondary.rgb()
        }
    };
    chart.draw_series(due_days.rates.iter().map(|r| {
        let radius = (r.count as f64).sqrt() * 2.0;
        Circle::new(
            (f64::from(r.day), r.rate),
            radius.round() as i32,
            bubble_color(r.day).mix(0.8).filled(),
        )
    }))?;

    let overall = due_days.overall_rate;
    let line_color = style.negative.rgb();
    chart.draw_series(LineSeries::new([(0.5, overall), (31.5, overall)], line_color.stroke_width(1)))?;

    let annotate_from = due_days.min_invoices * 5;
    let note = text(style, style.label_size, style.text).pos(Pos::new(HPos::Left, VPos::Bottom));
    chart.draw_series(
        due_days
            .rates
            .iter()
            .filter(|r| r.count >= annotate_from)
            .map(|r| {
                Text::new(
                    format!(" day {} {:.0}%", r.day, r.rate),
                    (f64::from(r.day), r.rate),
                    note.clone(),
                )
            }),
    )?;
    draw_key(
        &areas[1],
        style,
        &[KeyEntry::new(format!("Overall: {overall:.1}%"), line_color, Swatch::Line)],
    )
}

/// Overdue rate line and invoice counts per billing period
fn draw_period_trend<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let rows = &report.trend.rows;
    let labels: Vec<String> = rows.iter().map(|r| r.period.short_label()).collect();
    let x_fmt = |x: &f64| category_label(&labels, *x);

    let caption = format!("Overdue rate ({:+.1} p.p.)", report.trend.rate_delta);
    if rows.is_empty() {
        draw_no_data(&areas[0], style, &caption)?;
        return draw_no_data(&areas[1], style, "Invoices per period");
    }

    let max_rate = rows.iter().map(|r| r.rate).fold(0.0, f64::max);
    let mut chart = panel(&areas[0], style, &caption, category_range(rows.len()), 0.0..headroom(max_rate))?;
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            y_desc: "% overdue",
            x_labels: rows.len(),
            x_fmt: Some(&x_fmt),
            y_fmt: Some(&percent_axis),
            x_grid: false,
            ..Axes::default()
        },
    )?;
    let points: Vec<(f64, f64)> = rows.iter().enumerate().map(|(i, r)| (i as f64, r.rate)).collect();
    chart.draw_series(LineSeries::new(points.clone(), style.negative.rgb().stroke_width(2)))?;
    chart.draw_series(
        points
            .iter()
            .map(|&p| Circle::new(p, 5, style.negative.rgb().filled())),
    )?;
    let above = text(style, style.label_size, style.text).pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Text::new(format!("{y:.1}%"), (x, y * 1.03), above.clone())),
    )?;

    let max_total = rows.iter().map(|r| r.total).max().unwrap_or(0) as f64;
    let mut chart = panel(
        &areas[1],
        style,
        "Invoices per period",
        category_range(rows.len()),
        0.0..headroom(max_total),
    )?;
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            y_desc: "invoices",
            x_labels: rows.len(),
            x_fmt: Some(&x_fmt),
            y_fmt: Some(&integer_axis),
            x_grid: false,
            ..Axes::default()
        },
    )?;
    let series = [
        ("All invoices", style.secondary.rgb(), -0.32, false),
        ("Overdue", style.negative.rgb(), 0.02, true),
    ];
    let mut key = Vec::new();
    for (label, color, offset, overdue_only) in series {
        chart.draw_series(rows.iter().enumerate().map(|(i, r)| {
            let x = i as f64 + offset;
            let value = (if overdue_only { r.overdue } else { r.total }) as f64;
            Rectangle::new([(x, 0.0), (x + 0.3, value)], color.filled())
        }))?;
        key.push(KeyEntry::new(label, color, Swatch::Block));
    }
    draw_key(&areas[1], style, &key)
}

/// Top customers by revenue and consumption vs revenue for every customer
fn draw_top_customers<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    // rank 1 at the top
    let bars: Vec<Bar> = report
        .top_customers
        .iter()
        .rev()
        .map(|c| Bar {
            label: c.label.clone(),
            value: c.totals.total_amount,
            color: if c.totals.ever_overdue {
                style.negative.rgb()
            } else {
                style.positive.rgb()
            },
            annotation: format_money(c.totals.total_amount),
        })
        .collect();
    horizontal_bars(
        &areas[0],
        style,
        "Total billed (red = has overdue)",
        "amount",
        &bars,
        &money_axis,
    )?;

    let totals = &report.customer_totals;
    if totals.is_empty() {
        return draw_no_data(&areas[1], style, "Consumption vs revenue");
    }
    let max_kwh = totals.iter().map(|c| c.total_consumption).fold(0.0, f64::max);
    let max_amount = totals.iter().map(|c| c.total_amount).fold(0.0, f64::max);
    let mut chart = panel(
        &areas[1],
        style,
        "Consumption vs revenue (red = top)",
        0.0..headroom(max_kwh),
        0.0..headroom(max_amount),
    )?;
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            x_desc: "total kWh",
            y_desc: "total billed",
            x_fmt: Some(&integer_axis),
            y_fmt: Some(&money_axis),
            ..Axes::default()
        },
    )?;

    let mut key = Vec::new();
    for customer_type in CustomerType::ALL {
        let color = type_color(style, customer_type);
        chart.draw_series(
            totals
                .iter()
                .filter(|c| c.customer_type == customer_type)
                .map(|c| Circle::new((c.total_consumption, c.total_amount), 3, color.mix(0.6).filled())),
        )?;
        key.push(KeyEntry::new(customer_type.code(), color, Swatch::Dot));
    }
    chart.draw_series(report.top_customers.iter().map(|c| {
        Circle::new(
            (c.totals.total_consumption, c.totals.total_amount),
            6,
            style.negative.rgb().filled(),
        )
    }))?;
    draw_key(&areas[1], style, &key)
}

/// Customers per overdue count, overdue rate histogram, payment profile
fn draw_delinquency<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let d = &report.delinquency;

    let bars: Vec<Bar> = d
        .distribution
        .iter()
        .map(|bucket| Bar {
            label: bucket.overdue_invoices.to_string(),
            value: bucket.customers as f64,
            color: match bucket.overdue_invoices {
                0 => style.positive.rgb(),
                1 => style.highlight.rgb(),
                _ => style.negative.rgb(),
            },
            annotation: bucket.customers.to_string(),
        })
        .collect();
    vertical_bars(&areas[0], style, "Customers by overdue count", "customers", &bars, &integer_axis)?;

    let mean_label = format!("Mean: {:.0}%", d.delinquent_mean_rate);
    let markers = if d.with_overdue > 0 {
        vec![Marker {
            value: d.delinquent_mean_rate,
            color: style.highlight.rgb(),
            label: &mean_label,
        }]
    } else {
        Vec::new()
    };
    histogram_panel(
        &areas[1],
        style,
        "Overdue rate, customers with >= 1 overdue",
        ("% overdue invoices", "customers"),
        &d.delinquent_rate_histogram,
        style.negative.rgb(),
        &markers,
    )?;

    let slices = [
        (format!("No overdue {}", d.without_overdue), d.without_overdue as f64, style.positive.rgb()),
        (format!("Partial {}", d.partially_overdue), d.partially_overdue as f64, style.highlight.rgb()),
        (format!("100% overdue {}", d.fully_overdue), d.fully_overdue as f64, style.negative.rgb()),
    ];
    donut(
        &areas[2],
        style,
        "Customer payment profile",
        &slices,
        &format!("{} customers", d.total_customers),
    )
}

fn heatmap_panel<DB>(area: &Area<DB>, style: &ChartStyle, report: &BillingReport) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let matrix = &report.correlation;
    let n = matrix.labels.len();
    // first label on top
    let y_labels: Vec<String> = matrix.labels.iter().rev().cloned().collect();
    let x_fmt = |x: &f64| category_label(&matrix.labels, *x);
    let y_fmt = |y: &f64| category_label(&y_labels, *y);

    let mut chart = panel(area, style, "Correlation matrix", category_range(n), category_range(n))?;
    draw_mesh(
        &mut chart,
        style,
        &Axes {
            x_labels: n,
            y_labels: n,
            x_fmt: Some(&x_fmt),
            y_fmt: Some(&y_fmt),
            x_grid: false,
            y_grid: false,
            ..Axes::default()
        },
    )?;

    let cells: Vec<(f64, f64, f64)> = matrix
        .values
        .iter()
        .enumerate()
        .flat_map(|(row, values)| {
            values
                .iter()
                .enumerate()
                .map(move |(col, &v)| (col as f64, (n - 1 - row) as f64, v))
        })
        .collect();
    chart.draw_series(cells.iter().map(|&(x, y, v)| {
        Rectangle::new([(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)], heat_color(v).filled())
    }))?;
    let dark = HexColor(0x0d, 0x0f, 0x14);
    let centered = text(style, style.label_size, dark).pos(Pos::new(HPos::Center, VPos::Center));
    chart.draw_series(
        cells
            .iter()
            .map(|&(x, y, v)| Text::new(format!("{v:.2}"), (x, y), centered.clone())),
    )?;
    Ok(())
}

fn kpi_table<DB>(area: &Area<DB>, style: &ChartStyle, report: &BillingReport) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    area.fill(&style.surface.rgb())?;
    let inner = area.titled(
        "KPI panel - executive summary",
        text(style, style.caption_size, style.highlight),
    )?;
    let (w, h) = inner.dim_in_pixel();
    let (w, h) = (w as i32, h as i32);

    let margin = 16;
    let rows = report.kpis.len() as i32 + 1;
    let row_height = ((h - 2 * margin) / rows.max(1)).max(1);
    let columns = [margin, margin + (w - 2 * margin) * 55 / 100, margin + (w - 2 * margin) * 85 / 100, w - margin];

    let header = [
        ("Metric".to_string(), 0usize),
        ("Value".to_string(), 1),
        ("Status".to_string(), 2),
    ];
    let mut lines: Vec<(Vec<(String, usize)>, RGBColor, HexColor)> =
        vec![(header.to_vec(), style.highlight.rgb(), style.background)];
    for kpi in &report.kpis {
        let (fill, color, flag) = match kpi.signal {
            Signal::Warn => (blend(style.surface, style.negative, 0.2), style.negative, "WARN"),
            Signal::Good => (blend(style.surface, style.positive, 0.15), style.positive, "OK"),
            Signal::Neutral => (style.surface.rgb(), style.text, "-"),
        };
        lines.push((
            vec![(kpi.metric.clone(), 0), (kpi.value.clone(), 1), (flag.to_string(), 2)],
            fill,
            color,
        ));
    }

    let left = Pos::new(HPos::Left, VPos::Center);
    for (i, (cells, fill, color)) in lines.into_iter().enumerate() {
        let top = margin + i as i32 * row_height;
        for (content, col) in cells {
            let (x0, x1) = (columns[col], columns[col + 1]);
            inner.draw(&Rectangle::new([(x0, top), (x1, top + row_height)], fill.filled()))?;
            inner.draw(&Rectangle::new([(x0, top), (x1, top + row_height)], style.muted.rgb()))?;
            inner.draw(&Text::new(
                content,
                (x0 + 6, top + row_height / 2),
                text(style, style.label_size, color).pos(left),
            ))?;
        }
    }
    Ok(())
}

/// Correlation heatmap and KPI table
fn draw_correlations<DB>(areas: &[Area<DB>], report: &BillingReport, style: &ChartStyle) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    heatmap_panel(&areas[0], style, report)?;
    kpi_table(&areas[1], style, report)
}

/// Draw one figure onto `root`: background, title strip, then its panels
///
/// # Arguments
/// * `figure` - Which report section to draw
/// * `root` - Drawing area sized with [`Figure::size`]
/// * `report` - Report the figure reads from
/// * `style` - Palette, font and panel sizes
pub fn draw_figure<DB>(
    figure: Figure,
    root: &DrawingArea<DB, Shift>,
    report: &BillingReport,
    style: &ChartStyle,
) -> crate::Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&style.background.rgb())?;
    let body = root.titled(&figure.title(report), text(style, style.title_size, style.highlight))?;
    let areas = body.split_evenly((1, figure.panels()));

    match figure {
        Figure::StatusOverview => draw_status_overview(&areas, report, style)?,
        Figure::Consumption => draw_consumption(&areas, report, style)?,
        Figure::Revenue => draw_revenue(&areas, report, style)?,
        Figure::DueDays => draw_due_days(&areas, report, style)?,
        Figure::PeriodTrend => draw_period_trend(&areas, report, style)?,
        Figure::TopCustomers => draw_top_customers(&areas, report, style)?,
        Figure::Delinquency => draw_delinquency(&areas, report, style)?,
        Figure::Correlations => draw_correlations(&areas, report, style)?,
    }
    root.present()?;
    Ok(())
}

/// Render every report figure as a PNG into `output_dir`
///
/// # Returns
/// * Paths of the written PNG files, in report order
pub fn render_all(report: &BillingReport, style: &ChartStyle, output_dir: &Path) -> crate::Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let mut written = Vec::with_capacity(Figure::ALL.len());
    for figure in Figure::ALL {
        let path = output_dir.join(figure.file_name());
        {
            let root = BitMapBackend::new(&path, figure.size(style)).into_drawing_area();
            draw_figure(figure, &root, report, style)
                .with_context(|| format!("failed to render {}", path.display()))?;
        }
        info!(path = %path.display(), "chart saved");
        written.push(path);
    }
    Ok(written)
}
