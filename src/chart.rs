//! SVG chart rendering for a table's columns.
//!
//! Charts are written as plain SVG markup: no fonts are measured and no raster output is
//! produced. Values are read with lenient numeric coercion, so numeric text plots too.

use crate::error::{NodeflowError, Result};
use crate::processing::types::{Column, Table, ValueKey};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 480.0;
const MARGIN: f64 = 60.0;
const HISTOGRAM_BINS: usize = 10;

const BACKGROUND: &str = "#ffffff";
const GRID: &str = "#e5e7eb";
const AXIS_TEXT: &str = "#4b5563";
const TITLE: &str = "#1f2937";
const PRIMARY: &str = "#3b82f6";
const PALETTE: [&str; 5] = ["#3b82f6", "#22c55e", "#f59e0b", "#8b5cf6", "#ec4899"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    #[serde(alias = "hist")]
    Histogram,
}

impl ChartKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "bar" => Some(Self::Bar),
            "line" => Some(Self::Line),
            "scatter" => Some(Self::Scatter),
            "pie" => Some(Self::Pie),
            "hist" | "histogram" => Some(Self::Histogram),
            _ => None,
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Scatter => "scatter",
            Self::Pie => "pie",
            Self::Histogram => "histogram",
        })
    }
}

fn default_title() -> String {
    "Chart".to_owned()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRequest {
    pub kind: ChartKind,
    pub x_column: String,
    #[serde(default)]
    pub y_column: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
}

impl ChartRequest {
    pub fn new(kind: ChartKind, x_column: impl Into<String>) -> Self {
        Self {
            kind,
            x_column: x_column.into(),
            y_column: None,
            title: default_title(),
        }
    }

    #[must_use]
    pub fn with_y(mut self, y_column: impl Into<String>) -> Self {
        self.y_column = Some(y_column.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChartImage {
    pub mime_type: &'static str,
    pub svg: String,
}

/// Renders one chart.
///
/// - bar: sum of `y` per distinct `x`, or value counts of `x` without `y`
/// - line: `y` against `x`, or `x` against row position without `y`
/// - scatter: `y` against `x`; `y` is required
/// - pie: value counts of `x`
/// - histogram: `x` in ten equal-width bins
///
/// # Errors
///
/// `GraphGeneration` when a column is absent or there is nothing to plot.
pub fn render_chart(table: &Table, request: &ChartRequest) -> Result<ChartImage> {
    let x = chart_column(table, &request.x_column)?;
    let y = request
        .y_column
        .as_deref()
        .map(|name| chart_column(table, name))
        .transpose()?;

    let mut canvas = Canvas::new(&request.title);
    match request.kind {
        ChartKind::Bar => {
            let bars = match &y {
                Some(y) => grouped_sums(&x, y),
                None => value_counts(&x),
            };
            canvas.bars(&bars)?;
        }
        ChartKind::Line => {
            let points = match &y {
                Some(y) => paired(&x, y),
                None => indexed(&x),
            };
            canvas.points(&points, true)?;
        }
        ChartKind::Scatter => {
            let y = y.ok_or_else(|| graph_error("a scatter chart needs a y column"))?;
            canvas.points(&paired(&x, &y), false)?;
        }
        ChartKind::Pie => canvas.pie(&value_counts(&x))?,
        ChartKind::Histogram => canvas.bars(&histogram(&x)?)?,
    }
    if request.kind != ChartKind::Pie {
        canvas.axis_labels(&request.x_column, request.y_column.as_deref());
    }

    tracing::debug!(kind = %request.kind, x = %request.x_column, "Rendered chart");
    Ok(ChartImage {
        mime_type: "image/svg+xml",
        svg: canvas.finish(),
    })
}

fn graph_error(msg: impl Into<String>) -> NodeflowError {
    NodeflowError::GraphGeneration(msg.into())
}

fn chart_column(table: &Table, name: &str) -> Result<Column> {
    table
        .column(name)
        .ok_or_else(|| graph_error(format!("column '{name}' not found")))
}

fn grouped_sums(x: &Column, y: &Column) -> Vec<(String, f64)> {
    let mut groups: BTreeMap<ValueKey, (String, f64)> = BTreeMap::new();
    for (key, value) in x.values().iter().zip(y.values()) {
        if key.is_missing() {
            continue;
        }
        let entry = groups
            .entry(key.key())
            .or_insert_with(|| (key.to_string(), 0.0));
        entry.1 += value.as_f64().unwrap_or_default();
    }
    groups.into_values().collect()
}

/// Counts per distinct value, most frequent first.
fn value_counts(x: &Column) -> Vec<(String, f64)> {
    let mut counts: BTreeMap<ValueKey, (String, usize)> = BTreeMap::new();
    for value in x.non_missing() {
        counts
            .entry(value.key())
            .or_insert_with(|| (value.to_string(), 0))
            .1 += 1;
    }
    let mut counts: Vec<_> = counts.into_values().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .map(|(label, n)| (label, n as f64))
        .collect()
}

fn paired(x: &Column, y: &Column) -> Vec<(f64, f64)> {
    x.values()
        .iter()
        .zip(y.values())
        .filter_map(|(x, y)| Some((x.as_f64()?, y.as_f64()?)))
        .collect()
}

fn indexed(x: &Column) -> Vec<(f64, f64)> {
    x.values()
        .iter()
        .enumerate()
        .filter_map(|(i, v)| Some((i as f64, v.as_f64()?)))
        .collect()
}

fn histogram(x: &Column) -> Result<Vec<(String, f64)>> {
    let values: Vec<f64> = x.values().iter().filter_map(|v| v.as_f64()).collect();
    let (Some(min), Some(max)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) else {
        return Err(graph_error(format!("no numeric values in '{}'", x.name())));
    };
    let (min, max) = if max > min {
        (min, max)
    } else {
        (min - 0.5, max + 0.5)
    };
    let width = (max - min) / HISTOGRAM_BINS as f64;

    let mut counts = [0usize; HISTOGRAM_BINS];
    for v in values {
        let bin = (((v - min) / width).floor() as usize).min(HISTOGRAM_BINS - 1);
        if let Some(count) = counts.get_mut(bin) {
            *count += 1;
        }
    }
    Ok(counts
        .iter()
        .enumerate()
        .map(|(i, n)| (format!("{:.1}", min + width * i as f64), *n as f64))
        .collect())
}

/// Accumulates SVG markup for one chart.
struct Canvas {
    out: String,
}

impl Canvas {
    const LEFT: f64 = MARGIN;
    const RIGHT: f64 = WIDTH - MARGIN / 2.0;
    const TOP: f64 = MARGIN;
    const BOTTOM: f64 = HEIGHT - MARGIN;

    fn new(title: &str) -> Self {
        let mut out = String::new();
        out.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {WIDTH} {HEIGHT}" width="{WIDTH}" height="{HEIGHT}">"#
        ));
        out.push('\n');
        out.push_str(&format!(
            r#"<rect x="0" y="0" width="{WIDTH}" height="{HEIGHT}" fill="{BACKGROUND}"/>"#
        ));
        out.push('\n');
        out.push_str(&format!(
            r#"<text x="{}" y="32" font-size="16" font-weight="600" text-anchor="middle" fill="{TITLE}">{}</text>"#,
            WIDTH / 2.0,
            escape(title)
        ));
        out.push('\n');
        Self { out }
    }

    fn text(&mut self, x: f64, y: f64, size: u32, anchor: &str, text: &str) {
        self.out.push_str(&format!(
            r#"<text x="{x:.1}" y="{y:.1}" font-size="{size}" text-anchor="{anchor}" fill="{AXIS_TEXT}">{}</text>"#,
            escape(text)
        ));
        self.out.push('\n');
    }

    /// Horizontal dashed grid with five value ticks between `min` and `max`.
    fn grid(&mut self, min: f64, max: f64) {
        for step in 0..=4 {
            let value = min + (max - min) * f64::from(step) / 4.0;
            let y = Self::BOTTOM - (Self::BOTTOM - Self::TOP) * f64::from(step) / 4.0;
            self.out.push_str(&format!(
                r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{GRID}" stroke-dasharray="4 4"/>"#,
                Self::LEFT,
                Self::RIGHT
            ));
            self.out.push('\n');
            self.text(Self::LEFT - 8.0, y + 4.0, 10, "end", &format_tick(value));
        }
    }

    fn bars(&mut self, bars: &[(String, f64)]) -> Result<()> {
        if bars.is_empty() {
            return Err(graph_error("nothing to plot"));
        }
        let max = bars.iter().map(|b| b.1).fold(0.0, f64::max);
        let min = bars.iter().map(|b| b.1).fold(0.0, f64::min);
        let span = if max > min { max - min } else { 1.0 };
        let scale = |v: f64| Self::BOTTOM - (v - min) / span * (Self::BOTTOM - Self::TOP);
        self.grid(min, min + span);

        let slot = (Self::RIGHT - Self::LEFT) / bars.len() as f64;
        let baseline = scale(0.0);
        for (i, (label, value)) in bars.iter().enumerate() {
            let x = Self::LEFT + slot * i as f64;
            let top = scale(*value).min(baseline);
            let height = (scale(*value) - baseline).abs();
            self.out.push_str(&format!(
                r#"<rect x="{:.1}" y="{top:.1}" width="{:.1}" height="{height:.1}" fill="{PRIMARY}" stroke="{BACKGROUND}" stroke-width="0.5"/>"#,
                x + slot * 0.1,
                slot * 0.8
            ));
            self.out.push('\n');
            self.text(x + slot / 2.0, Self::BOTTOM + 16.0, 10, "middle", label);
        }
        Ok(())
    }

    fn points(&mut self, points: &[(f64, f64)], connect: bool) -> Result<()> {
        if points.is_empty() {
            return Err(graph_error("no numeric points to plot"));
        }
        let bounds = |pick: fn(&(f64, f64)) -> f64| {
            let lo = points.iter().map(pick).fold(f64::INFINITY, f64::min);
            let hi = points.iter().map(pick).fold(f64::NEG_INFINITY, f64::max);
            if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) }
        };
        let (x_min, x_max) = bounds(|p| p.0);
        let (y_min, y_max) = bounds(|p| p.1);
        self.grid(y_min, y_max);

        let project = |(x, y): (f64, f64)| {
            (
                Self::LEFT + (x - x_min) / (x_max - x_min) * (Self::RIGHT - Self::LEFT),
                Self::BOTTOM - (y - y_min) / (y_max - y_min) * (Self::BOTTOM - Self::TOP),
            )
        };
        let projected: Vec<(f64, f64)> = points.iter().copied().map(project).collect();

        if connect {
            let path: Vec<String> = projected
                .iter()
                .map(|(x, y)| format!("{x:.1},{y:.1}"))
                .collect();
            self.out.push_str(&format!(
                r#"<polyline points="{}" fill="none" stroke="{PRIMARY}" stroke-width="2.5"/>"#,
                path.join(" ")
            ));
            self.out.push('\n');
        }
        let (radius, opacity) = if connect { (4.0, 1.0) } else { (5.0, 0.7) };
        for (x, y) in projected {
            self.out.push_str(&format!(
                r#"<circle cx="{x:.1}" cy="{y:.1}" r="{radius}" fill="{PRIMARY}" fill-opacity="{opacity}"/>"#
            ));
            self.out.push('\n');
        }
        self.text(Self::LEFT, Self::BOTTOM + 16.0, 10, "middle", &format_tick(x_min));
        self.text(Self::RIGHT, Self::BOTTOM + 16.0, 10, "middle", &format_tick(x_max));
        Ok(())
    }

    fn pie(&mut self, slices: &[(String, f64)]) -> Result<()> {
        let total: f64 = slices.iter().map(|s| s.1).sum();
        if total <= 0.0 {
            return Err(graph_error("nothing to plot"));
        }
        let (cx, cy, r) = (WIDTH / 2.0, HEIGHT / 2.0 + 16.0, 160.0);
        if let [(label, _)] = slices {
            self.out.push_str(&format!(
                r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{}"/>"#,
                PALETTE[0]
            ));
            self.out.push('\n');
            self.text(cx, cy, 12, "middle", &format!("{label} (100.0%)"));
            return Ok(());
        }

        // angles start at twelve o'clock and run clockwise
        let point = |angle: f64, radius: f64| {
            (
                cx + radius * angle.sin(),
                cy - radius * angle.cos(),
            )
        };
        let mut start = 0.0;
        for (i, (label, value)) in slices.iter().enumerate() {
            let sweep = value / total * std::f64::consts::TAU;
            let (x0, y0) = point(start, r);
            let (x1, y1) = point(start + sweep, r);
            let large_arc = u8::from(sweep > std::f64::consts::PI);
            self.out.push_str(&format!(
                r#"<path d="M {cx} {cy} L {x0:.1} {y0:.1} A {r} {r} 0 {large_arc} 1 {x1:.1} {y1:.1} Z" fill="{}" stroke="{BACKGROUND}"/>"#,
                PALETTE.get(i % PALETTE.len()).copied().unwrap_or(PRIMARY)
            ));
            self.out.push('\n');
            let (lx, ly) = point(start + sweep / 2.0, r * 1.18);
            self.text(lx, ly, 11, "middle", &format!("{label} ({:.1}%)", value / total * 100.0));
            start += sweep;
        }
        Ok(())
    }

    fn axis_labels(&mut self, x: &str, y: Option<&str>) {
        self.text(
            (Self::LEFT + Self::RIGHT) / 2.0,
            HEIGHT - 12.0,
            11,
            "middle",
            x,
        );
        if let Some(y) = y {
            let (lx, ly) = (16.0, (Self::TOP + Self::BOTTOM) / 2.0);
            self.out.push_str(&format!(
                r#"<text x="{lx}" y="{ly}" font-size="11" text-anchor="middle" fill="{AXIS_TEXT}" transform="rotate(-90 {lx} {ly})">{}</text>"#,
                escape(y)
            ));
            self.out.push('\n');
        }
    }

    fn finish(mut self) -> String {
        self.out.push_str("</svg>\n");
        self.out
    }
}

fn format_tick(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
