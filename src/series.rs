//! Series extraction: pure transforms from an [`EventLog`] to plottable
//! (x, y) sequences.
//!
//! Each time-domain metric yields a raw scatter series plus a smoothed
//! companion built by fixed-width time-bucket averaging; interval and
//! frequency metrics add a stem series. Extracted series are owned values
//! handed off to the plot engine, with no aliasing into the log.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::log::EventLog;

/// Width of the smoothing buckets, in milliseconds.
const SMOOTHING_BUCKET_MS: f64 = 8.0;
/// Intervals above this are dropped as outliers, except during warm-up.
const OUTLIER_INTERVAL_MS: f64 = 500.0;
/// Number of initial samples exempt from the outlier filter.
const WARMUP_SAMPLES: usize = 10;
/// Δt below this is degenerate for any rate computation.
const MIN_DT_MS: f64 = 1e-5;

/// RGBA draw color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const DARK_BLUE: Color = Color::rgb(0, 0, 139);
    pub const DARK_RED: Color = Color::rgb(139, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Scatter,
    Line,
    Smoothed,
    Stem,
}

/// A named, typed pair of equal-length coordinate sequences.
#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub kind: SeriesKind,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub color: Color,
    pub thickness: f32,
}

impl Series {
    pub fn new(
        name: impl Into<String>,
        kind: SeriesKind,
        x: Vec<f64>,
        y: Vec<f64>,
        color: Color,
        thickness: f32,
    ) -> Self {
        debug_assert_eq!(x.len(), y.len());
        Self { name: name.into(), kind, x, y, color, thickness }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// The metrics the operator can plot, in combo-box order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotMetric {
    IntervalVsTime,
    FrequencyVsTime,
    VelocityX,
    VelocityY,
    VelocityXy,
    CountsX,
    CountsY,
    CountsXy,
    XvsY,
}

impl PlotMetric {
    pub const ALL: [PlotMetric; 9] = [
        PlotMetric::IntervalVsTime,
        PlotMetric::FrequencyVsTime,
        PlotMetric::VelocityX,
        PlotMetric::VelocityY,
        PlotMetric::VelocityXy,
        PlotMetric::CountsX,
        PlotMetric::CountsY,
        PlotMetric::CountsXy,
        PlotMetric::XvsY,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            PlotMetric::IntervalVsTime => "Interval vs Time",
            PlotMetric::FrequencyVsTime => "Frequency vs Time",
            PlotMetric::VelocityX => "xVelocity vs Time",
            PlotMetric::VelocityY => "yVelocity vs Time",
            PlotMetric::VelocityXy => "xyVelocity vs Time",
            PlotMetric::CountsX => "xCounts vs Time",
            PlotMetric::CountsY => "yCounts vs Time",
            PlotMetric::CountsXy => "xyCounts vs Time",
            PlotMetric::XvsY => "X vs Y",
        }
    }

    fn csv_header(&self) -> &'static str {
        match self {
            PlotMetric::IntervalVsTime => "Time(ms),Interval(ms)",
            PlotMetric::FrequencyVsTime => "Time(ms),Frequency(Hz)",
            PlotMetric::VelocityX => "Time(ms),xVelocity(m/s)",
            PlotMetric::VelocityY => "Time(ms),yVelocity(m/s)",
            PlotMetric::VelocityXy => "Time(ms),xVelocity(m/s),yVelocity(m/s)",
            PlotMetric::CountsX => "Time(ms),xCount",
            PlotMetric::CountsY => "Time(ms),yCount",
            PlotMetric::CountsXy => "Time(ms),xCount,yCount",
            PlotMetric::XvsY => "xCount,yCount",
        }
    }

    fn is_dual(&self) -> bool {
        matches!(self, PlotMetric::CountsXy | PlotMetric::VelocityXy)
    }

    fn uses_stem(&self) -> bool {
        matches!(self, PlotMetric::IntervalVsTime | PlotMetric::FrequencyVsTime)
    }
}

/// Retained (timestamp, value) samples for one axis of a time-domain metric.
///
/// The first event never yields a Δt-derived sample. The interval outlier
/// filter keeps a sample iff its interval is at most 500 ms or it falls in
/// the 10-sample warm-up window at the start of the cycle.
fn metric_points(log: &EventLog, metric: PlotMetric, y_axis: bool) -> (Vec<f64>, Vec<f64>) {
    let events = log.events();
    let mut xs = Vec::with_capacity(events.len());
    let mut ys = Vec::with_capacity(events.len());
    let cpi = log.cpi;

    for (i, e) in events.iter().enumerate() {
        let t = e.time_ms;
        let dt = if i > 0 { t - events[i - 1].time_ms } else { 0.0 };
        let delta = if y_axis { e.dy as f64 } else { e.dx as f64 };

        let value = match metric {
            PlotMetric::CountsX | PlotMetric::CountsY | PlotMetric::CountsXy => Some(delta),
            PlotMetric::IntervalVsTime => {
                (i > 0 && (dt <= OUTLIER_INTERVAL_MS || i - 1 < WARMUP_SAMPLES)).then_some(dt)
            }
            PlotMetric::FrequencyVsTime => (i > 0 && dt > MIN_DT_MS).then(|| 1000.0 / dt),
            PlotMetric::VelocityX | PlotMetric::VelocityY | PlotMetric::VelocityXy => {
                (i > 0 && dt > MIN_DT_MS && cpi > 0.0).then(|| delta / dt * (25.4 / cpi))
            }
            PlotMetric::XvsY => None,
        };

        if let Some(v) = value {
            xs.push(t);
            ys.push(v);
        }
    }
    (xs, ys)
}

/// Cumulative displacement path: running sums of the raw deltas per axis.
fn cumulative_path(log: &EventLog) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::with_capacity(log.len());
    let mut ys = Vec::with_capacity(log.len());
    let (mut sum_x, mut sum_y) = (0.0, 0.0);
    for e in log.events() {
        sum_x += e.dx as f64;
        sum_y += e.dy as f64;
        xs.push(sum_x);
        ys.push(sum_y);
    }
    (xs, ys)
}

/// Fixed-width time-bucket averaging: one point per non-empty 8 ms bucket,
/// emitted at the bucket midpoint. Empty buckets are skipped, not
/// interpolated.
pub fn smooth(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut out_x = Vec::new();
    let mut out_y = Vec::new();
    let Some(&max_x) = x.last() else {
        return (out_x, out_y);
    };

    let mut src = 0;
    let mut boundary = SMOOTHING_BUCKET_MS;
    while boundary <= max_x + SMOOTHING_BUCKET_MS && src < x.len() {
        if x[src] > boundary {
            boundary += SMOOTHING_BUCKET_MS;
            continue;
        }
        let mut sum = 0.0;
        let mut n = 0usize;
        while src < x.len() && x[src] <= boundary {
            sum += y[src];
            n += 1;
            src += 1;
        }
        if n > 0 {
            out_x.push(boundary - SMOOTHING_BUCKET_MS * 0.5);
            out_y.push(sum / n as f64);
        }
        boundary += SMOOTHING_BUCKET_MS;
    }
    (out_x, out_y)
}

fn push_axis_series(out: &mut Vec<Series>, metric: PlotMetric, log: &EventLog, y_axis: bool) {
    let axis = if y_axis { "y" } else { "x" };
    let (scatter_color, smooth_color) =
        if y_axis { (Color::RED, Color::DARK_RED) } else { (Color::BLUE, Color::DARK_BLUE) };

    let (xs, ys) = metric_points(log, metric, y_axis);
    if xs.is_empty() {
        return;
    }

    let (sx, sy) = smooth(&xs, &ys);
    if metric.uses_stem() {
        out.push(Series::new(
            format!("{axis} stems"),
            SeriesKind::Stem,
            xs.clone(),
            ys.clone(),
            scatter_color,
            1.0,
        ));
    }
    out.push(Series::new(
        format!("{axis} samples"),
        SeriesKind::Scatter,
        xs,
        ys,
        scatter_color,
        1.5,
    ));
    if !sx.is_empty() {
        out.push(Series::new(
            format!("{axis} smoothed"),
            SeriesKind::Smoothed,
            sx,
            sy,
            smooth_color,
            2.0,
        ));
    }
}

/// Extract the drawable series for `metric` from a log snapshot.
///
/// Returns an empty vector when the log holds fewer than 2 events or no
/// sample survives filtering.
pub fn extract_series(log: &EventLog, metric: PlotMetric) -> Vec<Series> {
    let mut out = Vec::new();
    if log.len() < 2 {
        return out;
    }

    if metric == PlotMetric::XvsY {
        let (xs, ys) = cumulative_path(log);
        out.push(Series::new("path", SeriesKind::Line, xs.clone(), ys.clone(), Color::DARK_BLUE, 1.0));
        out.push(Series::new("points", SeriesKind::Scatter, xs, ys, Color::BLUE, 1.5));
        return out;
    }

    push_axis_series(&mut out, metric, log, false);
    if metric.is_dual() {
        push_axis_series(&mut out, metric, log, true);
    }
    out
}

/// Export the retained samples of `metric` as CSV.
pub fn export_csv(log: &EventLog, metric: PlotMetric, path: &Path) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "{}", metric.csv_header())?;

    match metric {
        PlotMetric::XvsY => {
            let (xs, ys) = cumulative_path(log);
            for (x, y) in xs.iter().zip(&ys) {
                writeln!(w, "{x:.2},{y:.2}")?;
            }
        }
        m if m.is_dual() => {
            // Both axes share the retention predicate, so the rows align.
            let (ts, xv) = metric_points(log, m, false);
            let (_, yv) = metric_points(log, m, true);
            for ((t, x), y) in ts.iter().zip(&xv).zip(&yv) {
                writeln!(w, "{t:.6},{x:.6},{y:.6}")?;
            }
        }
        m => {
            let y_axis = matches!(m, PlotMetric::CountsY | PlotMetric::VelocityY);
            let (ts, vs) = metric_points(log, m, y_axis);
            for (t, v) in ts.iter().zip(&vs) {
                writeln!(w, "{t:.6},{v:.6}")?;
            }
        }
    }
    w.flush()?;
    tracing::info!(path = %path.display(), metric = metric.title(), "series exported");
    Ok(())
}
