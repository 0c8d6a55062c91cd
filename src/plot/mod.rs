//! Interactive plot engine.
//!
//! A [`PlotView`] owns the series of one chart window together with the
//! data-space bounding box (union of all series extents, only ever widened),
//! the independently adjustable view-space box driven by pan/zoom, and a
//! cached raster re-rendered only when the dirty flag is set. All drawing
//! goes through the [`renderer::Renderer`] capability.

pub mod renderer;

use crate::series::{Color, Series, SeriesKind};
use renderer::{BitmapRenderer, Renderer, TextAlign};

/// Pixel size of the scatter de-duplication bins.
const SCATTER_BIN_PX: f32 = 6.0;
/// Target pixel spacing between x/y gridlines.
const GRID_TARGET_X_PX: f64 = 80.0;
const GRID_TARGET_Y_PX: f64 = 50.0;
/// Wheel zoom factors and the zoom-out clamp relative to the data extent.
pub const ZOOM_IN: f64 = 0.8;
pub const ZOOM_OUT: f64 = 1.25;
const MAX_VIEW_RATIO: f64 = 1.1;

const MARGIN_LEFT: f32 = 60.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_TOP: f32 = 10.0;
const MARGIN_BOTTOM: f32 = 40.0;

const GRID_MAJOR: Color = Color::rgb(208, 208, 208);
const GRID_MINOR: Color = Color::rgb(234, 234, 234);
const BORDER: Color = Color::rgb(204, 204, 204);

/// A rendered frame keyed to the window size it was produced for.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Bounds {
    fn empty() -> Self {
        Self { min_x: f64::MAX, max_x: f64::MIN, min_y: f64::MAX, max_y: f64::MIN }
    }

    fn widen(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }
}

/// Snap floating-point noise from repeated division to exact zero.
fn remove_noise(x: f64) -> f64 {
    if x.abs() < 1e-14 {
        0.0
    } else {
        x
    }
}

/// Choose a "nice" gridline interval for an axis range.
///
/// Log10-based 1-2-5-10 ladder: start at the decade of the range and divide
/// by 2 or 2.5 until the implied line count first exceeds the target, then
/// keep the previous step.
pub fn nice_interval(min: f64, max: f64, available_px: f64, target_spacing_px: f64) -> f64 {
    let range = (max - min).abs();
    if range <= 0.0 {
        return 1.0;
    }
    let target_count = (available_px / target_spacing_px).max(2.0);

    let mut interval = 10f64.powf(range.log10().floor());
    let mut candidate = interval;
    loop {
        let mantissa = candidate / 10f64.powf(candidate.log10().floor());
        candidate /= if (mantissa - 5.0).abs() < 0.1 { 2.5 } else { 2.0 };
        candidate = remove_noise(candidate);
        if range / interval >= target_count * 0.5 && range / candidate > target_count {
            break;
        }
        if candidate == 0.0 {
            break;
        }
        interval = candidate;
    }
    interval
}

/// Decimation stride for line-like series: points per pixel at the full data
/// extent, scaled by the visible fraction, floored, at least 1.
fn line_stride(count: usize, plot_w: f64, view_range_x: f64, data_range_x: f64) -> usize {
    if plot_w <= 0.0 || data_range_x <= 0.0 {
        return 1;
    }
    let points_per_pixel = count as f64 / plot_w;
    let view_ratio = view_range_x / data_range_x;
    ((points_per_pixel * view_ratio) as usize).max(1)
}

/// Roughly `%.2g`: two significant digits, no trailing zeros.
fn format_label(v: f64) -> String {
    if v == 0.0 {
        return "0".to_owned();
    }
    let exp = v.abs().log10().floor() as i32;
    if !(-4..4).contains(&exp) {
        return format!("{v:.1e}");
    }
    let decimals = (1 - exp).max(0) as usize;
    let s = format!("{v:.decimals$}");
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() { "0".to_owned() } else { trimmed.to_owned() }
}

/// Per-chart state: series, bounds, viewport and the cached raster.
pub struct PlotView {
    title: String,
    series: Vec<Series>,
    data: Bounds,
    view: Bounds,
    dirty: bool,
    cache: Option<Frame>,
    /// Plot-area pixel size from the last render, used to scale pan deltas.
    plot_px: (f32, f32),
}

impl PlotView {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            series: Vec::new(),
            data: Bounds::empty(),
            view: Bounds { min_x: 0.0, max_x: 1.0, min_y: 0.0, max_y: 1.0 },
            dirty: true,
            cache: None,
            plot_px: (1.0, 1.0),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn series(&self) -> &[Series] {
        &self.series
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn view_x_range(&self) -> (f64, f64) {
        (self.view.min_x, self.view.max_x)
    }

    /// Take ownership of a series, widening the data bounds and resetting the
    /// view to the full x extent with a 5% padded y extent.
    pub fn add_series(&mut self, series: Series) {
        if series.is_empty() {
            return;
        }
        for (&x, &y) in series.x.iter().zip(&series.y) {
            self.data.widen(x, y);
        }
        self.series.push(series);

        self.view.min_x = self.data.min_x;
        self.view.max_x = self.data.max_x;
        let mut h = self.data.max_y - self.data.min_y;
        if h == 0.0 {
            h = 1.0;
        }
        self.view.min_y = self.data.min_y - h * 0.05;
        self.view.max_y = self.data.max_y + h * 0.05;
        self.dirty = true;
    }

    /// Translate the view by a mouse drag delta in pixels.
    pub fn pan(&mut self, drag_dx: f32, drag_dy: f32) {
        let rx = self.view.max_x - self.view.min_x;
        let ry = self.view.max_y - self.view.min_y;
        let (pw, ph) = self.plot_px;
        let shift_x = -drag_dx as f64 * rx / pw.max(1.0) as f64;
        let shift_y = drag_dy as f64 * ry / ph.max(1.0) as f64;
        self.view.min_x += shift_x;
        self.view.max_x += shift_x;
        self.view.min_y += shift_y;
        self.view.max_y += shift_y;
        self.dirty = true;
    }

    /// Scale the view's x-range around its center, clamped so it never
    /// exceeds 110% of the full data x-range.
    pub fn zoom(&mut self, factor: f64) {
        let range = self.view.max_x - self.view.min_x;
        let mut new_range = range * factor;
        let data_range = self.data.max_x - self.data.min_x;
        if data_range > 0.0 && new_range > data_range * MAX_VIEW_RATIO {
            new_range = data_range * MAX_VIEW_RATIO;
        }
        let center = (self.view.min_x + self.view.max_x) / 2.0;
        self.view.min_x = center - new_range / 2.0;
        self.view.max_x = center + new_range / 2.0;
        self.dirty = true;
    }

    /// Replace the x view range exactly; rejected unless `end > start`.
    pub fn set_range(&mut self, start: f64, end: f64) -> bool {
        if end > start {
            self.view.min_x = start;
            self.view.max_x = end;
            self.dirty = true;
            true
        } else {
            false
        }
    }

    pub fn set_series_color(&mut self, index: usize, color: Color) {
        if let Some(s) = self.series.get_mut(index) {
            s.color = color;
            self.dirty = true;
        }
    }

    /// Return the cached frame for a `w` x `h` window, re-rendering the full
    /// scene only when the view/series/size changed since the last paint.
    pub fn paint(&mut self, w: u32, h: u32) -> &Frame {
        let stale = self.dirty
            || self.cache.as_ref().map_or(true, |f| f.width != w || f.height != h);
        if stale {
            let mut r = BitmapRenderer::new(w, h);
            self.render(&mut r);
            self.cache = Some(Frame { width: w, height: h, rgb: r.into_rgb() });
            self.dirty = false;
        }
        self.cache.as_ref().expect("frame cache was just populated")
    }

    /// Render the full scene (border, gridlines, labels, series) through a
    /// renderer.
    pub fn render(&mut self, r: &mut dyn Renderer) {
        let (w, h) = r.size();
        let plot_x = MARGIN_LEFT;
        let plot_y = MARGIN_TOP;
        let plot_w = (w as f32 - MARGIN_LEFT - MARGIN_RIGHT).max(10.0);
        let plot_h = (h as f32 - MARGIN_TOP - MARGIN_BOTTOM).max(10.0);
        self.plot_px = (plot_w, plot_h);

        r.clear(Color::WHITE);
        r.fill_rect(plot_x, plot_y, plot_w, plot_h, Color::WHITE);
        r.draw_rect(plot_x, plot_y, plot_w, plot_h, BORDER, 1.0);

        let view_rx = self.view.max_x - self.view.min_x;
        let view_ry = self.view.max_y - self.view.min_y;
        if view_rx <= 0.0 || view_ry <= 0.0 {
            return;
        }
        let scale_x = plot_w as f64 / view_rx;
        let scale_y = plot_h as f64 / view_ry;
        let offset_x = plot_x as f64 - self.view.min_x * scale_x;
        let offset_y = (plot_y + plot_h) as f64 + self.view.min_y * scale_y;

        let to_px = |x: f64, y: f64| -> (f32, f32) {
            ((x * scale_x + offset_x) as f32, (offset_y - y * scale_y) as f32)
        };

        self.draw_grid(r, plot_x, plot_y, plot_w, plot_h, scale_x, scale_y, offset_x, offset_y);

        r.set_clip(plot_x, plot_y, plot_w, plot_h);
        let data_rx = self.data.max_x - self.data.min_x;
        for s in &self.series {
            match s.kind {
                SeriesKind::Scatter => {
                    draw_scatter_binned(r, s, plot_x, plot_y, plot_w, plot_h, &to_px, &self.view)
                }
                SeriesKind::Line | SeriesKind::Smoothed | SeriesKind::Stem => {
                    let stride = line_stride(s.len(), plot_w as f64, view_rx, data_rx);
                    let mut pts = Vec::with_capacity(s.len() / stride + 1);
                    for i in (0..s.len()).step_by(stride) {
                        let x = s.x[i];
                        if x < self.view.min_x - view_rx {
                            continue;
                        }
                        if x > self.view.max_x + view_rx {
                            break;
                        }
                        pts.push(to_px(x, s.y[i]));
                    }
                    match s.kind {
                        SeriesKind::Smoothed => r.draw_curve(&pts, s.color, s.thickness),
                        SeriesKind::Stem => {
                            let baseline = to_px(self.view.min_x, 0.0).1;
                            for &(px, py) in &pts {
                                r.draw_line((px, baseline), (px, py), s.color, s.thickness);
                            }
                        }
                        _ => r.draw_polyline(&pts, s.color, s.thickness),
                    }
                }
            }
        }
        r.reset_clip();
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_grid(
        &self,
        r: &mut dyn Renderer,
        plot_x: f32,
        plot_y: f32,
        plot_w: f32,
        plot_h: f32,
        scale_x: f64,
        scale_y: f64,
        offset_x: f64,
        offset_y: f64,
    ) {
        let x_int = nice_interval(self.view.min_x, self.view.max_x, plot_w as f64, GRID_TARGET_X_PX);
        let y_int = nice_interval(self.view.min_y, self.view.max_y, plot_h as f64, GRID_TARGET_Y_PX);
        let x_sub = x_int / 5.0;
        let y_sub = y_int / 5.0;

        let mut v = (self.view.min_x / x_sub).floor() * x_sub;
        while v <= self.view.max_x {
            if v >= self.view.min_x {
                let px = (v * scale_x + offset_x) as f32;
                let is_major = (v - (v / x_int).round() * x_int).abs() < x_sub * 0.1;
                let pen = if is_major { GRID_MAJOR } else { GRID_MINOR };
                r.draw_line((px, plot_y), (px, plot_y + plot_h), pen, 1.0);
                if is_major {
                    let label = format_label(remove_noise(v));
                    r.draw_text(&label, (px, plot_y + plot_h + 5.0), 12.0, Color::BLACK, TextAlign::Center);
                }
            }
            v += x_sub;
        }

        let mut v = (self.view.min_y / y_sub).floor() * y_sub;
        while v <= self.view.max_y {
            if v >= self.view.min_y {
                let py = (offset_y - v * scale_y) as f32;
                let is_major = (v - (v / y_int).round() * y_int).abs() < y_sub * 0.1;
                let pen = if is_major { GRID_MAJOR } else { GRID_MINOR };
                r.draw_line((plot_x, py), (plot_x + plot_w, py), pen, 1.0);
                if is_major {
                    let label = format_label(remove_noise(v));
                    r.draw_text(&label, (plot_x - 8.0, py - 7.0), 12.0, Color::BLACK, TextAlign::Right);
                }
            }
            v += y_sub;
        }
    }
}

/// Scatter drawing with spatial binning: at most one marker per fixed-size
/// pixel bin per frame, bounding draw-call count independent of density.
fn draw_scatter_binned(
    r: &mut dyn Renderer,
    s: &Series,
    plot_x: f32,
    plot_y: f32,
    plot_w: f32,
    plot_h: f32,
    to_px: &dyn Fn(f64, f64) -> (f32, f32),
    view: &Bounds,
) {
    let mx = (plot_w / SCATTER_BIN_PX) as usize + 1;
    let my = (plot_h / SCATTER_BIN_PX) as usize + 1;
    let mut bins = vec![false; mx * my];
    let radius = s.thickness * 1.5;

    for (&x, &y) in s.x.iter().zip(&s.y) {
        if x < view.min_x || x > view.max_x {
            continue;
        }
        let (px, py) = to_px(x, y);
        if py < plot_y || py > plot_y + plot_h {
            continue;
        }
        let bx = ((px - plot_x) / SCATTER_BIN_PX) as usize;
        let by = ((py - plot_y) / SCATTER_BIN_PX) as usize;
        if bx < mx && by < my && !bins[by * mx + bx] {
            bins[by * mx + bx] = true;
            r.fill_ellipse((px, py), radius, s.color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Renderer that records primitive counts instead of rasterizing.
    #[derive(Default)]
    struct RecordingRenderer {
        size: (u32, u32),
        ellipses: usize,
        lines: usize,
        polylines: usize,
        fill_rects: Vec<(f32, f32, f32, f32)>,
        texts: Vec<String>,
    }

    impl RecordingRenderer {
        fn new(w: u32, h: u32) -> Self {
            Self { size: (w, h), ..Default::default() }
        }
    }

    impl Renderer for RecordingRenderer {
        fn size(&self) -> (u32, u32) {
            self.size
        }
        fn clear(&mut self, _: Color) {}
        fn draw_line(&mut self, _: (f32, f32), _: (f32, f32), _: Color, _: f32) {
            self.lines += 1;
        }
        fn draw_polyline(&mut self, _: &[(f32, f32)], _: Color, _: f32) {
            self.polylines += 1;
        }
        fn draw_curve(&mut self, _: &[(f32, f32)], _: Color, _: f32) {}
        fn fill_ellipse(&mut self, _: (f32, f32), _: f32, _: Color) {
            self.ellipses += 1;
        }
        fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, _: Color) {
            self.fill_rects.push((x, y, w, h));
        }
        fn draw_rect(&mut self, _: f32, _: f32, _: f32, _: f32, _: Color, _: f32) {}
        fn draw_text(&mut self, t: &str, _: (f32, f32), _: f32, _: Color, _: TextAlign) {
            self.texts.push(t.to_owned());
        }
        fn set_clip(&mut self, _: f32, _: f32, _: f32, _: f32) {}
        fn reset_clip(&mut self) {}
    }

    fn scatter(xs: Vec<f64>, ys: Vec<f64>) -> Series {
        Series::new("s", SeriesKind::Scatter, xs, ys, Color::BLUE, 1.5)
    }

    #[test]
    fn nice_interval_is_scale_invariant() {
        for range in [7.3, 123.0, 0.042] {
            let a = nice_interval(0.0, range, 800.0, 80.0);
            let b = nice_interval(0.0, range * 10.0, 800.0, 80.0);
            assert!((b / a - 10.0).abs() < 1e-9, "range {range}: {a} vs {b}");
        }
    }

    #[test]
    fn nice_interval_degenerate_range() {
        assert_eq!(nice_interval(5.0, 5.0, 800.0, 80.0), 1.0);
    }

    #[test]
    fn stride_scales_with_view_fraction() {
        // 10k points over 1000 px fully zoomed out: stride 10.
        assert_eq!(line_stride(10_000, 1000.0, 100.0, 100.0), 10);
        // Zoomed to a tenth of the data: stride 1.
        assert_eq!(line_stride(10_000, 1000.0, 10.0, 100.0), 1);
        assert_eq!(line_stride(5, 1000.0, 100.0, 100.0), 1);
    }

    #[test]
    fn binning_draws_at_most_one_point_per_bin() {
        let mut view = PlotView::new("bins");
        // 500 samples all mapping into the same spot, plus one far away.
        let mut xs: Vec<f64> = vec![0.5; 500];
        let mut ys: Vec<f64> = vec![0.5; 500];
        xs.push(100.0);
        ys.push(80.0);
        view.add_series(scatter(xs, ys));

        let mut r = RecordingRenderer::new(640, 480);
        view.render(&mut r);
        assert_eq!(r.ellipses, 2);
    }

    #[test]
    fn data_bounds_widen_monotonically() {
        let mut view = PlotView::new("b");
        view.add_series(scatter(vec![0.0, 10.0], vec![0.0, 1.0]));
        view.add_series(scatter(vec![5.0, 6.0], vec![0.2, 0.4]));
        assert_eq!(view.view_x_range(), (0.0, 10.0));
        view.add_series(scatter(vec![-5.0, 20.0], vec![0.0, 2.0]));
        assert_eq!(view.view_x_range(), (-5.0, 20.0));
    }

    #[test]
    fn zoom_clamps_to_110_percent_of_data() {
        let mut view = PlotView::new("z");
        view.add_series(scatter(vec![0.0, 100.0], vec![0.0, 1.0]));
        for _ in 0..10 {
            view.zoom(ZOOM_OUT);
        }
        let (lo, hi) = view.view_x_range();
        assert!((hi - lo - 110.0).abs() < 1e-9);

        view.zoom(ZOOM_IN);
        let (lo, hi) = view.view_x_range();
        assert!((hi - lo - 88.0).abs() < 1e-9);
    }

    #[test]
    fn set_range_requires_end_after_start() {
        let mut view = PlotView::new("r");
        view.add_series(scatter(vec![0.0, 10.0], vec![0.0, 1.0]));
        assert!(!view.set_range(5.0, 5.0));
        assert!(!view.set_range(8.0, 2.0));
        assert!(view.set_range(2.0, 8.0));
        assert_eq!(view.view_x_range(), (2.0, 8.0));
    }

    #[test]
    fn pan_translates_by_view_per_pixel() {
        let mut view = PlotView::new("p");
        view.add_series(scatter(vec![0.0, 100.0], vec![0.0, 1.0]));
        // Establish the plot-area size.
        let mut r = RecordingRenderer::new(680, 530);
        view.render(&mut r);
        // plot width = 680 - 80 = 600 px over 100 units; dragging 60 px left
        // moves the view +10 units.
        view.pan(-60.0, 0.0);
        let (lo, hi) = view.view_x_range();
        assert!((lo - 10.0).abs() < 1e-6);
        assert!((hi - 110.0).abs() < 1e-6);
    }

    #[test]
    fn paint_caches_until_dirty() {
        let mut view = PlotView::new("c");
        view.add_series(scatter(vec![0.0, 1.0], vec![0.0, 1.0]));

        assert!(view.is_dirty());
        let first = view.paint(200, 100).rgb.clone();
        assert!(!view.is_dirty());
        // Unchanged state: same cached buffer.
        let second = view.paint(200, 100).rgb.clone();
        assert_eq!(first, second);

        view.zoom(ZOOM_IN);
        assert!(view.is_dirty());
        view.paint(200, 100);
        assert!(!view.is_dirty());

        // Size change invalidates even without a view change.
        let resized = view.paint(300, 100);
        assert_eq!(resized.width, 300);
    }

    #[test]
    fn render_fills_plot_area_background() {
        let mut view = PlotView::new("bg");
        view.add_series(scatter(vec![0.0, 10.0], vec![0.0, 1.0]));
        let mut r = RecordingRenderer::new(640, 480);
        view.render(&mut r);
        // One background fill sized to the plot area inside the margins.
        assert_eq!(r.fill_rects, vec![(60.0, 10.0, 640.0 - 80.0, 480.0 - 50.0)]);
    }

    #[test]
    fn labels_only_on_major_gridlines() {
        let mut view = PlotView::new("g");
        view.add_series(scatter(vec![0.0, 100.0], vec![0.0, 10.0]));
        let mut r = RecordingRenderer::new(800, 600);
        view.render(&mut r);
        // More gridline segments than labels: minors are unlabeled.
        assert!(r.lines > r.texts.len());
        assert!(!r.texts.is_empty());
    }

    #[test]
    fn label_formatting() {
        assert_eq!(format_label(0.0), "0");
        assert_eq!(format_label(0.5), "0.5");
        assert_eq!(format_label(150.0), "150");
        assert_eq!(format_label(2.5), "2.5");
        assert_eq!(format_label(-40.0), "-40");
    }
}
