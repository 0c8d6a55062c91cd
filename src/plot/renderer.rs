//! The 2D drawing capability the plot engine renders through.
//!
//! The engine only ever talks to the [`Renderer`] trait; [`BitmapRenderer`]
//! is the concrete implementation, rasterizing into an owned RGB buffer via
//! `plotters-bitmap`. Clipping is done in software here because the backend
//! has no clip-region primitive.

use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{IntoFont, RGBAColor, ShapeStyle};
use plotters_bitmap::BitMapBackend;
use plotters::prelude::DrawingBackend;

use crate::series::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// Drawing operations the plot engine needs from a backend.
pub trait Renderer {
    fn size(&self) -> (u32, u32);
    fn clear(&mut self, color: Color);
    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, width: f32);
    fn draw_polyline(&mut self, points: &[(f32, f32)], color: Color, width: f32);
    /// Smoothed curve through the points.
    fn draw_curve(&mut self, points: &[(f32, f32)], color: Color, width: f32);
    fn fill_ellipse(&mut self, center: (f32, f32), radius: f32, color: Color);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color);
    fn draw_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color, width: f32);
    fn draw_text(&mut self, text: &str, pos: (f32, f32), size: f32, color: Color, align: TextAlign);
    /// Restrict subsequent series drawing to a rectangle.
    fn set_clip(&mut self, x: f32, y: f32, w: f32, h: f32);
    fn reset_clip(&mut self);
}

/// Renderer rasterizing into an owned width*height*3 RGB buffer.
pub struct BitmapRenderer {
    width: u32,
    height: u32,
    buf: Vec<u8>,
    clip: Option<(f32, f32, f32, f32)>,
}

impl BitmapRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self { width, height, buf: vec![255; (width * height * 3) as usize], clip: None }
    }

    /// The rendered RGB pixel data.
    pub fn into_rgb(self) -> Vec<u8> {
        self.buf
    }

    fn backend(&mut self) -> BitMapBackend<'_> {
        BitMapBackend::with_buffer(&mut self.buf, (self.width, self.height))
    }

    /// Liang-Barsky segment clip against the active clip rectangle.
    fn clip_segment(&self, from: (f32, f32), to: (f32, f32)) -> Option<((f32, f32), (f32, f32))> {
        let Some((cx, cy, cw, ch)) = self.clip else {
            return Some((from, to));
        };
        let (x0, y0) = from;
        let (x1, y1) = to;
        let (dx, dy) = (x1 - x0, y1 - y0);
        let mut t0 = 0.0f32;
        let mut t1 = 1.0f32;

        let checks = [
            (-dx, x0 - cx),
            (dx, cx + cw - x0),
            (-dy, y0 - cy),
            (dy, cy + ch - y0),
        ];
        for (p, q) in checks {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
            } else {
                let r = q / p;
                if p < 0.0 {
                    if r > t1 {
                        return None;
                    }
                    if r > t0 {
                        t0 = r;
                    }
                } else {
                    if r < t0 {
                        return None;
                    }
                    if r < t1 {
                        t1 = r;
                    }
                }
            }
        }
        Some(((x0 + t0 * dx, y0 + t0 * dy), (x0 + t1 * dx, y0 + t1 * dy)))
    }

    fn inside_clip(&self, center: (f32, f32), margin: f32) -> bool {
        match self.clip {
            None => true,
            Some((cx, cy, cw, ch)) => {
                center.0 >= cx - margin
                    && center.0 <= cx + cw + margin
                    && center.1 >= cy - margin
                    && center.1 <= cy + ch + margin
            }
        }
    }
}

fn shape_style(color: Color, width: f32, filled: bool) -> ShapeStyle {
    ShapeStyle {
        color: RGBAColor(color.r, color.g, color.b, color.a as f64 / 255.0),
        filled,
        stroke_width: width.round().max(1.0) as u32,
    }
}

fn coord(p: (f32, f32)) -> (i32, i32) {
    (p.0.round() as i32, p.1.round() as i32)
}

/// Sample a Catmull-Rom spline through the control points.
fn catmull_rom(points: &[(f32, f32)], samples_per_segment: usize) -> Vec<(f32, f32)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut out = Vec::with_capacity(points.len() * samples_per_segment);
    let n = points.len();
    for i in 0..n - 1 {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(n - 1)];
        for s in 0..samples_per_segment {
            let t = s as f32 / samples_per_segment as f32;
            let t2 = t * t;
            let t3 = t2 * t;
            let x = 0.5
                * ((2.0 * p1.0)
                    + (-p0.0 + p2.0) * t
                    + (2.0 * p0.0 - 5.0 * p1.0 + 4.0 * p2.0 - p3.0) * t2
                    + (-p0.0 + 3.0 * p1.0 - 3.0 * p2.0 + p3.0) * t3);
            let y = 0.5
                * ((2.0 * p1.1)
                    + (-p0.1 + p2.1) * t
                    + (2.0 * p0.1 - 5.0 * p1.1 + 4.0 * p2.1 - p3.1) * t2
                    + (-p0.1 + 3.0 * p1.1 - 3.0 * p2.1 + p3.1) * t3);
            out.push((x, y));
        }
    }
    out.push(points[n - 1]);
    out
}

impl Renderer for BitmapRenderer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Color) {
        for px in self.buf.chunks_exact_mut(3) {
            px[0] = color.r;
            px[1] = color.g;
            px[2] = color.b;
        }
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
        let Some((a, b)) = self.clip_segment(from, to) else { return };
        let style = shape_style(color, width, false);
        let mut backend = self.backend();
        let _ = backend.draw_line(coord(a), coord(b), &style);
    }

    fn draw_polyline(&mut self, points: &[(f32, f32)], color: Color, width: f32) {
        for w in points.windows(2) {
            self.draw_line(w[0], w[1], color, width);
        }
    }

    fn draw_curve(&mut self, points: &[(f32, f32)], color: Color, width: f32) {
        let sampled = catmull_rom(points, 8);
        self.draw_polyline(&sampled, color, width);
    }

    fn fill_ellipse(&mut self, center: (f32, f32), radius: f32, color: Color) {
        if !self.inside_clip(center, radius) {
            return;
        }
        let style = shape_style(color, 1.0, true);
        let r = radius.round().max(1.0) as u32;
        let mut backend = self.backend();
        let _ = backend.draw_circle(coord(center), r, &style, true);
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        let style = shape_style(color, 1.0, true);
        let mut backend = self.backend();
        let _ = backend.draw_rect(coord((x, y)), coord((x + w, y + h)), &style, true);
    }

    fn draw_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color, width: f32) {
        let style = shape_style(color, width, false);
        let mut backend = self.backend();
        let _ = backend.draw_rect(coord((x, y)), coord((x + w, y + h)), &style, false);
    }

    fn draw_text(&mut self, text: &str, pos: (f32, f32), size: f32, color: Color, align: TextAlign) {
        let h_pos = match align {
            TextAlign::Left => HPos::Left,
            TextAlign::Center => HPos::Center,
            TextAlign::Right => HPos::Right,
        };
        let style = (plotters::style::FontFamily::SansSerif, size)
            .into_font()
            .color(&RGBAColor(color.r, color.g, color.b, color.a as f64 / 255.0))
            .pos(Pos::new(h_pos, VPos::Top));
        let mut backend = self.backend();
        let _ = backend.draw_text(text, &style, coord(pos));
    }

    fn set_clip(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.clip = Some((x, y, w, h));
    }

    fn reset_clip(&mut self) {
        self.clip = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_rejects_fully_outside_segment() {
        let mut r = BitmapRenderer::new(100, 100);
        r.set_clip(10.0, 10.0, 50.0, 50.0);
        assert!(r.clip_segment((0.0, 0.0), (5.0, 5.0)).is_none());
    }

    #[test]
    fn clip_trims_crossing_segment() {
        let mut r = BitmapRenderer::new(100, 100);
        r.set_clip(10.0, 0.0, 40.0, 100.0);
        let (a, b) = r.clip_segment((0.0, 20.0), (100.0, 20.0)).unwrap();
        assert_eq!(a.0, 10.0);
        assert_eq!(b.0, 50.0);
    }

    #[test]
    fn clip_passthrough_when_unset() {
        let r = BitmapRenderer::new(10, 10);
        let seg = r.clip_segment((-5.0, -5.0), (500.0, 500.0));
        assert_eq!(seg, Some(((-5.0, -5.0), (500.0, 500.0))));
    }

    #[test]
    fn clear_fills_buffer() {
        let mut r = BitmapRenderer::new(2, 2);
        r.clear(Color::rgb(1, 2, 3));
        let rgb = r.into_rgb();
        assert_eq!(&rgb[..3], &[1, 2, 3]);
        assert_eq!(rgb.len(), 12);
    }

    #[test]
    fn catmull_rom_keeps_endpoints() {
        let pts = [(0.0, 0.0), (10.0, 5.0), (20.0, 0.0)];
        let sampled = catmull_rom(&pts, 4);
        assert_eq!(sampled.first(), Some(&(0.0, 0.0)));
        assert_eq!(sampled.last(), Some(&(20.0, 0.0)));
        assert!(sampled.len() > pts.len());
    }

    #[test]
    fn short_curves_fall_back_to_input() {
        let pts = [(0.0, 0.0), (1.0, 1.0)];
        assert_eq!(catmull_rom(&pts, 8), pts.to_vec());
    }
}
