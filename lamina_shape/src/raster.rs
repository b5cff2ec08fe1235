// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Antialiased scanline rasterization of compiled shapes.

use smallvec::SmallVec;

use crate::compile::{scale_factor, CompiledShape, Part, Source};
use crate::desc::{StrokeDesc, StrokePosition, StrokeStyle};
use crate::kurbo::{self, Affine, BezPath, PathEl, Point, Stroke, StrokeOpts};
use crate::metrics::RenderMetrics;
use crate::peniko::Fill;
use crate::RasterError;

/// Pixel layout of a raster destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// One byte of coverage per pixel.
    Alpha8,
    /// Four bytes per pixel, red first.
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Alpha8 => 1,
            Self::Rgba8 => 4,
        }
    }
}

/// A caller-owned CPU pixel buffer to rasterize into.
#[derive(Debug)]
pub struct RasterTarget<'a> {
    pub pixels: &'a mut [u8],
    pub width: u32,
    pub height: u32,
    /// Distance between the starts of two rows, in bytes.
    pub stride: usize,
    pub format: PixelFormat,
}

impl<'a> RasterTarget<'a> {
    /// A tightly packed single-channel target.
    pub fn alpha(pixels: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            pixels,
            width,
            height,
            stride: width as usize,
            format: PixelFormat::Alpha8,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RasterizerOptions {
    /// Sample rows per pixel row. Horizontal coverage is always exact.
    pub subsamples: u32,
    /// Flattening tolerance in device pixels.
    pub tolerance: f64,
}

impl Default for RasterizerOptions {
    fn default() -> Self {
        Self {
            subsamples: 16,
            tolerance: 0.25,
        }
    }
}

/// A device-space line segment, stored top to bottom.
#[derive(Clone, Copy, Debug)]
struct Line {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    /// `+1` if the original segment pointed down, `-1` otherwise.
    dir: i32,
}

impl Line {
    fn x_at(&self, y: f64) -> f64 {
        self.x0 + (y - self.y0) * (self.x1 - self.x0) / (self.y1 - self.y0)
    }
}

/// Draws compiled shapes into coverage buffers.
///
/// Holds scratch buffers that are reused across calls.
#[derive(Debug, Default)]
pub struct Rasterizer {
    options: RasterizerOptions,
    lines: Vec<Line>,
    active: Vec<usize>,
    crossings: Vec<(f64, i32)>,
    coverage: Vec<f32>,
    runs: Vec<f32>,
}

impl Rasterizer {
    pub fn new(options: RasterizerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &RasterizerOptions {
        &self.options
    }

    /// Rasterize the body or a stroke of `shape` into `target`, replacing its content.
    ///
    /// Only tightly packed [`PixelFormat::Alpha8`] targets are supported. On error the target is
    /// left untouched.
    pub fn rasterize(
        &mut self,
        shape: &CompiledShape,
        part: impl Into<Part>,
        transform: Affine,
        target: &mut RasterTarget<'_>,
        metrics: &RenderMetrics,
    ) -> Result<(), RasterError> {
        if target.format != PixelFormat::Alpha8 {
            return Err(RasterError::UnsupportedFormat(target.format));
        }
        if target.stride != target.width as usize {
            return Err(RasterError::StrideMismatch {
                stride: target.stride,
                width: target.width,
            });
        }
        let len = target.width as usize * target.height as usize;
        if target.pixels.len() < len {
            return Err(RasterError::BufferTooSmall {
                len: target.pixels.len(),
                width: target.width,
                height: target.height,
            });
        }
        let part = part.into();
        let source = shape
            .source(part)
            .ok_or_else(|| invalid_index(part, shape))?;
        self.draw(
            source,
            transform,
            target.width,
            target.height,
            &mut target.pixels[..len],
        );
        metrics.record_rasterization();
        Ok(())
    }

    /// Rasterize into a freshly allocated tightly packed coverage buffer.
    pub fn rasterize_to_vec(
        &mut self,
        shape: &CompiledShape,
        part: impl Into<Part>,
        transform: Affine,
        width: u32,
        height: u32,
        metrics: &RenderMetrics,
    ) -> Result<Vec<u8>, RasterError> {
        let mut pixels = vec![0; width as usize * height as usize];
        self.rasterize(
            shape,
            part,
            transform,
            &mut RasterTarget::alpha(&mut pixels, width, height),
            metrics,
        )?;
        Ok(pixels)
    }

    /// Fill an arbitrary path into a tightly packed coverage buffer of `width` by `height`.
    pub fn fill_path(
        &mut self,
        path: &BezPath,
        fill_rule: Fill,
        transform: Affine,
        width: u32,
        height: u32,
        out: &mut [u8],
    ) {
        self.flatten(path, transform);
        self.sweep(fill_rule, width as usize, height as usize, out);
    }

    fn draw(&mut self, source: Source<'_>, transform: Affine, width: u32, height: u32, out: &mut [u8]) {
        match source {
            Source::Fill(outline) => {
                self.fill_path(&outline.path, outline.fill_rule, transform, width, height, out);
            }
            Source::Stroke(outline, stroke) => {
                // Stroke in path space so joins and dashes are not distorted by the transform.
                let tolerance = self.options.tolerance / scale_factor(transform).max(1.);
                let expanded = kurbo::stroke(
                    outline.path.iter(),
                    &stroke_style(stroke),
                    &StrokeOpts::default(),
                    tolerance,
                );
                self.fill_path(&expanded, Fill::NonZero, transform, width, height, out);
            }
        }
    }

    fn flatten(&mut self, path: &BezPath, transform: Affine) {
        let lines = &mut self.lines;
        lines.clear();
        let mut push = |p: Point, q: Point| {
            if p.y == q.y {
                return;
            }
            let (top, bottom, dir) = if p.y < q.y { (p, q, 1) } else { (q, p, -1) };
            lines.push(Line {
                x0: top.x,
                y0: top.y,
                x1: bottom.x,
                y1: bottom.y,
                dir,
            });
        };
        let mut start: Option<Point> = None;
        let mut last = Point::ZERO;
        let mut is_nan = false;
        kurbo::flatten(
            path.iter().map(|el| transform * el),
            self.options.tolerance,
            |el| match el {
                PathEl::MoveTo(p) => {
                    if let Some(s) = start {
                        push(last, s);
                    }
                    is_nan |= !(p.x.is_finite() && p.y.is_finite());
                    start = Some(p);
                    last = p;
                }
                PathEl::LineTo(p) => {
                    is_nan |= !(p.x.is_finite() && p.y.is_finite());
                    push(last, p);
                    last = p;
                }
                PathEl::ClosePath => {
                    if let Some(s) = start {
                        push(last, s);
                        last = s;
                    }
                }
                _ => {}
            },
        );
        if let Some(s) = start {
            push(last, s);
        }

        // A path that contains NaN is ill-defined, so ignore it.
        if is_nan {
            log::warn!("A path contains non-finite coordinates, ignoring it.");
            self.lines.clear();
        }
        self.lines.sort_by(|a, b| a.y0.total_cmp(&b.y0));
    }

    /// Scan-convert `self.lines` into `out`, replacing its content.
    fn sweep(&mut self, fill_rule: Fill, width: usize, height: usize, out: &mut [u8]) {
        let Self {
            options,
            lines,
            active,
            crossings,
            coverage,
            runs,
        } = self;
        let out = &mut out[..width * height];
        out.fill(0);
        if width == 0 || lines.is_empty() {
            return;
        }
        let samples = options.subsamples.max(1);
        let weight = 1. / samples as f32;
        coverage.resize(width, 0.);
        runs.resize(width + 1, 0.);
        active.clear();
        let mut next = 0;

        // Rows above the first line are empty.
        let first_row = (lines[0].y0.floor().max(0.) as usize).min(height);
        for (row, pixels) in out.chunks_exact_mut(width).enumerate().skip(first_row) {
            if next == lines.len() && active.is_empty() {
                break;
            }
            coverage.fill(0.);
            runs.fill(0.);
            for s in 0..samples {
                let y = row as f64 + (f64::from(s) + 0.5) / f64::from(samples);
                while next < lines.len() && lines[next].y0 <= y {
                    active.push(next);
                    next += 1;
                }
                active.retain(|&i| lines[i].y1 > y);

                crossings.clear();
                crossings.extend(
                    active
                        .iter()
                        .filter(|&&i| lines[i].y0 <= y)
                        .map(|&i| (lines[i].x_at(y), lines[i].dir)),
                );
                crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut winding = 0;
                let mut start = 0.;
                for &(x, dir) in crossings.iter() {
                    let was_inside = is_inside(fill_rule, winding);
                    winding += dir;
                    let now = is_inside(fill_rule, winding);
                    if !was_inside && now {
                        start = x;
                    } else if was_inside && !now {
                        accumulate(coverage, runs, start, x, weight);
                    }
                }
            }

            let mut run = 0.;
            for (i, px) in pixels.iter_mut().enumerate() {
                run += runs[i];
                let c = (coverage[i] + run).clamp(0., 1.);
                *px = (c * 255. + 0.5) as u8;
            }
        }
    }
}

fn is_inside(fill_rule: Fill, winding: i32) -> bool {
    match fill_rule {
        Fill::NonZero => winding != 0,
        Fill::EvenOdd => winding % 2 != 0,
    }
}

/// Add the horizontal span `xa..xb` of one sample row to the row coverage.
///
/// Partially covered pixels go to `coverage`, fully covered runs are recorded as differences in
/// `runs`.
fn accumulate(coverage: &mut [f32], runs: &mut [f32], xa: f64, xb: f64, weight: f32) {
    let width = coverage.len() as f64;
    let xa = xa.clamp(0., width);
    let xb = xb.clamp(0., width);
    if xb <= xa {
        return;
    }
    let ia = xa.floor() as usize;
    let ib = xb.floor() as usize;
    if ia == ib {
        coverage[ia] += (xb - xa) as f32 * weight;
        return;
    }
    coverage[ia] += (ia as f64 + 1. - xa) as f32 * weight;
    runs[ia + 1] += weight;
    runs[ib] -= weight;
    if ib < coverage.len() {
        coverage[ib] += (xb - ib as f64) as f32 * weight;
    }
}

/// Stroke parameters for `kurbo::stroke`.
///
/// Off-center strokes are drawn at double width; the half that falls on the wrong side of the
/// outline is removed by masking with the body.
pub fn stroke_style(stroke: &StrokeDesc) -> Stroke {
    let width = match stroke.position {
        StrokePosition::Center => stroke.thickness,
        StrokePosition::Inside | StrokePosition::Outside => 2. * stroke.thickness,
    };
    let style = Stroke::new(width)
        .with_join(stroke.join)
        .with_caps(stroke.cap)
        .with_miter_limit(stroke.miter_limit);
    let dashes: SmallVec<[f64; 4]> = match stroke.style {
        StrokeStyle::Solid => return style,
        _ if !stroke.dashing.is_empty() => stroke.dashing.clone(),
        StrokeStyle::Dashed => SmallVec::from_slice(&[4., 4.]),
        StrokeStyle::Dotted => SmallVec::from_slice(&[1., 1.]),
    };
    // A pattern without length would never advance.
    if dashes.iter().sum::<f64>() <= 0. || dashes.iter().any(|d| *d < 0.) {
        return style;
    }
    style.with_dashes(stroke.dash_offset, dashes)
}

fn invalid_index(part: Part, shape: &CompiledShape) -> RasterError {
    let index = match part {
        Part::Stroke(i) => i,
        Part::Body => 0,
    };
    RasterError::InvalidStrokeIndex {
        index,
        count: shape.stroke_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::desc::{FillDesc, PathDesc, ShapeDesc, StrokeDesc};
    use crate::kurbo::Rect;
    use crate::peniko::Color;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> CompiledShape {
        compile(&ShapeDesc::new(PathDesc::rectangle(Rect::new(x0, y0, x1, y1)))).unwrap()
    }

    fn render(shape: &CompiledShape, part: Part, w: u32, h: u32) -> Vec<u8> {
        Rasterizer::default()
            .rasterize_to_vec(shape, part, Affine::IDENTITY, w, h, &RenderMetrics::new())
            .unwrap()
    }

    #[test]
    fn pixel_aligned_rect_is_crisp() {
        let shape = square(2., 2., 6., 5.);
        let px = render(&shape, Part::Body, 8, 8);
        for y in 0..8 {
            for x in 0..8 {
                let inside = (2..6).contains(&x) && (2..5).contains(&y);
                assert_eq!(px[y * 8 + x], if inside { 255 } else { 0 }, "({x}, {y})");
            }
        }
    }

    #[test]
    fn half_pixel_edges_are_antialiased() {
        let shape = square(0.5, 0., 3.5, 4.);
        let px = render(&shape, Part::Body, 4, 4);
        assert_eq!(px[0], 128);
        assert_eq!(px[1], 255);
        assert_eq!(px[3], 128);
    }

    #[test]
    fn transform_is_applied() {
        let shape = square(0., 0., 1., 1.);
        let mut px = vec![0; 16];
        Rasterizer::default()
            .rasterize(
                &shape,
                Part::Body,
                Affine::scale(2.).then_translate((2., 2.).into()),
                &mut RasterTarget::alpha(&mut px, 4, 4),
                &RenderMetrics::new(),
            )
            .unwrap();
        assert_eq!(px[0], 0);
        assert_eq!(px[2 * 4 + 2], 255);
        assert_eq!(px[3 * 4 + 3], 255);
    }

    #[test]
    fn unsupported_targets_are_rejected_untouched() {
        let shape = square(0., 0., 4., 4.);
        let metrics = RenderMetrics::new();
        let mut r = Rasterizer::default();

        let mut rgba = vec![7; 64];
        let mut target = RasterTarget {
            pixels: &mut rgba,
            width: 4,
            height: 4,
            stride: 16,
            format: PixelFormat::Rgba8,
        };
        assert!(matches!(
            r.rasterize(&shape, Part::Body, Affine::IDENTITY, &mut target, &metrics),
            Err(RasterError::UnsupportedFormat(PixelFormat::Rgba8))
        ));
        assert!(rgba.iter().all(|&b| b == 7));

        let mut padded = vec![7; 32];
        let mut target = RasterTarget {
            pixels: &mut padded,
            width: 4,
            height: 4,
            stride: 8,
            format: PixelFormat::Alpha8,
        };
        assert!(matches!(
            r.rasterize(&shape, Part::Body, Affine::IDENTITY, &mut target, &metrics),
            Err(RasterError::StrideMismatch { stride: 8, width: 4 })
        ));
        assert!(padded.iter().all(|&b| b == 7));
        assert_eq!(metrics.rasterizations(), 0);
    }

    #[test]
    fn out_of_range_stroke_fails() {
        let shape = square(0., 0., 4., 4.);
        let mut px = vec![0; 16];
        let err = Rasterizer::default()
            .rasterize(
                &shape,
                Part::Stroke(0),
                Affine::IDENTITY,
                &mut RasterTarget::alpha(&mut px, 4, 4),
                &RenderMetrics::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RasterError::InvalidStrokeIndex { index: 0, count: 0 }
        ));
    }

    #[test]
    fn outside_stroke_uses_double_width() {
        let desc = ShapeDesc::new(PathDesc::rectangle(Rect::new(4., 4., 12., 12.))).with_stroke(
            StrokeDesc::new(2., StrokePosition::Outside, FillDesc::color(Color::BLACK)),
        );
        let shape = compile(&desc).unwrap();
        let px = render(&shape, Part::Stroke(0), 16, 16);
        // Double width straddles the outline: 2px outside and 2px inside.
        assert_eq!(px[8 * 16 + 2], 255);
        assert_eq!(px[8 * 16 + 5], 255);
        assert_eq!(px[8 * 16 + 1], 0);
        assert_eq!(px[8 * 16 + 8], 0);
    }

    #[test]
    fn dash_presets_apply_only_to_named_styles() {
        let mut stroke = StrokeDesc::new(1., StrokePosition::Center, FillDesc::color(Color::BLACK));
        assert!(stroke_style(&stroke).dash_pattern.is_empty());
        stroke.dashing = SmallVec::from_slice(&[3., 1.]);
        assert!(stroke_style(&stroke).dash_pattern.is_empty());
        stroke.style = StrokeStyle::Dotted;
        assert_eq!(stroke_style(&stroke).dash_pattern.as_slice(), &[3., 1.]);
        stroke.dashing.clear();
        assert_eq!(stroke_style(&stroke).dash_pattern.as_slice(), &[1., 1.]);
        stroke.style = StrokeStyle::Dashed;
        assert_eq!(stroke_style(&stroke).dash_pattern.as_slice(), &[4., 4.]);
        assert_eq!(stroke_style(&stroke).width, 1.);
    }

    #[test]
    fn metrics_count_rasterizations() {
        let shape = square(0., 0., 2., 2.);
        let metrics = RenderMetrics::new();
        let mut r = Rasterizer::default();
        for _ in 0..3 {
            r.rasterize_to_vec(&shape, Part::Body, Affine::IDENTITY, 2, 2, &metrics)
                .unwrap();
        }
        assert_eq!(metrics.rasterizations(), 3);
    }
}
