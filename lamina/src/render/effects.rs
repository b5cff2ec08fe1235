// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer effects.
//!
//! Shadows and glows are built from the alpha of their basis: grown by the choke with a
//! Euclidean distance transform, blurred with a separable Gaussian and tinted. Effect strokes
//! are bands of the same distance field. All effect parameters are in layer units and scaled to
//! device pixels by the layer's transform.

use super::paint::{draw_fill, FillFrame};
use super::Surfaces;
use crate::document::{
    Effect, EffectKind, Glow, LayerSource, Shadow, BLUR_RANGE_SIGMA_MULTIPLIER,
};
use crate::image::{PlacedImage, PremulColor};
use crate::kurbo::{Point, Vec2};
use crate::shape::compile::scale_factor;
use crate::shape::desc::{FillDesc, StrokePosition};
use crate::{Margin, PixelBounds, Result};

/// Squared distance standing in for "no feature pixel".
const FAR: f64 = 1e20;

pub(crate) fn draw_effect(
    surfaces: &Surfaces<'_>,
    source: &dyn LayerSource,
    frame: &FillFrame,
    effect: &Effect,
    basis: Option<&PlacedImage>,
) -> Result<Option<PlacedImage>> {
    let scale = scale_factor(frame.layer);
    match (&effect.kind, basis) {
        (EffectKind::Overlay(fill), _) => draw_fill(surfaces, source, fill, frame, frame.bounds),
        (_, None) => Ok(None),
        (
            EffectKind::Stroke {
                thickness,
                position,
                fill,
            },
            Some(basis),
        ) => stroke(
            surfaces,
            source,
            frame,
            basis,
            *thickness,
            *position,
            fill,
        ),
        (EffectKind::DropShadow(shadow), Some(basis)) => {
            let offset = device_offset(frame, shadow.offset);
            outer(surfaces, basis, &shadow_params(shadow, scale), offset)
        }
        (EffectKind::OuterGlow(glow), Some(basis)) => {
            outer(surfaces, basis, &glow_params(glow, scale), (0, 0))
        }
        (EffectKind::InnerShadow(shadow), Some(basis)) => {
            let offset = device_offset(frame, shadow.offset);
            inner(surfaces, basis, &shadow_params(shadow, scale), offset)
        }
        (EffectKind::InnerGlow(glow), Some(basis)) => {
            inner(surfaces, basis, &glow_params(glow, scale), (0, 0))
        }
        (EffectKind::Blur(sigma), Some(basis)) => blur(surfaces, basis, sigma * scale),
    }
}

/// Shadow or glow parameters in device pixels.
struct Spread {
    sigma: f64,
    choke: f64,
    color: PremulColor,
}

fn shadow_params(shadow: &Shadow, scale: f64) -> Spread {
    Spread {
        sigma: shadow.blur * scale,
        choke: shadow.choke * scale,
        color: PremulColor::from(shadow.color),
    }
}

fn glow_params(glow: &Glow, scale: f64) -> Spread {
    Spread {
        sigma: glow.blur * scale,
        choke: glow.choke * scale,
        color: PremulColor::from(glow.color),
    }
}

/// Whole-pixel device offset of a layer-space vector.
fn device_offset(frame: &FillFrame, offset: Vec2) -> (i32, i32) {
    let d = frame.layer * Point::new(offset.x, offset.y) - frame.layer * Point::ORIGIN;
    (d.x.round() as i32, d.y.round() as i32)
}

fn blur_radius(sigma: f64) -> f64 {
    BLUR_RANGE_SIGMA_MULTIPLIER * sigma
}

/// Whole pixels covering a device distance, saturating at `i32::MAX`.
fn padding(distance: f64) -> i32 {
    distance.ceil().max(0.) as i32
}

/// Drop shadows and outer glows: the grown, blurred basis alpha, moved by `offset`.
fn outer(
    surfaces: &Surfaces<'_>,
    basis: &PlacedImage,
    spread: &Spread,
    (dx, dy): (i32, i32),
) -> Result<Option<PlacedImage>> {
    let pad = padding(blur_radius(spread.sigma) + spread.choke).saturating_add(1);
    let region = basis.pixel_bounds().expand(pad);
    surfaces.check(region)?;
    let mut field = Field::alpha(basis, region);
    field.grow(spread.choke);
    field.blur(spread.sigma);
    let shifted = region.translate(dx, dy);
    surfaces.produce(shifted, |x, y| {
        spread
            .color
            .scale(field.get(x.saturating_sub(dx), y.saturating_sub(dy)))
    })
}

/// Inner shadows and inner glows: the grown, blurred complement of the basis alpha, moved by
/// `offset` and clipped to the basis.
fn inner(
    surfaces: &Surfaces<'_>,
    basis: &PlacedImage,
    spread: &Spread,
    (dx, dy): (i32, i32),
) -> Result<Option<PlacedImage>> {
    let reach = i32::try_from(dx.unsigned_abs().max(dy.unsigned_abs())).unwrap_or(i32::MAX);
    let pad = padding(blur_radius(spread.sigma) + spread.choke)
        .saturating_add(reach)
        .saturating_add(1);
    let bounds = basis.pixel_bounds();
    let region = bounds.expand(pad);
    surfaces.check(region)?;
    let mut field = Field::alpha(basis, region).inverted();
    field.grow(spread.choke);
    field.blur(spread.sigma);
    surfaces.produce(bounds, |x, y| {
        let coverage = basis.sample(x, y).a;
        spread
            .color
            .scale(field.get(x.saturating_sub(dx), y.saturating_sub(dy)) * coverage)
    })
}

fn blur(
    surfaces: &Surfaces<'_>,
    basis: &PlacedImage,
    sigma: f64,
) -> Result<Option<PlacedImage>> {
    let region = basis.pixel_bounds().expand(padding(blur_radius(sigma)));
    surfaces.check(region)?;
    let width = region.width() as usize;
    let height = region.height() as usize;
    let mut pixels = Vec::with_capacity(width * height);
    for y in region.y0..region.y1 {
        pixels.extend((region.x0..region.x1).map(|x| basis.sample(x, y)));
    }
    gaussian_blur(&mut pixels, width, height, sigma, PremulColor::TRANSPARENT);
    surfaces.produce(region, |x, y| {
        pixels[(y - region.y0) as usize * width + (x - region.x0) as usize]
    })
}

/// A band around the edge of the basis, painted with `fill`.
fn stroke(
    surfaces: &Surfaces<'_>,
    source: &dyn LayerSource,
    frame: &FillFrame,
    basis: &PlacedImage,
    thickness: f64,
    position: StrokePosition,
    fill: &FillDesc,
) -> Result<Option<PlacedImage>> {
    let width = thickness * scale_factor(frame.layer);
    if width <= 0. {
        return Ok(None);
    }
    let (outside, inside) = match position {
        StrokePosition::Outside => (width, 0.),
        StrokePosition::Center => (0.5 * width, 0.5 * width),
        StrokePosition::Inside => (0., width),
    };
    let region = basis.pixel_bounds().expand(padding(outside).saturating_add(1));
    surfaces.check(region)?;
    let area = frame.bounds.expand(&Margin::uniform(thickness));
    let Some(paint) = draw_fill(surfaces, source, fill, frame, area)? else {
        return Ok(None);
    };
    let field = Field::alpha(basis, region);
    let (w, h) = (region.width() as usize, region.height() as usize);
    let to_inside = distance_transform(|i| field.values[i] >= 0.5, w, h);
    let to_outside = distance_transform(|i| field.values[i] < 0.5, w, h);
    let band = |d: f32, reach: f64| (reach as f32 + 1. - d).clamp(0., 1.);
    surfaces.produce(region, |x, y| {
        let i = (y - region.y0) as usize * w + (x - region.x0) as usize;
        let a = field.values[i];
        let k = (1. - a) * band(to_inside[i], outside) + a * band(to_outside[i], inside);
        paint.sample(x, y).scale(k)
    })
}

/// One value per pixel of `bounds`, with a constant value everywhere else.
#[derive(Clone, Debug)]
struct Field {
    bounds: PixelBounds,
    values: Vec<f32>,
    outside: f32,
}

impl Field {
    fn alpha(image: &PlacedImage, bounds: PixelBounds) -> Self {
        let mut values = Vec::with_capacity(bounds.width() as usize * bounds.height() as usize);
        for y in bounds.y0..bounds.y1 {
            values.extend((bounds.x0..bounds.x1).map(|x| image.sample(x, y).a));
        }
        Self {
            bounds,
            values,
            outside: 0.,
        }
    }

    fn width(&self) -> usize {
        self.bounds.width() as usize
    }

    fn height(&self) -> usize {
        self.bounds.height() as usize
    }

    fn get(&self, x: i32, y: i32) -> f32 {
        let b = &self.bounds;
        if x < b.x0 || y < b.y0 || x >= b.x1 || y >= b.y1 {
            return self.outside;
        }
        self.values[(y - b.y0) as usize * self.width() + (x - b.x0) as usize]
    }

    #[must_use]
    fn inverted(mut self) -> Self {
        for v in &mut self.values {
            *v = 1. - *v;
        }
        self.outside = 1. - self.outside;
        self
    }

    /// Dilate by `radius` pixels.
    fn grow(&mut self, radius: f64) {
        if radius <= 0. {
            return;
        }
        let values = &self.values;
        let distance = distance_transform(|i| values[i] >= 0.5, self.width(), self.height());
        let radius = radius as f32;
        for (v, d) in self.values.iter_mut().zip(distance) {
            *v = v.max((radius + 1. - d).clamp(0., 1.));
        }
    }

    fn blur(&mut self, sigma: f64) {
        let (w, h) = (self.width(), self.height());
        gaussian_blur(&mut self.values, w, h, sigma, self.outside);
    }
}

/// Distance from every pixel center to the nearest pixel for which `is_feature` holds, by the
/// separable exact algorithm of Felzenszwalb and Huttenlocher.
fn distance_transform(is_feature: impl Fn(usize) -> bool, width: usize, height: usize) -> Vec<f32> {
    let mut grid: Vec<f64> = (0..width * height)
        .map(|i| if is_feature(i) { 0. } else { FAR })
        .collect();
    let n = width.max(height);
    let mut f = vec![0.; n];
    let mut d = vec![0.; n];
    let mut v = vec![0; n];
    let mut z = vec![0.; n + 1];
    for x in 0..width {
        for y in 0..height {
            f[y] = grid[y * width + x];
        }
        squared_distance_1d(&f[..height], &mut d[..height], &mut v, &mut z);
        for y in 0..height {
            grid[y * width + x] = d[y];
        }
    }
    for row in grid.chunks_exact_mut(width.max(1)) {
        f[..width].copy_from_slice(row);
        squared_distance_1d(&f[..width], &mut d[..width], &mut v, &mut z);
        row.copy_from_slice(&d[..width]);
    }
    grid.into_iter().map(|d| d.sqrt() as f32).collect()
}

/// Lower envelope of the parabolas rooted at `f`.
fn squared_distance_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut k = 0;
    v[0] = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;
    for q in 1..n {
        let qf = q as f64;
        let mut s;
        loop {
            let p = v[k] as f64;
            s = ((f[q] + qf * qf) - (f[v[k]] + p * p)) / (2. * (qf - p));
            if k > 0 && s <= z[k] {
                k -= 1;
            } else {
                break;
            }
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }
    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        let qf = q as f64;
        while z[k + 1] < qf {
            k += 1;
        }
        let p = v[k] as f64;
        *out = (qf - p) * (qf - p) + f[v[k]];
    }
}

/// Values that can be blurred.
trait Sample: Copy {
    const ZERO: Self;

    fn add_scaled(self, value: Self, k: f32) -> Self;
}

impl Sample for f32 {
    const ZERO: Self = 0.;

    fn add_scaled(self, value: Self, k: f32) -> Self {
        self + value * k
    }
}

impl Sample for PremulColor {
    const ZERO: Self = Self::TRANSPARENT;

    fn add_scaled(self, value: Self, k: f32) -> Self {
        Self::new(
            self.r + value.r * k,
            self.g + value.g * k,
            self.b + value.b * k,
            self.a + value.a * k,
        )
    }
}

/// Separable Gaussian blur of a `width` by `height` grid, reading `outside` past its edges.
fn gaussian_blur<T: Sample>(values: &mut [T], width: usize, height: usize, sigma: f64, outside: T) {
    let radius = blur_radius(sigma).ceil() as usize;
    if sigma <= 0. || radius == 0 || values.is_empty() {
        return;
    }
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / (2. * sigma * sigma)).exp() as f32
        })
        .collect();
    let total: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= total;
    }
    let mut pass = vec![T::ZERO; values.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = T::ZERO;
            for (j, &k) in kernel.iter().enumerate() {
                let sx = (x + j).checked_sub(radius).filter(|&sx| sx < width);
                let value = sx.map_or(outside, |sx| values[y * width + sx]);
                acc = acc.add_scaled(value, k);
            }
            pass[y * width + x] = acc;
        }
    }
    for y in 0..height {
        for x in 0..width {
            let mut acc = T::ZERO;
            for (j, &k) in kernel.iter().enumerate() {
                let sy = (y + j).checked_sub(radius).filter(|&sy| sy < height);
                let value = sy.map_or(outside, |sy| pass[sy * width + x]);
                acc = acc.add_scaled(value, k);
            }
            values[y * width + x] = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::document::Document;
    use crate::peniko::Color;
    use crate::framebuffer::{FramebufferPool, PixmapAllocator};
    use crate::kurbo::Affine;
    use crate::{Bounds, RenderMetrics};

    const WHITE: PremulColor = PremulColor::new(1., 1., 1., 1.);

    fn pool() -> FramebufferPool<PixmapAllocator> {
        FramebufferPool::new(PixmapAllocator, Rc::new(RenderMetrics::new())).with_granularity(16)
    }

    fn frame() -> FillFrame {
        FillFrame {
            layer: Affine::IDENTITY,
            parent: Affine::IDENTITY,
            artboard: Affine::IDENTITY,
            bounds: Bounds::new(2., 2., 6., 6.),
        }
    }

    fn square() -> PlacedImage {
        PlacedImage::solid(WHITE, Bounds::new(2., 2., 6., 6.))
    }

    fn apply(kind: EffectKind) -> Option<PlacedImage> {
        let pool = pool();
        let surfaces = Surfaces::new(&pool, 1024);
        let basis = square();
        draw_effect(
            &surfaces,
            &Document::default(),
            &frame(),
            &Effect::new(kind),
            Some(&basis),
        )
        .unwrap()
    }

    fn black_shadow(offset: Vec2, blur: f64, choke: f64) -> Shadow {
        Shadow {
            offset,
            blur,
            choke,
            color: Color::rgb8(0, 0, 0),
        }
    }

    #[test]
    fn distance_transform_is_euclidean() {
        // A single feature pixel in the middle of a 5x5 grid.
        let d = distance_transform(|i| i == 12, 5, 5);
        assert_eq!(d[12], 0.);
        assert_eq!(d[13], 1.);
        assert_eq!(d[14], 2.);
        assert!((d[0] - 8_f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn blur_spreads_and_conserves_coverage() {
        let blurred = apply(EffectKind::Blur(1.)).unwrap();
        assert_eq!(blurred.pixel_bounds(), PixelBounds::new(0, 0, 8, 8));
        let total: f32 = (0..8)
            .flat_map(|y| (0..8).map(move |x| (x, y)))
            .map(|(x, y)| blurred.sample(x, y).a)
            .sum();
        assert!((total - 16.).abs() < 1e-3, "total coverage {total}");
        assert!(blurred.sample(1, 3).a > 0.);
        assert!(blurred.sample(3, 3).a < 1.);
    }

    #[test]
    fn drop_shadow_is_offset() {
        let shadow = apply(EffectKind::DropShadow(black_shadow(Vec2::new(2., 1.), 0., 0.))).unwrap();
        assert_eq!(shadow.sample(7, 6).a, 1.);
        assert_eq!(shadow.sample(4, 3).a, 1.);
        assert_eq!(shadow.sample(3, 2).a, 0.);
        assert_eq!(shadow.sample(7, 3), PremulColor::new(0., 0., 0., 1.));
    }

    #[test]
    fn choke_grows_outer_glow() {
        let glow = Glow {
            blur: 0.,
            choke: 1.,
            color: Color::rgb8(255, 255, 255),
        };
        let glow = apply(EffectKind::OuterGlow(glow)).unwrap();
        assert_eq!(glow.sample(1, 3).a, 1.);
        assert_eq!(glow.sample(6, 3).a, 1.);
        assert_eq!(glow.sample(0, 3).a, 0.);
        // Corners are rounded by the Euclidean distance.
        let corner = glow.sample(1, 1).a;
        assert!(corner > 0.5 && corner < 1., "corner coverage {corner}");
    }

    #[test]
    fn inner_shadow_stays_inside_the_basis() {
        let shadow = apply(EffectKind::InnerShadow(black_shadow(Vec2::new(1., 0.), 0., 0.))).unwrap();
        assert_eq!(shadow.pixel_bounds(), PixelBounds::new(2, 2, 6, 6));
        assert_eq!(shadow.sample(2, 3).a, 1.);
        assert_eq!(shadow.sample(3, 3).a, 0.);
        assert_eq!(shadow.sample(5, 3).a, 0.);
        assert_eq!(shadow.sample(1, 3).a, 0.);
    }

    #[test]
    fn stroke_effect_positions() {
        let fill = FillDesc::color(Color::rgb8(255, 0, 0));
        let outside = apply(EffectKind::Stroke {
            thickness: 1.,
            position: StrokePosition::Outside,
            fill: fill.clone(),
        })
        .unwrap();
        assert_eq!(outside.sample(1, 3), PremulColor::new(1., 0., 0., 1.));
        assert_eq!(outside.sample(0, 3).a, 0.);
        assert_eq!(outside.sample(2, 3).a, 0.);

        let inside = apply(EffectKind::Stroke {
            thickness: 1.,
            position: StrokePosition::Inside,
            fill,
        })
        .unwrap();
        assert_eq!(inside.sample(2, 3).a, 1.);
        assert_eq!(inside.sample(3, 3).a, 0.);
        assert_eq!(inside.sample(1, 3).a, 0.);
    }

    #[test]
    fn overlay_paints_the_layer_bounds() {
        let pool = pool();
        let surfaces = Surfaces::new(&pool, 1024);
        let overlay = Effect::new(EffectKind::Overlay(FillDesc::color(Color::rgb8(0, 0, 255))));
        let image = draw_effect(&surfaces, &Document::default(), &frame(), &overlay, None)
            .unwrap()
            .unwrap();
        assert_eq!(image.pixel_bounds(), PixelBounds::new(2, 2, 6, 6));
        assert_eq!(image.sample(2, 2), PremulColor::new(0., 0., 1., 1.));
    }

    #[test]
    fn huge_radii_are_too_large_for_a_surface() {
        let pool = pool();
        let surfaces = Surfaces::new(&pool, 1024);
        let basis = square();
        let glow = Glow {
            blur: 0.,
            choke: 1e10,
            color: Color::rgb8(255, 255, 255),
        };
        for kind in [
            EffectKind::Blur(1e10),
            EffectKind::DropShadow(black_shadow(Vec2::new(1e12, -1e12), 1e10, 0.)),
            EffectKind::InnerShadow(black_shadow(Vec2::new(0., 1e12), 0., 0.)),
            EffectKind::OuterGlow(glow),
            EffectKind::Stroke {
                thickness: 1e10,
                position: StrokePosition::Outside,
                fill: FillDesc::color(Color::rgb8(255, 0, 0)),
            },
        ] {
            let result = draw_effect(
                &surfaces,
                &Document::default(),
                &frame(),
                &Effect::new(kind),
                Some(&basis),
            );
            assert!(
                matches!(result, Err(crate::Error::SurfaceTooLarge { limit: 1024, .. })),
                "{result:?}"
            );
        }
    }

    #[test]
    fn effects_without_basis_draw_nothing() {
        let pool = pool();
        let surfaces = Surfaces::new(&pool, 1024);
        let effect = Effect::new(EffectKind::Blur(2.));
        assert!(draw_effect(&surfaces, &Document::default(), &frame(), &effect, None)
            .unwrap()
            .is_none());
    }
}
