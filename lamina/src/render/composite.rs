// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositing of placed images.
//!
//! Every operation takes its operands as `Option<&PlacedImage>`, `None` being an image with no
//! pixels, and produces a new image over the pixel bounds its result can cover.

use super::Surfaces;
use crate::image::{PlacedImage, PremulColor};
use crate::peniko::Mix;
use crate::rendexpr::ChannelMatrix;
use crate::{PixelBounds, Result};

/// Composite `src` onto `dst` with `mode`.
pub(crate) fn blend(
    surfaces: &Surfaces<'_>,
    dst: Option<&PlacedImage>,
    src: Option<&PlacedImage>,
    mode: Mix,
) -> Result<Option<PlacedImage>> {
    let (dst, src) = match (dst, src) {
        (dst, None) => return Ok(dst.cloned()),
        (None, src) => return Ok(src.cloned()),
        (Some(dst), Some(src)) => (dst, src),
    };
    let bounds = dst.pixel_bounds().union(&src.pixel_bounds());
    surfaces.produce(bounds, |x, y| {
        blend_pixel(dst.sample(x, y), src.sample(x, y), mode)
    })
}

/// Composite `src` onto `dst` as if `src` were opaque wherever it has any coverage.
pub(crate) fn blend_ignore_alpha(
    surfaces: &Surfaces<'_>,
    dst: Option<&PlacedImage>,
    src: Option<&PlacedImage>,
    mode: Mix,
) -> Result<Option<PlacedImage>> {
    let Some(src) = src else {
        return Ok(dst.cloned());
    };
    let bounds = dst.map_or(PixelBounds::EMPTY, PlacedImage::pixel_bounds)
        .union(&src.pixel_bounds());
    surfaces.produce(bounds, |x, y| {
        let d = dst.map_or(PremulColor::TRANSPARENT, |d| d.sample(x, y));
        let s = src.sample(x, y);
        if s.a <= 0. {
            return d;
        }
        let [r, g, b] = s.unpremultiplied();
        blend_pixel(d, PremulColor::new(r, g, b, 1.), mode)
    })
}

/// `image` multiplied by the channel ratio of `mask`, over the overlap of both.
pub(crate) fn mask(
    surfaces: &Surfaces<'_>,
    image: Option<&PlacedImage>,
    mask: Option<&PlacedImage>,
    channels: &ChannelMatrix,
) -> Result<Option<PlacedImage>> {
    let (Some(image), Some(mask)) = (image, mask) else {
        return Ok(None);
    };
    let bounds = image.pixel_bounds().intersect(&mask.pixel_bounds());
    surfaces.produce(bounds, |x, y| {
        image.sample(x, y).scale(mask_ratio(mask.sample(x, y), channels))
    })
}

/// `a` and `b` interpolated by the channel ratio of `mask`: 0 gives `a`, 1 gives `b`.
///
/// Outside the mask the ratio is the matrix's constant term.
pub(crate) fn mix_mask(
    surfaces: &Surfaces<'_>,
    a: Option<&PlacedImage>,
    b: Option<&PlacedImage>,
    mask_image: Option<&PlacedImage>,
    channels: &ChannelMatrix,
) -> Result<Option<PlacedImage>> {
    let Some(mask_image) = mask_image else {
        return mix(surfaces, a, b, channels.0[4]);
    };
    let (a, b) = match (a, b) {
        (None, b) => return mask(surfaces, b, Some(mask_image), channels),
        (Some(a), None) => {
            let [r, g, b, alpha, bias] = channels.0;
            let inverse = ChannelMatrix([-r, -g, -b, -alpha, 1. - bias]);
            return mask(surfaces, Some(a), Some(mask_image), &inverse);
        }
        (Some(a), Some(b)) => (a, b),
    };
    let bounds = a.pixel_bounds().union(&b.pixel_bounds());
    surfaces.produce(bounds, |x, y| {
        let t = mask_ratio(mask_image.sample(x, y), channels);
        a.sample(x, y).lerp(b.sample(x, y), t)
    })
}

/// `a` and `b` interpolated by a constant ratio.
pub(crate) fn mix(
    surfaces: &Surfaces<'_>,
    a: Option<&PlacedImage>,
    b: Option<&PlacedImage>,
    ratio: f64,
) -> Result<Option<PlacedImage>> {
    if ratio <= 0. {
        return Ok(a.cloned());
    }
    if ratio >= 1. {
        return Ok(b.cloned());
    }
    let (a, b) = match (a, b) {
        (None, b) => return multiply_alpha(surfaces, b, ratio),
        (a, None) => return multiply_alpha(surfaces, a, 1. - ratio),
        (Some(a), Some(b)) => (a, b),
    };
    let t = ratio as f32;
    let bounds = a.pixel_bounds().union(&b.pixel_bounds());
    surfaces.produce(bounds, |x, y| a.sample(x, y).lerp(b.sample(x, y), t))
}

pub(crate) fn multiply_alpha(
    surfaces: &Surfaces<'_>,
    image: Option<&PlacedImage>,
    multiplier: f64,
) -> Result<Option<PlacedImage>> {
    let Some(image) = image else {
        return Ok(None);
    };
    if multiplier <= 0. {
        return Ok(None);
    }
    if multiplier == 1. {
        return Ok(Some(image.clone()));
    }
    let k = multiplier.min(1.) as f32;
    if let Some(color) = image.as_solid() {
        return Ok(Some(PlacedImage::solid(color.scale(k), image.bounds())));
    }
    surfaces.produce(image.pixel_bounds(), |x, y| image.sample(x, y).scale(k))
}

/// Scale the saturation of `image` by `amount`, `0` giving grayscale.
pub(crate) fn saturate(
    surfaces: &Surfaces<'_>,
    image: Option<&PlacedImage>,
    amount: f64,
) -> Result<Option<PlacedImage>> {
    let Some(image) = image else {
        return Ok(None);
    };
    let k = amount as f32;
    surfaces.produce(image.pixel_bounds(), |x, y| {
        let px = image.sample(x, y);
        if px.a <= 0. {
            return px;
        }
        let c = px.unpremultiplied();
        let l = 0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2];
        let s = c.map(|v| (l + (v - l) * k).clamp(0., 1.));
        PremulColor::new(s[0] * px.a, s[1] * px.a, s[2] * px.a, px.a)
    })
}

/// Resample `image` onto exactly `viewport`.
pub(crate) fn reframe(
    surfaces: &Surfaces<'_>,
    image: Option<&PlacedImage>,
    viewport: PixelBounds,
) -> Result<PlacedImage> {
    let reframed = surfaces.produce(viewport, |x, y| {
        image.map_or(PremulColor::TRANSPARENT, |image| image.sample(x, y))
    })?;
    Ok(reframed
        .unwrap_or_else(|| PlacedImage::solid(PremulColor::TRANSPARENT, viewport.into())))
}

fn mask_ratio(px: PremulColor, channels: &ChannelMatrix) -> f32 {
    let [r, g, b, a, bias] = channels.0.map(|m| m as f32);
    let c = px.unpremultiplied();
    (r * c[0] + g * c[1] + b * c[2] + a * px.a + bias).clamp(0., 1.)
}

/// Separable and non-separable blending of premultiplied colors.
pub(crate) fn blend_pixel(dst: PremulColor, src: PremulColor, mode: Mix) -> PremulColor {
    if src.a <= 0. {
        return dst;
    }
    if dst.a <= 0. || matches!(mode, Mix::Normal | Mix::Clip) {
        return dst.over(src);
    }
    let mixed = mix_colors(src.unpremultiplied(), dst.unpremultiplied(), mode);
    let (a_s, a_b) = (src.a, dst.a);
    let s = [src.r, src.g, src.b];
    let d = [dst.r, dst.g, dst.b];
    let c: [f32; 3] =
        core::array::from_fn(|i| s[i] * (1. - a_b) + d[i] * (1. - a_s) + a_s * a_b * mixed[i]);
    PremulColor::new(c[0], c[1], c[2], a_s + a_b * (1. - a_s))
}

/// The blend function `B(cb, cs)` on straight colors.
fn mix_colors(cs: [f32; 3], cb: [f32; 3], mode: Mix) -> [f32; 3] {
    let sep = |f: fn(f32, f32) -> f32| [f(cs[0], cb[0]), f(cs[1], cb[1]), f(cs[2], cb[2])];
    match mode {
        Mix::Normal => cs,
        Mix::Multiply => sep(|s, b| s * b),
        Mix::Screen => sep(screen),
        Mix::Overlay => sep(|s, b| hard_light(b, s)),
        Mix::Darken => sep(f32::min),
        Mix::Lighten => sep(f32::max),
        Mix::ColorDodge => sep(|s, b| {
            if b == 0. {
                0.
            } else if s >= 1. {
                1.
            } else {
                (b / (1. - s)).min(1.)
            }
        }),
        Mix::ColorBurn => sep(|s, b| {
            if b >= 1. {
                1.
            } else if s <= 0. {
                0.
            } else {
                1. - ((1. - b) / s).min(1.)
            }
        }),
        Mix::HardLight => sep(hard_light),
        Mix::SoftLight => sep(|s, b| {
            let d = if b <= 0.25 {
                ((16. * b - 12.) * b + 4.) * b
            } else {
                b.sqrt()
            };
            if s <= 0.5 {
                b - (1. - 2. * s) * b * (1. - b)
            } else {
                b + (2. * s - 1.) * (d - b)
            }
        }),
        Mix::Difference => sep(|s, b| (s - b).abs()),
        Mix::Exclusion => sep(|s, b| s + b - 2. * s * b),
        Mix::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        Mix::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        Mix::Color => set_lum(cs, lum(cb)),
        Mix::Luminosity => set_lum(cb, lum(cs)),
        // Same as `Normal`.
        Mix::Clip => cs,
    }
}

fn screen(s: f32, b: f32) -> f32 {
    s + b - s * b
}

fn hard_light(s: f32, b: f32) -> f32 {
    if s <= 0.5 {
        b * 2. * s
    } else {
        screen(b, 2. * s - 1.)
    }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    c.map(|mut v| {
        if n < 0. {
            v = l + (v - l) * l / (l - n);
        }
        if x > 1. {
            v = l + (v - l) * (1. - l) / (x - l);
        }
        v
    })
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color(c.map(|v| v + d))
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let mut order = [0, 1, 2];
    order.sort_by(|&i, &j| c[i].total_cmp(&c[j]));
    let [min, mid, max] = order;
    let mut out = [0.; 3];
    if c[max] > c[min] {
        out[mid] = (c[mid] - c[min]) * s / (c[max] - c[min]);
        out[max] = s;
    }
    out
}
