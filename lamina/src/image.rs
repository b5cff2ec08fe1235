// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel containers and placed images.
//!
//! Everything inside the evaluator is premultiplied [`PremulColor`]. Straight alpha only appears
//! in [`Bitmap`], at the boundary with image decoders and file output.

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

use crate::framebuffer::{PixmapAllocator, PooledFramebuffer};
use crate::kurbo::Point;
use crate::peniko::Color;
use crate::{Bounds, PixelBounds};

/// A premultiplied RGBA color with channels in `0..=1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PremulColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl PremulColor {
    pub const TRANSPARENT: Self = Self::new(0., 0., 0., 0.);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Premultiply a straight 8-bit color.
    pub fn from_straight(r: u8, g: u8, b: u8, a: u8) -> Self {
        let a = f32::from(a) / 255.;
        Self {
            r: f32::from(r) / 255. * a,
            g: f32::from(g) / 255. * a,
            b: f32::from(b) / 255. * a,
            a,
        }
    }

    /// Unpremultiply into straight 8-bit channels.
    ///
    /// Fully transparent pixels come out as transparent black.
    pub fn to_straight(self) -> [u8; 4] {
        if self.a <= 0. {
            return [0; 4];
        }
        let q = |v: f32| (v * 255.).round().clamp(0., 255.) as u8;
        [
            q(self.r / self.a),
            q(self.g / self.a),
            q(self.b / self.a),
            q(self.a),
        ]
    }

    /// Straight color channels, transparent pixels yield black.
    pub fn unpremultiplied(self) -> [f32; 3] {
        if self.a <= 0. {
            [0.; 3]
        } else {
            [self.r / self.a, self.g / self.a, self.b / self.a]
        }
    }

    #[must_use]
    pub fn scale(self, k: f32) -> Self {
        Self::new(self.r * k, self.g * k, self.b * k, self.a * k)
    }

    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
            self.a + (other.a - self.a) * t,
        )
    }

    /// Source-over compositing of `src` onto `self`.
    #[must_use]
    pub fn over(self, src: Self) -> Self {
        let k = 1. - src.a;
        Self::new(
            src.r + self.r * k,
            src.g + self.g * k,
            src.b + self.b * k,
            src.a + self.a * k,
        )
    }
}

impl From<Color> for PremulColor {
    fn from(c: Color) -> Self {
        Self::from_straight(c.r, c.g, c.b, c.a)
    }
}

/// A straight-alpha RGBA8 image, as produced by decoders and consumed by encoders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA8, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0; 4];
        px.copy_from_slice(&self.data[i..i + 4]);
        px
    }

    /// Convert into a premultiplied pixmap.
    pub fn premultiply(&self) -> Pixmap {
        let pixels: &[[u8; 4]] = bytemuck::cast_slice(&self.data);
        Pixmap {
            width: self.width,
            height: self.height,
            data: pixels
                .iter()
                .map(|&[r, g, b, a]| PremulColor::from_straight(r, g, b, a))
                .collect(),
        }
    }
}

/// A premultiplied image.
///
/// Pooled pixmaps may be larger than the image they hold; readers track the logical size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    data: Vec<PremulColor>,
}

impl Pixmap {
    /// A transparent pixmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![PremulColor::TRANSPARENT; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[PremulColor] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [PremulColor] {
        &mut self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulColor {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Row `y`, truncated to `len` pixels.
    pub fn row(&self, y: u32, len: u32) -> &[PremulColor] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + len as usize]
    }

    pub fn row_mut(&mut self, y: u32, len: u32) -> &mut [PremulColor] {
        let start = y as usize * self.width as usize;
        &mut self.data[start..start + len as usize]
    }

    /// Clear the top-left `width` by `height` region to transparent.
    pub fn clear_region(&mut self, width: u32, height: u32) {
        let width = width.min(self.width);
        for y in 0..height.min(self.height) {
            self.row_mut(y, width).fill(PremulColor::TRANSPARENT);
        }
    }

    /// Unpremultiply the top-left `width` by `height` region.
    pub fn to_bitmap(&self, width: u32, height: u32) -> Bitmap {
        let width = width.min(self.width);
        let height = height.min(self.height);
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for px in self.row(y, width) {
                data.extend_from_slice(&px.to_straight());
            }
        }
        Bitmap {
            width,
            height,
            data,
        }
    }
}

#[derive(Clone, Debug)]
enum Content {
    Solid(PremulColor),
    Pixels {
        surface: Rc<PooledFramebuffer<PixmapAllocator>>,
        width: u32,
        height: u32,
    },
}

/// Pixels together with where they sit in the output coordinate space.
///
/// Cloning is cheap; clones share the underlying surface, which returns to its pool when the
/// last clone is dropped.
#[derive(Clone, Debug)]
pub struct PlacedImage {
    content: Content,
    bounds: Bounds,
}

impl PlacedImage {
    /// A uniformly colored region.
    pub fn solid(color: PremulColor, bounds: Bounds) -> Self {
        Self {
            content: Content::Solid(color),
            bounds,
        }
    }

    /// The top-left `bounds.width()` by `bounds.height()` pixels of `surface`, placed at `bounds`.
    pub fn from_surface(surface: PooledFramebuffer<PixmapAllocator>, bounds: PixelBounds) -> Self {
        Self {
            content: Content::Pixels {
                surface: Rc::new(surface),
                width: bounds.width(),
                height: bounds.height(),
            },
            bounds: Bounds::from(bounds),
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// The pixel rectangle this image touches.
    pub fn pixel_bounds(&self) -> PixelBounds {
        self.bounds.outer_pixel_bounds()
    }

    /// The same pixels moved by `(dx, dy)`.
    #[must_use]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self {
            content: self.content.clone(),
            bounds: self.bounds.translate(dx, dy),
        }
    }

    /// The color covering pixel `(x, y)`, sampled at its center.
    pub fn sample(&self, x: i32, y: i32) -> PremulColor {
        let center = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
        if !self.bounds.contains(center) {
            return PremulColor::TRANSPARENT;
        }
        match &self.content {
            Content::Solid(color) => *color,
            Content::Pixels {
                surface,
                width,
                height,
            } => {
                let ix = (center.x - self.bounds.x0).floor();
                let iy = (center.y - self.bounds.y0).floor();
                if ix < 0. || iy < 0. || ix >= f64::from(*width) || iy >= f64::from(*height) {
                    return PremulColor::TRANSPARENT;
                }
                surface.pixel(ix as u32, iy as u32)
            }
        }
    }

    /// The solid color of this image, if it is one.
    pub fn as_solid(&self) -> Option<PremulColor> {
        match self.content {
            Content::Solid(c) => Some(c),
            Content::Pixels { .. } => None,
        }
    }

    /// Download as a straight-alpha bitmap covering [`Self::pixel_bounds`].
    pub fn to_bitmap(&self) -> Bitmap {
        let pb = self.pixel_bounds();
        let mut bitmap = Bitmap::new(pb.width(), pb.height());
        for (i, chunk) in bitmap.data.chunks_exact_mut(4).enumerate() {
            let x = pb.x0 + (i % pb.width().max(1) as usize) as i32;
            let y = pb.y0 + (i / pb.width().max(1) as usize) as i32;
            chunk.copy_from_slice(&self.sample(x, y).to_straight());
        }
        bitmap
    }
}
