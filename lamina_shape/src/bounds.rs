// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned rectangles in document space and pixel space.

use crate::kurbo::{Affine, Point, Rect};

/// An axis-aligned rectangle in document space, stored as min and max corners.
///
/// [`Bounds::UNSPECIFIED`] stands for "no geometry". It is the identity of [`Bounds::union`]
/// and absorbs [`Bounds::intersect`]. Every other value satisfies `x0 <= x1` and `y0 <= y1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Bounds {
    /// Bounds of nothing.
    pub const UNSPECIFIED: Self = Self {
        x0: f64::INFINITY,
        y0: f64::INFINITY,
        x1: f64::NEG_INFINITY,
        y1: f64::NEG_INFINITY,
    };

    /// Create bounds from two corners, normalizing their order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Whether these bounds are the "no geometry" sentinel.
    pub fn is_unspecified(&self) -> bool {
        !(self.x0 <= self.x1 && self.y0 <= self.y1)
    }

    pub fn width(&self) -> f64 {
        if self.is_unspecified() {
            0.
        } else {
            self.x1 - self.x0
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_unspecified() {
            0.
        } else {
            self.y1 - self.y0
        }
    }

    /// The smallest bounds containing both.
    pub fn union(&self, other: &Self) -> Self {
        if self.is_unspecified() {
            return *other;
        }
        if other.is_unspecified() {
            return *self;
        }
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// The overlap of both, or [`Bounds::UNSPECIFIED`] if they are disjoint.
    pub fn intersect(&self, other: &Self) -> Self {
        let r = Self {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        if r.is_unspecified() {
            Self::UNSPECIFIED
        } else {
            r
        }
    }

    /// Grow each side by the matching margin value.
    pub fn expand(&self, margin: &Margin) -> Self {
        if self.is_unspecified() {
            return *self;
        }
        let r = Self {
            x0: self.x0 - margin.left,
            y0: self.y0 - margin.top,
            x1: self.x1 + margin.right,
            y1: self.y1 + margin.bottom,
        };
        if r.is_unspecified() {
            Self::UNSPECIFIED
        } else {
            r
        }
    }

    /// Shift by `(dx, dy)`.
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        if self.is_unspecified() {
            return *self;
        }
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    /// Bounds of the four transformed corners.
    pub fn transform(&self, affine: Affine) -> Self {
        if self.is_unspecified() {
            return *self;
        }
        let corners = [
            affine * Point::new(self.x0, self.y0),
            affine * Point::new(self.x1, self.y0),
            affine * Point::new(self.x0, self.y1),
            affine * Point::new(self.x1, self.y1),
        ];
        corners.iter().fold(Self::UNSPECIFIED, |acc, p| Self {
            x0: acc.x0.min(p.x),
            y0: acc.y0.min(p.y),
            x1: acc.x1.max(p.x),
            y1: acc.y1.max(p.y),
        })
    }

    /// The smallest pixel rectangle covering these bounds.
    pub fn outer_pixel_bounds(&self) -> PixelBounds {
        if self.is_unspecified() {
            return PixelBounds::EMPTY;
        }
        PixelBounds::new(
            self.x0.floor() as i32,
            self.y0.floor() as i32,
            self.x1.ceil() as i32,
            self.y1.ceil() as i32,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x0 && p.x < self.x1 && p.y >= self.y0 && p.y < self.y1
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::UNSPECIFIED
    }
}

impl From<Rect> for Bounds {
    fn from(r: Rect) -> Self {
        Self::new(r.x0, r.y0, r.x1, r.y1)
    }
}

impl From<PixelBounds> for Bounds {
    fn from(b: PixelBounds) -> Self {
        if b.is_empty() {
            return Self::UNSPECIFIED;
        }
        Self::new(b.x0.into(), b.y0.into(), b.x1.into(), b.y1.into())
    }
}

/// Per-side distances used to grow or shrink [`Bounds`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Margin {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Margin {
    pub const ZERO: Self = Self::uniform(0.);

    pub const fn uniform(v: f64) -> Self {
        Self {
            left: v,
            top: v,
            right: v,
            bottom: v,
        }
    }
}

impl core::ops::Add for Margin {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            left: self.left + rhs.left,
            top: self.top + rhs.top,
            right: self.right + rhs.right,
            bottom: self.bottom + rhs.bottom,
        }
    }
}

impl core::ops::Mul<f64> for Margin {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self {
            left: self.left * rhs,
            top: self.top * rhs,
            right: self.right * rhs,
            bottom: self.bottom * rhs,
        }
    }
}

/// An axis-aligned rectangle of whole pixels, `x0..x1` by `y0..y1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelBounds {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl PixelBounds {
    pub const EMPTY: Self = Self {
        x0: 0,
        y0: 0,
        x1: 0,
        y1: 0,
    };

    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// A rectangle of the given size at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(
            0,
            0,
            i32::try_from(width).unwrap_or(i32::MAX),
            i32::try_from(height).unwrap_or(i32::MAX),
        )
    }

    pub fn width(&self) -> u32 {
        self.x1.abs_diff(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.abs_diff(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let r = Self {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        if r.is_empty() {
            Self::EMPTY
        } else {
            r
        }
    }

    /// Grow by `d` pixels on every side, saturating at the limits of `i32`.
    pub fn expand(&self, d: i32) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(
            self.x0.saturating_sub(d),
            self.y0.saturating_sub(d),
            self.x1.saturating_add(d),
            self.y1.saturating_add(d),
        )
    }

    /// Move by `(dx, dy)` pixels, saturating at the limits of `i32`.
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(
            self.x0.saturating_add(dx),
            self.y0.saturating_add(dy),
            self.x1.saturating_add(dx),
            self.y1.saturating_add(dy),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_is_union_identity() {
        let b = Bounds::new(1., 2., 3., 4.);
        assert_eq!(Bounds::UNSPECIFIED.union(&b), b);
        assert_eq!(b.union(&Bounds::UNSPECIFIED), b);
        assert!(Bounds::UNSPECIFIED.is_unspecified());
        assert!(!b.is_unspecified());
    }

    #[test]
    fn disjoint_intersection_is_unspecified() {
        let a = Bounds::new(0., 0., 1., 1.);
        let b = Bounds::new(2., 2., 3., 3.);
        assert!(a.intersect(&b).is_unspecified());
        assert_eq!(
            a.intersect(&Bounds::new(0.5, 0.5, 4., 4.)),
            Bounds::new(0.5, 0.5, 1., 1.)
        );
    }

    #[test]
    fn new_normalizes_corners() {
        let b = Bounds::new(5., 6., 1., 2.);
        assert_eq!(b, Bounds::new(1., 2., 5., 6.));
    }

    #[test]
    fn outer_pixel_bounds_rounds_outward() {
        let b = Bounds::new(0.5, -0.25, 10.1, 3.);
        assert_eq!(b.outer_pixel_bounds(), PixelBounds::new(0, -1, 11, 3));
        assert!(Bounds::UNSPECIFIED.outer_pixel_bounds().is_empty());
    }

    #[test]
    fn transform_covers_rotated_corners() {
        let b = Bounds::new(0., 0., 2., 1.);
        let r = b.transform(Affine::rotate(core::f64::consts::FRAC_PI_2));
        assert!((r.x0 + 1.).abs() < 1e-9);
        assert!((r.x1 - 0.).abs() < 1e-9);
        assert!((r.y0 - 0.).abs() < 1e-9);
        assert!((r.y1 - 2.).abs() < 1e-9);
    }

    #[test]
    fn pixel_expansion_saturates() {
        let far = Bounds::new(-3e9, 0., 4., 4.).outer_pixel_bounds();
        assert_eq!(far.x0, i32::MIN);
        let grown = far.expand(1);
        assert_eq!((grown.x0, grown.y0, grown.x1, grown.y1), (i32::MIN, -1, 5, 5));
        assert_eq!(grown.width(), 5 + 2_u32.pow(31));

        let edge = PixelBounds::new(i32::MAX - 2, i32::MAX - 2, i32::MAX, i32::MAX);
        assert_eq!(edge.expand(i32::MAX).x1, i32::MAX);
        assert_eq!(edge.expand(i32::MAX).x0, -2);
        assert_eq!(edge.translate(10, -10).x1, i32::MAX);
        assert_eq!(edge.translate(10, -10).y0, i32::MAX - 12);
        assert!(PixelBounds::EMPTY.expand(3).is_empty());
    }

    #[test]
    fn margin_expansion() {
        let b = Bounds::new(0., 0., 10., 10.).expand(&Margin::uniform(2.));
        assert_eq!(b, Bounds::new(-2., -2., 12., 12.));
    }
}
