// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain value structures describing a shape.
//!
//! These types carry no behavior beyond small constructors. They are produced by whatever
//! parses the design document and consumed by [`compile`](crate::compile) and the renderer.

use smallvec::SmallVec;

use crate::kurbo::{Affine, Cap, Join, Rect};
use crate::peniko::{Color, ColorStops, Extend, Fill, Mix};

/// Boolean operation combining the sub-paths of a compound path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp {
    Union,
    Intersect,
    Subtract,
    Exclude,
}

/// The geometry of a path.
#[derive(Clone, Debug, PartialEq)]
pub enum PathKind {
    /// An axis-aligned rectangle with optional uniform corner rounding.
    Rectangle {
        rect: Option<Rect>,
        corner_radius: f64,
    },
    /// SVG path data.
    Path { geometry: Option<String> },
    /// Sub-paths either concatenated (`op` is `None`) or folded with a boolean operation.
    Compound {
        paths: Vec<PathDesc>,
        op: Option<BoolOp>,
    },
}

/// A path together with its visibility and local transform.
#[derive(Clone, Debug, PartialEq)]
pub struct PathDesc {
    pub kind: PathKind,
    pub visible: bool,
    pub transform: Affine,
}

impl PathDesc {
    pub fn rectangle(rect: Rect) -> Self {
        Self::new(PathKind::Rectangle {
            rect: Some(rect),
            corner_radius: 0.,
        })
    }

    pub fn rounded_rectangle(rect: Rect, corner_radius: f64) -> Self {
        Self::new(PathKind::Rectangle {
            rect: Some(rect),
            corner_radius,
        })
    }

    /// A path from SVG path data, such as `"M0 0 L10 0 L10 10 Z"`.
    pub fn svg(geometry: impl Into<String>) -> Self {
        Self::new(PathKind::Path {
            geometry: Some(geometry.into()),
        })
    }

    pub fn compound(paths: Vec<Self>, op: Option<BoolOp>) -> Self {
        Self::new(PathKind::Compound { paths, op })
    }

    pub fn new(kind: PathKind) -> Self {
        Self {
            kind,
            visible: true,
            transform: Affine::IDENTITY,
        }
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Affine) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

/// Where a stroke sits relative to the outline it follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrokePosition {
    Inside,
    #[default]
    Center,
    Outside,
}

/// Named dash style of a stroke.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StrokeStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

/// A stroke of a shape.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeDesc {
    /// Custom stroke geometry. When present and visible it is filled instead of stroking the body.
    pub path: Option<PathDesc>,
    /// Fill rule of the custom geometry.
    pub fill_rule: Fill,
    pub thickness: f64,
    pub position: StrokePosition,
    pub join: Join,
    pub cap: Cap,
    pub miter_limit: f64,
    pub style: StrokeStyle,
    /// Explicit dash pattern. Takes precedence over the presets of `style`.
    pub dashing: SmallVec<[f64; 4]>,
    pub dash_offset: f64,
    pub fill: FillDesc,
    pub visible: bool,
}

impl StrokeDesc {
    pub fn new(thickness: f64, position: StrokePosition, fill: FillDesc) -> Self {
        Self {
            path: None,
            fill_rule: Fill::NonZero,
            thickness,
            position,
            join: Join::Miter,
            cap: Cap::Butt,
            miter_limit: 10.,
            style: StrokeStyle::Solid,
            dashing: SmallVec::new(),
            dash_offset: 0.,
            fill,
            visible: true,
        }
    }
}

/// A shape: an optional body path, a fill rule, fills and strokes.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeDesc {
    pub path: Option<PathDesc>,
    pub fill_rule: Fill,
    pub fills: Vec<FillDesc>,
    pub strokes: Vec<StrokeDesc>,
}

impl ShapeDesc {
    pub fn new(path: PathDesc) -> Self {
        Self {
            path: Some(path),
            fill_rule: Fill::NonZero,
            fills: Vec::new(),
            strokes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_fill_rule(mut self, fill_rule: Fill) -> Self {
        self.fill_rule = fill_rule;
        self
    }

    #[must_use]
    pub fn with_fill(mut self, fill: FillDesc) -> Self {
        self.fills.push(fill);
        self
    }

    #[must_use]
    pub fn with_stroke(mut self, stroke: StrokeDesc) -> Self {
        self.strokes.push(stroke);
        self
    }
}

/// Gradient geometry in gradient space.
///
/// Linear gradients run from `(0, 0)` to `(1, 0)`. Radial gradients are centered at the origin
/// with radius 1. Angular gradients sweep clockwise around the origin starting at the +x axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradientKind {
    Linear,
    Radial,
    Angular,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    pub kind: GradientKind,
    pub stops: ColorStops,
    pub extend: Extend,
}

/// How an image fill maps onto the positioning rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ImageLayout {
    #[default]
    Stretch,
    /// Cover the rectangle, preserving aspect ratio.
    Fill,
    /// Fit inside the rectangle, preserving aspect ratio.
    Fit,
    /// Repeat the image at its natural size times `scale`.
    Tile { scale: f64 },
}

/// The paint of a fill.
#[derive(Clone, Debug, PartialEq)]
pub enum Paint {
    Color(Color),
    Gradient(Gradient),
    /// An image resolved by key through the document's image source.
    Image { key: String, layout: ImageLayout },
}

/// The space a fill's positioning transform is relative to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PositioningOrigin {
    /// The layer's bounds; the unit square maps onto them.
    #[default]
    Layer,
    /// The parent layer's coordinate system.
    Parent,
    /// The artboard's coordinate system.
    Artboard,
}

/// Maps gradient or image space into the origin's space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Positioning {
    pub origin: PositioningOrigin,
    pub transform: Affine,
}

/// A filter applied to a fill after it has been drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Filter {
    /// Multiply alpha by a factor.
    OpacityMultiplier(f64),
    /// Scale saturation, `0` is grayscale and `1` leaves colors unchanged.
    Saturation(f64),
}

/// A fill of a shape or a stroke.
#[derive(Clone, Debug, PartialEq)]
pub struct FillDesc {
    pub paint: Paint,
    pub visible: bool,
    pub blend_mode: Mix,
    pub positioning: Option<Positioning>,
    pub filters: Vec<Filter>,
}

impl FillDesc {
    pub fn new(paint: Paint) -> Self {
        Self {
            paint,
            visible: true,
            blend_mode: Mix::Normal,
            positioning: None,
            filters: Vec::new(),
        }
    }

    pub fn color(color: Color) -> Self {
        Self::new(Paint::Color(color))
    }

    #[must_use]
    pub fn with_positioning(mut self, positioning: Positioning) -> Self {
        self.positioning = Some(positioning);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}
