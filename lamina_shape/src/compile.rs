// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compiling shape descriptions into outlines.

use crate::boolean;
use crate::bounds::{Bounds, Margin};
use crate::desc::{FillDesc, PathDesc, PathKind, ShapeDesc, StrokeDesc, StrokePosition};
use crate::kurbo::{Affine, BezPath, Rect, RoundedRect, Shape};
use crate::peniko::Fill;
use crate::ShapeError;

/// Tolerance used when converting rounded rectangles into Bézier paths.
const SHAPE_TOLERANCE: f64 = 0.01;

/// Selects the body of a shape or one of its strokes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Part {
    Body,
    Stroke(usize),
}

impl From<i32> for Part {
    /// Negative indices select the body.
    fn from(index: i32) -> Self {
        match usize::try_from(index) {
            Ok(i) => Self::Stroke(i),
            Err(_) => Self::Body,
        }
    }
}

/// A path with the fill rule it should be filled with.
#[derive(Clone, Debug, PartialEq)]
pub struct Outline {
    pub path: BezPath,
    pub fill_rule: Fill,
}

impl Outline {
    /// Whether the outline has no drawable segment.
    pub fn is_empty(&self) -> bool {
        self.path.segments().next().is_none()
    }

    /// Tight bounds of the outline under `transform`.
    ///
    /// Transforms without shear or rotation are applied to the untransformed tight bounds
    /// directly, which is exact in that case.
    pub fn bounds(&self, transform: Affine) -> Bounds {
        if self.is_empty() {
            return Bounds::UNSPECIFIED;
        }
        let [a, b, c, d, e, f] = transform.as_coeffs();
        if b != 0. || c != 0. {
            Bounds::from((transform * self.path.clone()).bounding_box())
        } else {
            let r = self.path.bounding_box();
            Bounds::new(a * r.x0 + e, d * r.y0 + f, a * r.x1 + e, d * r.y1 + f)
        }
    }
}

/// Where the geometry of a [`Part`] comes from.
#[derive(Clone, Copy, Debug)]
pub enum Source<'a> {
    /// Fill this outline.
    Fill(&'a Outline),
    /// Stroke this outline with the given stroke parameters.
    Stroke(&'a Outline, &'a StrokeDesc),
}

/// A shape description compiled into a body outline and per-stroke outlines.
///
/// Stroke outlines exist only for strokes carrying their own visible path. Other strokes are
/// drawn by stroking the body.
#[derive(Clone, Debug)]
pub struct CompiledShape {
    desc: ShapeDesc,
    body: Outline,
    strokes: Vec<Option<Outline>>,
}

impl CompiledShape {
    /// Compile a shape description.
    ///
    /// Malformed path data fails the whole compilation.
    pub fn compile(desc: &ShapeDesc) -> Result<Self, ShapeError> {
        let body = match &desc.path {
            Some(path) if path.visible => Outline {
                path: build_path(path, desc.fill_rule)?,
                fill_rule: desc.fill_rule,
            },
            _ => Outline {
                path: BezPath::new(),
                fill_rule: desc.fill_rule,
            },
        };
        let strokes = desc
            .strokes
            .iter()
            .map(|stroke| match &stroke.path {
                Some(path) if path.visible => Ok(Some(Outline {
                    path: build_path(path, stroke.fill_rule)?,
                    fill_rule: stroke.fill_rule,
                })),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>, ShapeError>>()?;
        Ok(Self {
            desc: desc.clone(),
            body,
            strokes,
        })
    }

    /// Replace the geometry with a compilation of `desc`.
    ///
    /// On failure `self` is left untouched.
    pub fn modify(&mut self, desc: &ShapeDesc) -> Result<(), ShapeError> {
        *self = Self::compile(desc)?;
        Ok(())
    }

    /// Replace the fills. Fills carry no geometry, so nothing is re-compiled.
    pub fn set_fills(&mut self, fills: Vec<FillDesc>) {
        self.desc.fills = fills;
    }

    pub fn desc(&self) -> &ShapeDesc {
        &self.desc
    }

    pub fn body(&self) -> &Outline {
        &self.body
    }

    pub fn stroke_count(&self) -> usize {
        self.desc.strokes.len()
    }

    /// The custom outline of stroke `index`, if it has one.
    pub fn stroke_outline(&self, index: usize) -> Option<&Outline> {
        self.strokes.get(index).and_then(Option::as_ref)
    }

    /// Resolve which outline draws `part`, or `None` for an out-of-range stroke.
    pub fn source(&self, part: Part) -> Option<Source<'_>> {
        match part {
            Part::Body => Some(Source::Fill(&self.body)),
            Part::Stroke(i) => {
                let stroke = self.desc.strokes.get(i)?;
                Some(match self.stroke_outline(i) {
                    Some(outline) => Source::Fill(outline),
                    None => Source::Stroke(&self.body, stroke),
                })
            }
        }
    }

    /// Graphical bounds of `part` under `transform`.
    ///
    /// A stroke without custom geometry reports the body bounds padded by the stroke
    /// thickness (outside), half of it (center) or nothing (inside). Each axis is padded by the
    /// extent of a disk of that radius under the transform.
    /// Out-of-range strokes and empty outlines report [`Bounds::UNSPECIFIED`].
    pub fn bounds(&self, part: impl Into<Part>, transform: Affine) -> Bounds {
        match self.source(part.into()) {
            None => Bounds::UNSPECIFIED,
            Some(Source::Fill(outline)) => outline.bounds(transform),
            Some(Source::Stroke(outline, stroke)) => {
                let pad = match stroke.position {
                    StrokePosition::Outside => stroke.thickness,
                    StrokePosition::Center => 0.5 * stroke.thickness,
                    StrokePosition::Inside => 0.,
                };
                let bounds = outline.bounds(transform);
                if pad > 0. {
                    bounds.expand(&disk_margin(pad, transform))
                } else {
                    bounds
                }
            }
        }
    }
}

/// Compile a shape description, see [`CompiledShape::compile`].
pub fn compile(desc: &ShapeDesc) -> Result<CompiledShape, ShapeError> {
    CompiledShape::compile(desc)
}

/// Re-compile `shape` from `desc` in place, see [`CompiledShape::modify`].
pub fn modify(shape: &mut CompiledShape, desc: &ShapeDesc) -> Result<(), ShapeError> {
    shape.modify(desc)
}

/// The largest factor by which `transform` stretches a unit vector along an axis.
pub fn scale_factor(transform: Affine) -> f64 {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    a.hypot(b).max(c.hypot(d))
}

/// Half extents of the image of a disk of `radius` under `transform`.
fn disk_margin(radius: f64, transform: Affine) -> Margin {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    let x = radius * a.hypot(c);
    let y = radius * b.hypot(d);
    Margin {
        left: x,
        top: y,
        right: x,
        bottom: y,
    }
}

fn build_path(desc: &PathDesc, fill_rule: Fill) -> Result<BezPath, ShapeError> {
    let mut path = match &desc.kind {
        PathKind::Rectangle {
            rect,
            corner_radius,
        } => {
            let rect = rect.ok_or(ShapeError::MissingRectangle)?.abs();
            rectangle_path(rect, *corner_radius)
        }
        PathKind::Path { geometry } => {
            let geometry = geometry.as_deref().ok_or(ShapeError::MissingPathData)?;
            BezPath::from_svg(geometry)
                .map_err(|e| ShapeError::InvalidPathData(e.to_string()))?
        }
        PathKind::Compound { paths, op: None } => {
            let mut out = BezPath::new();
            for sub in paths.iter().filter(|p| p.visible) {
                out.extend(build_path(sub, fill_rule)?);
            }
            out
        }
        PathKind::Compound {
            paths,
            op: Some(op),
        } => {
            let mut acc: Option<BezPath> = None;
            for sub in paths.iter().filter(|p| p.visible) {
                let sub = build_path(sub, fill_rule)?;
                acc = Some(match acc {
                    None => sub,
                    Some(acc) => boolean::combine(&acc, fill_rule, &sub, fill_rule, *op),
                });
            }
            acc.unwrap_or_default()
        }
    };
    if desc.transform != Affine::IDENTITY {
        path.apply_affine(desc.transform);
    }
    Ok(path)
}

fn rectangle_path(rect: Rect, corner_radius: f64) -> BezPath {
    let radius = corner_radius.min(0.5 * rect.width().min(rect.height()));
    if radius > 0. {
        RoundedRect::from_rect(rect, radius).to_path(SHAPE_TOLERANCE)
    } else {
        rect.to_path(SHAPE_TOLERANCE)
    }
}
