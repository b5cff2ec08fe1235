// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The layer model consumed by assembly and rendering.
//!
//! Parsing design files is left to callers; they build [`Layer`] trees out of plain values. The
//! renderer reads layers through the [`LayerSource`] trait, and [`Document`] is the in-memory
//! implementation of it.

use std::collections::HashMap;

use crate::animation::{AnimatedValue, Animation, LayerAnimation};
use crate::image::{Bitmap, Pixmap};
use crate::kurbo::{Affine, BezPath, ParamCurveNearest, Point, Rect, Shape, Vec2};
use crate::peniko::{Color, Fill, Mix};
use crate::rendexpr::ChannelMatrix;
use crate::shape::compile::{scale_factor, CompiledShape};
use crate::shape::desc::{FillDesc, Filter, Paint, ShapeDesc, StrokePosition};
use crate::shape::{Bounds, Margin, Part};
use crate::{Error, Result};

/// Blurs extend this many standard deviations past the blurred content.
pub const BLUR_RANGE_SIGMA_MULTIPLIER: f64 = 2.;

/// Accuracy of the distance to an outline when hit testing, in document units.
const HIT_ACCURACY: f64 = 1e-3;

/// A text box. Glyph layout is done by a [`TextRenderer`](crate::TextRenderer).
#[derive(Clone, Debug, PartialEq)]
pub struct TextDesc {
    pub text: String,
    /// The layout box in layer coordinates.
    pub bounds: Rect,
    pub font_size: f64,
    pub color: Color,
}

/// The content of a layer.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerKind {
    Shape(ShapeDesc),
    Text(TextDesc),
    Group {
        layers: Vec<Layer>,
    },
    /// A group whose content is only visible where its mask layer covers.
    MaskGroup {
        mask: Box<Layer>,
        basis: MaskBasis,
        channels: ChannelMatrix,
        layers: Vec<Layer>,
    },
}

/// Which rendition of the mask layer masks a [`LayerKind::MaskGroup`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaskBasis {
    #[default]
    Body,
    BodyAndStrokes,
    Fill,
    LayerAndEffects,
}

/// The input an effect is computed from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EffectBasis {
    #[default]
    Body,
    BodyAndStrokes,
    Fill,
    LayerAndEffects,
    /// Whatever is behind the layer.
    Background,
}

impl From<MaskBasis> for EffectBasis {
    fn from(basis: MaskBasis) -> Self {
        match basis {
            MaskBasis::Body => Self::Body,
            MaskBasis::BodyAndStrokes => Self::BodyAndStrokes,
            MaskBasis::Fill => Self::Fill,
            MaskBasis::LayerAndEffects => Self::LayerAndEffects,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    pub offset: Vec2,
    /// Standard deviation of the blur, in layer units.
    pub blur: f64,
    /// How far the basis is grown (drop shadows) or shrunk (inner shadows) before blurring.
    pub choke: f64,
    pub color: Color,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Glow {
    pub blur: f64,
    pub choke: f64,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EffectKind {
    /// A fill painted over the layer.
    Overlay(FillDesc),
    /// An outline around the coverage of the basis.
    Stroke {
        thickness: f64,
        position: StrokePosition,
        fill: FillDesc,
    },
    DropShadow(Shadow),
    InnerShadow(Shadow),
    OuterGlow(Glow),
    InnerGlow(Glow),
    /// Gaussian blur with the given standard deviation.
    Blur(f64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Effect {
    pub kind: EffectKind,
    pub basis: EffectBasis,
    pub visible: bool,
    pub blend_mode: Mix,
    /// Filters applied to the effect's output.
    pub filters: Vec<Filter>,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            basis: EffectBasis::Body,
            visible: true,
            blend_mode: Mix::Normal,
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_basis(mut self, basis: EffectBasis) -> Self {
        self.basis = basis;
        self
    }

    #[must_use]
    pub fn with_blend_mode(mut self, blend_mode: Mix) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Whether the effect reads its basis. Overlays paint on their own.
    pub fn needs_basis(&self) -> bool {
        !matches!(self.kind, EffectKind::Overlay(_))
    }

    /// How far outside the layer's bounds the effect may draw, in layer units.
    ///
    /// Sides may be negative when an offset moves the effect away from them.
    pub fn margin(&self) -> Margin {
        match &self.kind {
            EffectKind::Overlay(_) | EffectKind::InnerShadow(_) | EffectKind::InnerGlow(_) => {
                Margin::ZERO
            }
            EffectKind::Stroke {
                thickness,
                position,
                ..
            } => match position {
                StrokePosition::Outside => Margin::uniform(*thickness),
                StrokePosition::Center => Margin::uniform(0.5 * thickness),
                StrokePosition::Inside => Margin::ZERO,
            },
            EffectKind::DropShadow(shadow) => {
                let spread = BLUR_RANGE_SIGMA_MULTIPLIER * shadow.blur + shadow.choke;
                Margin {
                    left: spread - shadow.offset.x,
                    top: spread - shadow.offset.y,
                    right: spread + shadow.offset.x,
                    bottom: spread + shadow.offset.y,
                }
            }
            EffectKind::OuterGlow(glow) => {
                Margin::uniform(BLUR_RANGE_SIGMA_MULTIPLIER * glow.blur + glow.choke)
            }
            EffectKind::Blur(sigma) => Margin::uniform(BLUR_RANGE_SIGMA_MULTIPLIER * sigma),
        }
    }
}

/// A node of the layer tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: String,
    pub visible: bool,
    pub opacity: f64,
    pub blend_mode: Mix,
    /// Maps layer coordinates into the parent's coordinates.
    pub transform: Affine,
    pub kind: LayerKind,
    pub effects: Vec<Effect>,
}

impl Layer {
    pub fn new(id: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            visible: true,
            opacity: 1.,
            blend_mode: Mix::Normal,
            transform: Affine::IDENTITY,
            kind,
            effects: Vec::new(),
        }
    }

    pub fn shape(id: impl Into<String>, shape: ShapeDesc) -> Self {
        Self::new(id, LayerKind::Shape(shape))
    }

    pub fn text(id: impl Into<String>, text: TextDesc) -> Self {
        Self::new(id, LayerKind::Text(text))
    }

    pub fn group(id: impl Into<String>, layers: Vec<Self>) -> Self {
        Self::new(id, LayerKind::Group { layers })
    }

    pub fn mask_group(
        id: impl Into<String>,
        mask: Self,
        basis: MaskBasis,
        channels: ChannelMatrix,
        layers: Vec<Self>,
    ) -> Self {
        Self::new(
            id,
            LayerKind::MaskGroup {
                mask: Box::new(mask),
                basis,
                channels,
                layers,
            },
        )
    }

    #[must_use]
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    #[must_use]
    pub fn with_blend_mode(mut self, blend_mode: Mix) -> Self {
        self.blend_mode = blend_mode;
        self
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

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Direct children, with the mask layer of a mask group first.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        let (mask, layers): (Option<&Self>, &[Self]) = match &self.kind {
            LayerKind::Group { layers } => (None, layers.as_slice()),
            LayerKind::MaskGroup { mask, layers, .. } => (Some(&**mask), layers.as_slice()),
            LayerKind::Shape(_) | LayerKind::Text(_) => (None, &[]),
        };
        mask.into_iter().chain(layers)
    }

    fn children_mut(&mut self) -> impl Iterator<Item = &mut Self> {
        let (mask, layers): (Option<&mut Self>, &mut [Self]) = match &mut self.kind {
            LayerKind::Group { layers } => (None, layers.as_mut_slice()),
            LayerKind::MaskGroup { mask, layers, .. } => {
                (Some(&mut **mask), layers.as_mut_slice())
            }
            LayerKind::Shape(_) | LayerKind::Text(_) => (None, &mut []),
        };
        mask.into_iter().chain(layers)
    }
}

/// Read access to a layer tree, as needed by the renderer.
pub trait LayerSource {
    fn layer(&self, id: &str) -> Option<&Layer>;

    /// The compiled geometry of a shape layer.
    fn shape(&self, id: &str) -> Option<&CompiledShape>;

    /// Bounds of the layer's content in its own coordinates, without effects.
    fn layer_bounds(&self, id: &str) -> Bounds;

    /// A premultiplied image referenced by an image fill.
    fn image(&self, key: &str) -> Option<&Pixmap>;
}

/// Placement and extent of a layer, see [`Document::layer_metrics`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerMetrics {
    /// Maps layer coordinates into document coordinates.
    pub transform: Affine,
    /// Bounds of the layer's geometry in its own coordinates, without strokes or effects.
    pub logical_bounds: Bounds,
    /// Bounds including strokes and effects, in the layer's own coordinates.
    pub graphical_bounds: Bounds,
    /// The graphical bounds in document coordinates.
    pub document_bounds: Bounds,
}

/// Properties of an animated layer before animation.
#[derive(Clone, Debug)]
struct Rest {
    transform: Affine,
    opacity: f64,
    fills: Option<Vec<FillDesc>>,
}

/// An in-memory layer tree with compiled shapes and decoded images.
///
/// Animated layers hold their values at the document's current time, so assembling and rendering
/// the document shows that moment of the animation.
#[derive(Debug, Default)]
pub struct Document {
    layers: Vec<Layer>,
    /// Child indices from the root list down to each layer. For mask groups, index 0 is the
    /// mask layer and the group's layers follow.
    paths: HashMap<String, Vec<usize>>,
    shapes: HashMap<String, CompiledShape>,
    images: HashMap<String, Pixmap>,
    animations: Vec<LayerAnimation>,
    rest: HashMap<String, Rest>,
    time: f64,
}

impl Document {
    /// Index a layer tree and compile its shapes.
    pub fn new(layers: Vec<Layer>) -> Result<Self> {
        let mut document = Self {
            layers,
            ..Self::default()
        };
        let mut stack: Vec<(Vec<usize>, &Layer)> = document
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| (vec![i], layer))
            .collect();
        while let Some((path, layer)) = stack.pop() {
            if document.paths.contains_key(&layer.id) {
                return Err(Error::DuplicateLayer(layer.id.clone()));
            }
            if let LayerKind::Shape(desc) = &layer.kind {
                document
                    .shapes
                    .insert(layer.id.clone(), CompiledShape::compile(desc)?);
            }
            for (i, child) in layer.children().enumerate() {
                let mut child_path = path.clone();
                child_path.push(i);
                stack.push((child_path, child));
            }
            document.paths.insert(layer.id.clone(), path);
        }
        Ok(document)
    }

    /// The top-level layers, bottom-most first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Register a straight-alpha image for image fills referencing `key`.
    pub fn insert_image(&mut self, key: impl Into<String>, bitmap: &Bitmap) {
        self.images.insert(key.into(), bitmap.premultiply());
    }

    /// Replace the shape of a shape layer, re-compiling its geometry.
    ///
    /// On failure the layer keeps its previous shape.
    pub fn update_shape(&mut self, id: &str, desc: ShapeDesc) -> Result<()> {
        let shape = self
            .shapes
            .get_mut(id)
            .ok_or_else(|| shape_lookup_error(&self.paths, id))?;
        shape.modify(&desc)?;
        let fills = desc.fills.clone();
        let layer = self
            .layer_mut(id)
            .ok_or_else(|| Error::UnknownLayer(id.to_owned()))?;
        layer.kind = LayerKind::Shape(desc);
        let animated = match self.rest.get_mut(id) {
            Some(rest) => {
                rest.fills = Some(fills);
                true
            }
            None => false,
        };
        if animated {
            self.apply_animations();
        }
        Ok(())
    }

    /// Replace the document's animations and apply them at the current time.
    ///
    /// Fails without changing anything if an animation names an unknown layer.
    pub fn set_animations(&mut self, animations: Vec<LayerAnimation>) -> Result<()> {
        if let Some(missing) = animations
            .iter()
            .find(|animation| !self.paths.contains_key(&animation.layer))
        {
            return Err(Error::UnknownLayer(missing.layer.clone()));
        }
        self.restore();
        self.rest.clear();
        for animation in &animations {
            let targets = match animation.animation {
                Animation::FillColor(_) => self.shapes_under(&animation.layer),
                _ => vec![animation.layer.clone()],
            };
            for id in targets {
                self.capture(id);
            }
        }
        self.animations = animations;
        self.apply_animations();
        Ok(())
    }

    pub fn animations(&self) -> &[LayerAnimation] {
        &self.animations
    }

    /// The value of animation `index` at `time`, without changing the document.
    pub fn animation_value(&self, index: usize, time: f64) -> Option<AnimatedValue> {
        self.animations.get(index)?.value_at(time)
    }

    /// Move the document to `time` seconds into its animations.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
        self.apply_animations();
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Where layer `id` sits in the document and how far it reaches, or `None` for an unknown
    /// layer.
    pub fn layer_metrics(&self, id: &str) -> Option<LayerMetrics> {
        let transform = self.document_transform(id)?;
        let graphical_bounds = self.graphical_bounds(id);
        Some(LayerMetrics {
            transform,
            logical_bounds: self.logical_bounds(id),
            graphical_bounds,
            document_bounds: graphical_bounds.transform(transform),
        })
    }

    /// The top-most visible shape or text layer whose geometry lies within `radius` of `point`,
    /// both in document coordinates.
    ///
    /// The content of a mask group can only be hit where its mask is hit. When the mask is hit
    /// but none of the content is, a visible mask layer is the result.
    pub fn identify_layer(&self, point: Point, radius: f64) -> Option<&str> {
        let radius = radius.max(0.);
        self.layers
            .iter()
            .rev()
            .filter(|layer| layer.visible)
            .find_map(|layer| self.identify(layer, Affine::IDENTITY, point, radius))
    }

    fn identify<'a>(
        &'a self,
        layer: &'a Layer,
        parent: Affine,
        point: Point,
        radius: f64,
    ) -> Option<&'a str> {
        let transform = parent * layer.transform;
        let front_to_back = |layers: &'a [Layer]| {
            layers
                .iter()
                .rev()
                .filter(|child| child.visible)
                .find_map(|child| self.identify(child, transform, point, radius))
        };
        match &layer.kind {
            LayerKind::Shape(_) => {
                let shape = self.shapes.get(&layer.id)?;
                hits_shape(shape, transform, point, radius).then_some(layer.id.as_str())
            }
            LayerKind::Text(text) => {
                let outline = text.bounds.to_path(0.1);
                hits_outline(&outline, Fill::NonZero, transform, point, radius)
                    .then_some(layer.id.as_str())
            }
            LayerKind::Group { layers } => front_to_back(layers.as_slice()),
            LayerKind::MaskGroup { mask, layers, .. } => {
                let mask_hit = self.identify(mask, transform, point, radius)?;
                front_to_back(layers.as_slice()).or(mask.visible.then_some(mask_hit))
            }
        }
    }

    /// Maps the coordinates of layer `id` into document coordinates.
    fn document_transform(&self, id: &str) -> Option<Affine> {
        let path = self.paths.get(id)?;
        let (first, rest) = path.split_first()?;
        let mut layer = self.layers.get(*first)?;
        let mut transform = layer.transform;
        for &i in rest {
            layer = layer.children().nth(i)?;
            transform = transform * layer.transform;
        }
        Some(transform)
    }

    /// Bounds of the layer's geometry without strokes or effects, in its own coordinates.
    fn logical_bounds(&self, id: &str) -> Bounds {
        let Some(layer) = self.layer(id) else {
            return Bounds::UNSPECIFIED;
        };
        match &layer.kind {
            LayerKind::Shape(_) => self
                .shapes
                .get(id)
                .map_or(Bounds::UNSPECIFIED, |shape| {
                    shape.bounds(Part::Body, Affine::IDENTITY)
                }),
            LayerKind::Text(text) => Bounds::from(text.bounds),
            LayerKind::Group { layers } | LayerKind::MaskGroup { layers, .. } => layers
                .iter()
                .filter(|child| child.visible)
                .fold(Bounds::UNSPECIFIED, |acc, child| {
                    acc.union(&self.logical_bounds(&child.id).transform(child.transform))
                }),
        }
    }

    /// Ids of the shape layers at or below `id`.
    fn shapes_under(&self, id: &str) -> Vec<String> {
        let mut ids = Vec::new();
        let mut stack: Vec<&Layer> = self.layer(id).into_iter().collect();
        while let Some(layer) = stack.pop() {
            if matches!(layer.kind, LayerKind::Shape(_)) {
                ids.push(layer.id.clone());
            }
            stack.extend(layer.children());
        }
        ids
    }

    fn capture(&mut self, id: String) {
        if self.rest.contains_key(&id) {
            return;
        }
        let Some(layer) = self.layer(&id) else {
            return;
        };
        let rest = Rest {
            transform: layer.transform,
            opacity: layer.opacity,
            fills: self.shapes.get(&id).map(|shape| shape.desc().fills.clone()),
        };
        self.rest.insert(id, rest);
    }

    /// Put every animated layer back to its values before animation.
    fn restore(&mut self) {
        let rest = std::mem::take(&mut self.rest);
        for (id, state) in &rest {
            if let Some(layer) = self.layer_mut(id) {
                layer.transform = state.transform;
                layer.opacity = state.opacity;
                if let (LayerKind::Shape(desc), Some(fills)) = (&mut layer.kind, &state.fills) {
                    desc.fills = fills.clone();
                }
            }
            if let (Some(shape), Some(fills)) = (self.shapes.get_mut(id), &state.fills) {
                shape.set_fills(fills.clone());
            }
        }
        self.rest = rest;
    }

    /// Set every animated layer to its values at the current time.
    fn apply_animations(&mut self) {
        self.restore();
        let time = self.time;
        let changes: Vec<_> = self
            .animations
            .iter()
            .map(|animation| {
                (
                    animation.layer.clone(),
                    animation.transform_at(time),
                    animation.opacity_at(time),
                    animation.fill_color_at(time),
                )
            })
            .collect();
        for (id, transform, opacity, color) in changes {
            if let Some(color) = color {
                for shape in self.shapes_under(&id) {
                    self.recolor(&shape, color);
                }
            } else if let Some(layer) = self.layer_mut(&id) {
                layer.transform = transform * layer.transform;
                layer.opacity *= opacity;
            }
        }
    }

    fn recolor(&mut self, id: &str, color: Color) {
        let Some(shape) = self.shapes.get_mut(id) else {
            return;
        };
        let mut fills = shape.desc().fills.clone();
        for fill in &mut fills {
            if let Paint::Color(c) = &mut fill.paint {
                *c = color;
            }
        }
        shape.set_fills(fills.clone());
        if let Some(Layer {
            kind: LayerKind::Shape(desc),
            ..
        }) = self.layer_mut(id)
        {
            desc.fills = fills;
        }
    }

    /// Bounds of the layer including its effects, in its own coordinates.
    pub fn graphical_bounds(&self, id: &str) -> Bounds {
        let Some(layer) = self.layer(id) else {
            return Bounds::UNSPECIFIED;
        };
        let bounds = self.layer_bounds(id);
        if bounds.is_unspecified() {
            return bounds;
        }
        layer
            .effects
            .iter()
            .filter(|effect| effect.visible)
            .fold(bounds, |acc, effect| {
                acc.union(&bounds.expand(&effect.margin()))
            })
    }

    fn layer_mut(&mut self, id: &str) -> Option<&mut Layer> {
        let path = self.paths.get(id)?;
        let (first, rest) = path.split_first()?;
        let mut layer = self.layers.get_mut(*first)?;
        for &i in rest {
            layer = layer.children_mut().nth(i)?;
        }
        Some(layer)
    }
}

/// Whether the body or a visible stroke of `shape`, placed by `transform`, lies within `radius`
/// of `point`.
fn hits_shape(shape: &CompiledShape, transform: Affine, point: Point, radius: f64) -> bool {
    let body = shape.body();
    if hits_outline(&body.path, body.fill_rule, transform, point, radius) {
        return true;
    }
    shape
        .desc()
        .strokes
        .iter()
        .enumerate()
        .filter(|(_, stroke)| stroke.visible)
        .any(|(i, stroke)| match shape.stroke_outline(i) {
            Some(outline) => {
                hits_outline(&outline.path, outline.fill_rule, transform, point, radius)
            }
            None => {
                let reach = match stroke.position {
                    StrokePosition::Outside => stroke.thickness,
                    StrokePosition::Center => 0.5 * stroke.thickness,
                    StrokePosition::Inside => 0.,
                };
                reach > 0.
                    && within(
                        &(transform * body.path.clone()),
                        point,
                        radius + reach * scale_factor(transform),
                    )
            }
        })
}

fn hits_outline(
    path: &BezPath,
    fill_rule: Fill,
    transform: Affine,
    point: Point,
    radius: f64,
) -> bool {
    let path = transform * path.clone();
    let winding = path.winding(point);
    let inside = match fill_rule {
        Fill::NonZero => winding != 0,
        Fill::EvenOdd => winding % 2 != 0,
    };
    inside || within(&path, point, radius)
}

/// Whether some segment of `path` passes within `radius` of `point`.
fn within(path: &BezPath, point: Point, radius: f64) -> bool {
    path.segments()
        .any(|segment| segment.nearest(point, HIT_ACCURACY).distance_sq <= radius * radius)
}

fn shape_lookup_error(paths: &HashMap<String, Vec<usize>>, id: &str) -> Error {
    if paths.contains_key(id) {
        Error::NotAShape(id.to_owned())
    } else {
        Error::UnknownLayer(id.to_owned())
    }
}

impl LayerSource for Document {
    fn layer(&self, id: &str) -> Option<&Layer> {
        let path = self.paths.get(id)?;
        let (first, rest) = path.split_first()?;
        let mut layer = self.layers.get(*first)?;
        for &i in rest {
            layer = layer.children().nth(i)?;
        }
        Some(layer)
    }

    fn shape(&self, id: &str) -> Option<&CompiledShape> {
        self.shapes.get(id)
    }

    fn layer_bounds(&self, id: &str) -> Bounds {
        let Some(layer) = self.layer(id) else {
            return Bounds::UNSPECIFIED;
        };
        let child_bounds = |layers: &[Layer]| {
            layers
                .iter()
                .filter(|child| child.visible)
                .fold(Bounds::UNSPECIFIED, |acc, child| {
                    acc.union(&self.graphical_bounds(&child.id).transform(child.transform))
                })
        };
        match &layer.kind {
            LayerKind::Shape(desc) => {
                let Some(shape) = self.shapes.get(id) else {
                    return Bounds::UNSPECIFIED;
                };
                desc.strokes
                    .iter()
                    .enumerate()
                    .filter(|(_, stroke)| stroke.visible)
                    .fold(shape.bounds(Part::Body, Affine::IDENTITY), |acc, (i, _)| {
                        acc.union(&shape.bounds(Part::Stroke(i), Affine::IDENTITY))
                    })
            }
            LayerKind::Text(text) => Bounds::from(text.bounds),
            LayerKind::Group { layers } => child_bounds(layers),
            LayerKind::MaskGroup { mask, layers, .. } => {
                let mask_bounds = self.graphical_bounds(&mask.id).transform(mask.transform);
                child_bounds(layers).intersect(&mask_bounds)
            }
        }
    }

    fn image(&self, key: &str) -> Option<&Pixmap> {
        self.images.get(key)
    }
}
