// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Evaluation of render expression graphs into placed images.
//!
//! The evaluator walks the graph bottom-up with an explicit stack. Results are memoized by node
//! identity together with the background stack the node is evaluated against, so a node reached
//! through several parents is drawn once per pass. Each result is released as soon as its last
//! consumer has read it.

mod composite;
mod effects;
mod paint;

use std::collections::HashMap;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::document::{LayerKind, LayerSource, TextDesc};
use crate::framebuffer::{FramebufferPool, PixmapAllocator, PooledFramebuffer};
use crate::image::{Pixmap, PlacedImage, PremulColor};
use crate::kurbo::Affine;
use crate::rendexpr::{LayerInstance, Node, NodeId, Rendexpr};
use crate::shape::desc::Filter;
use crate::shape::{Part, Rasterizer, RasterizerOptions};
use crate::{Bounds, Error, PixelBounds, RenderMetrics, Result};

use paint::FillFrame;

/// Options which are set at renderer creation time.
#[derive(Clone, Copy, Debug)]
pub struct RendererOptions {
    /// Pooled pixmap dimensions are rounded up to multiples of this.
    pub framebuffer_granularity: u32,
    /// The largest width or height of an intermediate surface. Larger requests fail with
    /// [`Error::SurfaceTooLarge`].
    pub max_surface_dimension: u32,
    pub rasterizer: RasterizerOptions,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            framebuffer_granularity: 64,
            max_surface_dimension: 16384,
            rasterizer: RasterizerOptions::default(),
        }
    }
}

/// Lays out and draws the glyphs of text layers.
///
/// Font loading and shaping live outside of Lamina; a renderer without a text renderer draws
/// text layers as nothing.
pub trait TextRenderer {
    /// Draw `text`, placed by `transform` into device space, into `target`.
    ///
    /// The top-left `area.width()` by `area.height()` pixels of `target` correspond to `area`.
    /// They are transparent on entry and must be left premultiplied.
    fn draw_text(&mut self, text: &TextDesc, transform: Affine, area: PixelBounds, target: &mut Pixmap);
}

/// Called with every evaluated node and its result, in evaluation order.
pub type RenderHook<'a> = dyn FnMut(&Rendexpr, Option<&PlacedImage>) + 'a;

/// Size-checked access to the evaluator's pixmap pool.
pub(crate) struct Surfaces<'a> {
    pool: &'a FramebufferPool<PixmapAllocator>,
    max_dimension: u32,
}

impl<'a> Surfaces<'a> {
    pub(crate) fn new(pool: &'a FramebufferPool<PixmapAllocator>, max_dimension: u32) -> Self {
        Self {
            pool,
            max_dimension,
        }
    }

    /// Fails with [`Error::SurfaceTooLarge`] when `bounds` could not be allocated.
    pub(crate) fn check(&self, bounds: PixelBounds) -> Result<()> {
        let (width, height) = (bounds.width(), bounds.height());
        if width > self.max_dimension || height > self.max_dimension {
            return Err(Error::SurfaceTooLarge {
                width,
                height,
                limit: self.max_dimension,
            });
        }
        Ok(())
    }

    pub(crate) fn acquire(
        &self,
        bounds: PixelBounds,
    ) -> Result<PooledFramebuffer<PixmapAllocator>> {
        self.check(bounds)?;
        self.pool.acquire(&bounds)
    }

    /// A new image over `bounds` with every pixel computed by `f(x, y)`.
    ///
    /// Empty bounds produce no image.
    pub(crate) fn produce(
        &self,
        bounds: PixelBounds,
        mut f: impl FnMut(i32, i32) -> PremulColor,
    ) -> Result<Option<PlacedImage>> {
        if bounds.is_empty() {
            return Ok(None);
        }
        let mut surface = self.acquire(bounds)?;
        let width = bounds.width();
        for (row, y) in (bounds.y0..bounds.y1).enumerate() {
            let out = surface.row_mut(row as u32, width);
            for (px, x) in out.iter_mut().zip(bounds.x0..bounds.x1) {
                *px = f(x, y);
            }
        }
        Ok(Some(PlacedImage::from_surface(surface, bounds)))
    }
}

/// Evaluates render expression graphs on the CPU.
///
/// A renderer keeps its pixmap pool and rasterizer scratch buffers between passes, so repeated
/// renders of similar documents allocate little.
pub struct Renderer {
    options: RendererOptions,
    rasterizer: Rasterizer,
    pool: FramebufferPool<PixmapAllocator>,
    metrics: Rc<RenderMetrics>,
    text_renderer: Option<Box<dyn TextRenderer>>,
}

impl Renderer {
    pub fn new(options: RendererOptions) -> Self {
        let metrics = Rc::new(RenderMetrics::new());
        Self {
            rasterizer: Rasterizer::new(options.rasterizer),
            pool: FramebufferPool::new(PixmapAllocator, metrics.clone())
                .with_granularity(options.framebuffer_granularity),
            metrics,
            options,
            text_renderer: None,
        }
    }

    #[must_use]
    pub fn with_text_renderer(mut self, text_renderer: impl TextRenderer + 'static) -> Self {
        self.text_renderer = Some(Box::new(text_renderer));
        self
    }

    pub fn options(&self) -> &RendererOptions {
        &self.options
    }

    /// Counters of the work done by this renderer so far.
    pub fn metrics(&self) -> &RenderMetrics {
        &self.metrics
    }

    pub fn pool(&self) -> &FramebufferPool<PixmapAllocator> {
        &self.pool
    }

    /// Evaluate `root` against `source` and resample the result onto `viewport`.
    ///
    /// Document coordinates are multiplied by `scale` to get device pixels.
    pub fn render(
        &mut self,
        source: &dyn LayerSource,
        root: Option<&Rendexpr>,
        viewport: PixelBounds,
        scale: f64,
    ) -> Result<PlacedImage> {
        self.render_with_hook(source, root, viewport, scale, &mut |_, _| {})
    }

    /// Like [`render`](Self::render), calling `hook` after each node is evaluated.
    pub fn render_with_hook(
        &mut self,
        source: &dyn LayerSource,
        root: Option<&Rendexpr>,
        viewport: PixelBounds,
        scale: f64,
        hook: &mut RenderHook<'_>,
    ) -> Result<PlacedImage> {
        let surfaces = Surfaces::new(&self.pool, self.options.max_surface_dimension);
        let result = match root {
            Some(root) => {
                let mut evaluation = Evaluation {
                    surfaces: &surfaces,
                    rasterizer: &mut self.rasterizer,
                    text_renderer: self.text_renderer.as_deref_mut(),
                    metrics: &self.metrics,
                    source,
                    scale,
                    frames: vec![Frame::default()],
                    frame_ids: HashMap::new(),
                };
                evaluation.run(root, hook)?
            }
            None => None,
        };
        composite::reframe(&surfaces, result.as_ref(), viewport)
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("options", &self.options)
            .field("pool", &self.pool)
            .field("has_text_renderer", &self.text_renderer.is_some())
            .finish_non_exhaustive()
    }
}

/// Index of an interned background stack. 0 is the empty stack.
type StateId = usize;

/// One entry of the background stack: what [`Node::Background`] evaluates to, and the stack it
/// is evaluated against.
#[derive(Default)]
struct Frame {
    background: Option<Rendexpr>,
    parent: StateId,
}

type Key = (NodeId, StateId);

/// The inputs of a node at a given state, aligned with the node's input slots.
type Dependencies = SmallVec<[Option<(Rendexpr, StateId)>; 3]>;

#[derive(Clone, Copy)]
struct Uses {
    remaining: usize,
    consumed: bool,
}

struct Evaluation<'a, 's> {
    surfaces: &'a Surfaces<'s>,
    rasterizer: &'a mut Rasterizer,
    text_renderer: Option<&'a mut (dyn TextRenderer + 'static)>,
    metrics: &'a RenderMetrics,
    source: &'a dyn LayerSource,
    scale: f64,
    frames: Vec<Frame>,
    frame_ids: HashMap<(StateId, Option<NodeId>), StateId>,
}

impl Evaluation<'_, '_> {
    fn run(&mut self, root: &Rendexpr, hook: &mut RenderHook<'_>) -> Result<Option<PlacedImage>> {
        let root_key = (NodeId::of(root), 0);
        let mut uses = self.count_uses(root);
        let mut results: HashMap<Key, Option<PlacedImage>> = HashMap::new();
        let mut stack = vec![(root.clone(), 0, false)];
        while let Some((node, state, expanded)) = stack.pop() {
            let key = (NodeId::of(&node), state);
            if results.contains_key(&key) {
                continue;
            }
            let deps = self.dependencies(&node, state);
            if !expanded {
                stack.push((node, state, true));
                for (child, child_state) in deps.into_iter().flatten().rev() {
                    if !results.contains_key(&(NodeId::of(&child), child_state)) {
                        stack.push((child, child_state, false));
                    }
                }
                continue;
            }
            let mut inputs: SmallVec<[Option<PlacedImage>; 3]> = SmallVec::new();
            for dep in &deps {
                let Some((child, child_state)) = dep else {
                    inputs.push(None);
                    continue;
                };
                let child_key = (NodeId::of(child), *child_state);
                inputs.push(results.get(&child_key).cloned().flatten());
                if let Some(u) = uses.get_mut(&child_key) {
                    if u.consumed {
                        self.metrics.record_cache_hit();
                    }
                    u.consumed = true;
                    u.remaining = u.remaining.saturating_sub(1);
                    if u.remaining == 0 && child_key != root_key {
                        results.remove(&child_key);
                    }
                }
            }
            let image = self.evaluate(&node, &inputs)?;
            drop(inputs);
            self.metrics.record_node_evaluated();
            log::trace!(
                "Evaluated {} in state {state}: {:?}",
                node.short_name(),
                image.as_ref().map(PlacedImage::pixel_bounds)
            );
            hook(&node, image.as_ref());
            results.insert(key, image);
        }
        Ok(results.remove(&root_key).flatten())
    }

    /// Count how many parent edges read each (node, state) pair.
    fn count_uses(&mut self, root: &Rendexpr) -> HashMap<Key, Uses> {
        let mut uses: HashMap<Key, Uses> = HashMap::new();
        let mut expanded = std::collections::HashSet::new();
        let mut stack = vec![(root.clone(), 0)];
        while let Some((node, state)) = stack.pop() {
            if !expanded.insert((NodeId::of(&node), state)) {
                continue;
            }
            for (child, child_state) in self.dependencies(&node, state).into_iter().flatten() {
                uses.entry((NodeId::of(&child), child_state))
                    .or_insert(Uses {
                        remaining: 0,
                        consumed: false,
                    })
                    .remaining += 1;
                stack.push((child, child_state));
            }
        }
        uses
    }

    /// Intern the stack `state` with `background` pushed on top.
    fn push_frame(&mut self, state: StateId, background: Option<&Rendexpr>) -> StateId {
        let key = (state, background.map(NodeId::of));
        if let Some(&id) = self.frame_ids.get(&key) {
            return id;
        }
        let id = self.frames.len();
        self.frames.push(Frame {
            background: background.cloned(),
            parent: state,
        });
        self.frame_ids.insert(key, id);
        id
    }

    fn dependencies(&mut self, node: &Node, state: StateId) -> Dependencies {
        match node {
            Node::SetBackground {
                content,
                background,
            } => {
                let inner = self.push_frame(state, background.as_ref());
                let mut deps = Dependencies::new();
                deps.push(Some((content.clone(), inner)));
                deps.push(background.clone().map(|bg| (bg, state)));
                deps
            }
            Node::Background => {
                let mut deps = Dependencies::new();
                if state != 0 {
                    let frame = &self.frames[state];
                    deps.push(frame.background.clone().map(|bg| (bg, frame.parent)));
                }
                deps
            }
            Node::MixLayerOpacity { layer, a, b } => {
                let mut deps = Dependencies::new();
                let Some(opacity) = self.source.layer(&layer.id).map(|l| l.opacity) else {
                    return deps;
                };
                deps.push(a.clone().filter(|_| opacity < 1.).map(|a| (a, state)));
                deps.push(b.clone().filter(|_| opacity > 0.).map(|b| (b, state)));
                deps
            }
            _ => node
                .children()
                .into_iter()
                .map(|(_, child)| child.map(|c| (c.clone(), state)))
                .collect(),
        }
    }

    fn evaluate(
        &mut self,
        node: &Node,
        inputs: &[Option<PlacedImage>],
    ) -> Result<Option<PlacedImage>> {
        let s = self.surfaces;
        let input = |i: usize| inputs.get(i).and_then(Option::as_ref);
        match node {
            Node::Empty => Ok(None),
            Node::Identity { .. } | Node::SetBackground { .. } | Node::Background => {
                Ok(input(0).cloned())
            }
            Node::Blend { mode, .. } => composite::blend(s, input(0), input(1), *mode),
            Node::BlendIgnoreAlpha { mode, .. } => {
                composite::blend_ignore_alpha(s, input(0), input(1), *mode)
            }
            Node::Mask { channels, .. } => composite::mask(s, input(0), input(1), channels),
            Node::MixMask { channels, .. } => {
                composite::mix_mask(s, input(0), input(1), input(2), channels)
            }
            Node::Mix { ratio, .. } => composite::mix(s, input(0), input(1), *ratio),
            Node::MultiplyAlpha { multiplier, .. } => {
                composite::multiply_alpha(s, input(0), *multiplier)
            }
            Node::DrawLayerBody { layer } => self.draw_coverage(layer, Part::Body),
            Node::DrawLayerStroke { layer, index } => {
                self.draw_coverage(layer, Part::Stroke(*index))
            }
            Node::DrawLayerFill { layer, index } => self.draw_layer_fill(layer, *index),
            Node::DrawLayerStrokeFill { layer, index } => {
                self.draw_layer_stroke_fill(layer, *index)
            }
            Node::DrawLayerText { layer } => self.draw_layer_text(layer),
            Node::DrawLayerEffect { layer, index, .. } => {
                self.draw_layer_effect(layer, *index, input(0))
            }
            Node::ApplyFilter { filter, .. } => match *filter {
                Filter::OpacityMultiplier(k) => composite::multiply_alpha(s, input(0), k),
                Filter::Saturation(k) => composite::saturate(s, input(0), k),
            },
            Node::MixLayerOpacity { layer, .. } => {
                let Some(found) = self.source.layer(&layer.id) else {
                    log::warn!("Unknown layer {:?}", layer.id);
                    return Ok(None);
                };
                composite::mix(s, input(0), input(1), found.opacity)
            }
        }
    }

    fn device_transform(&self, layer: &LayerInstance, local: Affine) -> Affine {
        Affine::scale(self.scale) * layer.parent_transform * local
    }

    fn frame(&self, layer: &LayerInstance, local: Affine, bounds: Bounds) -> FillFrame {
        FillFrame {
            layer: self.device_transform(layer, local),
            parent: Affine::scale(self.scale) * layer.parent_transform,
            artboard: Affine::scale(self.scale),
            bounds,
        }
    }

    fn draw_coverage(&mut self, layer: &LayerInstance, part: Part) -> Result<Option<PlacedImage>> {
        let (Some(found), Some(shape)) = (
            self.source.layer(&layer.id),
            self.source.shape(&layer.id),
        ) else {
            log::warn!("Unknown shape layer {:?}", layer.id);
            return Ok(None);
        };
        let transform = self.device_transform(layer, found.transform);
        let bounds = shape.bounds(part, transform);
        if bounds.is_unspecified() {
            return Ok(None);
        }
        let area = bounds.outer_pixel_bounds().expand(1);
        // Checked before rasterizing so that oversized shapes fail without allocating.
        self.surfaces.check(area)?;
        let coverage = self.rasterizer.rasterize_to_vec(
            shape,
            part,
            Affine::translate((-f64::from(area.x0), -f64::from(area.y0))) * transform,
            area.width(),
            area.height(),
            self.metrics,
        )?;
        let width = area.width() as usize;
        self.surfaces.produce(area, |x, y| {
            let i = (y - area.y0) as usize * width + (x - area.x0) as usize;
            let c = f32::from(coverage[i]) / 255.;
            PremulColor::new(c, c, c, c)
        })
    }

    fn draw_layer_fill(&mut self, layer: &LayerInstance, index: usize) -> Result<Option<PlacedImage>> {
        let (Some(found), Some(shape)) = (
            self.source.layer(&layer.id),
            self.source.shape(&layer.id),
        ) else {
            log::warn!("Unknown shape layer {:?}", layer.id);
            return Ok(None);
        };
        let Some(fill) = shape.desc().fills.get(index) else {
            log::warn!("Layer {:?} has no fill {index}", layer.id);
            return Ok(None);
        };
        let bounds = self.source.layer_bounds(&layer.id);
        let frame = self.frame(layer, found.transform, bounds);
        paint::draw_fill(self.surfaces, self.source, fill, &frame, bounds)
    }

    fn draw_layer_stroke_fill(
        &mut self,
        layer: &LayerInstance,
        index: usize,
    ) -> Result<Option<PlacedImage>> {
        let (Some(found), Some(shape)) = (
            self.source.layer(&layer.id),
            self.source.shape(&layer.id),
        ) else {
            log::warn!("Unknown shape layer {:?}", layer.id);
            return Ok(None);
        };
        let Some(stroke) = shape.desc().strokes.get(index) else {
            log::warn!("Layer {:?} has no stroke {index}", layer.id);
            return Ok(None);
        };
        let area = shape.bounds(Part::Stroke(index), Affine::IDENTITY);
        let frame = self.frame(layer, found.transform, self.source.layer_bounds(&layer.id));
        paint::draw_fill(self.surfaces, self.source, &stroke.fill, &frame, area)
    }

    fn draw_layer_text(&mut self, layer: &LayerInstance) -> Result<Option<PlacedImage>> {
        let Some(found) = self.source.layer(&layer.id) else {
            log::warn!("Unknown layer {:?}", layer.id);
            return Ok(None);
        };
        let LayerKind::Text(text) = &found.kind else {
            log::warn!("Layer {:?} is not a text layer", layer.id);
            return Ok(None);
        };
        let transform = self.device_transform(layer, found.transform);
        let area = Bounds::from(text.bounds)
            .transform(transform)
            .outer_pixel_bounds();
        let Some(text_renderer) = self.text_renderer.as_deref_mut() else {
            log::debug!("No text renderer, skipping layer {:?}", layer.id);
            return Ok(None);
        };
        if area.is_empty() {
            return Ok(None);
        }
        let mut surface = self.surfaces.acquire(area)?;
        text_renderer.draw_text(text, transform, area, &mut surface);
        Ok(Some(PlacedImage::from_surface(surface, area)))
    }

    fn draw_layer_effect(
        &mut self,
        layer: &LayerInstance,
        index: usize,
        basis: Option<&PlacedImage>,
    ) -> Result<Option<PlacedImage>> {
        let Some(found) = self.source.layer(&layer.id) else {
            log::warn!("Unknown layer {:?}", layer.id);
            return Ok(None);
        };
        let Some(effect) = found.effects.get(index) else {
            log::warn!("Layer {:?} has no effect {index}", layer.id);
            return Ok(None);
        };
        let frame = self.frame(layer, found.transform, self.source.layer_bounds(&layer.id));
        effects::draw_effect(self.surfaces, self.source, &frame, effect, basis)
    }
}
