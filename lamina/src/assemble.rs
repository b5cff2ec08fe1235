// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Assembly of a document's layer tree into a render expression.
//!
//! Every layer is drawn against the background formed by the layers below it. A layer splits into
//! an underlay, drawn outside its body (outer strokes, drop shadows, outer glows), and an overlay,
//! drawn inside it (fills, inner strokes, inner shadows and glows, overlays). The two are joined
//! by mixing through the body coverage, and layer opacity is applied last.

use crate::document::{Document, EffectBasis, EffectKind, Layer, LayerKind, LayerSource};
use crate::kurbo::Affine;
use crate::peniko::Mix;
use crate::rendexpr::{self, ChannelMatrix, LayerInstance, Rendexpr};
use crate::shape::desc::{Filter, StrokePosition};

/// Assemble the visible layers of `document` into a single render expression.
///
/// Returns `None` when nothing would be drawn.
pub fn assemble(document: &Document) -> Option<Rendexpr> {
    let assembler = Assembler { document };
    assembler.stack(document.layers(), Affine::IDENTITY, None)
}

/// The renditions of a layer that masks and effects can be based on.
#[derive(Clone, Default)]
struct Facets {
    body: Option<Rendexpr>,
    body_and_strokes: Option<Rendexpr>,
    fill: Option<Rendexpr>,
    layer_and_effects: Option<Rendexpr>,
}

impl Facets {
    fn uniform(facet: Option<Rendexpr>) -> Self {
        Self {
            body: facet.clone(),
            body_and_strokes: facet.clone(),
            fill: facet.clone(),
            layer_and_effects: facet,
        }
    }

    fn get(&self, basis: EffectBasis) -> Option<Rendexpr> {
        match basis {
            EffectBasis::Body => self.body.clone(),
            EffectBasis::BodyAndStrokes => self.body_and_strokes.clone(),
            EffectBasis::Fill => self.fill.clone(),
            EffectBasis::LayerAndEffects => self.layer_and_effects.clone(),
            EffectBasis::Background => Some(rendexpr::background()),
        }
    }
}

struct Assembled {
    root: Option<Rendexpr>,
    facets: Facets,
}

impl Assembled {
    fn empty() -> Self {
        Self {
            root: None,
            facets: Facets::default(),
        }
    }
}

/// The two halves of a layer while it is being built.
struct Halves {
    underlay: Option<Rendexpr>,
    overlay: Option<Rendexpr>,
}

struct Assembler<'a> {
    document: &'a Document,
}

impl Assembler<'_> {
    /// Chain `layers` bottom to top, each one drawn over what is below.
    fn stack(
        &self,
        layers: &[Layer],
        parent: Affine,
        mut content: Option<Rendexpr>,
    ) -> Option<Rendexpr> {
        for layer in layers.iter().filter(|layer| layer.visible) {
            if let Some(root) = self.layer(layer, parent).root {
                content = rendexpr::set_background(Some(root), content);
            }
        }
        content
    }

    fn layer(&self, layer: &Layer, parent: Affine) -> Assembled {
        let instance = LayerInstance::new(layer.id.as_str(), parent);
        match &layer.kind {
            LayerKind::Shape(_) => self.shape(layer, &instance),
            LayerKind::Text(_) => self.text(layer, &instance),
            LayerKind::Group { layers } => {
                let content = self.stack(
                    layers,
                    parent * layer.transform,
                    layer_background(layer),
                );
                self.group(layer, &instance, content)
            }
            LayerKind::MaskGroup {
                mask,
                basis,
                channels,
                layers,
            } => {
                let inner = parent * layer.transform;
                let mask_layer = self.layer(mask, inner);
                let mut content = layer_background(layer);
                if mask.visible {
                    if let Some(root) = mask_layer.root {
                        content = rendexpr::set_background(Some(root), content);
                    }
                }
                let content = self.stack(layers, inner, content);
                let facet = mask_layer.facets.get((*basis).into());
                if facet.is_none() {
                    log::debug!("Mask of {:?} draws nothing, hiding its content", layer.id);
                }
                let masked = rendexpr::mix_mask(
                    Some(rendexpr::background()),
                    content,
                    facet,
                    *channels,
                );
                self.group(layer, &instance, masked)
            }
        }
    }

    fn shape(&self, layer: &Layer, instance: &LayerInstance) -> Assembled {
        let Some(shape) = self.document.shape(&layer.id) else {
            return Assembled::empty();
        };
        let desc = shape.desc();
        let body = rendexpr::draw_layer_body(instance);

        let mut combined_fill = None;
        for (i, fill) in desc.fills.iter().enumerate().filter(|(_, f)| f.visible) {
            let drawn = apply_filters(rendexpr::draw_layer_fill(instance, i), &fill.filters);
            combined_fill = rendexpr::blend(combined_fill, drawn, fill.blend_mode);
        }

        let mut body_and_strokes = body.clone();
        let mut strokes = Vec::new();
        for (i, stroke) in desc.strokes.iter().enumerate().filter(|(_, s)| s.visible) {
            let stroke_body = rendexpr::draw_layer_stroke(instance, i);
            if stroke.position != StrokePosition::Inside {
                body_and_strokes =
                    rendexpr::blend(body_and_strokes, stroke_body.clone(), Mix::Normal);
            }
            if stroke.fill.visible {
                let fill = apply_filters(
                    rendexpr::draw_layer_stroke_fill(instance, i),
                    &stroke.fill.filters,
                );
                let drawn = rendexpr::mask(fill, stroke_body, ChannelMatrix::ALPHA);
                strokes.push((stroke.position, stroke.fill.blend_mode, drawn));
            }
        }

        let facets = Facets {
            fill: rendexpr::mask(combined_fill.clone(), body.clone(), ChannelMatrix::ALPHA),
            body: body.clone(),
            body_and_strokes,
            layer_and_effects: None,
        };
        let underlay = layer_background(layer);
        let fill = self.replace_fill(layer, instance, combined_fill, &facets);
        let mut halves = Halves {
            overlay: rendexpr::blend(underlay.clone(), fill, layer.blend_mode),
            underlay,
        };
        for (position, mode, drawn) in strokes {
            halves.place(position, drawn, mode);
        }
        self.foreground_effects(layer, instance, &facets, &mut halves);
        self.finish(layer, instance, halves, body, facets)
    }

    /// Apply blur effects that act on the fill itself rather than adding to the layer.
    fn replace_fill(
        &self,
        layer: &Layer,
        instance: &LayerInstance,
        mut fill: Option<Rendexpr>,
        facets: &Facets,
    ) -> Option<Rendexpr> {
        for (i, effect) in layer.effects.iter().enumerate() {
            if !effect.visible || !matches!(effect.kind, EffectKind::Blur(_)) {
                continue;
            }
            match effect_basis(layer, effect.basis, &effect.kind) {
                EffectBasis::Background => {
                    let behind = rendexpr::draw_layer_effect(
                        Some(rendexpr::background()),
                        instance,
                        i,
                        true,
                    );
                    let behind = apply_filters(behind, &effect.filters);
                    fill = rendexpr::blend(behind, fill, Mix::Normal);
                }
                EffectBasis::LayerAndEffects => {}
                _ => {
                    let blurred =
                        rendexpr::draw_layer_effect(facets.fill.clone(), instance, i, true);
                    fill = apply_filters(blurred, &effect.filters);
                }
            }
        }
        fill
    }

    fn text(&self, layer: &Layer, instance: &LayerInstance) -> Assembled {
        let text = rendexpr::draw_layer_text(instance);
        let facets = Facets::uniform(text.clone());
        let underlay = layer_background(layer);
        let mut halves = Halves {
            overlay: rendexpr::blend_ignore_alpha(underlay.clone(), text.clone(), layer.blend_mode),
            underlay,
        };
        self.foreground_effects(layer, instance, &facets, &mut halves);
        self.finish(layer, instance, halves, text, facets)
    }

    /// Groups and mask groups. A normal group without effects passes its children through to the
    /// background; anything else is composited as an isolated unit.
    fn group(
        &self,
        layer: &Layer,
        instance: &LayerInstance,
        content: Option<Rendexpr>,
    ) -> Assembled {
        let passes_through = layer.blend_mode == Mix::Normal
            && !layer.effects.iter().any(|effect| effect.visible);
        if passes_through {
            return Assembled {
                root: rendexpr::mix_layer_opacity(
                    instance,
                    Some(rendexpr::background()),
                    content.clone(),
                ),
                facets: Facets::uniform(rendexpr::unset_background(content)),
            };
        }
        let isolated = rendexpr::unset_background(content);
        let facets = Facets::uniform(isolated.clone());
        let underlay = layer_background(layer);
        let mut halves = Halves {
            overlay: rendexpr::blend_ignore_alpha(
                underlay.clone(),
                isolated.clone(),
                layer.blend_mode,
            ),
            underlay,
        };
        self.foreground_effects(layer, instance, &facets, &mut halves);
        self.finish(layer, instance, halves, isolated, facets)
    }

    /// Effects drawn under or over the layer, based on one of its facets.
    fn foreground_effects(
        &self,
        layer: &Layer,
        instance: &LayerInstance,
        facets: &Facets,
        halves: &mut Halves,
    ) {
        for (i, effect) in layer.effects.iter().enumerate() {
            if !effect.visible {
                continue;
            }
            let basis = effect_basis(layer, effect.basis, &effect.kind);
            if basis == EffectBasis::LayerAndEffects || matches!(effect.kind, EffectKind::Blur(_)) {
                continue;
            }
            let drawn = rendexpr::draw_layer_effect(
                facets.get(basis),
                instance,
                i,
                effect.needs_basis(),
            );
            let drawn = apply_filters(drawn, &effect.filters);
            let mode = effect.blend_mode;
            match &effect.kind {
                EffectKind::Overlay(_) | EffectKind::InnerShadow(_) | EffectKind::InnerGlow(_) => {
                    halves.overlay = rendexpr::blend(halves.overlay.take(), drawn, mode);
                }
                EffectKind::DropShadow(_) | EffectKind::OuterGlow(_) => {
                    halves.underlay = rendexpr::blend(halves.underlay.take(), drawn, mode);
                }
                EffectKind::Stroke { position, .. } => halves.place(*position, drawn, mode),
                EffectKind::Blur(_) => {}
            }
        }
    }

    /// Join the halves through `mask`, apply effects based on the whole layer, then opacity.
    fn finish(
        &self,
        layer: &Layer,
        instance: &LayerInstance,
        halves: Halves,
        mask: Option<Rendexpr>,
        mut facets: Facets,
    ) -> Assembled {
        let mut render =
            rendexpr::mix_mask(halves.underlay, halves.overlay, mask, ChannelMatrix::ALPHA);
        let mut whole = None;
        for (i, effect) in layer.effects.iter().enumerate() {
            if !effect.visible
                || effect_basis(layer, effect.basis, &effect.kind) != EffectBasis::LayerAndEffects
            {
                continue;
            }
            let current = whole.clone().or_else(|| render.clone());
            let drawn =
                rendexpr::draw_layer_effect(current.clone(), instance, i, effect.needs_basis());
            let drawn = apply_filters(drawn, &effect.filters);
            let mode = effect.blend_mode;
            whole = match &effect.kind {
                EffectKind::Blur(_) => drawn,
                EffectKind::DropShadow(_) | EffectKind::OuterGlow(_) => {
                    rendexpr::blend(drawn, current, mode)
                }
                EffectKind::Stroke {
                    position: StrokePosition::Outside,
                    ..
                } => rendexpr::blend(drawn, current, mode),
                _ => rendexpr::blend(current, drawn, mode),
            };
        }
        facets.layer_and_effects = match whole {
            Some(whole) => {
                render = rendexpr::blend(
                    Some(rendexpr::background()),
                    Some(whole.clone()),
                    layer.blend_mode,
                );
                Some(whole)
            }
            None => rendexpr::unset_background(render.clone()),
        };
        Assembled {
            root: rendexpr::mix_layer_opacity(instance, Some(rendexpr::background()), render),
            facets,
        }
    }
}

impl Halves {
    /// Outer parts go under the layer and inner parts over it; centered ones go to both.
    fn place(&mut self, position: StrokePosition, drawn: Option<Rendexpr>, mode: Mix) {
        if position != StrokePosition::Inside {
            self.underlay = rendexpr::blend(self.underlay.take(), drawn.clone(), mode);
        }
        if position != StrokePosition::Outside {
            self.overlay = rendexpr::blend(self.overlay.take(), drawn, mode);
        }
    }
}

/// What a layer is drawn against before it is composited with its background.
///
/// Layers with effects based on the whole layer are drawn against nothing and blended with the
/// background at the end.
fn layer_background(layer: &Layer) -> Option<Rendexpr> {
    let isolated = layer.effects.iter().any(|effect| {
        effect.visible
            && effect_basis(layer, effect.basis, &effect.kind) == EffectBasis::LayerAndEffects
    });
    (!isolated).then(rendexpr::background)
}

/// Blurs of text and groups always act on the whole layer.
fn effect_basis(layer: &Layer, basis: EffectBasis, kind: &EffectKind) -> EffectBasis {
    if matches!(kind, EffectKind::Blur(_)) && !matches!(layer.kind, LayerKind::Shape(_)) {
        EffectBasis::LayerAndEffects
    } else {
        basis
    }
}

fn apply_filters(expr: Option<Rendexpr>, filters: &[Filter]) -> Option<Rendexpr> {
    filters
        .iter()
        .fold(expr, |expr, filter| rendexpr::apply_filter(expr, *filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Effect, MaskBasis, Shadow};
    use crate::kurbo::{Rect, Vec2};
    use crate::peniko::Color;
    use crate::rendexpr::graph::RenderGraph;
    use crate::shape::desc::{FillDesc, PathDesc, ShapeDesc, StrokeDesc};
    use crate::{PixelBounds, PlacedImage, PremulColor, Renderer, RendererOptions};

    const RED: PremulColor = PremulColor::new(1., 0., 0., 1.);
    const BLUE: PremulColor = PremulColor::new(0., 0., 1., 1.);

    fn square(id: &str, x0: f64, size: f64, color: Color) -> Layer {
        Layer::shape(
            id,
            ShapeDesc::new(PathDesc::rectangle(Rect::new(x0, x0, x0 + size, x0 + size)))
                .with_fill(FillDesc::color(color)),
        )
    }

    fn render(document: &Document, size: u32) -> PlacedImage {
        let root = assemble(document);
        Renderer::new(RendererOptions::default())
            .render(document, root.as_ref(), PixelBounds::from_size(size, size), 1.)
            .unwrap()
    }

    #[test]
    fn filled_square() {
        let doc = Document::new(vec![square("a", 2., 4., Color::rgb8(255, 0, 0))]).unwrap();
        let image = render(&doc, 8);
        assert_eq!(image.sample(3, 3), RED);
        assert_eq!(image.sample(5, 5), RED);
        assert_eq!(image.sample(1, 1), PremulColor::TRANSPARENT);
        assert_eq!(image.sample(6, 6), PremulColor::TRANSPARENT);
    }

    #[test]
    fn later_layers_draw_on_top() {
        let doc = Document::new(vec![
            square("bottom", 0., 4., Color::rgb8(0, 0, 255)),
            square("top", 2., 4., Color::rgb8(255, 0, 0)),
        ])
        .unwrap();
        let image = render(&doc, 8);
        assert_eq!(image.sample(1, 1), BLUE);
        assert_eq!(image.sample(3, 3), RED);
        assert_eq!(image.sample(5, 5), RED);
        assert_eq!(image.sample(1, 5), PremulColor::TRANSPARENT);
    }

    #[test]
    fn opacity_is_applied_last() {
        let doc = Document::new(vec![
            square("a", 0., 2., Color::rgb8(255, 0, 0)).with_opacity(0.5)
        ])
        .unwrap();
        let image = render(&doc, 2);
        assert_eq!(image.sample(0, 0), PremulColor::new(0.5, 0., 0., 0.5));
    }

    #[test]
    fn hidden_layers_are_skipped() {
        let doc = Document::new(vec![
            square("a", 0., 2., Color::rgb8(255, 0, 0)).with_visible(false)
        ])
        .unwrap();
        assert!(assemble(&doc).is_none());
    }

    #[test]
    fn outside_strokes_draw_around_the_body() {
        let shape = ShapeDesc::new(PathDesc::rectangle(Rect::new(2., 2., 6., 6.)))
            .with_fill(FillDesc::color(Color::rgb8(255, 0, 0)))
            .with_stroke(StrokeDesc::new(
                1.,
                StrokePosition::Outside,
                FillDesc::color(Color::rgb8(0, 0, 255)),
            ));
        let doc = Document::new(vec![Layer::shape("a", shape)]).unwrap();
        let image = render(&doc, 8);
        assert_eq!(image.sample(1, 3), BLUE);
        assert_eq!(image.sample(2, 3), RED);
        assert_eq!(image.sample(0, 3), PremulColor::TRANSPARENT);
    }

    #[test]
    fn center_strokes_are_shared_by_both_halves() {
        let shape = ShapeDesc::new(PathDesc::rectangle(Rect::new(2., 2., 6., 6.)))
            .with_fill(FillDesc::color(Color::rgb8(255, 0, 0)))
            .with_stroke(StrokeDesc::new(
                2.,
                StrokePosition::Center,
                FillDesc::color(Color::rgb8(0, 0, 255)),
            ));
        let doc = Document::new(vec![Layer::shape("a", shape)]).unwrap();
        let root = assemble(&doc).unwrap();
        let graph = RenderGraph::new(Some(root.clone()));
        let strokes: Vec<_> = graph
            .nodes()
            .iter()
            .filter(|n| n.short_name() == "LayerStroke")
            .collect();
        assert_eq!(strokes.len(), 1);
        let stroke_render = graph
            .nodes()
            .iter()
            .find(|n| {
                n.short_name() == "Mask"
                    && n.children()
                        .iter()
                        .any(|(_, c)| c.is_some_and(|c| std::sync::Arc::ptr_eq(c, strokes[0])))
            })
            .unwrap();
        let parents = graph
            .nodes()
            .iter()
            .flat_map(|n| n.children())
            .filter(|(_, c)| c.is_some_and(|c| std::sync::Arc::ptr_eq(c, stroke_render)))
            .count();
        assert_eq!(parents, 2);

        let mut renderer = Renderer::new(RendererOptions::default());
        let image = renderer
            .render(&doc, Some(&root), PixelBounds::from_size(8, 8), 1.)
            .unwrap();
        assert_eq!(image.sample(1, 3), BLUE);
        assert_eq!(image.sample(2, 3), BLUE);
        assert_eq!(image.sample(3, 3), RED);
        assert!(renderer.metrics().cache_hits() > 0);
    }

    #[test]
    fn group_blend_modes_isolate_children() {
        let group = Layer::group("g", vec![square("cyan", 0., 2., Color::rgb8(0, 255, 255))])
            .with_blend_mode(Mix::Multiply);
        let doc = Document::new(vec![square("yellow", 0., 2., Color::rgb8(255, 255, 0)), group])
            .unwrap();
        let image = render(&doc, 2);
        assert_eq!(image.sample(1, 1), PremulColor::new(0., 1., 0., 1.));
    }

    #[test]
    fn pass_through_groups_chain_children() {
        let group = Layer::group(
            "g",
            vec![
                square("under", 0., 2., Color::rgb8(0, 0, 255)),
                square("over", 1., 2., Color::rgb8(255, 0, 0)),
            ],
        );
        let doc = Document::new(vec![group]).unwrap();
        let image = render(&doc, 3);
        assert_eq!(image.sample(0, 0), BLUE);
        assert_eq!(image.sample(1, 1), RED);
        assert_eq!(image.sample(2, 2), RED);
    }

    #[test]
    fn mask_groups_clip_to_the_mask() {
        let group = Layer::mask_group(
            "mg",
            square("mask", 0., 2., Color::rgb8(255, 255, 255)),
            MaskBasis::Body,
            ChannelMatrix::ALPHA,
            vec![square("content", 0., 4., Color::rgb8(255, 0, 0))],
        );
        let doc = Document::new(vec![group]).unwrap();
        let image = render(&doc, 4);
        assert_eq!(image.sample(1, 1), RED);
        assert_eq!(image.sample(3, 3), PremulColor::TRANSPARENT);
        assert_eq!(image.sample(3, 0), PremulColor::TRANSPARENT);
    }

    #[test]
    fn invisible_masks_still_mask() {
        let group = Layer::mask_group(
            "mg",
            square("mask", 0., 2., Color::rgb8(255, 255, 255)).with_visible(false),
            MaskBasis::Body,
            ChannelMatrix::ALPHA,
            vec![square("content", 0., 4., Color::rgb8(0, 0, 255))],
        );
        let doc = Document::new(vec![group]).unwrap();
        let image = render(&doc, 4);
        assert_eq!(image.sample(1, 1), BLUE);
        assert_eq!(image.sample(3, 3), PremulColor::TRANSPARENT);
    }

    #[test]
    fn drop_shadows_go_under_the_body() {
        let shadow = Shadow {
            offset: Vec2::new(2., 0.),
            blur: 0.,
            choke: 0.,
            color: Color::rgb8(0, 0, 0),
        };
        let layer = square("a", 2., 4., Color::rgb8(255, 0, 0))
            .with_effect(Effect::new(EffectKind::DropShadow(shadow)));
        let doc = Document::new(vec![layer]).unwrap();
        let image = render(&doc, 10);
        assert_eq!(image.sample(4, 3), RED);
        assert_eq!(image.sample(6, 3), PremulColor::new(0., 0., 0., 1.));
        assert_eq!(image.sample(7, 3), PremulColor::new(0., 0., 0., 1.));
        assert_eq!(image.sample(8, 3), PremulColor::TRANSPARENT);
    }

    #[test]
    fn whole_layer_blur_is_composited_at_the_end() {
        let layer = square("a", 4., 4., Color::rgb8(255, 0, 0)).with_effect(
            Effect::new(EffectKind::Blur(1.)).with_basis(EffectBasis::LayerAndEffects),
        );
        let doc = Document::new(vec![layer]).unwrap();
        let image = render(&doc, 12);
        let outside = image.sample(3, 5);
        assert!(outside.a > 0. && outside.a < 1.);
        assert_eq!(outside.g, 0.);
        assert!(image.sample(5, 5).a < 1.);
    }
}
