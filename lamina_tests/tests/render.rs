// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Documents assembled and rendered end to end on the CPU.

#![allow(clippy::missing_assert_message)]

use anyhow::Result;
use lamina::animation::{Animation, Easing, Keyframe, LayerAnimation};
use lamina::document::{Document, Effect, EffectKind, Layer, Shadow, TextDesc};
use lamina::kurbo::{Affine, Rect, Vec2};
use lamina::peniko::Color;
use lamina::shape::desc::{
    FillDesc, Filter, ImageLayout, Paint, PathDesc, ShapeDesc, StrokeDesc, StrokePosition,
};
use lamina::{
    graphviz, Bitmap, Error, PixelBounds, Pixmap, PremulColor, RenderGraph, Renderer,
    RendererOptions, TextRenderer,
};
use lamina_tests::{filled_rect, render_document};

const RED: PremulColor = PremulColor::new(1., 0., 0., 1.);

#[test]
fn group_transforms_apply_to_children() -> Result<()> {
    let group = Layer::group(
        "group",
        vec![filled_rect("square", Rect::new(0., 0., 2., 2.), Color::rgb8(255, 0, 0))],
    )
    .with_transform(Affine::translate((2., 1.)));
    let image = render_document(&Document::new(vec![group])?, 4, 4)?;
    assert_eq!(image.sample(2, 1), RED);
    assert_eq!(image.sample(3, 2), RED);
    assert_eq!(image.sample(1, 1), PremulColor::TRANSPARENT);
    assert_eq!(image.sample(2, 0), PremulColor::TRANSPARENT);
    Ok(())
}

#[test]
fn image_fills_sample_the_document_images() -> Result<()> {
    let layer = Layer::shape(
        "picture",
        ShapeDesc::new(PathDesc::rectangle(Rect::new(0., 0., 4., 4.))).with_fill(FillDesc::new(
            Paint::Image {
                key: "pixel".into(),
                layout: ImageLayout::Stretch,
            },
        )),
    );
    let mut document = Document::new(vec![layer])?;
    let mut bitmap = Bitmap::new(1, 1);
    bitmap.data.copy_from_slice(&[0, 255, 0, 255]);
    document.insert_image("pixel", &bitmap);
    let image = render_document(&document, 4, 4)?;
    assert_eq!(image.sample(1, 2), PremulColor::new(0., 1., 0., 1.));
    Ok(())
}

#[test]
fn missing_images_draw_nothing() -> Result<()> {
    let layer = Layer::shape(
        "picture",
        ShapeDesc::new(PathDesc::rectangle(Rect::new(0., 0., 4., 4.))).with_fill(FillDesc::new(
            Paint::Image {
                key: "nowhere".into(),
                layout: ImageLayout::Fit,
            },
        )),
    );
    let image = render_document(&Document::new(vec![layer])?, 4, 4)?;
    assert_eq!(image.sample(1, 1), PremulColor::TRANSPARENT);
    Ok(())
}

#[test]
fn fill_filters_apply_before_compositing() -> Result<()> {
    let layer = Layer::shape(
        "faded",
        ShapeDesc::new(PathDesc::rectangle(Rect::new(0., 0., 2., 2.))).with_fill(
            FillDesc::color(Color::rgb8(255, 0, 0)).with_filter(Filter::OpacityMultiplier(0.5)),
        ),
    );
    let image = render_document(&Document::new(vec![layer])?, 2, 2)?;
    assert_eq!(image.sample(0, 0), PremulColor::new(0.5, 0., 0., 0.5));
    Ok(())
}

/// Fills the whole text box with the text color.
struct BlockText;

impl TextRenderer for BlockText {
    fn draw_text(
        &mut self,
        text: &TextDesc,
        _transform: Affine,
        area: PixelBounds,
        target: &mut Pixmap,
    ) {
        for y in 0..area.height() {
            target
                .row_mut(y, area.width())
                .fill(PremulColor::from(text.color));
        }
    }
}

#[test]
fn text_layers_cast_shadows() -> Result<()> {
    let text = Layer::text(
        "label",
        TextDesc {
            text: "Hi".into(),
            bounds: Rect::new(0., 0., 2., 2.),
            font_size: 2.,
            color: Color::rgb8(0, 255, 0),
        },
    )
    .with_effect(Effect::new(EffectKind::DropShadow(Shadow {
        offset: Vec2::new(2., 0.),
        blur: 0.,
        choke: 0.,
        color: Color::rgb8(0, 0, 0),
    })));
    let document = Document::new(vec![text])?;
    let root = lamina::assemble(&document);
    let mut renderer = Renderer::new(RendererOptions::default()).with_text_renderer(BlockText);
    let image = renderer.render(&document, root.as_ref(), PixelBounds::from_size(4, 2), 1.)?;
    assert_eq!(image.sample(1, 1), PremulColor::new(0., 1., 0., 1.));
    assert_eq!(image.sample(3, 1), PremulColor::new(0., 0., 0., 1.));

    // Without a text renderer, nothing is drawn.
    let image = render_document(&document, 4, 2)?;
    assert_eq!(image.sample(1, 1), PremulColor::TRANSPARENT);
    Ok(())
}

#[test]
fn updated_shapes_render_their_new_geometry() -> Result<()> {
    let mut document = Document::new(vec![filled_rect(
        "square",
        Rect::new(0., 0., 2., 2.),
        Color::rgb8(255, 0, 0),
    )])?;
    document.update_shape(
        "square",
        ShapeDesc::new(PathDesc::rectangle(Rect::new(2., 2., 4., 4.)))
            .with_fill(FillDesc::color(Color::rgb8(255, 0, 0))),
    )?;
    let image = render_document(&document, 4, 4)?;
    assert_eq!(image.sample(0, 0), PremulColor::TRANSPARENT);
    assert_eq!(image.sample(3, 3), RED);

    assert!(document.update_shape("missing", ShapeDesc::new(PathDesc::svg("M 0 0"))).is_err());
    Ok(())
}

#[test]
fn assembled_graphs_export_to_dot() -> Result<()> {
    let document = Document::new(vec![
        filled_rect("bottom", Rect::new(0., 0., 2., 2.), Color::rgb8(0, 0, 255)),
        filled_rect("top", Rect::new(1., 1., 3., 3.), Color::rgb8(255, 0, 0)),
    ])?;
    let root = lamina::assemble(&document);
    let dot = graphviz::to_dot(root.as_ref());
    assert!(dot.starts_with("digraph rendexpr {"));
    assert!(dot.contains("LayerBody"));
    assert!(dot.contains("bottom"));

    let graph = RenderGraph::new(root);
    let edges = graph
        .nodes()
        .iter()
        .map(|node| graph.child_count(node))
        .sum::<usize>();
    assert_eq!(dot.matches(" -> ").count(), edges);
    Ok(())
}

#[test]
fn oversized_geometry_and_effects_are_rejected() -> Result<()> {
    let red = Color::rgb8(255, 0, 0);
    let square = || filled_rect("square", Rect::new(0., 0., 4., 4.), red);
    let shadow = Shadow {
        offset: Vec2::new(1., 1.),
        blur: 1e10,
        choke: 0.,
        color: Color::rgb8(0, 0, 0),
    };
    let documents = [
        Document::new(vec![filled_rect("far", Rect::new(-3e9, 0., 4., 4.), red)])?,
        Document::new(vec![square().with_effect(Effect::new(EffectKind::Blur(1e10)))])?,
        Document::new(vec![square().with_effect(Effect::new(EffectKind::DropShadow(shadow)))])?,
        Document::new(vec![Layer::shape(
            "stroked",
            ShapeDesc::new(PathDesc::rectangle(Rect::new(0., 0., 4., 4.))).with_stroke(
                StrokeDesc::new(1e10, StrokePosition::Outside, FillDesc::color(red)),
            ),
        )])?,
    ];
    for document in &documents {
        let err = render_document(document, 4, 4).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<Error>(),
                Some(Error::SurfaceTooLarge { .. })
            ),
            "{err}"
        );
    }
    Ok(())
}

#[test]
fn animated_documents_render_the_current_time() -> Result<()> {
    let mut document = Document::new(vec![filled_rect(
        "square",
        Rect::new(0., 0., 2., 2.),
        Color::rgb8(255, 0, 0),
    )])?;
    document.set_animations(vec![
        LayerAnimation::new(
            "square",
            Animation::Transform(vec![
                Keyframe::new(0., Affine::IDENTITY),
                Keyframe::new(1., Affine::translate((2., 0.))).with_easing(Easing::cubic(0., 1.)),
            ]),
        ),
        LayerAnimation::new(
            "square",
            Animation::Opacity(vec![Keyframe::new(0., 1.), Keyframe::new(1., 0.5)]),
        ),
    ])?;

    let image = render_document(&document, 4, 2)?;
    assert_eq!(image.sample(0, 0), RED);
    assert_eq!(image.sample(2, 0), PremulColor::TRANSPARENT);

    document.set_time(1.);
    let image = render_document(&document, 4, 2)?;
    assert_eq!(image.sample(0, 0), PremulColor::TRANSPARENT);
    assert_eq!(image.sample(3, 1), PremulColor::new(0.5, 0., 0., 0.5));
    Ok(())
}
