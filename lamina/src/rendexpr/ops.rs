// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Constructors of render expressions.
//!
//! `None` stands for "draws nothing". Each constructor folds away operations whose result is
//! known without evaluation, so assembled graphs stay small.

use std::sync::Arc;

use super::{ChannelMatrix, LayerInstance, Node, Rendexpr};
use crate::peniko::Mix;
use crate::shape::desc::Filter;

fn node(node: Node) -> Option<Rendexpr> {
    Some(Arc::new(node))
}

pub fn empty() -> Rendexpr {
    Arc::new(Node::Empty)
}

pub fn identity(content: Option<Rendexpr>) -> Rendexpr {
    Arc::new(Node::Identity {
        content: content.unwrap_or_else(empty),
    })
}

pub fn background() -> Rendexpr {
    Arc::new(Node::Background)
}

pub fn blend(dst: Option<Rendexpr>, src: Option<Rendexpr>, mode: Mix) -> Option<Rendexpr> {
    match (dst, src) {
        (dst, None) => dst,
        (None, src) => src,
        (Some(dst), Some(src)) => node(Node::Blend { dst, src, mode }),
    }
}

pub fn blend_ignore_alpha(
    dst: Option<Rendexpr>,
    src: Option<Rendexpr>,
    mode: Mix,
) -> Option<Rendexpr> {
    match (dst, src) {
        (dst, None) => dst,
        (None, src) => src,
        (Some(dst), Some(src)) => node(Node::BlendIgnoreAlpha { dst, src, mode }),
    }
}

pub fn mask(
    image: Option<Rendexpr>,
    mask: Option<Rendexpr>,
    channels: ChannelMatrix,
) -> Option<Rendexpr> {
    match (image, mask) {
        (Some(image), Some(mask)) if channels.is_effective() => node(Node::Mask {
            image,
            mask,
            channels,
        }),
        _ => None,
    }
}

/// Mix `src` over `dst` where `mask` covers.
///
/// Without `src` or `mask` the result is `dst`.
pub fn mix_mask(
    dst: Option<Rendexpr>,
    src: Option<Rendexpr>,
    mask: Option<Rendexpr>,
    channels: ChannelMatrix,
) -> Option<Rendexpr> {
    let (Some(src), Some(mask_expr)) = (src, mask) else {
        return dst;
    };
    if !channels.is_effective() {
        return dst;
    }
    let Some(dst) = dst else {
        return self::mask(Some(src), Some(mask_expr), channels);
    };
    if Arc::ptr_eq(&dst, &src) {
        return Some(dst);
    }
    // Blending ignoring alpha and then masking by the blended source is a plain blend.
    if let Node::BlendIgnoreAlpha {
        dst: inner_dst,
        src: inner_src,
        mode,
    } = &*src
    {
        if Arc::ptr_eq(inner_src, &mask_expr) && Arc::ptr_eq(inner_dst, &dst) {
            return node(Node::Blend {
                dst,
                src: mask_expr,
                mode: *mode,
            });
        }
    }
    node(Node::MixMask {
        dst,
        src,
        mask: mask_expr,
        channels,
    })
}

/// Mix `a` into `b` by `ratio`: 0 is all `a`, 1 is all `b`.
pub fn mix(a: Option<Rendexpr>, b: Option<Rendexpr>, ratio: f64) -> Option<Rendexpr> {
    if ratio <= 0. {
        return a;
    }
    if ratio >= 1. {
        return b;
    }
    match (a, b) {
        (None, b) => multiply_alpha(b, ratio),
        (a, None) => multiply_alpha(a, 1. - ratio),
        (Some(a), Some(b)) => node(Node::Mix { a, b, ratio }),
    }
}

pub fn multiply_alpha(image: Option<Rendexpr>, multiplier: f64) -> Option<Rendexpr> {
    if multiplier == 1. {
        return image;
    }
    if multiplier <= 0. {
        return None;
    }
    node(Node::MultiplyAlpha {
        image: image?,
        multiplier,
    })
}

pub fn draw_layer_body(layer: &LayerInstance) -> Option<Rendexpr> {
    node(Node::DrawLayerBody {
        layer: layer.clone(),
    })
}

pub fn draw_layer_stroke(layer: &LayerInstance, index: usize) -> Option<Rendexpr> {
    node(Node::DrawLayerStroke {
        layer: layer.clone(),
        index,
    })
}

pub fn draw_layer_fill(layer: &LayerInstance, index: usize) -> Option<Rendexpr> {
    node(Node::DrawLayerFill {
        layer: layer.clone(),
        index,
    })
}

pub fn draw_layer_stroke_fill(layer: &LayerInstance, index: usize) -> Option<Rendexpr> {
    node(Node::DrawLayerStrokeFill {
        layer: layer.clone(),
        index,
    })
}

pub fn draw_layer_text(layer: &LayerInstance) -> Option<Rendexpr> {
    node(Node::DrawLayerText {
        layer: layer.clone(),
    })
}

/// Apply effect `index` of `layer` to `basis`.
///
/// Only overlay effects may omit the basis; pass `needs_basis = false` for them.
pub fn draw_layer_effect(
    basis: Option<Rendexpr>,
    layer: &LayerInstance,
    index: usize,
    needs_basis: bool,
) -> Option<Rendexpr> {
    if basis.is_none() && needs_basis {
        return None;
    }
    node(Node::DrawLayerEffect {
        basis,
        layer: layer.clone(),
        index,
    })
}

pub fn apply_filter(basis: Option<Rendexpr>, filter: Filter) -> Option<Rendexpr> {
    match filter {
        Filter::OpacityMultiplier(opacity) => multiply_alpha(basis, opacity),
        _ => node(Node::ApplyFilter {
            basis: basis?,
            filter,
        }),
    }
}

/// Evaluate `content` with `background` behind it.
pub fn set_background(
    content: Option<Rendexpr>,
    background: Option<Rendexpr>,
) -> Option<Rendexpr> {
    let Some(background) = background else {
        return unset_background(content);
    };
    let content = content?;
    if matches!(*background, Node::Background) {
        return Some(content);
    }
    if matches!(*content, Node::Background) {
        return Some(background);
    }
    node(Node::SetBackground {
        content,
        background: Some(background),
    })
}

/// Evaluate `content` with nothing behind it.
pub fn unset_background(content: Option<Rendexpr>) -> Option<Rendexpr> {
    node(Node::SetBackground {
        content: content?,
        background: None,
    })
}

pub fn mix_layer_opacity(
    layer: &LayerInstance,
    a: Option<Rendexpr>,
    b: Option<Rendexpr>,
) -> Option<Rendexpr> {
    node(Node::MixLayerOpacity {
        layer: layer.clone(),
        a,
        b,
    })
}
