// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render expression graph.
//!
//! A [`Rendexpr`] is a shared reference to an immutable [`Node`]. Nodes reference their
//! children through `Arc`s, so one sub-expression can feed several parents and the graph is a
//! DAG rather than a tree. Node identity is the `Arc` allocation ([`NodeId`]); two structurally
//! equal nodes built separately are distinct.
//!
//! Every traversal in the crate goes through [`Node::children`], which lists the named child
//! slots of a node in a fixed order.

pub mod graph;
mod ops;

use std::sync::Arc;

use smallvec::SmallVec;

use crate::kurbo::Affine;
use crate::peniko::Mix;
use crate::shape::desc::Filter;

pub use ops::*;

/// A shared reference to a render expression node.
pub type Rendexpr = Arc<Node>;

/// The identity of a node: the address of its allocation.
///
/// Only meaningful while some [`Rendexpr`] keeps the node alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of(expr: &Rendexpr) -> Self {
        Self(Arc::as_ptr(expr) as usize)
    }
}

/// Weights of the red, green, blue and alpha channels plus a constant, mapping a straight-alpha
/// color to a mask value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelMatrix(pub [f64; 5]);

impl ChannelMatrix {
    /// Mask by alpha.
    pub const ALPHA: Self = Self([0., 0., 0., 1., 0.]);
    /// Mask by Rec. 709 luminance.
    pub const LUMINANCE: Self = Self([0.2126, 0.7152, 0.0722, 0., 0.]);

    /// Whether any coefficient can make the mask non-zero.
    pub fn is_effective(&self) -> bool {
        self.0.iter().any(|&m| m > 0.)
    }
}

impl Default for ChannelMatrix {
    fn default() -> Self {
        Self::ALPHA
    }
}

/// The document layer a node draws, with the accumulated transform of its ancestors.
///
/// Only the layer id is kept; layers are resolved through a
/// [`LayerSource`](crate::document::LayerSource) when drawing.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerInstance {
    pub id: Arc<str>,
    pub parent_transform: Affine,
}

impl LayerInstance {
    pub fn new(id: impl Into<Arc<str>>, parent_transform: Affine) -> Self {
        Self {
            id: id.into(),
            parent_transform,
        }
    }
}

/// A node of the render expression graph.
#[derive(Debug)]
pub enum Node {
    /// Nothing.
    Empty,
    /// Its content, unchanged.
    Identity { content: Rendexpr },
    /// `src` composited onto `dst` with a blend mode.
    Blend {
        dst: Rendexpr,
        src: Rendexpr,
        mode: Mix,
    },
    /// `src` composited onto `dst` as if `src` were opaque wherever it is placed.
    BlendIgnoreAlpha {
        dst: Rendexpr,
        src: Rendexpr,
        mode: Mix,
    },
    /// `image` multiplied by a channel of `mask`.
    Mask {
        image: Rendexpr,
        mask: Rendexpr,
        channels: ChannelMatrix,
    },
    /// `dst` and `src` mixed by a channel of `mask`.
    MixMask {
        dst: Rendexpr,
        src: Rendexpr,
        mask: Rendexpr,
        channels: ChannelMatrix,
    },
    /// `a` and `b` mixed by a constant ratio.
    Mix { a: Rendexpr, b: Rendexpr, ratio: f64 },
    /// `image` with alpha multiplied by a constant.
    MultiplyAlpha { image: Rendexpr, multiplier: f64 },
    /// Coverage of a layer's body.
    DrawLayerBody { layer: LayerInstance },
    /// Coverage of one of a layer's strokes.
    DrawLayerStroke { layer: LayerInstance, index: usize },
    /// One of a layer's fills, unmasked, over the layer's bounds.
    DrawLayerFill { layer: LayerInstance, index: usize },
    /// The fill of one of a layer's strokes, unmasked, over the stroke's bounds.
    DrawLayerStrokeFill { layer: LayerInstance, index: usize },
    /// A text layer's glyphs.
    DrawLayerText { layer: LayerInstance },
    /// One of a layer's effects applied to `basis`. Overlay effects have no basis.
    DrawLayerEffect {
        basis: Option<Rendexpr>,
        layer: LayerInstance,
        index: usize,
    },
    /// A filter applied to `basis`.
    ApplyFilter { basis: Rendexpr, filter: Filter },
    /// Whatever the innermost enclosing [`Node::SetBackground`] put behind its content.
    Background,
    /// `content`, evaluated with `background` as its [`Node::Background`].
    ///
    /// A missing background makes `Background` evaluate to nothing inside `content`.
    SetBackground {
        content: Rendexpr,
        background: Option<Rendexpr>,
    },
    /// `a` and `b` mixed by the layer's opacity.
    MixLayerOpacity {
        layer: LayerInstance,
        a: Option<Rendexpr>,
        b: Option<Rendexpr>,
    },
}

/// The named child slots of a node, in evaluation order. Empty optional slots are `None`.
pub type Children<'a> = SmallVec<[(&'static str, Option<&'a Rendexpr>); 3]>;

impl Node {
    /// The named child slots of this node, in evaluation order.
    pub fn children(&self) -> Children<'_> {
        let mut out = Children::new();
        match self {
            Self::Empty
            | Self::Background
            | Self::DrawLayerBody { .. }
            | Self::DrawLayerStroke { .. }
            | Self::DrawLayerFill { .. }
            | Self::DrawLayerStrokeFill { .. }
            | Self::DrawLayerText { .. } => {}
            Self::Identity { content } => out.push(("content", Some(content))),
            Self::Blend { dst, src, .. } | Self::BlendIgnoreAlpha { dst, src, .. } => {
                out.push(("dst", Some(dst)));
                out.push(("src", Some(src)));
            }
            Self::Mask { image, mask, .. } => {
                out.push(("image", Some(image)));
                out.push(("mask", Some(mask)));
            }
            Self::MixMask { dst, src, mask, .. } => {
                out.push(("dst", Some(dst)));
                out.push(("src", Some(src)));
                out.push(("mask", Some(mask)));
            }
            Self::Mix { a, b, .. } => {
                out.push(("a", Some(a)));
                out.push(("b", Some(b)));
            }
            Self::MultiplyAlpha { image, .. } => out.push(("image", Some(image))),
            Self::DrawLayerEffect { basis, .. } => out.push(("basis", basis.as_ref())),
            Self::ApplyFilter { basis, .. } => out.push(("basis", Some(basis))),
            Self::SetBackground {
                content,
                background,
            } => {
                out.push(("content", Some(content)));
                out.push(("background", background.as_ref()));
            }
            Self::MixLayerOpacity { a, b, .. } => {
                out.push(("a", a.as_ref()));
                out.push(("b", b.as_ref()));
            }
        }
        out
    }

    /// The layer this node draws, if any.
    pub fn layer(&self) -> Option<&LayerInstance> {
        match self {
            Self::DrawLayerBody { layer }
            | Self::DrawLayerStroke { layer, .. }
            | Self::DrawLayerFill { layer, .. }
            | Self::DrawLayerStrokeFill { layer, .. }
            | Self::DrawLayerText { layer }
            | Self::DrawLayerEffect { layer, .. }
            | Self::MixLayerOpacity { layer, .. } => Some(layer),
            _ => None,
        }
    }

    /// A short name for the node kind, used in diagnostics.
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Empty => "Empty",
            Self::Identity { .. } => "Identity",
            Self::Blend { .. } => "Blend",
            Self::BlendIgnoreAlpha { .. } => "Blend-IA",
            Self::Mask { .. } => "Mask",
            Self::MixMask { .. } => "MixMask",
            Self::Mix { .. } => "Mix",
            Self::MultiplyAlpha { .. } => "AlphaMult",
            Self::DrawLayerBody { .. } => "LayerBody",
            Self::DrawLayerStroke { .. } => "LayerStroke",
            Self::DrawLayerFill { .. } => "LayerFill",
            Self::DrawLayerStrokeFill { .. } => "LayerStrokeFill",
            Self::DrawLayerText { .. } => "LayerText",
            Self::DrawLayerEffect { .. } => "LayerEffect",
            Self::ApplyFilter { .. } => "ApplyFilter",
            Self::Background => "BG",
            Self::SetBackground { .. } => "SetBG",
            Self::MixLayerOpacity { .. } => "MixLayerOpacity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_are_listed_in_slot_order() {
        let a: Rendexpr = Arc::new(Node::Empty);
        let b: Rendexpr = Arc::new(Node::Background);
        let mask = Arc::new(Node::Empty);
        let node = Node::MixMask {
            dst: a.clone(),
            src: b.clone(),
            mask: mask.clone(),
            channels: ChannelMatrix::ALPHA,
        };
        let names: Vec<_> = node.children().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["dst", "src", "mask"]);
        assert!(Arc::ptr_eq(node.children()[1].1.unwrap(), &b));
    }

    #[test]
    fn optional_slots_are_reported_empty() {
        let content = Arc::new(Node::Empty);
        let node = Node::SetBackground {
            content,
            background: None,
        };
        let children = node.children();
        assert_eq!(children.len(), 2);
        assert!(children[1].1.is_none());
    }

    #[test]
    fn identity_is_by_allocation() {
        let a: Rendexpr = Arc::new(Node::Empty);
        let b: Rendexpr = Arc::new(Node::Empty);
        assert_ne!(NodeId::of(&a), NodeId::of(&b));
        assert_eq!(NodeId::of(&a), NodeId::of(&a.clone()));
    }

    #[test]
    fn channel_matrix_effectiveness() {
        assert!(ChannelMatrix::ALPHA.is_effective());
        assert!(!ChannelMatrix([0., 0., 0., 0., 0.]).is_effective());
        assert!(!ChannelMatrix([-1., 0., 0., 0., 0.]).is_effective());
    }
}
