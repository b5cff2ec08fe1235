// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lamina renders vector design documents through a render expression graph.
//!
//! A document's layer tree is assembled into a [`Rendexpr`]: a directed acyclic graph of
//! compositing operations (fills, strokes, effects, groups, masks). The graph is immutable once
//! built and may share sub-expressions between several parents. It is used three ways:
//!
//! - [`Renderer`] evaluates it bottom-up into a [`PlacedImage`], evaluating every shared node
//!   once per pass.
//! - [`RenderGraph`] indexes it breadth-first for inspection (node index, depth and child count).
//! - [`graphviz`] exports it as a `dot` graph for diagnostics.
//!
//! Geometry comes from [`lamina_shape`], which compiles shape descriptions and rasterizes them.
//! With the `wgpu` feature (enabled by default), compiled shapes and evaluated images can also be
//! written into [`wgpu`] textures, see the [`gpu`] module.
//!
//! # Example
//!
//! ```no_run
//! use lamina::document::{Document, Layer};
//! use lamina::kurbo::Rect;
//! use lamina::peniko::Color;
//! use lamina::shape::desc::{FillDesc, PathDesc, ShapeDesc};
//! use lamina::{assemble, PixelBounds, Renderer, RendererOptions};
//!
//! let shape = ShapeDesc::new(PathDesc::rectangle(Rect::new(10., 10., 90., 90.)))
//!     .with_fill(FillDesc::color(Color::rgb8(255, 0, 0)));
//! let document = Document::new(vec![Layer::shape("square", shape)]).unwrap();
//! let root = assemble(&document);
//! let mut renderer = Renderer::new(RendererOptions::default());
//! let image = renderer
//!     .render(&document, root.as_ref(), PixelBounds::from_size(100, 100), 1.0)
//!     .unwrap();
//! let bitmap = image.to_bitmap();
//! assert_eq!(bitmap.width, 100);
//! ```

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]

pub mod animation;
mod assemble;
pub mod document;
pub mod framebuffer;
#[cfg(feature = "wgpu")]
pub mod gpu;
pub mod graphviz;
pub mod image;
pub mod rendexpr;
mod render;

pub use lamina_shape as shape;
pub use peniko;
pub use peniko::kurbo;
#[cfg(feature = "wgpu")]
pub use wgpu;

pub use assemble::assemble;
pub use framebuffer::{FramebufferPool, PooledFramebuffer, SurfaceAllocator};
pub use image::{Bitmap, Pixmap, PlacedImage, PremulColor};
pub use lamina_shape::{Bounds, Margin, PixelBounds, RenderMetrics};
pub use rendexpr::graph::RenderGraph;
pub use rendexpr::{ChannelMatrix, LayerInstance, Node, Rendexpr};
pub use render::{RenderHook, Renderer, RendererOptions, TextRenderer};

use thiserror::Error;

/// Errors that can occur in Lamina.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A shape description could not be compiled.
    #[error(transparent)]
    Shape(#[from] lamina_shape::ShapeError),
    /// Rasterization into a destination failed.
    #[error(transparent)]
    Raster(#[from] lamina_shape::RasterError),
    /// An intermediate surface would exceed the configured size limit.
    #[error("Surface of {width}x{height} exceeds the limit of {limit}")]
    SurfaceTooLarge { width: u32, height: u32, limit: u32 },
    /// Two layers of a document share an id.
    #[error("Duplicate layer id {0:?}")]
    DuplicateLayer(String),
    /// A layer id was not found in the document.
    #[error("Unknown layer {0:?}")]
    UnknownLayer(String),
    /// The layer exists but is not a shape layer.
    #[error("Layer {0:?} is not a shape layer")]
    NotAShape(String),
    /// There is no available device with the features required by Lamina.
    #[cfg(feature = "wgpu")]
    #[error("Couldn't find suitable device")]
    NoCompatibleDevice,
    /// The texture's format cannot be written by Lamina.
    #[cfg(feature = "wgpu")]
    #[error("Unsupported texture format {0:?}, expected `Rgba8Unorm`")]
    UnsupportedTextureFormat(wgpu::TextureFormat),
    /// The texture cannot be written to from the queue.
    #[cfg(feature = "wgpu")]
    #[error("Texture is missing the `COPY_DST` usage")]
    TextureNotWritable,
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;
