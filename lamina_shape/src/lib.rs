// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shape compilation and rasterization for Lamina.
//!
//! This crate turns declarative shape descriptions into renderable geometry and draws that
//! geometry into alpha coverage buffers.
//!
//! # Contents
//!
//! - [`bounds`]: document-space and pixel-space rectangles, margins and the "unspecified" sentinel.
//! - [`desc`]: the plain value structures describing a shape, its fills and its strokes.
//! - [`compile`]: the shape compiler, producing a [`CompiledShape`] with exact graphical bounds.
//! - [`boolean`]: union, intersection, difference and exclusion of filled paths.
//! - [`raster`]: an antialiased scanline rasterizer writing into single-channel buffers.
//! - [`metrics`]: counters threaded explicitly through rasterization and resource pooling.
//!
//! The GPU-facing parts of the pipeline live in the `lamina` crate, which re-exports this one.

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

pub mod boolean;
pub mod bounds;
pub mod compile;
pub mod desc;
pub mod metrics;
pub mod raster;

pub use peniko;
pub use peniko::kurbo;

pub use bounds::{Bounds, Margin, PixelBounds};
pub use compile::{CompiledShape, Outline, Part};
pub use metrics::RenderMetrics;
pub use raster::{PixelFormat, RasterTarget, Rasterizer, RasterizerOptions};

/// Errors produced while compiling a shape description.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShapeError {
    /// The textual path data could not be parsed.
    #[error("Invalid path data: {0}")]
    InvalidPathData(String),
    /// A path of type `Path` carried no geometry.
    #[error("Path has no geometry")]
    MissingPathData,
    /// A path of type `Rectangle` carried no rectangle.
    #[error("Rectangle path has no rectangle")]
    MissingRectangle,
}

/// Errors produced by the rasterizer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RasterError {
    /// The stroke index does not name a stroke of the shape.
    #[error("Stroke index {index} out of range (shape has {count} strokes)")]
    InvalidStrokeIndex { index: usize, count: usize },
    /// The destination pixel format is not supported for this kind of destination.
    #[error("Unsupported destination format {0:?}")]
    UnsupportedFormat(PixelFormat),
    /// The destination row stride does not match its width.
    #[error("Row stride of {stride} bytes does not match width {width}")]
    StrideMismatch { stride: usize, width: u32 },
    /// The destination buffer is smaller than its declared dimensions.
    #[error("Destination buffer holds {len} bytes but {width}x{height} were declared")]
    BufferTooSmall { len: usize, width: u32, height: u32 },
    /// The requested dimensions exceed what the backend can allocate.
    #[error("Destination of {width}x{height} exceeds the limit of {limit}")]
    ResourceLimit { width: u32, height: u32, limit: u32 },
}
