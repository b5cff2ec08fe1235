// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lamina tests.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![warn(unused_crate_dependencies)]
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![allow(missing_debug_implementations, missing_docs, clippy::print_stderr)]

use std::sync::mpsc;

use anyhow::{anyhow, Result};
use lamina::document::{Document, Layer};
use lamina::gpu::GpuContext;
use lamina::kurbo::Rect;
use lamina::peniko::Color;
use lamina::shape::desc::{FillDesc, PathDesc, ShapeDesc};
use lamina::wgpu::{self, Extent3d, ImageCopyBuffer, ImageDataLayout, Texture};
use lamina::{PixelBounds, PlacedImage, Renderer, RendererOptions};

/// A five-pointed star in a 100 by 100 box whose center pentagon is wound twice.
pub const STAR: &str = "M 50 0 L 79 90 L 2 35 L 98 35 L 21 90 Z";

pub fn star() -> PathDesc {
    PathDesc::svg(STAR)
}

/// A shape layer filling `rect` with `color`.
pub fn filled_rect(id: &str, rect: Rect, color: Color) -> Layer {
    Layer::shape(
        id,
        ShapeDesc::new(PathDesc::rectangle(rect)).with_fill(FillDesc::color(color)),
    )
}

/// Assemble and render `document` into a `width` by `height` viewport at unit scale.
pub fn render_document(document: &Document, width: u32, height: u32) -> Result<PlacedImage> {
    let root = lamina::assemble(document);
    let mut renderer = Renderer::new(RendererOptions::default());
    let image = renderer.render(
        document,
        root.as_ref(),
        PixelBounds::from_size(width, height),
        1.,
    )?;
    Ok(image)
}

/// A GPU context on the default adapter, or `None` if there is no usable adapter.
pub fn gpu_context() -> Option<GpuContext> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    match pollster::block_on(GpuContext::request(&instance)) {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("Skipping GPU test: {err}");
            None
        }
    }
}

/// Copy the top-left `width` by `height` of an RGBA8 texture back to the CPU, tightly packed.
pub fn read_texture(
    context: &GpuContext,
    texture: &Texture,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let row = 4 * width;
    let padded_row = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size: u64::from(padded_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        ImageCopyBuffer {
            buffer: &buffer,
            layout: ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: None,
            },
        },
        Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    context.queue.submit([encoder.finish()]);

    let slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    context.device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| anyhow!("mapping callback was dropped"))??;

    let mapped = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity(row as usize * height as usize);
    for chunk in mapped.chunks_exact(padded_row as usize) {
        pixels.extend_from_slice(&chunk[..row as usize]);
    }
    drop(mapped);
    buffer.unmap();
    Ok(pixels)
}
