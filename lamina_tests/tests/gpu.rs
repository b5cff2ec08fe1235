// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Texture output on a real device.
//!
//! These tests are skipped when `LAMINA_CI_GPU_SUPPORT=no`, and pass trivially when no adapter
//! is available.

#![allow(clippy::missing_assert_message)]

use anyhow::Result;
use lamina::document::Document;
use lamina::gpu::{self, TEXTURE_FORMAT};
use lamina::kurbo::{Affine, Rect};
use lamina::peniko::Color;
use lamina::shape::compile::CompiledShape;
use lamina::shape::desc::{PathDesc, ShapeDesc};
use lamina::shape::raster::{Rasterizer, RasterizerOptions};
use lamina::shape::Part;
use lamina::wgpu::{self, Extent3d, TextureDescriptor, TextureDimension, TextureUsages};
use lamina::Error;
use lamina_tests::{filled_rect, gpu_context, read_texture, render_document};

fn texture(
    context: &gpu::GpuContext,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: TextureUsages,
) -> wgpu::Texture {
    context.device.create_texture(&TextureDescriptor {
        label: None,
        size: Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn coverage_is_written_as_white_alpha() -> Result<()> {
    let Some(context) = gpu_context() else {
        return Ok(());
    };
    let shape = CompiledShape::compile(&ShapeDesc::new(PathDesc::rectangle(Rect::new(
        2., 2., 6., 6.,
    ))))?;
    let target = texture(
        &context,
        8,
        8,
        TEXTURE_FORMAT,
        TextureUsages::COPY_DST | TextureUsages::COPY_SRC,
    );
    let mut rasterizer = Rasterizer::new(RasterizerOptions::default());
    gpu::rasterize_to_texture(
        &mut rasterizer,
        &shape,
        Part::Body,
        Affine::IDENTITY,
        &context,
        &target,
    )?;
    let pixels = read_texture(&context, &target, 8, 8)?;
    let at = |x: usize, y: usize| &pixels[(y * 8 + x) * 4..][..4];
    assert_eq!(at(3, 3), [255, 255, 255, 255]);
    assert_eq!(at(0, 0), [255, 255, 255, 0]);
    assert_eq!(context.metrics.rasterizations(), 1);
    Ok(())
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn unsuitable_textures_are_rejected() -> Result<()> {
    let Some(context) = gpu_context() else {
        return Ok(());
    };
    let shape = CompiledShape::compile(&ShapeDesc::new(PathDesc::rectangle(Rect::new(
        0., 0., 4., 4.,
    ))))?;
    let mut rasterizer = Rasterizer::new(RasterizerOptions::default());

    let wrong_format = texture(
        &context,
        4,
        4,
        wgpu::TextureFormat::Rgba16Float,
        TextureUsages::COPY_DST,
    );
    let result = gpu::rasterize_to_texture(
        &mut rasterizer,
        &shape,
        Part::Body,
        Affine::IDENTITY,
        &context,
        &wrong_format,
    );
    assert!(matches!(result, Err(Error::UnsupportedTextureFormat(_))));

    let read_only = texture(&context, 4, 4, TEXTURE_FORMAT, TextureUsages::TEXTURE_BINDING);
    let result = gpu::rasterize_to_texture(
        &mut rasterizer,
        &shape,
        Part::Body,
        Affine::IDENTITY,
        &context,
        &read_only,
    );
    assert!(matches!(result, Err(Error::TextureNotWritable)));

    let result = gpu::rasterize_to_texture(
        &mut rasterizer,
        &shape,
        Part::Stroke(3),
        Affine::IDENTITY,
        &context,
        &texture(&context, 4, 4, TEXTURE_FORMAT, TextureUsages::COPY_DST),
    );
    assert!(matches!(result, Err(Error::Raster(_))));
    assert_eq!(context.metrics.rasterizations(), 0);
    Ok(())
}

#[test]
#[cfg_attr(skip_gpu_tests, ignore)]
fn evaluated_images_upload_into_pooled_textures() -> Result<()> {
    let Some(context) = gpu_context() else {
        return Ok(());
    };
    let document = Document::new(vec![filled_rect(
        "square",
        Rect::new(0., 0., 2., 2.),
        Color::rgb8(255, 0, 0),
    )])?;
    let image = render_document(&document, 4, 4)?;
    let pool = context.texture_pool().with_granularity(16);

    let uploaded = gpu::upload_image(&image, &context, &pool)?;
    assert_eq!((uploaded.width(), uploaded.height()), (4, 4));
    let pixels = read_texture(&context, &uploaded, 4, 4)?;
    assert_eq!(&pixels[..4], [255, 0, 0, 255]);
    assert_eq!(&pixels[(3 * 4 + 3) * 4..], [0, 0, 0, 0]);
    drop(uploaded);

    let again = gpu::upload_image(&image, &context, &pool)?;
    drop(again);
    assert_eq!(context.metrics.surfaces_created(), 1);
    assert_eq!(context.metrics.surfaces_reused(), 1);
    Ok(())
}
