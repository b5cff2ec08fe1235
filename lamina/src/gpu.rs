// Copyright 2025 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Output into [`wgpu`] textures.
//!
//! Coverage is computed on the CPU and uploaded with [`wgpu::Queue::write_texture`]. Every call
//! records its own copy and leaves no bound state behind, so nothing set up here can leak into
//! the caller's later passes.

use std::rc::Rc;
use std::sync::Arc;

use wgpu::{
    Device, Extent3d, ImageCopyTexture, ImageDataLayout, Origin3d, Queue, Texture,
    TextureAspect, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
};

use crate::framebuffer::{FramebufferPool, PooledFramebuffer, SurfaceAllocator};
use crate::kurbo::Affine;
use crate::shape::compile::CompiledShape;
use crate::shape::raster::Rasterizer;
use crate::shape::{Part, RasterError};
use crate::{Error, PlacedImage, RenderMetrics, Result};

/// The only texture format Lamina writes.
pub const TEXTURE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Usages of textures created by [`TextureAllocator`].
pub const TEXTURE_USAGES: TextureUsages = TextureUsages::TEXTURE_BINDING
    .union(TextureUsages::COPY_DST)
    .union(TextureUsages::COPY_SRC)
    .union(TextureUsages::RENDER_ATTACHMENT);

/// A device and its queue, shared by texture pools and uploads.
#[derive(Clone, Debug)]
pub struct GpuContext {
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub metrics: Rc<RenderMetrics>,
}

impl GpuContext {
    pub fn new(device: Device, queue: Queue) -> Self {
        Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            metrics: Rc::new(RenderMetrics::new()),
        }
    }

    /// Request a device from the first adapter `instance` offers.
    pub async fn request(instance: &wgpu::Instance) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok_or(Error::NoCompatibleDevice)?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("lamina"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|err| {
                log::warn!("Device request failed: {err}");
                Error::NoCompatibleDevice
            })?;
        log::debug!("Using adapter {:?}", adapter.get_info().name);
        Ok(Self::new(device, queue))
    }

    /// Largest texture side the device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// A texture pool on this device.
    pub fn texture_pool(&self) -> FramebufferPool<TextureAllocator> {
        FramebufferPool::new(
            TextureAllocator {
                device: self.device.clone(),
                queue: self.queue.clone(),
            },
            self.metrics.clone(),
        )
    }

    fn check_size(&self, width: u32, height: u32) -> Result<()> {
        let limit = self.max_texture_dimension();
        if width > limit || height > limit {
            return Err(RasterError::ResourceLimit {
                width,
                height,
                limit,
            }
            .into());
        }
        Ok(())
    }

    /// Write tightly packed RGBA8 rows into the top-left `width` by `height` of `texture`.
    fn write_rgba(&self, texture: &Texture, width: u32, height: u32, data: &[u8]) {
        self.queue.write_texture(
            ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: Origin3d::ZERO,
                aspect: TextureAspect::All,
            },
            data,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Creates [`TEXTURE_FORMAT`] textures for a [`FramebufferPool`].
#[derive(Debug)]
pub struct TextureAllocator {
    device: Arc<Device>,
    queue: Arc<Queue>,
}

impl SurfaceAllocator for TextureAllocator {
    type Surface = Texture;

    fn allocate(&mut self, width: u32, height: u32) -> Result<Texture> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(RasterError::ResourceLimit {
                width,
                height,
                limit,
            }
            .into());
        }
        Ok(self.device.create_texture(&TextureDescriptor {
            label: Some("lamina framebuffer"),
            size: Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: TEXTURE_USAGES,
            view_formats: &[],
        }))
    }

    fn recycle(&mut self, surface: &mut Texture, width: u32, height: u32) {
        let (width, height) = (width.min(surface.width()), height.min(surface.height()));
        if width == 0 || height == 0 {
            return;
        }
        let zeros = vec![0_u8; 4 * width as usize * height as usize];
        self.queue.write_texture(
            surface.as_image_copy(),
            &zeros,
            ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Rasterize the body or a stroke of `shape` into the whole of `texture`.
///
/// Coverage is rasterized on the CPU by `rasterizer` and then copied into the texture with
/// [`wgpu::Queue::write_texture`]. No render or compute pass is recorded.
///
/// The texture is overwritten with white carrying the coverage in its alpha channel. It must be
/// [`TEXTURE_FORMAT`], have [`TextureUsages::COPY_DST`] and fit the device's size limit.
pub fn rasterize_to_texture(
    rasterizer: &mut Rasterizer,
    shape: &CompiledShape,
    part: impl Into<Part>,
    transform: Affine,
    context: &GpuContext,
    texture: &Texture,
) -> Result<()> {
    if texture.format() != TEXTURE_FORMAT {
        return Err(Error::UnsupportedTextureFormat(texture.format()));
    }
    if !texture.usage().contains(TextureUsages::COPY_DST) {
        return Err(Error::TextureNotWritable);
    }
    let (width, height) = (texture.width(), texture.height());
    context.check_size(width, height)?;
    let coverage =
        rasterizer.rasterize_to_vec(shape, part, transform, width, height, &context.metrics)?;
    let pixels: Vec<[u8; 4]> = coverage.iter().map(|&a| [255, 255, 255, a]).collect();
    context.write_rgba(texture, width, height, bytemuck::cast_slice(&pixels));
    Ok(())
}

/// Upload an evaluated image into a texture from `pool`, as straight-alpha RGBA8.
///
/// The image's pixel bounds map to the top-left of the texture, which may be larger.
pub fn upload_image(
    image: &PlacedImage,
    context: &GpuContext,
    pool: &FramebufferPool<TextureAllocator>,
) -> Result<PooledFramebuffer<TextureAllocator>> {
    let bitmap = image.to_bitmap();
    context.check_size(bitmap.width, bitmap.height)?;
    let texture = pool.acquire_exact(bitmap.width.max(1), bitmap.height.max(1))?;
    if bitmap.width > 0 && bitmap.height > 0 {
        context.write_rgba(&texture, bitmap.width, bitmap.height, &bitmap.data);
    }
    Ok(texture)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_usages_allow_upload_and_readback() {
        assert!(TEXTURE_USAGES.contains(TextureUsages::COPY_DST));
        assert!(TEXTURE_USAGES.contains(TextureUsages::COPY_SRC));
        assert!(TEXTURE_USAGES.contains(TextureUsages::TEXTURE_BINDING));
    }
}
