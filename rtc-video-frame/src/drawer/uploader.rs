//! Uploads planar I420 frames into three single-channel textures

use std::sync::Arc;

use glam::Mat4;

use crate::error::Result;
use crate::frame::{
    I420Buffer, PlaneTexture, SourceFormat, TextureBuffer, TextureHandle, TextureToI420,
};

/// Keeps one set of Y/U/V textures and refills them per frame.
///
/// Textures are recreated only when the frame size changes. A texture buffer
/// handed out earlier keeps the old textures alive, but shares the current
/// ones until the next size change, so its contents follow later uploads.
#[derive(Debug, Default)]
pub struct YuvUploader {
    planes: Option<Arc<TextureHandle>>,
    size: (u32, u32),
}

impl YuvUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the three planes of `buffer` into the textures
    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffer: &I420Buffer,
    ) -> Result<Arc<TextureHandle>> {
        let [data_y, data_u, data_v] = buffer.planes()?;
        let size = (buffer.width(), buffer.height());

        let handle = match &self.planes {
            Some(handle) if self.size == size => Arc::clone(handle),
            _ => {
                tracing::debug!("Allocating YUV plane textures {}x{}", size.0, size.1);
                let (cw, ch) = (buffer.chroma_width(), buffer.chroma_height());
                let handle = Arc::new(TextureHandle::Yuv([
                    create_plane(device, "Y Plane", size.0, size.1),
                    create_plane(device, "U Plane", cw, ch),
                    create_plane(device, "V Plane", cw, ch),
                ]));
                self.planes = Some(Arc::clone(&handle));
                self.size = size;
                handle
            }
        };

        if let TextureHandle::Yuv([y, u, v]) = handle.as_ref() {
            write_plane(queue, y, &data_y, buffer.stride_y());
            write_plane(queue, u, &data_u, buffer.stride_u());
            write_plane(queue, v, &data_v, buffer.stride_v());
        }
        Ok(handle)
    }

    /// Upload and wrap the result as a `Yuv` texture buffer of the same size
    pub fn upload_to_texture_buffer(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffer: &I420Buffer,
        converter: Option<Arc<dyn TextureToI420>>,
    ) -> Result<TextureBuffer> {
        let handle = self.upload(device, queue, buffer)?;
        TextureBuffer::new(
            buffer.width(),
            buffer.height(),
            handle,
            SourceFormat::Yuv,
            Mat4::IDENTITY,
            converter,
            None,
        )
    }

    /// Drop the textures
    pub fn release(&mut self) {
        self.planes = None;
        self.size = (0, 0);
    }
}

fn create_plane(device: &wgpu::Device, label: &str, width: u32, height: u32) -> PlaneTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R8Unorm,
        usage: wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    PlaneTexture::new(texture)
}

// Unlike buffer copies, queue writes accept any row pitch, so planes go up
// with their own stride and an unpadded last row.
fn write_plane(queue: &wgpu::Queue, plane: &PlaneTexture, data: &[u8], stride: usize) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &plane.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(stride as u32),
            rows_per_image: Some(plane.height()),
        },
        wgpu::Extent3d {
            width: plane.width(),
            height: plane.height(),
            depth_or_array_layers: 1,
        },
    );
}
