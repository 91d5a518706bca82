//! Draws `VideoFrame`s of any buffer type, applying their rotation

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use super::{DrawParams, GenericDrawer, RenderTarget, Viewport, YuvUploader};
use crate::error::{FrameError, Result};
use crate::frame::{
    FrameBuffer, I420Buffer, PlaneTexture, Rotation, SourceFormat, TextureBuffer, TextureHandle,
    TextureToI420, VideoFrame,
};
use crate::gpu_context::GpuContext;
use crate::shaders::PASSTHROUGH_FRAGMENT;

/// Texture-coordinate transform for drawing a frame upright.
///
/// `additional` is applied to the output coordinates first, then the
/// clockwise `rotation` about the center of the unit square.
pub fn render_matrix(rotation: Rotation, additional: Mat4) -> Mat4 {
    let angle = -(rotation.degrees() as f32).to_radians();
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0))
        * Mat4::from_rotation_z(angle)
        * Mat4::from_translation(Vec3::new(-0.5, -0.5, 0.0))
        * additional
}

/// Frame size before and after the additional render matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInformation {
    /// Rotated frame width
    pub frame_width: u32,
    pub frame_height: u32,
    /// Size of the frame as laid out by the additional matrix
    pub render_width: u32,
    pub render_height: u32,
}

impl FrameInformation {
    pub fn new(frame: &VideoFrame, additional: Option<&Mat4>) -> Self {
        let frame_width = frame.rotated_width();
        let frame_height = frame.rotated_height();
        let Some(m) = additional else {
            return Self {
                frame_width,
                frame_height,
                render_width: frame_width,
                render_height: frame_height,
            };
        };

        let map = |x: f32, y: f32| {
            let p = *m * Vec4::new(x, y, 0.0, 1.0);
            (p.x * frame_width as f32, p.y * frame_height as f32)
        };
        let origin = map(0.0, 0.0);
        let right = map(1.0, 0.0);
        let down = map(0.0, 1.0);
        let distance = |a: (f32, f32), b: (f32, f32)| (b.0 - a.0).hypot(b.1 - a.1).round() as u32;

        Self {
            frame_width,
            frame_height,
            render_width: distance(origin, right),
            render_height: distance(origin, down),
        }
    }
}

/// Draws frames with one passthrough program per input format
pub struct FrameDrawer {
    drawer: GenericDrawer,
    uploader: YuvUploader,
    last_uploaded: Option<(I420Buffer, Arc<TextureHandle>)>,
}

impl FrameDrawer {
    pub fn new(target_format: wgpu::TextureFormat) -> Self {
        Self::with_fragment(PASSTHROUGH_FRAGMENT, target_format)
    }

    /// A frame drawer running a custom fragment body written against `sample()`
    pub fn with_fragment(fragment_body: impl Into<String>, target_format: wgpu::TextureFormat) -> Self {
        Self {
            drawer: GenericDrawer::without_callbacks(fragment_body, target_format),
            uploader: YuvUploader::new(),
            last_uploaded: None,
        }
    }

    pub fn drawer(&self) -> &GenericDrawer {
        &self.drawer
    }

    /// Draw `frame` into `viewport` of `target`
    pub fn draw_frame(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        target: &RenderTarget<'_>,
        frame: &VideoFrame,
        additional: Option<&Mat4>,
        viewport: Viewport,
    ) -> Result<()> {
        let info = FrameInformation::new(frame, additional);
        let matrix = render_matrix(frame.rotation(), additional.copied().unwrap_or(Mat4::IDENTITY));

        match frame.buffer() {
            FrameBuffer::Texture(texture) => {
                let handle = texture.handle()?;
                self.drawer.draw(
                    &ctx.device,
                    encoder,
                    target,
                    &DrawParams {
                        format: texture.format(),
                        textures: handle,
                        tex_matrix: texture.transform() * matrix,
                        frame_width: info.render_width,
                        frame_height: info.render_height,
                        viewport,
                    },
                )
            }
            planar => {
                let i420 = planar.to_i420()?;
                let uploaded = self.upload_if_changed(ctx, &i420);
                i420.release()?;
                let handle = uploaded?;
                self.drawer.draw(
                    &ctx.device,
                    encoder,
                    target,
                    &DrawParams {
                        format: SourceFormat::Yuv,
                        textures: &handle,
                        tex_matrix: matrix,
                        frame_width: info.render_width,
                        frame_height: info.render_height,
                        viewport,
                    },
                )
            }
        }
    }

    /// Render `frame` upright into a new RGBA texture and wrap it as a
    /// texture buffer tagged `output_format` (`Rgb` or `Oes`).
    pub fn render_to_texture_buffer(
        &mut self,
        ctx: &GpuContext,
        frame: &VideoFrame,
        output_format: SourceFormat,
        converter: Option<Arc<dyn TextureToI420>>,
    ) -> Result<TextureBuffer> {
        if output_format.plane_count() != 1 {
            return Err(FrameError::TextureFormatMismatch {
                format: output_format.name(),
                expected: output_format.plane_count(),
                actual: 1,
            });
        }

        let (width, height) = (frame.rotated_width(), frame.rotated_height());
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Rendered Frame"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.drawer.target_format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let plane = PlaneTexture::new(texture);

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Frame Encoder"),
            });
        self.draw_frame(
            ctx,
            &mut encoder,
            &RenderTarget {
                view: &plane.view,
                width,
                height,
                clear: Some(wgpu::Color::BLACK),
            },
            frame,
            None,
            Viewport::full(width, height),
        )?;
        ctx.queue.submit(Some(encoder.finish()));

        TextureBuffer::new(
            width,
            height,
            Arc::new(TextureHandle::Rgba(plane)),
            output_format,
            Mat4::IDENTITY,
            converter,
            None,
        )
    }

    fn upload_if_changed(&mut self, ctx: &GpuContext, buffer: &I420Buffer) -> Result<Arc<TextureHandle>> {
        if let Some((last, handle)) = &self.last_uploaded {
            if last.ptr_eq(buffer) {
                return Ok(Arc::clone(handle));
            }
        }
        let handle = self.uploader.upload(&ctx.device, &ctx.queue, buffer)?;
        self.last_uploaded = Some((buffer.clone(), Arc::clone(&handle)));
        Ok(handle)
    }

    /// Drop programs and textures
    pub fn release(&mut self) {
        self.drawer.dispose();
        self.uploader.release();
        self.last_uploaded = None;
    }
}
