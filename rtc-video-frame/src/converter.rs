//! GPU texture → I420 conversion
//!
//! All three planes are rendered into one packed RGBA texture in a single
//! submission, then read back with one buffer copy. Each output texel holds
//! four horizontally adjacent samples of one plane:
//!
//! ```text
//!   +---------+        row 0
//!   |    Y    |
//!   |         |        row h - 1
//!   +----+----+        row h
//!   | U  | V  |
//!   +----+----+        row h + uv_height - 1
//! ```
//!
//! Read as bytes with a row stride of `stride`, the U and V halves become two
//! interleaved planes sharing that stride.

use std::sync::Arc;

use bytes::Bytes;
use glam::{Mat4, Vec3};
use parking_lot::Mutex;

use crate::drawer::{DrawParams, GenericDrawer, RenderTarget, ShaderCallbacks, Viewport};
use crate::error::{FrameError, Result};
use crate::frame::{chroma_extent, I420Buffer, SourceFormat, TextureBuffer, TextureToI420};
use crate::gpu_context::GpuContext;
use crate::shaders::YUV_PACK_FRAGMENT;

const Y_COEFFS: [f32; 4] = [0.299, 0.587, 0.114, 0.0];
const U_COEFFS: [f32; 4] = [-0.169, -0.331, 0.499, 0.5];
const V_COEFFS: [f32; 4] = [0.499, -0.418, -0.0813, 0.5];

const PACKED_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Geometry of the packed readback for a `width x height` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedLayout {
    pub width: u32,
    pub height: u32,
    /// Row stride of every plane in the result; `width` rounded up to 8
    pub stride: u32,
    pub uv_height: u32,
    pub total_height: u32,
}

impl PackedLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let stride = align_to(width, 8);
        let uv_height = chroma_extent(height);
        Self {
            width,
            height,
            stride,
            uv_height,
            total_height: height + uv_height,
        }
    }

    /// Packed target size in RGBA texels
    pub fn target_size(&self) -> (u32, u32) {
        (self.stride / 4, self.total_height)
    }

    pub fn y_viewport(&self) -> Viewport {
        Viewport::new(0, 0, self.width.div_ceil(4), self.height)
    }

    pub fn u_viewport(&self) -> Viewport {
        Viewport::new(0, self.height, self.width.div_ceil(8), self.uv_height)
    }

    pub fn v_viewport(&self) -> Viewport {
        Viewport::new(self.stride / 8, self.height, self.width.div_ceil(8), self.uv_height)
    }

    /// Bytes in the result allocation, including one trailing padding row
    pub fn allocation_len(&self) -> usize {
        self.stride as usize * (self.total_height as usize + 1)
    }

    pub fn u_offset(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn v_offset(&self) -> usize {
        self.u_offset() + self.stride as usize / 2
    }

    /// Texture-coordinate scale so each pass samples exactly the pixels its
    /// texels cover: the viewports round the frame width up to whole texels
    /// and the chroma rows up to whole luma row pairs.
    fn coverage_scale(&self, chroma: bool) -> (f32, f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        if chroma {
            let x = 8.0 * self.width.div_ceil(8) as f32 / w;
            let y = 2.0 * self.uv_height as f32 / h;
            (x, y)
        } else {
            (4.0 * self.width.div_ceil(4) as f32 / w, 1.0)
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PackParams {
    x_unit: [f32; 2],
    _pad: [f32; 2],
    coeffs: [f32; 4],
}

/// Per-pass uniforms for the pack program
#[derive(Debug, Clone, Copy)]
struct PackCallbacks {
    coeffs: [f32; 4],
    /// Source pixels between adjacent samples (1 for Y, 2 for U/V)
    step: f32,
    /// Horizontal coverage scale folded into the draw matrix
    x_scale: f32,
}

impl Default for PackCallbacks {
    fn default() -> Self {
        Self {
            coeffs: Y_COEFFS,
            step: 1.0,
            x_scale: 1.0,
        }
    }
}

impl ShaderCallbacks for PackCallbacks {
    fn custom_uniform_size(&self) -> Option<u64> {
        Some(std::mem::size_of::<PackParams>() as u64)
    }

    fn on_new_shader(&mut self, format: SourceFormat) {
        tracing::debug!("YUV converter compiled program for {} input", format);
    }

    fn on_prepare_shader(
        &mut self,
        _format: SourceFormat,
        tex_matrix: &Mat4,
        frame_width: u32,
        _frame_height: u32,
        _viewport_width: u32,
        _viewport_height: u32,
    ) -> Vec<u8> {
        // tex_matrix already carries x_scale; undo it so one step is one
        // source pixel.
        let unit = tex_matrix.x_axis.truncate().truncate()
            * (self.step / (frame_width as f32 * self.x_scale));
        let params = PackParams {
            x_unit: unit.to_array(),
            _pad: [0.0; 2],
            coeffs: self.coeffs,
        };
        bytemuck::bytes_of(&params).to_vec()
    }
}

struct PackedTarget {
    layout: PackedLayout,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

impl PackedTarget {
    fn new(device: &wgpu::Device, layout: PackedLayout) -> Self {
        let (width, height) = layout.target_size();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("YUV Packed Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PACKED_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row = align_to(layout.stride, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("YUV Readback"),
            size: padded_bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            layout,
            texture,
            view,
            readback,
            padded_bytes_per_row,
        }
    }
}

/// Converts texture buffers to I420 on the GPU.
///
/// Must be used from the thread that owns the [`GpuContext`]'s submissions.
pub struct YuvConverter {
    ctx: Arc<GpuContext>,
    drawer: GenericDrawer<PackCallbacks>,
    target: Option<PackedTarget>,
    released: bool,
}

impl YuvConverter {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            drawer: GenericDrawer::new(YUV_PACK_FRAGMENT, PACKED_FORMAT, PackCallbacks::default()),
            target: None,
            released: false,
        }
    }

    /// Number of pack programs compiled so far
    pub fn compile_count(&self) -> u64 {
        self.drawer.compile_count()
    }

    /// Read `buffer` back as a new I420 buffer.
    ///
    /// The result's planes all use stride `round_up(width, 8)`; U and V live
    /// in the same allocation with interleaved rows.
    pub fn convert(&mut self, buffer: &TextureBuffer) -> Result<I420Buffer> {
        if self.released {
            return Err(FrameError::ConverterReleased);
        }
        let handle = buffer.handle()?;
        let layout = PackedLayout::new(buffer.width(), buffer.height());

        let target = match self.target.take() {
            Some(target) if target.layout == layout => target,
            _ => {
                tracing::debug!(
                    "Allocating packed YUV target {}x{}",
                    layout.target_size().0,
                    layout.target_size().1
                );
                PackedTarget::new(&self.ctx.device, layout)
            }
        };
        let target = self.target.insert(target);
        let (target_width, target_height) = layout.target_size();

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("YUV Converter Encoder"),
            });

        let passes = [
            (Y_COEFFS, 1.0, false, layout.y_viewport()),
            (U_COEFFS, 2.0, true, layout.u_viewport()),
            (V_COEFFS, 2.0, true, layout.v_viewport()),
        ];
        for (index, (coeffs, step, chroma, viewport)) in passes.into_iter().enumerate() {
            let (x_scale, y_scale) = layout.coverage_scale(chroma);
            *self.drawer.callbacks_mut() = PackCallbacks {
                coeffs,
                step,
                x_scale,
            };
            let tex_matrix =
                buffer.transform() * Mat4::from_scale(Vec3::new(x_scale, y_scale, 1.0));
            self.drawer.draw(
                &self.ctx.device,
                &mut encoder,
                &RenderTarget {
                    view: &target.view,
                    width: target_width,
                    height: target_height,
                    clear: (index == 0).then_some(wgpu::Color::TRANSPARENT),
                },
                &DrawParams {
                    format: buffer.format(),
                    textures: handle,
                    tex_matrix,
                    frame_width: layout.width,
                    frame_height: layout.height,
                    viewport,
                },
            )?;
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &target.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_bytes_per_row),
                    rows_per_image: Some(target_height),
                },
            },
            wgpu::Extent3d {
                width: target_width,
                height: target_height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(Some(encoder.finish()));

        let packed = read_back(&self.ctx.device, target)?;
        wrap_packed(layout, packed)
    }

    /// Drop GPU resources; later conversions fail with `ConverterReleased`
    pub fn release(&mut self) {
        self.drawer.dispose();
        self.target = None;
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

fn read_back(device: &wgpu::Device, target: &PackedTarget) -> Result<Vec<u8>> {
    let layout = target.layout;
    let buffer_slice = target.readback.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| FrameError::Readback("map callback never ran".to_string()))?
        .map_err(|err| FrameError::Readback(err.to_string()))?;

    let stride = layout.stride as usize;
    let padded = target.padded_bytes_per_row as usize;
    let mut packed = vec![0u8; layout.allocation_len()];
    {
        let mapped = buffer_slice.get_mapped_range();
        for row in 0..layout.total_height as usize {
            let src = &mapped[row * padded..row * padded + stride];
            packed[row * stride..(row + 1) * stride].copy_from_slice(src);
        }
    }
    target.readback.unmap();
    Ok(packed)
}

/// Split the packed readback into an I420 buffer sharing one allocation
fn wrap_packed(layout: PackedLayout, packed: Vec<u8>) -> Result<I420Buffer> {
    let stride = layout.stride as usize;
    let data = Bytes::from(packed);
    let y = data.slice(..layout.u_offset());
    let u = data.slice(layout.u_offset()..);
    let v = data.slice(layout.v_offset()..);
    I420Buffer::wrap(layout.width, layout.height, y, stride, u, stride, v, stride, None)
}

/// A converter shared between texture buffers.
///
/// Buffers call it from whichever thread asks for pixels; the lock
/// serializes conversions on the converter's device.
#[derive(Clone)]
pub struct SharedYuvConverter(Arc<Mutex<YuvConverter>>);

impl SharedYuvConverter {
    pub fn new(converter: YuvConverter) -> Self {
        Self(Arc::new(Mutex::new(converter)))
    }

    /// As the hook type texture buffers store
    pub fn as_hook(&self) -> Arc<dyn TextureToI420> {
        Arc::new(self.clone())
    }

    pub fn compile_count(&self) -> u64 {
        self.0.lock().compile_count()
    }

    pub fn release(&self) {
        self.0.lock().release();
    }
}

impl TextureToI420 for SharedYuvConverter {
    fn texture_to_i420(&self, buffer: &TextureBuffer) -> Result<I420Buffer> {
        self.0.lock().convert(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_for_odd_width() {
        let layout = PackedLayout::new(49, 33);
        assert_eq!(layout.stride, 56);
        assert_eq!(layout.uv_height, 17);
        assert_eq!(layout.total_height, 50);
        assert_eq!(layout.target_size(), (14, 50));
        assert_eq!(layout.y_viewport(), Viewport::new(0, 0, 13, 33));
        assert_eq!(layout.u_viewport(), Viewport::new(0, 33, 7, 17));
        assert_eq!(layout.v_viewport(), Viewport::new(7, 33, 7, 17));
        assert_eq!(layout.allocation_len(), 56 * 51);
        assert_eq!(layout.u_offset(), 56 * 33);
        assert_eq!(layout.v_offset(), 56 * 33 + 28);
    }

    #[test]
    fn test_viewports_fit_target_for_all_alignments() {
        for add in [0, 1, 2, 3, 4, 5, 6, 7, 8, 16] {
            let layout = PackedLayout::new(48 + add, 32 + add);
            let (tw, th) = layout.target_size();
            for vp in [layout.y_viewport(), layout.u_viewport(), layout.v_viewport()] {
                assert!(vp.x + vp.width <= tw, "{add}: {vp:?} exceeds width {tw}");
                assert!(vp.y + vp.height <= th, "{add}: {vp:?} exceeds height {th}");
            }
            // U and V halves never overlap.
            assert!(layout.u_viewport().width <= layout.v_viewport().x);
        }
    }

    #[test]
    fn test_wrapped_planes_satisfy_capacity() {
        for (w, h) in [(1, 1), (7, 3), (48, 32), (49, 33), (64, 48)] {
            let layout = PackedLayout::new(w, h);
            let buffer = wrap_packed(layout, vec![0u8; layout.allocation_len()]).unwrap();
            assert_eq!(buffer.stride_u(), layout.stride as usize);
            assert_eq!(buffer.data_v().unwrap().len(), layout.allocation_len() - layout.v_offset());
        }
    }

    #[test]
    fn test_wrapped_planes_interleave_chroma_rows() {
        let layout = PackedLayout::new(8, 2);
        let packed: Vec<u8> = (0..layout.allocation_len() as u8).collect();
        let buffer = wrap_packed(layout, packed).unwrap();
        assert_eq!(buffer.data_y().unwrap()[..8], [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(buffer.data_u().unwrap()[..4], [16, 17, 18, 19]);
        assert_eq!(buffer.data_v().unwrap()[..4], [20, 21, 22, 23]);
    }

    #[test]
    fn test_pack_callbacks_undo_coverage_scale() {
        let layout = PackedLayout::new(50, 32);
        let (x_scale, y_scale) = layout.coverage_scale(true);
        let mut callbacks = PackCallbacks {
            coeffs: U_COEFFS,
            step: 2.0,
            x_scale,
        };
        let m = Mat4::from_scale(Vec3::new(x_scale, y_scale, 1.0));
        let bytes = callbacks.on_prepare_shader(SourceFormat::Rgb, &m, 50, 32, 7, 16);
        let params: PackParams = bytemuck::pod_read_unaligned(&bytes);
        assert!((params.x_unit[0] - 2.0 / 50.0).abs() < 1e-6);
        assert_eq!(params.x_unit[1], 0.0);
        assert_eq!(params.coeffs, U_COEFFS);
    }
}
