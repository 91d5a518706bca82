//! GPU texture-backed frame buffers
//!
//! A `TextureBuffer` never touches pixels on crop or scale: it composes a
//! texture-coordinate transform and shares the underlying texture(s). Pixels
//! reach the CPU only through `to_i420`, which hands the buffer to the
//! attached [`TextureToI420`] converter.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use super::ref_count::{RefCount, ReleaseCallback};
use super::{validate_crop, I420Buffer};
use crate::error::{FrameError, Result};

/// How the texture(s) of a [`TextureBuffer`] encode color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Texture produced by a camera or decoder surface.
    ///
    /// wgpu has no external-image binding; these arrive as RGBA 2D textures
    /// but keep their own tag so they get their own compiled program.
    Oes,
    /// A single RGBA texture
    Rgb,
    /// Three single-channel textures (Y, U, V)
    Yuv,
}

impl SourceFormat {
    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::Oes => "OES",
            SourceFormat::Rgb => "RGB",
            SourceFormat::Yuv => "YUV",
        }
    }

    /// Number of textures a handle of this format carries
    pub fn plane_count(self) -> usize {
        match self {
            SourceFormat::Oes | SourceFormat::Rgb => 1,
            SourceFormat::Yuv => 3,
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A texture together with the default view used to sample it
#[derive(Debug)]
pub struct PlaneTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl PlaneTexture {
    pub fn new(texture: wgpu::Texture) -> Self {
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }
}

/// The GPU resources behind a texture buffer
#[derive(Debug)]
pub enum TextureHandle {
    /// One RGBA texture (`Rgb` and `Oes` sources)
    Rgba(PlaneTexture),
    /// Y, U and V planes in that order
    Yuv([PlaneTexture; 3]),
}

impl TextureHandle {
    pub fn plane_count(&self) -> usize {
        match self {
            TextureHandle::Rgba(_) => 1,
            TextureHandle::Yuv(_) => 3,
        }
    }

    /// Views in binding order (Y/RGB first)
    pub fn views(&self) -> Vec<&wgpu::TextureView> {
        match self {
            TextureHandle::Rgba(plane) => vec![&plane.view],
            TextureHandle::Yuv(planes) => planes.iter().map(|p| &p.view).collect(),
        }
    }
}

/// Converts a texture buffer into planar CPU memory
pub trait TextureToI420: Send + Sync {
    fn texture_to_i420(&self, buffer: &TextureBuffer) -> Result<I420Buffer>;
}

/// `m · T(x/w, y/h) · S(crop_w/w, crop_h/h)`: the transform that maps the
/// unit square onto the crop rectangle of a `width x height` buffer before
/// applying `m`.
pub fn crop_matrix(
    m: Mat4,
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    crop_width: u32,
    crop_height: u32,
) -> Mat4 {
    let (w, h) = (width as f32, height as f32);
    m * Mat4::from_translation(Vec3::new(x as f32 / w, y as f32 / h, 0.0))
        * Mat4::from_scale(Vec3::new(crop_width as f32 / w, crop_height as f32 / h, 1.0))
}

struct TextureInner {
    width: u32,
    height: u32,
    handle: Arc<TextureHandle>,
    format: SourceFormat,
    transform: Mat4,
    converter: Option<Arc<dyn TextureToI420>>,
    ref_count: RefCount,
}

/// A reference-counted frame buffer whose pixels live in GPU texture(s)
#[derive(Clone)]
pub struct TextureBuffer {
    inner: Arc<TextureInner>,
}

impl TextureBuffer {
    /// Wrap a texture handle.
    ///
    /// `transform` maps normalized quad coordinates to texture coordinates;
    /// `converter` is used by [`to_i420`](Self::to_i420) and is inherited by
    /// crops. `on_release` runs when the last owner releases.
    pub fn new(
        width: u32,
        height: u32,
        handle: Arc<TextureHandle>,
        format: SourceFormat,
        transform: Mat4,
        converter: Option<Arc<dyn TextureToI420>>,
        on_release: Option<ReleaseCallback>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        if handle.plane_count() != format.plane_count() {
            return Err(FrameError::TextureFormatMismatch {
                format: format.name(),
                expected: format.plane_count(),
                actual: handle.plane_count(),
            });
        }

        Ok(Self {
            inner: Arc::new(TextureInner {
                width,
                height,
                handle,
                format,
                transform,
                converter,
                ref_count: RefCount::new(on_release),
            }),
        })
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn format(&self) -> SourceFormat {
        self.inner.format
    }

    pub fn transform(&self) -> Mat4 {
        self.inner.transform
    }

    /// The shared texture handle; fails once the buffer is released
    pub fn handle(&self) -> Result<&Arc<TextureHandle>> {
        self.inner.ref_count.ensure_alive()?;
        Ok(&self.inner.handle)
    }

    pub fn converter(&self) -> Option<&Arc<dyn TextureToI420>> {
        self.inner.converter.as_ref()
    }

    pub fn retain(&self) -> Result<()> {
        self.inner.ref_count.retain()
    }

    pub fn release(&self) -> Result<bool> {
        self.inner.ref_count.release()
    }

    pub fn ref_count(&self) -> usize {
        self.inner.ref_count.count()
    }

    pub fn is_alive(&self) -> bool {
        self.inner.ref_count.is_alive()
    }

    /// Read the pixels back through the attached converter
    pub fn to_i420(&self) -> Result<I420Buffer> {
        self.inner.ref_count.ensure_alive()?;
        let converter = self.inner.converter.as_ref().ok_or(FrameError::NoConverter)?;
        converter.texture_to_i420(self)
    }

    /// A new `new_width x new_height` buffer over the same textures with
    /// `matrix` applied after this buffer's transform.
    ///
    /// The new buffer holds an owner of this one until it is released.
    pub fn apply_transform(&self, matrix: Mat4, new_width: u32, new_height: u32) -> Result<TextureBuffer> {
        self.retain()?;
        let source = self.clone();
        let on_release: ReleaseCallback = Box::new(move || {
            if let Err(err) = source.release() {
                tracing::warn!("Derived texture buffer could not release its source: {}", err);
            }
        });

        let derived = Self::new(
            new_width,
            new_height,
            Arc::clone(&self.inner.handle),
            self.inner.format,
            self.inner.transform * matrix,
            self.inner.converter.clone(),
            Some(on_release),
        );
        match derived {
            Ok(buffer) => Ok(buffer),
            Err(err) => {
                self.release()?;
                Err(err)
            }
        }
    }

    /// Crop and scale by composing the transform; no pixels are touched
    #[allow(clippy::too_many_arguments)]
    pub fn crop_and_scale(
        &self,
        x: u32,
        y: u32,
        crop_width: u32,
        crop_height: u32,
        scale_width: u32,
        scale_height: u32,
    ) -> Result<TextureBuffer> {
        validate_crop(
            self.width(),
            self.height(),
            x,
            y,
            crop_width,
            crop_height,
            scale_width,
            scale_height,
        )?;
        let crop = crop_matrix(
            Mat4::IDENTITY,
            self.width(),
            self.height(),
            x,
            y,
            crop_width,
            crop_height,
        );
        self.apply_transform(crop, scale_width, scale_height)
    }
}

impl std::fmt::Debug for TextureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureBuffer")
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("format", &self.inner.format)
            .field("transform", &self.inner.transform)
            .field("has_converter", &self.inner.converter.is_some())
            .field("ref_count", &self.inner.ref_count.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx_eq(a: Mat4, b: Mat4) -> bool {
        a.to_cols_array()
            .iter()
            .zip(b.to_cols_array().iter())
            .all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn test_crop_matrix_maps_unit_square_to_crop_rect() {
        let m = crop_matrix(Mat4::IDENTITY, 100, 50, 10, 20, 60, 20);
        let origin = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let corner = m * Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!((origin.x - 0.1).abs() < 1e-6 && (origin.y - 0.4).abs() < 1e-6);
        assert!((corner.x - 0.7).abs() < 1e-6 && (corner.y - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_nested_crops_compose() {
        // crop(10, 20, 60x40 -> 30x20) then crop(3, 4, 15x10 -> 15x10) on a
        // 100x100 source equals crop(16, 28, 30x20) on the source.
        let first = crop_matrix(Mat4::IDENTITY, 100, 100, 10, 20, 60, 40);
        let nested = crop_matrix(first, 30, 20, 3, 4, 15, 10);
        let direct = crop_matrix(Mat4::IDENTITY, 100, 100, 16, 28, 30, 20);
        assert!(approx_eq(nested, direct));
    }

    #[test]
    fn test_identity_crop_is_identity() {
        let m = crop_matrix(Mat4::IDENTITY, 64, 48, 0, 0, 64, 48);
        assert!(approx_eq(m, Mat4::IDENTITY));
    }

    #[test]
    fn test_source_format_plane_counts() {
        assert_eq!(SourceFormat::Rgb.plane_count(), 1);
        assert_eq!(SourceFormat::Oes.plane_count(), 1);
        assert_eq!(SourceFormat::Yuv.plane_count(), 3);
        assert_eq!(SourceFormat::Oes.to_string(), "OES");
    }
}
