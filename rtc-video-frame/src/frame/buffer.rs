//! The polymorphic frame buffer

use super::{I420ABuffer, I420Buffer, TextureBuffer};
use crate::error::Result;

/// Which representation a [`FrameBuffer`] holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferType {
    I420,
    I420A,
    Texture,
}

/// A reference-counted frame buffer in any supported representation.
///
/// All operations forward to the variant; the reference count lives in the
/// variant, so cloning a `FrameBuffer` does not add an owner.
#[derive(Debug, Clone)]
pub enum FrameBuffer {
    I420(I420Buffer),
    I420A(I420ABuffer),
    Texture(TextureBuffer),
}

impl FrameBuffer {
    pub fn buffer_type(&self) -> BufferType {
        match self {
            FrameBuffer::I420(_) => BufferType::I420,
            FrameBuffer::I420A(_) => BufferType::I420A,
            FrameBuffer::Texture(_) => BufferType::Texture,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            FrameBuffer::I420(b) => b.width(),
            FrameBuffer::I420A(b) => b.width(),
            FrameBuffer::Texture(b) => b.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            FrameBuffer::I420(b) => b.height(),
            FrameBuffer::I420A(b) => b.height(),
            FrameBuffer::Texture(b) => b.height(),
        }
    }

    pub fn retain(&self) -> Result<()> {
        match self {
            FrameBuffer::I420(b) => b.retain(),
            FrameBuffer::I420A(b) => b.retain(),
            FrameBuffer::Texture(b) => b.retain(),
        }
    }

    /// Drop an owner; `true` if this released the last one
    pub fn release(&self) -> Result<bool> {
        match self {
            FrameBuffer::I420(b) => b.release(),
            FrameBuffer::I420A(b) => b.release(),
            FrameBuffer::Texture(b) => b.release(),
        }
    }

    pub fn ref_count(&self) -> usize {
        match self {
            FrameBuffer::I420(b) => b.ref_count(),
            FrameBuffer::I420A(b) => b.ref_count(),
            FrameBuffer::Texture(b) => b.ref_count(),
        }
    }

    pub fn is_alive(&self) -> bool {
        match self {
            FrameBuffer::I420(b) => b.is_alive(),
            FrameBuffer::I420A(b) => b.is_alive(),
            FrameBuffer::Texture(b) => b.is_alive(),
        }
    }

    /// Planar pixels for this frame.
    ///
    /// Planar variants share their memory; texture buffers go through their
    /// attached converter and return a new buffer. The caller owns one
    /// reference to the result either way.
    pub fn to_i420(&self) -> Result<I420Buffer> {
        match self {
            FrameBuffer::I420(b) => b.to_i420(),
            FrameBuffer::I420A(b) => b.to_i420(),
            FrameBuffer::Texture(b) => b.to_i420(),
        }
    }

    /// Crop and scale into a buffer of the same representation
    #[allow(clippy::too_many_arguments)]
    pub fn crop_and_scale(
        &self,
        x: u32,
        y: u32,
        crop_width: u32,
        crop_height: u32,
        scale_width: u32,
        scale_height: u32,
    ) -> Result<FrameBuffer> {
        Ok(match self {
            FrameBuffer::I420(b) => FrameBuffer::I420(b.crop_and_scale(
                x,
                y,
                crop_width,
                crop_height,
                scale_width,
                scale_height,
            )?),
            FrameBuffer::I420A(b) => FrameBuffer::I420A(b.crop_and_scale(
                x,
                y,
                crop_width,
                crop_height,
                scale_width,
                scale_height,
            )?),
            FrameBuffer::Texture(b) => FrameBuffer::Texture(b.crop_and_scale(
                x,
                y,
                crop_width,
                crop_height,
                scale_width,
                scale_height,
            )?),
        })
    }

    pub fn as_texture(&self) -> Option<&TextureBuffer> {
        match self {
            FrameBuffer::Texture(b) => Some(b),
            _ => None,
        }
    }
}

impl From<I420Buffer> for FrameBuffer {
    fn from(buffer: I420Buffer) -> Self {
        FrameBuffer::I420(buffer)
    }
}

impl From<I420ABuffer> for FrameBuffer {
    fn from(buffer: I420ABuffer) -> Self {
        FrameBuffer::I420A(buffer)
    }
}

impl From<TextureBuffer> for FrameBuffer {
    fn from(buffer: TextureBuffer) -> Self {
        FrameBuffer::Texture(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use bytes::Bytes;

    #[test]
    fn test_forwards_to_variant() {
        let buffer: FrameBuffer = I420Buffer::black(16, 8).unwrap().into();
        assert_eq!(buffer.buffer_type(), BufferType::I420);
        assert_eq!((buffer.width(), buffer.height()), (16, 8));

        let cropped = buffer.crop_and_scale(4, 0, 8, 8, 4, 4).unwrap();
        assert_eq!(cropped.buffer_type(), BufferType::I420);
        assert_eq!((cropped.width(), cropped.height()), (4, 4));

        cropped.release().unwrap();
        assert!(buffer.release().unwrap());
        assert!(matches!(buffer.retain(), Err(FrameError::DisposedBuffer)));
        assert!(matches!(
            buffer.crop_and_scale(0, 0, 2, 2, 2, 2),
            Err(FrameError::DisposedBuffer)
        ));
    }

    #[test]
    fn test_i420a_to_i420_shares_color_planes() {
        let color = I420Buffer::black(4, 4).unwrap();
        let alpha = I420ABuffer::wrap(color.clone(), Bytes::from(vec![255u8; 16]), 4).unwrap();
        let buffer = FrameBuffer::from(alpha);
        assert_eq!(buffer.buffer_type(), BufferType::I420A);

        let planar = buffer.to_i420().unwrap();
        assert!(planar.ptr_eq(&color));
        assert_eq!(buffer.ref_count(), 2);
        planar.release().unwrap();
        assert!(buffer.release().unwrap());
    }
}
