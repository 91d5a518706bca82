//! Video frame buffers
//!
//! Frame buffers are reference counted explicitly (see [`ref_count`]) and come
//! in three representations:
//! - `I420Buffer`: planar Y/U/V in CPU memory
//! - `I420ABuffer`: I420 plus a full-resolution alpha plane
//! - `TextureBuffer`: GPU texture(s) plus a texture-coordinate transform
//!
//! [`FrameBuffer`] is the closed union over all three.

mod buffer;
mod handoff;
mod i420;
pub mod ref_count;
mod texture;
mod video_frame;

pub use buffer::{BufferType, FrameBuffer};
pub use handoff::{frame_handoff, FrameReceiver, FrameSender};
pub use i420::{chroma_extent, min_plane_len, I420ABuffer, I420Buffer};
pub use i420::scale_plane_box;
pub use ref_count::{RefCount, ReleaseCallback};
pub use texture::{
    crop_matrix, PlaneTexture, SourceFormat, TextureBuffer, TextureHandle, TextureToI420,
};
pub use video_frame::{Rotation, VideoFrame};

use crate::error::{FrameError, Result};

/// Check a crop rectangle and output size against a `width x height` buffer
#[allow(clippy::too_many_arguments)]
pub(crate) fn validate_crop(
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    crop_width: u32,
    crop_height: u32,
    scale_width: u32,
    scale_height: u32,
) -> Result<()> {
    let fits_x = x.checked_add(crop_width).is_some_and(|right| right <= width);
    let fits_y = y.checked_add(crop_height).is_some_and(|bottom| bottom <= height);
    let non_empty = crop_width > 0 && crop_height > 0 && scale_width > 0 && scale_height > 0;

    if fits_x && fits_y && non_empty {
        Ok(())
    } else {
        Err(FrameError::InvalidCrop {
            width,
            height,
            x,
            y,
            crop_width,
            crop_height,
            scale_width,
            scale_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_crop_bounds() {
        assert!(validate_crop(64, 48, 0, 0, 64, 48, 32, 24).is_ok());
        assert!(validate_crop(64, 48, 10, 8, 54, 40, 1, 1).is_ok());
        assert!(validate_crop(64, 48, 11, 0, 54, 48, 54, 48).is_err());
        assert!(validate_crop(64, 48, 0, 9, 64, 40, 64, 40).is_err());
        assert!(validate_crop(64, 48, 0, 0, 0, 48, 64, 48).is_err());
        assert!(validate_crop(64, 48, 0, 0, 64, 48, 64, 0).is_err());
    }

    #[test]
    fn test_validate_crop_does_not_overflow() {
        assert!(validate_crop(64, 48, u32::MAX, 0, 2, 48, 2, 48).is_err());
    }
}
