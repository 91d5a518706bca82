//! CPU helpers for moving I420 data into caller-provided memory
//!
//! Every function checks the destination size up front and fails with
//! `InsufficientCapacity` without writing anything.

use crate::error::{FrameError, Result};
use crate::frame::{chroma_extent, min_plane_len, I420Buffer, Rotation};

fn ensure_capacity(required: usize, actual: usize) -> Result<()> {
    if actual < required {
        Err(FrameError::InsufficientCapacity { required, actual })
    } else {
        Ok(())
    }
}

fn ensure_layout(width: u32, height: u32, stride: usize, slice_height: usize) -> Result<()> {
    if stride < width as usize || slice_height < height as usize {
        Err(FrameError::InvalidDimensions { width, height })
    } else {
        Ok(())
    }
}

/// Copy `height` rows of `width` bytes between strided planes
pub fn copy_plane(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    width: usize,
    height: usize,
) -> Result<()> {
    if src_stride < width || dst_stride < width {
        return Err(FrameError::InvalidDimensions {
            width: width as u32,
            height: height as u32,
        });
    }
    ensure_capacity(min_plane_len(src_stride, width, height), src.len())?;
    ensure_capacity(min_plane_len(dst_stride, width, height), dst.len())?;
    for row in 0..height {
        let s = row * src_stride;
        let d = row * dst_stride;
        dst[d..d + width].copy_from_slice(&src[s..s + width]);
    }
    Ok(())
}

/// Copy `src` into one contiguous I420 layout.
///
/// The Y plane uses `dst_stride_y` and spans `dst_height_y` rows before U
/// starts; chroma strides and slice heights are the halves of those,
/// rounded up.
pub fn i420_copy(src: &I420Buffer, dst: &mut [u8], dst_stride_y: usize, dst_height_y: usize) -> Result<()> {
    let (width, height) = (src.width(), src.height());
    ensure_layout(width, height, dst_stride_y, dst_height_y)?;
    let (cw, ch) = (chroma_extent(width) as usize, chroma_extent(height) as usize);
    let dst_stride_u = dst_stride_y.div_ceil(2);
    let dst_height_u = dst_height_y.div_ceil(2);

    let start_u = dst_stride_y * dst_height_y;
    let start_v = start_u + dst_stride_u * dst_height_u;
    ensure_capacity(start_v + min_plane_len(dst_stride_u, cw, ch), dst.len())?;

    let [y, u, v] = src.planes()?;
    let (dst_y, rest) = dst.split_at_mut(start_u);
    let (dst_u, dst_v) = rest.split_at_mut(start_v - start_u);
    copy_plane(&y, src.stride_y(), dst_y, dst_stride_y, width as usize, height as usize)?;
    copy_plane(&u, src.stride_u(), dst_u, dst_stride_u, cw, ch)?;
    copy_plane(&v, src.stride_v(), dst_v, dst_stride_u, cw, ch)
}

/// [`i420_copy`] with tightly packed planes
pub fn i420_copy_packed(src: &I420Buffer, dst: &mut [u8]) -> Result<()> {
    i420_copy(src, dst, src.width() as usize, src.height() as usize)
}

/// Convert to NV12: the Y plane followed by interleaved U/V pairs
pub fn i420_to_nv12(src: &I420Buffer, dst: &mut [u8], dst_stride_y: usize, dst_height_y: usize) -> Result<()> {
    let (width, height) = (src.width(), src.height());
    ensure_layout(width, height, dst_stride_y, dst_height_y)?;
    let (cw, ch) = (chroma_extent(width) as usize, chroma_extent(height) as usize);
    let dst_stride_uv = dst_stride_y.div_ceil(2) * 2;

    let start_uv = dst_stride_y * dst_height_y;
    ensure_capacity(start_uv + min_plane_len(dst_stride_uv, cw * 2, ch), dst.len())?;

    let [y, u, v] = src.planes()?;
    let (dst_y, dst_uv) = dst.split_at_mut(start_uv);
    copy_plane(&y, src.stride_y(), dst_y, dst_stride_y, width as usize, height as usize)?;

    let (stride_u, stride_v) = (src.stride_u(), src.stride_v());
    for row in 0..ch {
        let out = &mut dst_uv[row * dst_stride_uv..row * dst_stride_uv + cw * 2];
        let u_row = &u[row * stride_u..row * stride_u + cw];
        let v_row = &v[row * stride_v..row * stride_v + cw];
        for (pair, (&cb, &cr)) in out.chunks_exact_mut(2).zip(u_row.iter().zip(v_row)) {
            pair[0] = cb;
            pair[1] = cr;
        }
    }
    Ok(())
}

/// Rotate clockwise into a tightly packed I420 layout.
///
/// Returns the destination dimensions.
pub fn i420_rotate(src: &I420Buffer, dst: &mut [u8], rotation: Rotation) -> Result<(u32, u32)> {
    let (width, height) = (src.width(), src.height());
    let (dst_width, dst_height) = if rotation.is_transposed() {
        (height, width)
    } else {
        (width, height)
    };
    let (dst_cw, dst_ch) = (chroma_extent(dst_width) as usize, chroma_extent(dst_height) as usize);
    let luma = dst_width as usize * dst_height as usize;
    let chroma = dst_cw * dst_ch;
    ensure_capacity(luma + 2 * chroma, dst.len())?;

    let [y, u, v] = src.planes()?;
    let (dst_y, rest) = dst.split_at_mut(luma);
    let (dst_u, dst_v) = rest.split_at_mut(chroma);

    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (src.chroma_width() as usize, src.chroma_height() as usize);
    rotate_plane(&y, src.stride_y(), w, h, dst_y, rotation);
    rotate_plane(&u, src.stride_u(), cw, ch, dst_u, rotation);
    rotate_plane(&v, src.stride_v(), cw, ch, dst_v, rotation);
    Ok((dst_width, dst_height))
}

/// Rotate one plane into a packed destination whose stride is the rotated width
fn rotate_plane(src: &[u8], src_stride: usize, width: usize, height: usize, dst: &mut [u8], rotation: Rotation) {
    let dst_stride = if rotation.is_transposed() { height } else { width };
    for y in 0..height {
        let row = &src[y * src_stride..y * src_stride + width];
        for (x, &pixel) in row.iter().enumerate() {
            let (dx, dy) = match rotation {
                Rotation::Deg0 => (x, y),
                Rotation::Deg90 => (height - 1 - y, x),
                Rotation::Deg180 => (width - 1 - x, height - 1 - y),
                Rotation::Deg270 => (y, width - 1 - x),
            };
            dst[dy * dst_stride + dx] = pixel;
        }
    }
}

/// Convert RGBA bytes (libyuv "ABGR") to a new I420 buffer.
///
/// BT.601 limited range: Y in 16..=235, chroma computed from the average of
/// each 2x2 block (partial blocks at odd edges).
pub fn abgr_to_i420(src: &[u8], src_stride: usize, width: u32, height: u32) -> Result<I420Buffer> {
    if width == 0 || height == 0 || src_stride < width as usize * 4 {
        return Err(FrameError::InvalidDimensions { width, height });
    }
    let (w, h) = (width as usize, height as usize);
    ensure_capacity(min_plane_len(src_stride, w * 4, h), src.len())?;
    let (cw, ch) = (chroma_extent(width) as usize, chroma_extent(height) as usize);

    let pixel = |x: usize, y: usize| -> [i32; 3] {
        let i = y * src_stride + x * 4;
        [src[i] as i32, src[i + 1] as i32, src[i + 2] as i32]
    };

    let mut out_y = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let [r, g, b] = pixel(x, y);
            out_y[y * w + x] = ((66 * r + 129 * g + 25 * b + 0x1080) >> 8) as u8;
        }
    }

    let mut out_u = vec![0u8; cw * ch];
    let mut out_v = vec![0u8; cw * ch];
    for cy in 0..ch {
        for cx in 0..cw {
            let mut sum = [0i32; 3];
            let mut count = 0;
            for y in (cy * 2)..(cy * 2 + 2).min(h) {
                for x in (cx * 2)..(cx * 2 + 2).min(w) {
                    let p = pixel(x, y);
                    sum.iter_mut().zip(p).for_each(|(s, c)| *s += c);
                    count += 1;
                }
            }
            let [r, g, b] = sum.map(|s| (s + count / 2) / count);
            out_u[cy * cw + cx] = ((112 * b - 74 * g - 38 * r + 0x8080) >> 8) as u8;
            out_v[cy * cw + cx] = ((112 * r - 94 * g - 18 * b + 0x8080) >> 8) as u8;
        }
    }

    I420Buffer::wrap(
        width,
        height,
        out_y.into(),
        w,
        out_u.into(),
        cw,
        out_v.into(),
        cw,
        None,
    )
}
