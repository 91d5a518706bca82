//! Planar 4:2:0 frame buffers
//!
//! `I420Buffer` keeps each plane as a zero-copy `Bytes` view with its own
//! stride, so crops that don't scale are just offset views into the source
//! allocation. `I420ABuffer` embeds an `I420Buffer` and adds an alpha plane.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use super::ref_count::{RefCount, ReleaseCallback};
use super::validate_crop;
use crate::error::{FrameError, Result};

/// Chroma plane extent for a luma extent (4:2:0 subsampling)
pub fn chroma_extent(luma: u32) -> u32 {
    luma.div_ceil(2)
}

/// Smallest byte length holding `rows` rows of `row_bytes` at `stride`.
///
/// The last row does not have to be padded out to a full stride.
pub fn min_plane_len(stride: usize, row_bytes: usize, rows: usize) -> usize {
    if rows == 0 {
        0
    } else {
        stride * (rows - 1) + row_bytes
    }
}

fn check_plane(data: &Bytes, stride: usize, width: u32, height: u32) -> Result<()> {
    if stride < width as usize {
        return Err(FrameError::InvalidDimensions { width, height });
    }
    let required = min_plane_len(stride, width as usize, height as usize);
    if data.len() < required {
        return Err(FrameError::InsufficientCapacity {
            required,
            actual: data.len(),
        });
    }
    Ok(())
}

struct I420Inner {
    width: u32,
    height: u32,
    strides: [usize; 3],
    /// Y, U, V; taken out when the last owner releases
    planes: RwLock<Option<[Bytes; 3]>>,
    /// Alpha plane attached by `I420ABuffer`; dropped with the color planes
    alpha: RwLock<Option<Bytes>>,
    ref_count: RefCount,
}

/// A reference-counted I420 (YUV 4:2:0, 8-bit) frame buffer.
///
/// Cloning the handle does not add an owner; call [`retain`](Self::retain)
/// before handing the buffer to another owner.
#[derive(Clone)]
pub struct I420Buffer {
    inner: Arc<I420Inner>,
}

impl I420Buffer {
    /// Wrap existing plane data.
    ///
    /// `on_release` runs once when the last owner releases the buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn wrap(
        width: u32,
        height: u32,
        data_y: Bytes,
        stride_y: usize,
        data_u: Bytes,
        stride_u: usize,
        data_v: Bytes,
        stride_v: usize,
        on_release: Option<ReleaseCallback>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let chroma_width = chroma_extent(width);
        let chroma_height = chroma_extent(height);
        check_plane(&data_y, stride_y, width, height)?;
        check_plane(&data_u, stride_u, chroma_width, chroma_height)?;
        check_plane(&data_v, stride_v, chroma_width, chroma_height)?;

        Ok(Self {
            inner: Arc::new(I420Inner {
                width,
                height,
                strides: [stride_y, stride_u, stride_v],
                planes: RwLock::new(Some([data_y, data_u, data_v])),
                alpha: RwLock::new(None),
                ref_count: RefCount::new(on_release),
            }),
        })
    }

    /// Allocate a zero-filled buffer with tightly packed strides
    pub fn allocate(width: u32, height: u32) -> Result<Self> {
        let (cw, ch) = (chroma_extent(width) as usize, chroma_extent(height) as usize);
        let (w, h) = (width as usize, height as usize);
        Self::wrap(
            width,
            height,
            Bytes::from(vec![0u8; w * h]),
            w,
            Bytes::from(vec![0u8; cw * ch]),
            cw,
            Bytes::from(vec![0u8; cw * ch]),
            cw,
            None,
        )
    }

    /// Allocate a black frame (Y = 0, U = V = 128)
    pub fn black(width: u32, height: u32) -> Result<Self> {
        let (cw, ch) = (chroma_extent(width) as usize, chroma_extent(height) as usize);
        let (w, h) = (width as usize, height as usize);
        Self::wrap(
            width,
            height,
            Bytes::from(vec![0u8; w * h]),
            w,
            Bytes::from(vec![128u8; cw * ch]),
            cw,
            Bytes::from(vec![128u8; cw * ch]),
            cw,
            None,
        )
    }

    /// Copy strided planes into a new, tightly packed buffer
    #[allow(clippy::too_many_arguments)]
    pub fn copy_from(
        width: u32,
        height: u32,
        src_y: &[u8],
        stride_y: usize,
        src_u: &[u8],
        stride_u: usize,
        src_v: &[u8],
        stride_v: usize,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let (cw, ch) = (chroma_extent(width) as usize, chroma_extent(height) as usize);
        let (w, h) = (width as usize, height as usize);
        let y = pack_plane(src_y, stride_y, w, h)?;
        let u = pack_plane(src_u, stride_u, cw, ch)?;
        let v = pack_plane(src_v, stride_v, cw, ch)?;
        Self::wrap(width, height, y.into(), w, u.into(), cw, v.into(), cw, None)
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn chroma_width(&self) -> u32 {
        chroma_extent(self.inner.width)
    }

    pub fn chroma_height(&self) -> u32 {
        chroma_extent(self.inner.height)
    }

    pub fn stride_y(&self) -> usize {
        self.inner.strides[0]
    }

    pub fn stride_u(&self) -> usize {
        self.inner.strides[1]
    }

    pub fn stride_v(&self) -> usize {
        self.inner.strides[2]
    }

    /// All three planes (Y, U, V) as cheap `Bytes` handles
    pub fn planes(&self) -> Result<[Bytes; 3]> {
        self.inner
            .planes
            .read()
            .as_ref()
            .cloned()
            .ok_or(FrameError::DisposedBuffer)
    }

    pub fn data_y(&self) -> Result<Bytes> {
        self.planes().map(|[y, _, _]| y)
    }

    pub fn data_u(&self) -> Result<Bytes> {
        self.planes().map(|[_, u, _]| u)
    }

    pub fn data_v(&self) -> Result<Bytes> {
        self.planes().map(|[_, _, v]| v)
    }

    pub fn retain(&self) -> Result<()> {
        self.inner.ref_count.retain()
    }

    /// Drop an owner; frees the planes when the last owner releases.
    ///
    /// Returns `true` if this call released the last owner.
    pub fn release(&self) -> Result<bool> {
        let released = self.inner.ref_count.release()?;
        if released {
            self.inner.planes.write().take();
            self.inner.alpha.write().take();
        }
        Ok(released)
    }

    pub fn ref_count(&self) -> usize {
        self.inner.ref_count.count()
    }

    fn attach_alpha(&self, data_a: Bytes) -> Result<()> {
        self.inner.ref_count.ensure_alive()?;
        *self.inner.alpha.write() = Some(data_a);
        Ok(())
    }

    fn alpha(&self) -> Result<Bytes> {
        self.inner
            .alpha
            .read()
            .as_ref()
            .cloned()
            .ok_or(FrameError::DisposedBuffer)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.ref_count.is_alive()
    }

    /// Whether both handles refer to the same buffer
    pub fn ptr_eq(&self, other: &I420Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// An I420 buffer is already planar: returns itself with one more owner
    pub fn to_i420(&self) -> Result<I420Buffer> {
        self.retain()?;
        Ok(self.clone())
    }

    /// Crop to `crop_width x crop_height` at `(x, y)` and scale to
    /// `scale_width x scale_height`.
    ///
    /// Without scaling the result is a view sharing this buffer's memory; it
    /// holds an owner of this buffer until it is released itself. With
    /// scaling every plane is box-filtered into a new allocation.
    #[allow(clippy::too_many_arguments)]
    pub fn crop_and_scale(
        &self,
        x: u32,
        y: u32,
        crop_width: u32,
        crop_height: u32,
        scale_width: u32,
        scale_height: u32,
    ) -> Result<I420Buffer> {
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
        let planes = self.planes()?;

        if crop_width == scale_width && crop_height == scale_height {
            return self.crop_view(&planes, x, y, crop_width, crop_height);
        }

        let [src_y, src_u, src_v] = planes;
        let [stride_y, stride_u, stride_v] = self.inner.strides;
        let (x, y) = (x as usize, y as usize);
        let (chroma_x, chroma_y) = (x / 2, y / 2);

        let dst_w = scale_width as usize;
        let dst_h = scale_height as usize;
        let dst_cw = chroma_extent(scale_width) as usize;
        let dst_ch = chroma_extent(scale_height) as usize;
        let src_cw = chroma_extent(crop_width) as usize;
        let src_ch = chroma_extent(crop_height) as usize;

        let mut out_y = vec![0u8; dst_w * dst_h];
        let mut out_u = vec![0u8; dst_cw * dst_ch];
        let mut out_v = vec![0u8; dst_cw * dst_ch];

        scale_plane_box(
            &src_y[y * stride_y + x..],
            stride_y,
            crop_width as usize,
            crop_height as usize,
            &mut out_y,
            dst_w,
            dst_w,
            dst_h,
        );
        scale_plane_box(
            &src_u[chroma_y * stride_u + chroma_x..],
            stride_u,
            src_cw,
            src_ch,
            &mut out_u,
            dst_cw,
            dst_cw,
            dst_ch,
        );
        scale_plane_box(
            &src_v[chroma_y * stride_v + chroma_x..],
            stride_v,
            src_cw,
            src_ch,
            &mut out_v,
            dst_cw,
            dst_cw,
            dst_ch,
        );

        Self::wrap(
            scale_width,
            scale_height,
            out_y.into(),
            dst_w,
            out_u.into(),
            dst_cw,
            out_v.into(),
            dst_cw,
            None,
        )
    }

    fn crop_view(
        &self,
        planes: &[Bytes; 3],
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<I420Buffer> {
        let [stride_y, stride_u, stride_v] = self.inner.strides;
        let (x, y) = (x as usize, y as usize);
        let offset_y = y * stride_y + x;
        let offset_u = (y / 2) * stride_u + x / 2;
        let offset_v = (y / 2) * stride_v + x / 2;

        self.retain()?;
        let source = self.clone();
        let on_release: ReleaseCallback = Box::new(move || {
            if let Err(err) = source.release() {
                tracing::warn!("Cropped I420 view could not release its source: {}", err);
            }
        });

        let view = Self::wrap(
            width,
            height,
            planes[0].slice(offset_y..),
            stride_y,
            planes[1].slice(offset_u..),
            stride_u,
            planes[2].slice(offset_v..),
            stride_v,
            Some(on_release),
        );
        match view {
            Ok(view) => Ok(view),
            Err(err) => {
                self.release()?;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for I420Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I420Buffer")
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("strides", &self.inner.strides)
            .field("ref_count", &self.inner.ref_count.count())
            .finish()
    }
}

/// Copy `height` rows of `width` bytes out of a strided plane
fn pack_plane(src: &[u8], stride: usize, width: usize, height: usize) -> Result<Vec<u8>> {
    if stride < width {
        return Err(FrameError::InvalidDimensions {
            width: width as u32,
            height: height as u32,
        });
    }
    let required = min_plane_len(stride, width, height);
    if src.len() < required {
        return Err(FrameError::InsufficientCapacity {
            required,
            actual: src.len(),
        });
    }
    let mut out = Vec::with_capacity(width * height);
    for row in 0..height {
        let start = row * stride;
        out.extend_from_slice(&src[start..start + width]);
    }
    Ok(out)
}

/// Source range `[start, end)` covered by destination index `i`.
///
/// Downscaling averages the whole box; upscaling degenerates to a one-sample
/// box, i.e. point sampling.
fn box_range(i: usize, src_len: usize, dst_len: usize) -> (usize, usize) {
    let start = i * src_len / dst_len;
    let end = ((i + 1) * src_len / dst_len).max(start + 1).min(src_len);
    (start, end)
}

/// Box-filter resample of one 8-bit plane.
///
/// `src` starts at the first pixel of the source rectangle.
#[allow(clippy::too_many_arguments)]
pub fn scale_plane_box(
    src: &[u8],
    src_stride: usize,
    src_width: usize,
    src_height: usize,
    dst: &mut [u8],
    dst_stride: usize,
    dst_width: usize,
    dst_height: usize,
) {
    let columns: Vec<(usize, usize)> = (0..dst_width)
        .map(|x| box_range(x, src_width, dst_width))
        .collect();

    for dy in 0..dst_height {
        let (y0, y1) = box_range(dy, src_height, dst_height);
        let dst_row = &mut dst[dy * dst_stride..dy * dst_stride + dst_width];
        for (dx, &(x0, x1)) in columns.iter().enumerate() {
            let mut sum = 0u32;
            for sy in y0..y1 {
                let row = &src[sy * src_stride..sy * src_stride + src_width];
                sum += row[x0..x1].iter().map(|&p| p as u32).sum::<u32>();
            }
            let count = ((y1 - y0) * (x1 - x0)) as u32;
            dst_row[dx] = ((sum + count / 2) / count) as u8;
        }
    }
}

/// I420 frame with a full-resolution alpha plane.
///
/// Composes an [`I420Buffer`] and shares its reference count. The alpha plane
/// is stored with the color planes, so whichever handle releases the last
/// owner (this buffer, a crop view's source, or a `to_i420` result) frees
/// all four together.
#[derive(Clone)]
pub struct I420ABuffer {
    i420: I420Buffer,
    stride_a: usize,
}

impl I420ABuffer {
    /// Attach an alpha plane to `i420`, taking over its ownership
    pub fn wrap(i420: I420Buffer, data_a: Bytes, stride_a: usize) -> Result<Self> {
        check_plane(&data_a, stride_a, i420.width(), i420.height())?;
        i420.attach_alpha(data_a)?;
        Ok(Self { i420, stride_a })
    }

    pub fn width(&self) -> u32 {
        self.i420.width()
    }

    pub fn height(&self) -> u32 {
        self.i420.height()
    }

    /// The embedded color planes
    pub fn i420(&self) -> &I420Buffer {
        &self.i420
    }

    pub fn stride_a(&self) -> usize {
        self.stride_a
    }

    pub fn data_a(&self) -> Result<Bytes> {
        self.i420.alpha()
    }

    pub fn retain(&self) -> Result<()> {
        self.i420.retain()
    }

    pub fn release(&self) -> Result<bool> {
        self.i420.release()
    }

    pub fn ref_count(&self) -> usize {
        self.i420.ref_count()
    }

    pub fn is_alive(&self) -> bool {
        self.i420.is_alive()
    }

    /// The color planes with one more owner on the shared count
    pub fn to_i420(&self) -> Result<I420Buffer> {
        self.i420.to_i420()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn crop_and_scale(
        &self,
        x: u32,
        y: u32,
        crop_width: u32,
        crop_height: u32,
        scale_width: u32,
        scale_height: u32,
    ) -> Result<I420ABuffer> {
        // Validates the rectangle and the count before touching alpha.
        let color = self.i420.crop_and_scale(
            x,
            y,
            crop_width,
            crop_height,
            scale_width,
            scale_height,
        )?;
        let alpha = match self.data_a() {
            Ok(alpha) => alpha,
            Err(err) => {
                color.release()?;
                return Err(err);
            }
        };
        let stride_a = self.stride_a;
        let offset = y as usize * stride_a + x as usize;

        let (data_a, out_stride) = if crop_width == scale_width && crop_height == scale_height {
            (alpha.slice(offset..), stride_a)
        } else {
            let mut out = vec![0u8; scale_width as usize * scale_height as usize];
            scale_plane_box(
                &alpha[offset..],
                stride_a,
                crop_width as usize,
                crop_height as usize,
                &mut out,
                scale_width as usize,
                scale_width as usize,
                scale_height as usize,
            );
            (Bytes::from(out), scale_width as usize)
        };

        match Self::wrap(color.clone(), data_a, out_stride) {
            Ok(buffer) => Ok(buffer),
            Err(err) => {
                color.release()?;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for I420ABuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I420ABuffer")
            .field("i420", &self.i420)
            .field("stride_a", &self.stride_a)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> I420Buffer {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (chroma_extent(width) as usize, chroma_extent(height) as usize);
        let y: Vec<u8> = (0..w * h).map(|i| ((i % w) * 4 + (i / w)) as u8).collect();
        let u: Vec<u8> = (0..cw * ch).map(|i| (100 + i % cw) as u8).collect();
        let v: Vec<u8> = (0..cw * ch).map(|i| (150 - i / cw) as u8).collect();
        I420Buffer::copy_from(width, height, &y, w, &u, cw, &v, cw).unwrap()
    }

    fn plane_rows(data: &[u8], stride: usize, width: usize, height: usize) -> Vec<Vec<u8>> {
        (0..height)
            .map(|r| data[r * stride..r * stride + width].to_vec())
            .collect()
    }

    #[test]
    fn test_chroma_extent_rounds_up() {
        assert_eq!(chroma_extent(1), 1);
        assert_eq!(chroma_extent(2), 1);
        assert_eq!(chroma_extent(7), 4);
        assert_eq!(chroma_extent(48), 24);
    }

    #[test]
    fn test_wrap_rejects_short_planes() {
        let err = I420Buffer::wrap(
            4,
            4,
            Bytes::from(vec![0u8; 15]),
            4,
            Bytes::from(vec![0u8; 4]),
            2,
            Bytes::from(vec![0u8; 4]),
            2,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FrameError::InsufficientCapacity {
                required: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn test_wrap_rejects_narrow_stride() {
        let err = I420Buffer::wrap(
            4,
            2,
            Bytes::from(vec![0u8; 8]),
            3,
            Bytes::from(vec![0u8; 2]),
            2,
            Bytes::from(vec![0u8; 2]),
            2,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_last_row_needs_no_stride_padding() {
        // 3x3 with stride 8: last row only needs 3 bytes
        let buffer = I420Buffer::wrap(
            3,
            3,
            Bytes::from(vec![0u8; 8 * 2 + 3]),
            8,
            Bytes::from(vec![0u8; 8 + 2]),
            8,
            Bytes::from(vec![0u8; 8 + 2]),
            8,
            None,
        );
        assert!(buffer.is_ok());
    }

    #[test]
    fn test_to_i420_shares_and_retains() {
        let buffer = gradient(8, 8);
        let same = buffer.to_i420().unwrap();
        assert!(same.ptr_eq(&buffer));
        assert_eq!(buffer.ref_count(), 2);
        assert!(!same.release().unwrap());
        assert!(buffer.release().unwrap());
        assert!(matches!(buffer.data_y(), Err(FrameError::DisposedBuffer)));
        assert!(matches!(buffer.to_i420(), Err(FrameError::DisposedBuffer)));
    }

    #[test]
    fn test_identity_crop_is_a_view_with_identical_pixels() {
        let buffer = gradient(10, 6);
        let view = buffer.crop_and_scale(0, 0, 10, 6, 10, 6).unwrap();
        assert_eq!(buffer.ref_count(), 2);
        assert_eq!(view.data_y().unwrap(), buffer.data_y().unwrap());
        assert_eq!(view.data_u().unwrap(), buffer.data_u().unwrap());
        assert_eq!(view.data_v().unwrap(), buffer.data_v().unwrap());

        // The view keeps the source alive until it is released itself.
        assert!(!buffer.release().unwrap());
        assert!(view.data_y().is_ok());
        assert!(view.release().unwrap());
        assert!(!buffer.is_alive());
    }

    #[test]
    fn test_crop_view_offsets_planes() {
        let buffer = gradient(8, 8);
        let view = buffer.crop_and_scale(2, 4, 4, 4, 4, 4).unwrap();
        let src_y = buffer.data_y().unwrap();
        let view_y = view.data_y().unwrap();
        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(
                    view_y[row * view.stride_y() + col],
                    src_y[(row + 4) * 8 + col + 2]
                );
            }
        }
        let src_u = buffer.data_u().unwrap();
        let view_u = view.data_u().unwrap();
        assert_eq!(view_u[0], src_u[2 * 4 + 1]);
        view.release().unwrap();
        buffer.release().unwrap();
    }

    #[test]
    fn test_odd_crop_origin_rounds_chroma_toward_zero() {
        let buffer = gradient(8, 8);
        let view = buffer.crop_and_scale(3, 3, 4, 4, 4, 4).unwrap();
        let src_v = buffer.data_v().unwrap();
        let view_v = view.data_v().unwrap();
        assert_eq!(view_v[0], src_v[4 + 1]);
        view.release().unwrap();
        buffer.release().unwrap();
    }

    #[test]
    fn test_invalid_crop_rejected_before_work() {
        let buffer = gradient(8, 8);
        assert!(matches!(
            buffer.crop_and_scale(4, 0, 5, 8, 5, 8),
            Err(FrameError::InvalidCrop { .. })
        ));
        assert!(matches!(
            buffer.crop_and_scale(0, 0, 8, 8, 0, 4),
            Err(FrameError::InvalidCrop { .. })
        ));
        assert_eq!(buffer.ref_count(), 1);
    }

    #[test]
    fn test_downscale_box_averages() {
        let y = [10u8, 20, 30, 40, 50, 60, 70, 80];
        let u = [100u8, 200];
        let v = [50u8, 150];
        let buffer = I420Buffer::copy_from(4, 2, &y, 4, &u, 2, &v, 2).unwrap();
        let scaled = buffer.crop_and_scale(0, 0, 4, 2, 2, 1).unwrap();
        assert!(!scaled.ptr_eq(&buffer));
        let out_y = scaled.data_y().unwrap();
        assert_eq!(&out_y[..], &[35, 55]);
        let out_u = scaled.data_u().unwrap();
        assert_eq!(&out_u[..], &[150]);
        let out_v = scaled.data_v().unwrap();
        assert_eq!(&out_v[..], &[100]);
        // Scaled buffers own their memory and hold no reference to the source.
        assert_eq!(buffer.ref_count(), 1);
    }

    #[test]
    fn test_upscale_point_samples() {
        let y = [0u8, 100, 200, 250];
        let buffer = I420Buffer::copy_from(2, 2, &y, 2, &[128], 1, &[128], 1).unwrap();
        let scaled = buffer.crop_and_scale(0, 0, 2, 2, 4, 4).unwrap();
        let out = scaled.data_y().unwrap();
        let rows = plane_rows(&out, 4, 4, 4);
        assert_eq!(rows[0], vec![0, 0, 100, 100]);
        assert_eq!(rows[3], vec![200, 200, 250, 250]);
    }

    #[test]
    fn test_i420a_shares_count_and_crops_alpha() {
        let color = gradient(4, 4);
        let alpha: Vec<u8> = (0..16).collect();
        let buffer = I420ABuffer::wrap(color, Bytes::from(alpha), 4).unwrap();

        let cropped = buffer.crop_and_scale(2, 2, 2, 2, 2, 2).unwrap();
        let a = cropped.data_a().unwrap();
        assert_eq!(a[0], 10);
        assert_eq!(a[cropped.stride_a() + 1], 15);
        assert_eq!(buffer.ref_count(), 2);

        let scaled = buffer.crop_and_scale(0, 0, 4, 4, 2, 2).unwrap();
        assert_eq!(&scaled.data_a().unwrap()[..], &[3, 5, 11, 13]);

        cropped.release().unwrap();
        scaled.release().unwrap();
        assert!(buffer.release().unwrap());
        assert!(matches!(buffer.data_a(), Err(FrameError::DisposedBuffer)));
    }

    #[test]
    fn test_i420a_alpha_freed_when_crop_view_releases_last_owner() {
        let alpha: Vec<u8> = (0..16).collect();
        let buffer = I420ABuffer::wrap(I420Buffer::black(4, 4).unwrap(), Bytes::from(alpha), 4).unwrap();

        let view = buffer.crop_and_scale(0, 0, 2, 2, 2, 2).unwrap();
        assert!(!buffer.release().unwrap());
        assert!(buffer.data_a().is_ok());

        assert!(view.release().unwrap());
        assert!(!buffer.is_alive());
        assert!(matches!(buffer.data_a(), Err(FrameError::DisposedBuffer)));
        assert!(matches!(view.data_a(), Err(FrameError::DisposedBuffer)));
    }

    #[test]
    fn test_i420a_alpha_freed_when_color_handle_releases_last_owner() {
        let buffer = I420ABuffer::wrap(I420Buffer::black(4, 4).unwrap(), Bytes::from(vec![255u8; 16]), 4).unwrap();

        let color = buffer.to_i420().unwrap();
        assert!(!buffer.release().unwrap());
        assert!(color.release().unwrap());

        assert!(!buffer.is_alive());
        assert!(matches!(buffer.data_a(), Err(FrameError::DisposedBuffer)));
        assert!(matches!(buffer.i420().data_y(), Err(FrameError::DisposedBuffer)));
    }

    #[test]
    fn test_i420a_wrap_rejects_released_color() {
        let color = I420Buffer::black(4, 4).unwrap();
        color.release().unwrap();
        assert!(matches!(
            I420ABuffer::wrap(color, Bytes::from(vec![0u8; 16]), 4),
            Err(FrameError::DisposedBuffer)
        ));
    }
}
