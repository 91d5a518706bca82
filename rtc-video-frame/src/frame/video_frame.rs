//! A frame buffer plus rotation and capture timestamp

use super::FrameBuffer;
use crate::error::Result;

/// Clockwise rotation to apply when rendering a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Parse a multiple of 90 degrees; negative values wrap around
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Whether width and height swap under this rotation
    pub fn is_transposed(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// A video frame: buffer, rotation and timestamp.
///
/// The frame does not own a reference of its own; `retain`/`release`
/// forward to the buffer.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    buffer: FrameBuffer,
    rotation: Rotation,
    timestamp_ns: i64,
}

impl VideoFrame {
    pub fn new(buffer: impl Into<FrameBuffer>, rotation: Rotation, timestamp_ns: i64) -> Self {
        Self {
            buffer: buffer.into(),
            rotation,
            timestamp_ns,
        }
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    /// Width after rotation is applied
    pub fn rotated_width(&self) -> u32 {
        if self.rotation.is_transposed() {
            self.buffer.height()
        } else {
            self.buffer.width()
        }
    }

    /// Height after rotation is applied
    pub fn rotated_height(&self) -> u32 {
        if self.rotation.is_transposed() {
            self.buffer.width()
        } else {
            self.buffer.height()
        }
    }

    pub fn retain(&self) -> Result<()> {
        self.buffer.retain()
    }

    pub fn release(&self) -> Result<bool> {
        self.buffer.release()
    }
}
