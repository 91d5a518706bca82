//! Error types shared by every frame, shader and conversion operation.

use std::fmt;

use thiserror::Error;

use crate::settings::SettingsError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, FrameError>;

/// Stage of shader compilation that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    /// Pipeline creation (the equivalent of a program link step)
    Pipeline,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
            ShaderStage::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// Errors raised by frame buffers, the drawer and the YUV converter.
///
/// Every failure is synchronous and leaves caller-visible state untouched.
#[derive(Debug, Error)]
pub enum FrameError {
    /// A buffer was used after its reference count reached zero
    #[error("frame buffer used after its reference count reached zero")]
    DisposedBuffer,

    /// Generated or caller-supplied shader source failed to compile
    #[error("{stage} shader failed to compile:\n{diagnostic}")]
    ShaderCompile {
        stage: ShaderStage,
        diagnostic: String,
    },

    /// Crop rectangle or output size violates the buffer bounds
    #[error(
        "invalid crop {crop_width}x{crop_height} at ({x}, {y}) scaled to \
         {scale_width}x{scale_height} on a {width}x{height} buffer"
    )]
    InvalidCrop {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        crop_width: u32,
        crop_height: u32,
        scale_width: u32,
        scale_height: u32,
    },

    /// A destination or plane is smaller than the layout requires
    #[error("buffer too small: expected at least {required} bytes, got {actual}")]
    InsufficientCapacity { required: usize, actual: usize },

    /// Width or height is zero, or a stride is narrower than its plane
    #[error("invalid buffer dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Texture handle plane count does not match the source format
    #[error("{format} textures need {expected} plane(s), handle has {actual}")]
    TextureFormatMismatch {
        format: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Viewport extends past the render target
    #[error(
        "viewport {width}x{height} at ({x}, {y}) exceeds the \
         {target_width}x{target_height} render target"
    )]
    InvalidViewport {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },

    /// The YUV converter was used after `release()`
    #[error("YUV converter used after release")]
    ConverterReleased,

    /// A texture buffer was asked for planar pixels but has no converter attached
    #[error("texture buffer has no I420 converter attached")]
    NoConverter,

    /// Mapping the readback buffer failed
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// No adapter matched the requested options
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a device
    #[error("failed to create GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Pipeline settings could not be loaded or saved
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_compile_message_carries_diagnostic() {
        let err = FrameError::ShaderCompile {
            stage: ShaderStage::Fragment,
            diagnostic: "expected ';'".to_string(),
        };
        let message = err.to_string();
        assert!(message.starts_with("fragment shader failed to compile"));
        assert!(message.contains("expected ';'"));
    }

    #[test]
    fn test_invalid_crop_message() {
        let err = FrameError::InvalidCrop {
            width: 16,
            height: 8,
            x: 10,
            y: 0,
            crop_width: 8,
            crop_height: 8,
            scale_width: 8,
            scale_height: 8,
        };
        assert!(err.to_string().contains("16x8 buffer"));
    }
}
