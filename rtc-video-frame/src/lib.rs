//! RTC Video Frame Library
//!
//! Reference-counted video frame buffers (planar I420/I420A and GPU
//! textures), a wgpu drawing pipeline that renders any of them with a
//! rotation and an optional transform, and a GPU converter that packs
//! textures back into I420 through a single readback.

pub mod converter;
pub mod drawer;
pub mod error;
pub mod frame;
pub mod gpu_context;
pub mod settings;
pub mod shaders;
pub mod telemetry;
pub mod yuv_helper;

pub use converter::{PackedLayout, SharedYuvConverter, YuvConverter};
pub use drawer::{
    render_matrix, DrawParams, FrameDrawer, FrameInformation, GenericDrawer, RenderTarget, ShaderCallbacks,
    Viewport, YuvUploader,
};
pub use error::{FrameError, Result, ShaderStage};
pub use frame::{
    frame_handoff, BufferType, FrameBuffer, FrameReceiver, FrameSender, I420ABuffer, I420Buffer, Rotation,
    SourceFormat, TextureBuffer, TextureHandle, TextureToI420, VideoFrame,
};
pub use gpu_context::GpuContext;
pub use settings::{PipelineSettings, PowerPreference, SettingsError};
