//! Generic textured-quad drawer
//!
//! A [`GenericDrawer`] owns one fragment body and lazily compiles it for
//! whichever [`SourceFormat`] it is asked to draw. The compiled program is
//! cached until a draw arrives with a different format.

mod frame_drawer;
mod uploader;

pub use frame_drawer::{render_matrix, FrameDrawer, FrameInformation};
pub use uploader::YuvUploader;

use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::error::{FrameError, Result};
use crate::frame::{SourceFormat, TextureHandle};
use crate::shaders::{ProgramDescriptor, ShaderProgram, QUAD_VERTICES};

/// Hooks into program creation and per-draw uniform upload
pub trait ShaderCallbacks {
    /// Size in bytes of the uniform block at `@group(0) @binding(1)`
    fn custom_uniform_size(&self) -> Option<u64> {
        None
    }

    /// Called once after each program (re)compile
    fn on_new_shader(&mut self, _format: SourceFormat) {}

    /// Bytes of the custom uniform block for the next draw
    #[allow(clippy::too_many_arguments)]
    fn on_prepare_shader(
        &mut self,
        _format: SourceFormat,
        _tex_matrix: &Mat4,
        _frame_width: u32,
        _frame_height: u32,
        _viewport_width: u32,
        _viewport_height: u32,
    ) -> Vec<u8> {
        Vec::new()
    }
}

/// Callbacks for fragment bodies without uniforms of their own
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCallbacks;

impl ShaderCallbacks for NoCallbacks {}

/// Compilation state of a drawer
#[derive(Debug, PartialEq)]
pub enum DrawerState<P> {
    Uninitialized,
    Ready { format: SourceFormat, program: P },
}

/// Single-slot program cache keyed by source format.
///
/// Switching format drops the old program before building the new one; a
/// failed build leaves the cache empty.
#[derive(Debug)]
pub struct ShaderCache<P> {
    current: Option<(SourceFormat, P)>,
    compile_count: u64,
}

impl<P> Default for ShaderCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ShaderCache<P> {
    pub fn new() -> Self {
        Self {
            current: None,
            compile_count: 0,
        }
    }

    /// The program for `format`, building it with `build` unless the cached
    /// one already matches. The flag is `true` when a build happened.
    pub fn prepare<F>(&mut self, format: SourceFormat, build: F) -> Result<(&P, bool)>
    where
        F: FnOnce(SourceFormat) -> Result<P>,
    {
        match self.current.take() {
            Some((cached, program)) if cached == format => {
                let (_, program) = self.current.insert((cached, program));
                Ok((program, false))
            }
            stale => {
                if let Some((previous, _)) = &stale {
                    tracing::debug!("Source format changed {} -> {}, recompiling", previous, format);
                }
                drop(stale);
                self.compile_count += 1;
                let program = build(format)?;
                let (_, program) = self.current.insert((format, program));
                Ok((program, true))
            }
        }
    }

    pub fn state(&self) -> DrawerState<&P> {
        match &self.current {
            Some((format, program)) => DrawerState::Ready {
                format: *format,
                program,
            },
            None => DrawerState::Uninitialized,
        }
    }

    /// Number of builds attempted since creation
    pub fn compile_count(&self) -> u64 {
        self.compile_count
    }

    /// Drop the cached program; safe to call repeatedly
    pub fn dispose(&mut self) {
        self.current = None;
    }
}

/// Pixel rectangle of the render target to draw into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Whole-target viewport
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// Where a draw lands
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    /// Clear color, or `None` to keep the existing contents
    pub clear: Option<wgpu::Color>,
}

/// What to draw
#[derive(Debug, Clone, Copy)]
pub struct DrawParams<'a> {
    pub format: SourceFormat,
    pub textures: &'a TextureHandle,
    pub tex_matrix: Mat4,
    pub frame_width: u32,
    pub frame_height: u32,
    pub viewport: Viewport,
}

struct DrawResources {
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
}

impl DrawResources {
    fn new(device: &wgpu::Device) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Drawer Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Drawer Quad"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self { sampler, quad }
    }
}

/// Draws textures through a format-specialized fragment program
pub struct GenericDrawer<C: ShaderCallbacks = NoCallbacks> {
    fragment_body: String,
    target_format: wgpu::TextureFormat,
    callbacks: C,
    cache: ShaderCache<ShaderProgram>,
    resources: Option<DrawResources>,
}

impl GenericDrawer<NoCallbacks> {
    pub fn without_callbacks(fragment_body: impl Into<String>, target_format: wgpu::TextureFormat) -> Self {
        Self::new(fragment_body, target_format, NoCallbacks)
    }
}

impl<C: ShaderCallbacks> GenericDrawer<C> {
    /// Nothing touches the GPU until the first draw
    pub fn new(fragment_body: impl Into<String>, target_format: wgpu::TextureFormat, callbacks: C) -> Self {
        Self {
            fragment_body: fragment_body.into(),
            target_format,
            callbacks,
            cache: ShaderCache::new(),
            resources: None,
        }
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    pub fn callbacks(&self) -> &C {
        &self.callbacks
    }

    pub fn callbacks_mut(&mut self) -> &mut C {
        &mut self.callbacks
    }

    pub fn state(&self) -> DrawerState<&ShaderProgram> {
        self.cache.state()
    }

    pub fn compile_count(&self) -> u64 {
        self.cache.compile_count()
    }

    /// Make sure a program for `format` is compiled
    pub fn prepare_shader(&mut self, device: &wgpu::Device, format: SourceFormat) -> Result<&ShaderProgram> {
        prepare_program(
            &mut self.cache,
            &mut self.callbacks,
            device,
            &self.fragment_body,
            self.target_format,
            format,
        )
    }

    /// Record one quad draw into `encoder` as its own render pass
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        target: &RenderTarget<'_>,
        params: &DrawParams<'_>,
    ) -> Result<()> {
        let viewport = params.viewport;
        let fits = viewport.width > 0
            && viewport.height > 0
            && viewport.x.checked_add(viewport.width).is_some_and(|r| r <= target.width)
            && viewport.y.checked_add(viewport.height).is_some_and(|b| b <= target.height);
        if !fits {
            return Err(FrameError::InvalidViewport {
                x: viewport.x,
                y: viewport.y,
                width: viewport.width,
                height: viewport.height,
                target_width: target.width,
                target_height: target.height,
            });
        }

        let views = params.textures.views();
        if views.len() != params.format.plane_count() {
            return Err(FrameError::TextureFormatMismatch {
                format: params.format.name(),
                expected: params.format.plane_count(),
                actual: views.len(),
            });
        }

        let Self {
            fragment_body,
            target_format,
            callbacks,
            cache,
            resources,
        } = self;
        let program = prepare_program(
            cache,
            callbacks,
            device,
            fragment_body,
            *target_format,
            params.format,
        )?;

        let custom = callbacks.on_prepare_shader(
            params.format,
            &params.tex_matrix,
            params.frame_width,
            params.frame_height,
            viewport.width,
            viewport.height,
        );
        let custom_buffer = if program.has_custom_uniforms() {
            let required = callbacks.custom_uniform_size().unwrap_or(0) as usize;
            if custom.len() < required {
                return Err(FrameError::InsufficientCapacity {
                    required,
                    actual: custom.len(),
                });
            }
            Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Drawer Custom Uniforms"),
                contents: &custom,
                usage: wgpu::BufferUsages::UNIFORM,
            }))
        } else {
            None
        };

        let matrix_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Drawer Tex Matrix"),
            contents: bytemuck::cast_slice(&params.tex_matrix.to_cols_array()),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let resources = resources.get_or_insert_with(|| DrawResources::new(device));
        let uniforms = program.uniform_bind_group(device, &matrix_buffer, custom_buffer.as_ref());
        let textures = program.texture_bind_group(device, &views, &resources.sampler)?;

        let load = match target.clear {
            Some(color) => wgpu::LoadOp::Clear(color),
            None => wgpu::LoadOp::Load,
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Generic Drawer Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(program.pipeline());
        render_pass.set_bind_group(0, &uniforms, &[]);
        render_pass.set_bind_group(1, &textures, &[]);
        render_pass.set_vertex_buffer(0, resources.quad.slice(..));
        render_pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        Ok(())
    }

    /// Release the compiled program and GPU helpers; the next draw starts over
    pub fn dispose(&mut self) {
        self.cache.dispose();
        self.resources = None;
    }
}

fn prepare_program<'a, C: ShaderCallbacks>(
    cache: &'a mut ShaderCache<ShaderProgram>,
    callbacks: &mut C,
    device: &wgpu::Device,
    fragment_body: &str,
    target_format: wgpu::TextureFormat,
    format: SourceFormat,
) -> Result<&'a ShaderProgram> {
    let custom_uniform_size = callbacks.custom_uniform_size();
    let (program, compiled) = cache.prepare(format, |format| {
        ShaderProgram::compile(
            device,
            &ProgramDescriptor {
                format,
                fragment_body,
                target_format,
                custom_uniform_size,
            },
        )
    })?;
    if compiled {
        callbacks.on_new_shader(format);
    }
    Ok(program)
}
