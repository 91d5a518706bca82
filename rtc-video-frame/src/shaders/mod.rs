//! Shader program builder
//!
//! Fragment programs are written once against an abstract
//! `fn sample(p: vec2<f32>) -> vec4<f32>` and specialized per
//! [`SourceFormat`]:
//! - `Rgb` / `Oes`: one texture `tex`; every `sample(` call becomes a
//!   `textureSample(tex, tex_sampler, ` call.
//! - `Yuv`: three textures `y_tex`, `u_tex`, `v_tex` and a generated `sample`
//!   that converts to RGB.
//!
//! Binding convention (shared with the drawer):
//! - `@group(0) @binding(0)`: `tex_matrix` (vertex stage)
//! - `@group(0) @binding(1)`: optional caller uniforms (fragment stage)
//! - `@group(1) @binding(0..=2)`: Y/RGB/OES, U, V textures
//! - `@group(1) @binding(3)`: the shared sampler

use crate::error::{FrameError, Result, ShaderStage};
use crate::frame::SourceFormat;

/// Vertex stage shared by every program
pub const VERTEX_SHADER: &str = include_str!("textured_quad.wgsl");

/// Fragment body that draws the input unchanged
pub const PASSTHROUGH_FRAGMENT: &str = include_str!("passthrough.wgsl");

/// Fragment body that packs four samples of one plane into an RGBA texel
pub const YUV_PACK_FRAGMENT: &str = include_str!("yuv_pack.wgsl");

const RGB_TEXTURE_DECLS: &str = include_str!("rgb_texture.wgsl");
const YUV_SAMPLE_FN: &str = include_str!("yuv_sample.wgsl");

const FRAGMENT_PRELUDE: &str = "struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tc: vec2<f32>,
}
";

/// Texture binding for Y, RGB and OES inputs
pub const TEXTURE_BINDING: u32 = 0;
pub const U_TEXTURE_BINDING: u32 = 1;
pub const V_TEXTURE_BINDING: u32 = 2;
pub const SAMPLER_BINDING: u32 = 3;

pub const TEX_MATRIX_BINDING: u32 = 0;
pub const CUSTOM_UNIFORM_BINDING: u32 = 1;

/// Vertex of the unit quad; position in clip space, texture coordinate in
/// `[0, 1]` with `(0, 0)` at the first row of the texture
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub pos: [f32; 2],
    pub tc: [f32; 2],
}

/// Triangle strip covering the viewport
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { pos: [-1.0, 1.0], tc: [0.0, 0.0] },
    QuadVertex { pos: [1.0, 1.0], tc: [1.0, 0.0] },
    QuadVertex { pos: [-1.0, -1.0], tc: [0.0, 1.0] },
    QuadVertex { pos: [1.0, -1.0], tc: [1.0, 1.0] },
];

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

impl QuadVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        }
    }
}

/// Complete fragment shader source for `format` around `body`.
///
/// Pure and deterministic: the same inputs always produce the same text.
pub fn build_fragment_shader(format: SourceFormat, body: &str) -> String {
    let mut source = String::with_capacity(FRAGMENT_PRELUDE.len() + body.len() + 512);
    source.push_str(FRAGMENT_PRELUDE);
    source.push('\n');
    match format {
        SourceFormat::Rgb | SourceFormat::Oes => {
            source.push_str(RGB_TEXTURE_DECLS);
            source.push('\n');
            source.push_str(&substitute_sample_calls(body));
        }
        SourceFormat::Yuv => {
            source.push_str(YUV_SAMPLE_FN);
            source.push('\n');
            source.push_str(body);
        }
    }
    source
}

/// Replace calls to the abstract `sample(` with a direct texture sample.
/// Identifiers merely ending in `sample` (e.g. `resample(`) are left alone.
fn substitute_sample_calls(body: &str) -> String {
    const CALL: &str = "sample(";
    let mut out = String::with_capacity(body.len() + 64);
    let mut rest = body;
    while let Some(pos) = rest.find(CALL) {
        let inside_identifier = rest[..pos]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        out.push_str(&rest[..pos]);
        if inside_identifier {
            out.push_str(CALL);
        } else {
            out.push_str("textureSample(tex, tex_sampler, ");
        }
        rest = &rest[pos + CALL.len()..];
    }
    out.push_str(rest);
    out
}

/// Parse and validate WGSL offline, reporting failures for `stage`
pub fn validate_wgsl(source: &str, stage: ShaderStage) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| FrameError::ShaderCompile {
        stage,
        diagnostic: err.emit_to_string(source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|err| FrameError::ShaderCompile {
        stage,
        diagnostic: err.emit_to_string(source),
    })?;

    Ok(module)
}

/// What to compile: input format, fragment body and render target
#[derive(Debug, Clone, Copy)]
pub struct ProgramDescriptor<'a> {
    pub format: SourceFormat,
    pub fragment_body: &'a str,
    pub target_format: wgpu::TextureFormat,
    /// Size of the caller uniform block at `@group(0) @binding(1)`, if any
    pub custom_uniform_size: Option<u64>,
}

/// A compiled render pipeline for one input format
#[derive(Debug)]
pub struct ShaderProgram {
    format: SourceFormat,
    pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    has_custom_uniforms: bool,
}

impl ShaderProgram {
    /// Generate, validate and compile a program.
    ///
    /// WGSL errors are caught by naga before anything reaches the device;
    /// anything wgpu rejects afterwards (e.g. a binding mismatch) is reported
    /// as a `Pipeline` stage failure.
    pub fn compile(device: &wgpu::Device, desc: &ProgramDescriptor<'_>) -> Result<Self> {
        let fragment_source = build_fragment_shader(desc.format, desc.fragment_body);
        validate_wgsl(VERTEX_SHADER, ShaderStage::Vertex)?;
        validate_wgsl(&fragment_source, ShaderStage::Fragment)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let label = format!("{} Program", desc.format);
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Textured Quad Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(VERTEX_SHADER.into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
        });

        let custom_size = desc.custom_uniform_size.filter(|size| *size > 0);
        let uniform_layout = create_uniform_layout(device, custom_size);
        let texture_layout = create_texture_layout(device, desc.format);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&label),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FrameError::ShaderCompile {
                stage: ShaderStage::Pipeline,
                diagnostic: err.to_string(),
            });
        }

        tracing::debug!("Compiled {} shader program", desc.format);

        Ok(Self {
            format: desc.format,
            pipeline,
            uniform_layout,
            texture_layout,
            has_custom_uniforms: custom_size.is_some(),
        })
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn has_custom_uniforms(&self) -> bool {
        self.has_custom_uniforms
    }

    /// Bind group for `tex_matrix` and, if the program has one, the caller
    /// uniform buffer
    pub fn uniform_bind_group(
        &self,
        device: &wgpu::Device,
        tex_matrix: &wgpu::Buffer,
        custom: Option<&wgpu::Buffer>,
    ) -> wgpu::BindGroup {
        let mut entries = vec![wgpu::BindGroupEntry {
            binding: TEX_MATRIX_BINDING,
            resource: tex_matrix.as_entire_binding(),
        }];
        if let (true, Some(custom)) = (self.has_custom_uniforms, custom) {
            entries.push(wgpu::BindGroupEntry {
                binding: CUSTOM_UNIFORM_BINDING,
                resource: custom.as_entire_binding(),
            });
        }
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Program Uniforms"),
            layout: &self.uniform_layout,
            entries: &entries,
        })
    }

    /// Bind group for the input texture(s) in binding order plus the sampler
    pub fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        views: &[&wgpu::TextureView],
        sampler: &wgpu::Sampler,
    ) -> Result<wgpu::BindGroup> {
        if views.len() != self.format.plane_count() {
            return Err(FrameError::TextureFormatMismatch {
                format: self.format.name(),
                expected: self.format.plane_count(),
                actual: views.len(),
            });
        }
        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(i, view)| wgpu::BindGroupEntry {
                binding: TEXTURE_BINDING + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Program Textures"),
            layout: &self.texture_layout,
            entries: &entries,
        }))
    }
}

fn create_uniform_layout(device: &wgpu::Device, custom_size: Option<u64>) -> wgpu::BindGroupLayout {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: TEX_MATRIX_BINDING,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<[f32; 16]>() as u64),
        },
        count: None,
    }];
    if let Some(size) = custom_size {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: CUSTOM_UNIFORM_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(size),
            },
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Program Uniform Layout"),
        entries: &entries,
    })
}

fn create_texture_layout(device: &wgpu::Device, format: SourceFormat) -> wgpu::BindGroupLayout {
    let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..format.plane_count() as u32)
        .map(|i| wgpu::BindGroupLayoutEntry {
            binding: TEXTURE_BINDING + i,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        })
        .collect();
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: SAMPLER_BINDING,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Program Texture Layout"),
        entries: &entries,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FORMATS: [SourceFormat; 3] = [SourceFormat::Rgb, SourceFormat::Oes, SourceFormat::Yuv];

    #[test]
    fn test_vertex_shader_validates() {
        let module = validate_wgsl(VERTEX_SHADER, ShaderStage::Vertex).unwrap();
        assert!(module.entry_points.iter().any(|ep| ep.name == "vs_main"));
    }

    #[test]
    fn test_generated_fragments_validate_for_every_format() {
        for format in ALL_FORMATS {
            for body in [PASSTHROUGH_FRAGMENT, YUV_PACK_FRAGMENT] {
                let source = build_fragment_shader(format, body);
                let module = validate_wgsl(&source, ShaderStage::Fragment)
                    .unwrap_or_else(|e| panic!("{format} program failed: {e}\n{source}"));
                assert!(module.entry_points.iter().any(|ep| ep.name == "fs_main"));
            }
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        for format in ALL_FORMATS {
            assert_eq!(
                build_fragment_shader(format, YUV_PACK_FRAGMENT),
                build_fragment_shader(format, YUV_PACK_FRAGMENT)
            );
        }
    }

    #[test]
    fn test_rgb_substitutes_sample_calls() {
        let source = build_fragment_shader(SourceFormat::Rgb, PASSTHROUGH_FRAGMENT);
        assert!(source.contains("textureSample(tex, tex_sampler, in_frag.tc)"));
        assert!(source.contains("@group(1) @binding(0) var tex"));
        assert!(!source.contains("fn sample("));
    }

    #[test]
    fn test_yuv_declares_planes_and_sample_fn() {
        let source = build_fragment_shader(SourceFormat::Yuv, PASSTHROUGH_FRAGMENT);
        assert!(source.contains("fn sample(p: vec2<f32>) -> vec4<f32>"));
        assert!(source.contains("@group(1) @binding(1) var u_tex"));
        assert!(source.contains("@group(1) @binding(2) var v_tex"));
        // Body is appended unchanged.
        assert!(source.ends_with(PASSTHROUGH_FRAGMENT));
    }

    #[test]
    fn test_substitution_skips_longer_identifiers() {
        let out = substitute_sample_calls("let a = sample(p); let b = resample(p); let c = my_sample(p);");
        assert_eq!(
            out,
            "let a = textureSample(tex, tex_sampler, p); let b = resample(p); let c = my_sample(p);"
        );
    }

    #[test]
    fn test_broken_body_reports_fragment_diagnostic() {
        let body = "@fragment fn fs_main(in_frag: VertexOutput) -> @location(0) vec4<f32> { return sample(in_frag.tc) }";
        let source = build_fragment_shader(SourceFormat::Rgb, body);
        match validate_wgsl(&source, ShaderStage::Fragment) {
            Err(FrameError::ShaderCompile { stage, diagnostic }) => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(!diagnostic.is_empty());
            }
            other => panic!("expected a compile error, got {other:?}"),
        }
    }

    #[test]
    fn test_type_error_reports_fragment_diagnostic() {
        let body = "@fragment fn fs_main(in_frag: VertexOutput) -> @location(0) vec4<f32> { return in_frag.tc; }";
        let source = build_fragment_shader(SourceFormat::Yuv, body);
        assert!(matches!(
            validate_wgsl(&source, ShaderStage::Fragment),
            Err(FrameError::ShaderCompile { stage: ShaderStage::Fragment, .. })
        ));
    }

    #[test]
    fn test_quad_covers_viewport_top_left_first() {
        assert_eq!(QUAD_VERTICES[0].pos, [-1.0, 1.0]);
        assert_eq!(QUAD_VERTICES[0].tc, [0.0, 0.0]);
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
    }
}
