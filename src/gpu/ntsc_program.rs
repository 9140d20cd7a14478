//! GPU effect program: the NTSC render pipeline and its uniform buffer.

use anyhow::{bail, Result};
use bytemuck::{Pod, Zeroable};

use crate::program::{EffectProgram, FrameGlobals, NtscUniforms, ParamSlot, ParamValue};

/// Built-in WGSL source for the effect.
pub const NTSC_SHADER: &str = include_str!("shader_ntsc.wgsl");

/// Vertex for fullscreen quad rendering.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Fullscreen quad vertices (two triangles covering NDC).
pub(crate) const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0,  1.0], uv: [0.0, 0.0] },
];

/// The NTSC effect as a wgpu render pipeline.
pub struct NtscProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniforms: NtscUniforms,
    format: wgpu::TextureFormat,
}

impl NtscProgram {
    /// Compile `source` and build the pipeline for `format`.
    ///
    /// Validation errors are caught in an error scope and returned instead of
    /// reaching the device's uncaptured error handler.
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        source: &str,
        texture_bind_group_layout: &wgpu::BindGroupLayout,
        uniform_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Result<Self> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("NTSC Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("NTSC Pipeline Layout"),
            bind_group_layouts: &[texture_bind_group_layout, uniform_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("NTSC Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("NTSC Uniform Buffer"),
            size: std::mem::size_of::<NtscUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("NTSC Uniform Bind Group"),
            layout: uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            bail!("NTSC shader failed validation: {}", err);
        }

        Ok(Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            uniforms: NtscUniforms::default(),
            format,
        })
    }

    /// Pipeline for sub-pass `pass`. The effect has a single sub-pass.
    pub fn pipeline(&self, pass: u32) -> Option<&wgpu::RenderPipeline> {
        (pass == 0).then_some(&self.pipeline)
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn uniforms(&self) -> &NtscUniforms {
        &self.uniforms
    }

    pub(crate) fn uniform_bind_group(&self) -> &wgpu::BindGroup {
        &self.uniform_bind_group
    }

    /// Upload the pushed values. Called right before the program is drawn.
    pub(crate) fn write_uniforms(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
    }
}

impl EffectProgram for NtscProgram {
    fn set_param(&mut self, slot: ParamSlot, value: ParamValue) {
        self.uniforms.set_param(slot, value);
    }

    fn set_globals(&mut self, globals: &FrameGlobals) {
        self.uniforms.set_globals(globals);
    }
}
