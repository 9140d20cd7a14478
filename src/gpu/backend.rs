//! wgpu implementation of [`PassBackend`].
//!
//! Owns the frame target, a recycled pair of temporary textures and the
//! shared resources the NTSC program draws with. All work for a frame is
//! recorded into one command encoder and submitted in [`PassBackend::submit`].

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::backend::PassBackend;
use crate::gpu::ntsc_program::{NtscProgram, NTSC_SHADER, QUAD_VERTICES};
use crate::surface::{FrameDescriptor, SurfaceId};

/// The two per-frame temporaries. Storage is kept across frames and only
/// reallocated when the requested size or format changes.
struct Temporaries {
    textures: [wgpu::Texture; 2],
    views: [wgpu::TextureView; 2],
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

/// Frame target plus its view.
struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// GPU backend for the NTSC pass.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    /// Shader file to load instead of the built-in source.
    shader_path: Option<PathBuf>,
    target: Option<Target>,
    temporaries: Option<Temporaries>,
    temporaries_in_use: bool,
    encoder: Option<wgpu::CommandEncoder>,
    quad_vertex_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    uniform_bind_group_layout: wgpu::BindGroupLayout,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        // Fullscreen quad
        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("NTSC Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // Input texture + sampler
        let texture_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("NTSC Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        // Effect uniforms
        let uniform_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("NTSC Uniform Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Self {
            device,
            queue,
            format,
            shader_path: None,
            target: None,
            temporaries: None,
            temporaries_in_use: false,
            encoder: None,
            quad_vertex_buffer,
            sampler,
            texture_bind_group_layout,
            uniform_bind_group_layout,
        }
    }

    /// Acquire a device without a presentation surface.
    pub async fn headless(format: wgpu::TextureFormat) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("No adapter found"))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await?;

        Ok(Self::new(device, queue, format))
    }

    /// Load the effect from a WGSL file instead of the built-in shader.
    pub fn with_shader_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.shader_path = Some(path.into());
        self
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Hand the backend the frame target for the following frames.
    ///
    /// The texture must be in the backend's format and allow sampling,
    /// copying from and copying into.
    pub fn attach_target(&mut self, texture: wgpu::Texture) -> Result<()> {
        if texture.format() != self.format {
            bail!(
                "Frame target format {:?} does not match backend format {:?}",
                texture.format(),
                self.format
            );
        }
        let required = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        if !texture.usage().contains(required) {
            bail!("Frame target is missing usages {:?}", required - texture.usage());
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.target = Some(Target { texture, view });
        Ok(())
    }

    /// Take the frame target back, flushing any recorded work first.
    pub fn detach_target(&mut self) -> Option<wgpu::Texture> {
        self.flush();
        self.target.take().map(|t| t.texture)
    }

    /// Descriptor of the attached frame target.
    pub fn descriptor(&self) -> Option<FrameDescriptor> {
        self.target.as_ref().map(|t| {
            FrameDescriptor::new(t.texture.width(), t.texture.height(), t.texture.format())
        })
    }

    /// Create a frame target holding `image` and attach it.
    pub fn upload_target(&mut self, image: &RgbaImage) -> Result<()> {
        if !is_rgba8(self.format) {
            bail!("Image upload needs an RGBA8 backend format, got {:?}", self.format);
        }
        let (width, height) = image.dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        self.attach_target(texture)
    }

    /// Read the frame target back into an image.
    pub fn read_target(&mut self) -> Result<RgbaImage> {
        self.flush();
        let target = self.target.as_ref().ok_or_else(|| anyhow!("No frame target attached"))?;
        if !is_rgba8(target.texture.format()) {
            bail!("Readback needs an RGBA8 target, got {:?}", target.texture.format());
        }
        let width = target.texture.width();
        let height = target.texture.height();

        // Rows are padded to COPY_BYTES_PER_ROW_ALIGNMENT
        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            target.texture.size(),
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .context("Readback callback dropped")?
            .context("Failed to map readback buffer")?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        for row in 0..height {
            let start = (row * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
        }
        drop(data);
        output_buffer.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("Readback produced a short buffer"))
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        match self.encoder.take() {
            Some(encoder) => encoder,
            None => self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("NTSC Pass Encoder"),
            }),
        }
    }

    fn texture(&self, id: SurfaceId) -> Option<&wgpu::Texture> {
        match id {
            SurfaceId::Target => self.target.as_ref().map(|t| &t.texture),
            SurfaceId::Temp(slot) => self.temporaries.as_ref().map(|t| &t.textures[slot.index()]),
        }
    }

    fn view(&self, id: SurfaceId) -> Option<&wgpu::TextureView> {
        match id {
            SurfaceId::Target => self.target.as_ref().map(|t| &t.view),
            SurfaceId::Temp(slot) => self.temporaries.as_ref().map(|t| &t.views[slot.index()]),
        }
    }

    fn record_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        program: &NtscProgram,
        pass: u32,
        src: SurfaceId,
        dst: SurfaceId,
    ) -> bool {
        let Some(pipeline) = program.pipeline(pass) else {
            log::warn!("NTSC program has no sub-pass {}", pass);
            return false;
        };
        let (Some(input), Some(output)) = (self.view(src), self.view(dst)) else {
            log::error!("Draw {:?} -> {:?} references a missing surface", src, dst);
            return false;
        };

        program.write_uniforms(&self.queue);

        let texture_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("NTSC Texture Bind Group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("NTSC Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &texture_bind_group, &[]);
        render_pass.set_bind_group(1, program.uniform_bind_group(), &[]);
        render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
        render_pass.draw(0..6, 0..1);
        true
    }

    fn record_copy(&self, encoder: &mut wgpu::CommandEncoder, src: SurfaceId, dst: SurfaceId) {
        let (Some(from), Some(to)) = (self.texture(src), self.texture(dst)) else {
            log::error!("Copy {:?} -> {:?} references a missing surface", src, dst);
            return;
        };
        let size = wgpu::Extent3d {
            width: from.width().min(to.width()),
            height: from.height().min(to.height()),
            depth_or_array_layers: 1,
        };

        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: from,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: to,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            size,
        );
    }

    fn create_temporaries(&self, width: u32, height: u32, format: wgpu::TextureFormat) -> Temporaries {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let create_texture = |label: &str| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };

        let tex_a = create_texture("NTSC Temporary A");
        let tex_b = create_texture("NTSC Temporary B");
        let view_a = tex_a.create_view(&wgpu::TextureViewDescriptor::default());
        let view_b = tex_b.create_view(&wgpu::TextureViewDescriptor::default());

        Temporaries {
            textures: [tex_a, tex_b],
            views: [view_a, view_b],
            width,
            height,
            format,
        }
    }
}

impl PassBackend for WgpuBackend {
    type Program = NtscProgram;

    fn create_program(&mut self) -> Result<NtscProgram> {
        let source = match &self.shader_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read shader {:?}", path))?,
            None => NTSC_SHADER.to_string(),
        };
        NtscProgram::new(
            &self.device,
            self.format,
            &source,
            &self.texture_bind_group_layout,
            &self.uniform_bind_group_layout,
        )
    }

    fn acquire_temporaries(&mut self, descriptor: &FrameDescriptor) {
        if descriptor.format != self.format {
            log::warn!(
                "Frame format {:?} differs from backend format {:?}; using the backend format",
                descriptor.format,
                self.format
            );
        }
        let extent = descriptor.extent();
        let reuse = self.temporaries.as_ref().is_some_and(|t| {
            t.width == extent.width && t.height == extent.height && t.format == self.format
        });
        if !reuse {
            log::debug!("Allocating NTSC temporaries {}x{}", extent.width, extent.height);
            self.temporaries = Some(self.create_temporaries(extent.width, extent.height, self.format));
        }
        self.temporaries_in_use = true;
    }

    fn draw(
        &mut self,
        program: &mut NtscProgram,
        pass: u32,
        src: SurfaceId,
        dst: SurfaceId,
    ) -> bool {
        if src == dst {
            log::error!("Refusing to draw {:?} into itself", src);
            return false;
        }
        if !self.temporaries_in_use {
            log::error!("Draw before temporaries were acquired");
            return false;
        }
        let mut encoder = self.take_encoder();
        let drawn = self.record_draw(&mut encoder, program, pass, src, dst);
        self.encoder = Some(encoder);
        drawn
    }

    fn copy(&mut self, src: SurfaceId, dst: SurfaceId) {
        if src == dst {
            return;
        }
        let mut encoder = self.take_encoder();
        self.record_copy(&mut encoder, src, dst);
        self.encoder = Some(encoder);
    }

    fn release_temporaries(&mut self) {
        self.temporaries_in_use = false;
    }

    fn submit(&mut self) {
        self.flush();
    }
}

fn is_rgba8(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::Slot;

    #[test]
    fn test_rgba8_formats() {
        assert!(is_rgba8(wgpu::TextureFormat::Rgba8Unorm));
        assert!(is_rgba8(wgpu::TextureFormat::Rgba8UnormSrgb));
        assert!(!is_rgba8(wgpu::TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn test_slot_indices_address_both_temporaries() {
        assert_eq!(Slot::A.index(), 0);
        assert_eq!(Slot::B.index(), 1);
    }
}
