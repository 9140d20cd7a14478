//! CPU reference backend.
//!
//! Surfaces are `image::RgbaImage`s and the effect program is a plain
//! function over them. Every operation is logged as a [`BackendEvent`], which
//! makes this backend the one the tests drive. It also lets the CLI run
//! without a GPU adapter.

use std::collections::HashMap;
use std::f32::consts::PI;

use anyhow::{bail, Result};
use image::{Rgba, RgbaImage};

use crate::backend::PassBackend;
use crate::program::{EffectProgram, FrameGlobals, NtscUniforms, ParamSlot, ParamValue};
use crate::surface::{FrameDescriptor, Slot, SurfaceId};

/// Image kernel run by [`CpuProgram`]: `(program, sub-pass, src, dst)`.
pub type CpuKernel = fn(&CpuProgram, u32, &RgbaImage, &mut RgbaImage);

/// Operations recorded by [`CpuBackend`], in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendEvent {
    /// Temporaries acquired for this descriptor, as the backend received it.
    Acquire { descriptor: FrameDescriptor },
    Draw { pass: u32, src: SurfaceId, dst: SurfaceId },
    Copy { src: SurfaceId, dst: SurfaceId },
    Release,
    Submit,
}

/// Effect program for the CPU backend.
pub struct CpuProgram {
    uniforms: NtscUniforms,
    pushed: HashMap<ParamSlot, ParamValue>,
    globals: Option<FrameGlobals>,
    kernel: CpuKernel,
    invocations: u32,
}

impl CpuProgram {
    pub fn new(kernel: CpuKernel) -> Self {
        Self {
            uniforms: NtscUniforms::default(),
            pushed: HashMap::new(),
            globals: None,
            kernel,
            invocations: 0,
        }
    }

    /// Last value pushed into `slot`, if any.
    pub fn param(&self, slot: ParamSlot) -> Option<ParamValue> {
        self.pushed.get(&slot).copied()
    }

    pub fn globals(&self) -> Option<&FrameGlobals> {
        self.globals.as_ref()
    }

    pub fn uniforms(&self) -> &NtscUniforms {
        &self.uniforms
    }

    /// Times the kernel has run.
    pub fn invocations(&self) -> u32 {
        self.invocations
    }
}

impl EffectProgram for CpuProgram {
    fn set_param(&mut self, slot: ParamSlot, value: ParamValue) {
        self.uniforms.set_param(slot, value);
        self.pushed.insert(slot, value);
    }

    fn set_globals(&mut self, globals: &FrameGlobals) {
        self.uniforms.set_globals(globals);
        self.globals = Some(*globals);
    }
}

/// Backend over in-memory RGBA8 images.
pub struct CpuBackend {
    target: RgbaImage,
    temporaries: [RgbaImage; 2],
    kernel: CpuKernel,
    failing_programs: u32,
    program_attempts: u32,
    draws: u32,
    acquired: bool,
    events: Vec<BackendEvent>,
}

impl CpuBackend {
    /// Create a backend whose frame target holds `target`.
    pub fn new(target: RgbaImage) -> Self {
        Self {
            target,
            temporaries: [RgbaImage::new(0, 0), RgbaImage::new(0, 0)],
            kernel: ntsc_kernel,
            failing_programs: 0,
            program_attempts: 0,
            draws: 0,
            acquired: false,
            events: Vec::new(),
        }
    }

    pub fn with_kernel(mut self, kernel: CpuKernel) -> Self {
        self.kernel = kernel;
        self
    }

    /// Make the next `count` program constructions fail.
    pub fn fail_next_programs(&mut self, count: u32) {
        self.failing_programs = count;
    }

    /// Descriptor matching the current frame target.
    pub fn descriptor(&self) -> FrameDescriptor {
        FrameDescriptor::new(
            self.target.width(),
            self.target.height(),
            wgpu::TextureFormat::Rgba8Unorm,
        )
    }

    pub fn target(&self) -> &RgbaImage {
        &self.target
    }

    pub fn set_target(&mut self, target: RgbaImage) {
        self.target = target;
    }

    pub fn into_target(self) -> RgbaImage {
        self.target
    }

    pub fn temporary(&self, slot: Slot) -> &RgbaImage {
        &self.temporaries[slot.index()]
    }

    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Total draws across all frames.
    pub fn draw_count(&self) -> u32 {
        self.draws
    }

    pub fn program_attempts(&self) -> u32 {
        self.program_attempts
    }

    fn surface(&self, id: SurfaceId) -> &RgbaImage {
        match id {
            SurfaceId::Target => &self.target,
            SurfaceId::Temp(slot) => &self.temporaries[slot.index()],
        }
    }

    fn surface_mut(&mut self, id: SurfaceId) -> &mut RgbaImage {
        match id {
            SurfaceId::Target => &mut self.target,
            SurfaceId::Temp(slot) => &mut self.temporaries[slot.index()],
        }
    }
}

impl PassBackend for CpuBackend {
    type Program = CpuProgram;

    fn create_program(&mut self) -> Result<CpuProgram> {
        self.program_attempts += 1;
        if self.failing_programs > 0 {
            self.failing_programs -= 1;
            bail!("CPU program construction disabled");
        }
        Ok(CpuProgram::new(self.kernel))
    }

    fn acquire_temporaries(&mut self, descriptor: &FrameDescriptor) {
        let (width, height) = (descriptor.width.max(1), descriptor.height.max(1));
        for temp in &mut self.temporaries {
            if temp.dimensions() != (width, height) {
                *temp = RgbaImage::new(width, height);
            }
        }
        self.acquired = true;
        self.events.push(BackendEvent::Acquire { descriptor: *descriptor });
    }

    fn draw(
        &mut self,
        program: &mut CpuProgram,
        pass: u32,
        src: SurfaceId,
        dst: SurfaceId,
    ) -> bool {
        if src == dst {
            log::error!("Refusing to draw {:?} into itself", src);
            return false;
        }
        if !self.acquired {
            log::error!("Draw before temporaries were acquired");
            return false;
        }
        if pass >= program.pass_count() {
            log::warn!("CPU program has no sub-pass {}", pass);
            return false;
        }
        let input = self.surface(src).clone();
        let kernel = program.kernel;
        kernel(program, pass, &input, self.surface_mut(dst));
        program.invocations += 1;
        self.draws += 1;
        self.events.push(BackendEvent::Draw { pass, src, dst });
        true
    }

    fn copy(&mut self, src: SurfaceId, dst: SurfaceId) {
        if src != dst {
            let image = self.surface(src).clone();
            *self.surface_mut(dst) = image;
        }
        self.events.push(BackendEvent::Copy { src, dst });
    }

    fn release_temporaries(&mut self) {
        self.acquired = false;
        self.events.push(BackendEvent::Release);
    }

    fn submit(&mut self) {
        self.events.push(BackendEvent::Submit);
    }
}

/// Copies `src` into `dst` unchanged.
pub fn identity_kernel(_program: &CpuProgram, _pass: u32, src: &RgbaImage, dst: &mut RgbaImage) {
    for (x, y, pixel) in dst.enumerate_pixels_mut() {
        *pixel = sample(src, x as i64, y as i64);
    }
}

/// CPU approximation of the NTSC look.
///
/// Encodes each pixel as a composite signal on the logical raster, blurs it
/// horizontally with a Gaussian, demodulates chroma, sharpens luma and
/// applies the flicker. Close to `shader_ntsc.wgsl`, not bit-exact.
pub fn ntsc_kernel(program: &CpuProgram, _pass: u32, src: &RgbaImage, dst: &mut RgbaImage) {
    let u = program.uniforms();
    let (width, height) = dst.dimensions();
    let radius = u.kernel_radius.max(1);
    let sigma = (radius as f32 * 0.5).max(0.5);
    let raster = u.raster_size;
    // Source pixels covered by one logical raster texel.
    let texel_px = (width as f32 * raster[2]).max(f32::EPSILON);
    let time = if u.flicker_use_time_scale != 0 { u.scaled_time } else { u.time };

    for (x, y, pixel) in dst.enumerate_pixels_mut() {
        let uv_x = (x as f32 + 0.5) / width as f32;
        let uv_y = (y as f32 + 0.5) / height as f32;
        let raster_x = uv_x * raster[0];
        let raster_y = (uv_y * raster[1]).floor();

        let center = sample(src, x as i64, y as i64);
        let center_yiq = rgb_to_yiq(center);

        let mut luma = 0.0;
        let mut chroma = [0.0f32; 2];
        let mut total = 0.0;
        for i in -radius..=radius {
            let offset = i as f32 * u.kernel_width_ratio;
            let sx = (x as f32 + offset * texel_px).round() as i64;
            let yiq = rgb_to_yiq(sample(src, sx, y as i64));

            let phase = 2.0 * PI * u.horizontal_carrier_frequency * (raster_x + offset)
                + raster_y * u.line_phase_shift;
            let (s, c) = phase.sin_cos();
            let composite = yiq[0] + yiq[1] * c + yiq[2] * s;

            let weight = (-(i * i) as f32 / (2.0 * sigma * sigma)).exp();
            luma += composite * weight;
            chroma[0] += composite * c * 2.0 * weight;
            chroma[1] += composite * s * 2.0 * weight;
            total += weight;
        }
        luma /= total;
        chroma[0] /= total;
        chroma[1] /= total;

        luma += (center_yiq[0] - luma) * u.sharpness;

        let wave = (raster_x * u.flicker_scale_x * 0.01
            + raster_y * u.flicker_scale_y
            + time * 60.0 * u.flicker_percent * PI)
            .sin();
        luma *= 1.0 - 0.04 * (0.5 + 0.5 * wave);

        *pixel = yiq_to_rgb([luma, chroma[0], chroma[1]], center[3]);
    }
}

fn sample(image: &RgbaImage, x: i64, y: i64) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let x = x.clamp(0, w as i64 - 1) as u32;
    let y = y.clamp(0, h as i64 - 1) as u32;
    *image.get_pixel(x, y)
}

fn rgb_to_yiq(p: Rgba<u8>) -> [f32; 3] {
    let r = p[0] as f32 / 255.0;
    let g = p[1] as f32 / 255.0;
    let b = p[2] as f32 / 255.0;
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        0.596 * r - 0.274 * g - 0.322 * b,
        0.211 * r - 0.523 * g + 0.312 * b,
    ]
}

fn yiq_to_rgb(yiq: [f32; 3], alpha: u8) -> Rgba<u8> {
    let [y, i, q] = yiq;
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba([
        to_u8(y + 0.956 * i + 0.621 * q),
        to_u8(y - 0.272 * i - 0.647 * q),
        to_u8(y - 1.106 * i + 1.703 * q),
        alpha,
    ])
}
