//! Effect program interface.
//!
//! The pass talks to the effect program only through named parameter slots,
//! a block of per-frame globals and one image input/output pair per
//! invocation. This module defines those slots and the GPU uniform layout
//! they are packed into.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Logical raster the effect simulates, independent of the output resolution.
pub const LOGICAL_RASTER_WIDTH: u32 = 512;
pub const LOGICAL_RASTER_HEIGHT: u32 = 288;

/// Input slots exposed by the effect program, in upload order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamSlot {
    HorizontalCarrierFrequency,
    KernelRadius,
    KernelWidthRatio,
    Sharpness,
    LinePhaseShift,
    FlickerPercent,
    FlickerScaleX,
    FlickerScaleY,
    FlickerUseTimeScale,
}

impl ParamSlot {
    pub const ALL: [ParamSlot; 9] = [
        ParamSlot::HorizontalCarrierFrequency,
        ParamSlot::KernelRadius,
        ParamSlot::KernelWidthRatio,
        ParamSlot::Sharpness,
        ParamSlot::LinePhaseShift,
        ParamSlot::FlickerPercent,
        ParamSlot::FlickerScaleX,
        ParamSlot::FlickerScaleY,
        ParamSlot::FlickerUseTimeScale,
    ];

    /// Slot name as seen by the program.
    pub fn name(self) -> &'static str {
        match self {
            ParamSlot::HorizontalCarrierFrequency => "horizontal_carrier_frequency",
            ParamSlot::KernelRadius => "kernel_radius",
            ParamSlot::KernelWidthRatio => "kernel_width_ratio",
            ParamSlot::Sharpness => "sharpness",
            ParamSlot::LinePhaseShift => "line_phase_shift",
            ParamSlot::FlickerPercent => "flicker_percent",
            ParamSlot::FlickerScaleX => "flicker_scale_x",
            ParamSlot::FlickerScaleY => "flicker_scale_y",
            ParamSlot::FlickerUseTimeScale => "flicker_use_time_scale",
        }
    }
}

/// Value pushed into a slot. Booleans travel as integers (0 or 1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
}

impl ParamValue {
    pub fn as_f32(self) -> f32 {
        match self {
            ParamValue::Float(v) => v,
            ParamValue::Int(v) => v as f32,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            ParamValue::Float(v) => v as i32,
            ParamValue::Int(v) => v,
        }
    }
}

/// Per-frame values shared by every invocation of the program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGlobals {
    /// Elapsed time, unaffected by any time scale.
    pub time: f32,
    /// Elapsed time with the host's time scale applied.
    pub scaled_time: f32,
    /// Physical screen size: `(w, h, 1/w, 1/h)`.
    pub screen_size: Vec4,
    /// Logical raster size: `(512, 288, 1/512, 1/288)`.
    pub raster_size: Vec4,
}

impl FrameGlobals {
    pub fn new(time: f32, scaled_time: f32, screen_width: u32, screen_height: u32) -> Self {
        Self {
            time,
            scaled_time,
            screen_size: size_with_reciprocals(screen_width, screen_height),
            raster_size: size_with_reciprocals(LOGICAL_RASTER_WIDTH, LOGICAL_RASTER_HEIGHT),
        }
    }
}

fn size_with_reciprocals(width: u32, height: u32) -> Vec4 {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    Vec4::new(w, h, 1.0 / w, 1.0 / h)
}

/// The effect program as seen by the pass.
///
/// Implementations keep the pushed values and consume them when their
/// backend invokes them on a surface pair.
pub trait EffectProgram {
    fn set_param(&mut self, slot: ParamSlot, value: ParamValue);

    fn set_globals(&mut self, globals: &FrameGlobals);

    /// Number of internal sub-passes. Sub-pass indices run from 0.
    fn pass_count(&self) -> u32 {
        1
    }
}

/// Uniform block consumed by `shader_ntsc.wgsl`.
///
/// Matches the WGSL `NtscUniforms` struct (80 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct NtscUniforms {
    pub horizontal_carrier_frequency: f32,
    pub kernel_radius: i32,
    pub kernel_width_ratio: f32,
    pub sharpness: f32,

    pub line_phase_shift: f32,
    pub flicker_percent: f32,
    pub flicker_scale_x: f32,
    pub flicker_scale_y: f32,

    pub flicker_use_time_scale: i32,
    pub time: f32,
    pub scaled_time: f32,
    pub _padding: f32,

    pub screen_size: [f32; 4],
    pub raster_size: [f32; 4],
}

impl Default for NtscUniforms {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl NtscUniforms {
    pub fn set_param(&mut self, slot: ParamSlot, value: ParamValue) {
        match slot {
            ParamSlot::HorizontalCarrierFrequency => {
                self.horizontal_carrier_frequency = value.as_f32()
            }
            ParamSlot::KernelRadius => self.kernel_radius = value.as_i32(),
            ParamSlot::KernelWidthRatio => self.kernel_width_ratio = value.as_f32(),
            ParamSlot::Sharpness => self.sharpness = value.as_f32(),
            ParamSlot::LinePhaseShift => self.line_phase_shift = value.as_f32(),
            ParamSlot::FlickerPercent => self.flicker_percent = value.as_f32(),
            ParamSlot::FlickerScaleX => self.flicker_scale_x = value.as_f32(),
            ParamSlot::FlickerScaleY => self.flicker_scale_y = value.as_f32(),
            ParamSlot::FlickerUseTimeScale => self.flicker_use_time_scale = value.as_i32(),
        }
    }

    pub fn set_globals(&mut self, globals: &FrameGlobals) {
        self.time = globals.time;
        self.scaled_time = globals.scaled_time;
        self.screen_size = globals.screen_size.to_array();
        self.raster_size = globals.raster_size.to_array();
    }
}
