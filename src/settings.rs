//! NTSC effect settings.
//!
//! Holds the range-constrained parameters the pass reads once per frame.
//! Numeric values are clamped on every write, so anything read back from
//! here is already inside its declared range.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::program::{ParamSlot, ParamValue};

/// A float constrained to an inclusive range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClampedFloat {
    value: f32,
    default: f32,
    min: f32,
    max: f32,
}

impl ClampedFloat {
    /// Bounds given in either order are sorted, and `default` is clamped
    /// into them.
    pub fn new(default: f32, min: f32, max: f32) -> Self {
        let (min, max) = (min.min(max), min.max(max));
        let default = if default.is_nan() { min } else { default.max(min).min(max) };
        Self { value: default, default, min, max }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Set the value, clamping into range. NaN resets to the default.
    /// Returns true if the stored value differs from the requested one.
    pub fn set(&mut self, value: f32) -> bool {
        if value.is_nan() {
            self.value = self.default;
            return true;
        }
        // Unlike `clamp`, never panics on NaN bounds.
        self.value = value.max(self.min).min(self.max);
        self.value != value
    }
}

/// An integer constrained to an inclusive range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClampedInt {
    value: i32,
    min: i32,
    max: i32,
}

impl ClampedInt {
    /// Bounds given in either order are sorted, and `default` is clamped
    /// into them.
    pub fn new(default: i32, min: i32, max: i32) -> Self {
        let (min, max) = (min.min(max), min.max(max));
        Self { value: default.clamp(min, max), min, max }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    /// Set the value, clamping into range. Returns true if it was clamped.
    pub fn set(&mut self, value: i32) -> bool {
        self.value = value.clamp(self.min, self.max);
        self.value != value
    }
}

/// Kind and range of a parameter, for listing and by-name assignment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamKind {
    Bool { default: bool },
    Float { default: f32, min: f32, max: f32 },
    Int { default: i32, min: i32, max: i32 },
}

/// Description of one parameter.
#[derive(Clone, Copy, Debug)]
pub struct ParamDef {
    pub key: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
}

const PARAM_DEFS: &[ParamDef] = &[
    ParamDef {
        key: "enabled",
        kind: ParamKind::Bool { default: false },
        description: "Whether the NTSC effect is active. Produces colour bleeding and a natural \
                      blurriness. Does not combine well with other CRT-style effects.",
    },
    ParamDef {
        key: "horizontal_carrier_frequency",
        kind: ParamKind::Float { default: 0.44, min: 0.1, max: 3.0 },
        description: "Frequency of the horizontal carrier wave. The carrier phase is linear in \
                      time and in horizontal distance along a scanline. Pick a value that hides \
                      the scanlines; edges then show rainbowing tied to this frequency.",
    },
    ParamDef {
        key: "kernel_radius",
        kind: ParamKind::Int { default: 2, min: 1, max: 5 },
        description: "Number of steps taken by the Gaussian blur.",
    },
    ParamDef {
        key: "kernel_width_ratio",
        kind: ParamKind::Float { default: 0.203, min: 0.1, max: 2.0 },
        description: "Scale of the horizontal blur. Use it to blur out the vertical lines \
                      produced by the carrier frequency.",
    },
    ParamDef {
        key: "sharpness",
        kind: ParamKind::Float { default: 0.25, min: 0.0, max: 1.0 },
        description: "Amount of sharpening applied after blurring.",
    },
    ParamDef {
        key: "line_phase_shift",
        kind: ParamKind::Float { default: 3.14, min: 0.0, max: 6.28 },
        description: "Phase offset of the carrier wave between lines. Rarely noticeable; \
                      best left at 3.14.",
    },
    ParamDef {
        key: "flicker_percent",
        kind: ParamKind::Float { default: 1.0, min: 0.0, max: 1.0 },
        description: "How fast the flicker animates relative to the frame rate.",
    },
    ParamDef {
        key: "flicker_scale_x",
        kind: ParamKind::Float { default: 0.36, min: 0.0, max: 5.0 },
        description: "Horizontal scale of the flicker pattern.",
    },
    ParamDef {
        key: "flicker_scale_y",
        kind: ParamKind::Float { default: 1.62, min: 1.0, max: 5.0 },
        description: "Vertical scale of the flicker pattern.",
    },
    ParamDef {
        key: "flicker_use_time_scale",
        kind: ParamKind::Bool { default: false },
        description: "Drive the flicker with scaled time instead of unscaled time.",
    },
];

/// The settings container for the NTSC pass.
///
/// Fields are private so the declared ranges cannot be swapped out; values
/// change only through the setters below or [`NtscSettings::set`].
#[derive(Clone, Debug, PartialEq)]
pub struct NtscSettings {
    enabled: bool,
    horizontal_carrier_frequency: ClampedFloat,
    kernel_radius: ClampedInt,
    kernel_width_ratio: ClampedFloat,
    sharpness: ClampedFloat,
    line_phase_shift: ClampedFloat,
    flicker_percent: ClampedFloat,
    flicker_scale_x: ClampedFloat,
    flicker_scale_y: ClampedFloat,
    flicker_use_time_scale: bool,
}

impl Default for NtscSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            horizontal_carrier_frequency: ClampedFloat::new(0.44, 0.1, 3.0),
            kernel_radius: ClampedInt::new(2, 1, 5),
            kernel_width_ratio: ClampedFloat::new(0.203, 0.1, 2.0),
            sharpness: ClampedFloat::new(0.25, 0.0, 1.0),
            line_phase_shift: ClampedFloat::new(3.14, 0.0, 6.28),
            flicker_percent: ClampedFloat::new(1.0, 0.0, 1.0),
            flicker_scale_x: ClampedFloat::new(0.36, 0.0, 5.0),
            flicker_scale_y: ClampedFloat::new(1.62, 1.0, 5.0),
            flicker_use_time_scale: false,
        }
    }
}

impl NtscSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the pass should process this frame.
    pub fn is_active(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn horizontal_carrier_frequency(&self) -> f32 {
        self.horizontal_carrier_frequency.value()
    }

    pub fn set_horizontal_carrier_frequency(&mut self, value: f32) {
        self.set_float("horizontal_carrier_frequency", value);
    }

    pub fn kernel_radius(&self) -> i32 {
        self.kernel_radius.value()
    }

    pub fn set_kernel_radius(&mut self, value: i32) {
        self.set_int("kernel_radius", value);
    }

    pub fn kernel_width_ratio(&self) -> f32 {
        self.kernel_width_ratio.value()
    }

    pub fn set_kernel_width_ratio(&mut self, value: f32) {
        self.set_float("kernel_width_ratio", value);
    }

    pub fn sharpness(&self) -> f32 {
        self.sharpness.value()
    }

    pub fn set_sharpness(&mut self, value: f32) {
        self.set_float("sharpness", value);
    }

    pub fn line_phase_shift(&self) -> f32 {
        self.line_phase_shift.value()
    }

    pub fn set_line_phase_shift(&mut self, value: f32) {
        self.set_float("line_phase_shift", value);
    }

    pub fn flicker_percent(&self) -> f32 {
        self.flicker_percent.value()
    }

    pub fn set_flicker_percent(&mut self, value: f32) {
        self.set_float("flicker_percent", value);
    }

    pub fn flicker_scale_x(&self) -> f32 {
        self.flicker_scale_x.value()
    }

    pub fn set_flicker_scale_x(&mut self, value: f32) {
        self.set_float("flicker_scale_x", value);
    }

    pub fn flicker_scale_y(&self) -> f32 {
        self.flicker_scale_y.value()
    }

    pub fn set_flicker_scale_y(&mut self, value: f32) {
        self.set_float("flicker_scale_y", value);
    }

    pub fn flicker_use_time_scale(&self) -> bool {
        self.flicker_use_time_scale
    }

    pub fn set_flicker_use_time_scale(&mut self, value: bool) {
        self.flicker_use_time_scale = value;
    }

    /// All declared parameters, in declaration order.
    pub fn param_defs() -> &'static [ParamDef] {
        PARAM_DEFS
    }

    /// Current value of every program slot, in upload order.
    pub fn program_params(&self) -> [(ParamSlot, ParamValue); 9] {
        [
            (
                ParamSlot::HorizontalCarrierFrequency,
                ParamValue::Float(self.horizontal_carrier_frequency.value()),
            ),
            (ParamSlot::KernelRadius, ParamValue::Int(self.kernel_radius.value())),
            (ParamSlot::KernelWidthRatio, ParamValue::Float(self.kernel_width_ratio.value())),
            (ParamSlot::Sharpness, ParamValue::Float(self.sharpness.value())),
            (ParamSlot::LinePhaseShift, ParamValue::Float(self.line_phase_shift.value())),
            (ParamSlot::FlickerPercent, ParamValue::Float(self.flicker_percent.value())),
            (ParamSlot::FlickerScaleX, ParamValue::Float(self.flicker_scale_x.value())),
            (ParamSlot::FlickerScaleY, ParamValue::Float(self.flicker_scale_y.value())),
            (
                ParamSlot::FlickerUseTimeScale,
                ParamValue::Int(self.flicker_use_time_scale as i32),
            ),
        ]
    }

    fn float_mut(&mut self, key: &str) -> Option<&mut ClampedFloat> {
        match key {
            "horizontal_carrier_frequency" => Some(&mut self.horizontal_carrier_frequency),
            "kernel_width_ratio" => Some(&mut self.kernel_width_ratio),
            "sharpness" => Some(&mut self.sharpness),
            "line_phase_shift" => Some(&mut self.line_phase_shift),
            "flicker_percent" => Some(&mut self.flicker_percent),
            "flicker_scale_x" => Some(&mut self.flicker_scale_x),
            "flicker_scale_y" => Some(&mut self.flicker_scale_y),
            _ => None,
        }
    }

    /// Assign a parameter by key from its textual form.
    ///
    /// Numbers outside the declared range are clamped and logged. Unknown
    /// keys and unparsable values are errors.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "enabled" => self.enabled = parse_bool(value)?,
            "flicker_use_time_scale" => self.flicker_use_time_scale = parse_bool(value)?,
            "kernel_radius" => {
                let v: i32 = value
                    .parse()
                    .with_context(|| format!("'{}' expects an integer, got '{}'", key, value))?;
                self.set_int(key, v);
            }
            _ => {
                let v: f32 = value
                    .parse()
                    .with_context(|| format!("'{}' expects a number, got '{}'", key, value))?;
                if self.float_mut(key).is_none() {
                    bail!("Unknown parameter: {}", key);
                }
                self.set_float(key, v);
            }
        }
        Ok(())
    }

    fn set_float(&mut self, key: &str, value: f32) {
        if let Some(param) = self.float_mut(key) {
            if param.set(value) {
                log::warn!("'{}' = {} out of range, clamped to {}", key, value, param.value());
            }
        }
    }

    fn set_int(&mut self, key: &str, value: i32) {
        if self.kernel_radius.set(value) {
            log::warn!(
                "'{}' = {} out of range, clamped to {}",
                key,
                value,
                self.kernel_radius.value()
            );
        }
    }

    /// Parse settings from JSON. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SettingsFile = serde_json::from_str(json)?;
        let mut settings = Self::default();
        settings.apply(&file);
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        Self::from_json(&contents).with_context(|| format!("Invalid settings file {:?}", path))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&SettingsFile::from(self))?)
    }

    fn apply(&mut self, file: &SettingsFile) {
        self.enabled = file.enabled;
        self.flicker_use_time_scale = file.flicker_use_time_scale;
        self.set_int("kernel_radius", file.kernel_radius);
        self.set_float("horizontal_carrier_frequency", file.horizontal_carrier_frequency);
        self.set_float("kernel_width_ratio", file.kernel_width_ratio);
        self.set_float("sharpness", file.sharpness);
        self.set_float("line_phase_shift", file.line_phase_shift);
        self.set_float("flicker_percent", file.flicker_percent);
        self.set_float("flicker_scale_x", file.flicker_scale_x);
        self.set_float("flicker_scale_y", file.flicker_scale_y);
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(anyhow!("Expected a boolean, got '{}'", value)),
    }
}

/// On-disk form of the settings: a flat JSON object of plain values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    enabled: bool,
    horizontal_carrier_frequency: f32,
    kernel_radius: i32,
    kernel_width_ratio: f32,
    sharpness: f32,
    line_phase_shift: f32,
    flicker_percent: f32,
    flicker_scale_x: f32,
    flicker_scale_y: f32,
    flicker_use_time_scale: bool,
}

impl Default for SettingsFile {
    fn default() -> Self {
        SettingsFile::from(&NtscSettings::default())
    }
}

impl From<&NtscSettings> for SettingsFile {
    fn from(s: &NtscSettings) -> Self {
        Self {
            enabled: s.enabled,
            horizontal_carrier_frequency: s.horizontal_carrier_frequency.value(),
            kernel_radius: s.kernel_radius.value(),
            kernel_width_ratio: s.kernel_width_ratio.value(),
            sharpness: s.sharpness.value(),
            line_phase_shift: s.line_phase_shift.value(),
            flicker_percent: s.flicker_percent.value(),
            flicker_scale_x: s.flicker_scale_x.value(),
            flicker_scale_y: s.flicker_scale_y.value(),
            flicker_use_time_scale: s.flicker_use_time_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_param_table() {
        let settings = NtscSettings::default();
        for def in NtscSettings::param_defs() {
            match def.kind {
                ParamKind::Float { default, .. } => {
                    let value = settings
                        .program_params()
                        .iter()
                        .find(|(slot, _)| slot.name() == def.key)
                        .map(|(_, v)| v.as_f32());
                    assert_eq!(value, Some(default), "{}", def.key);
                }
                ParamKind::Int { default, .. } => {
                    assert_eq!(settings.kernel_radius.value(), default);
                }
                ParamKind::Bool { default } => {
                    let value = match def.key {
                        "enabled" => settings.enabled,
                        _ => settings.flicker_use_time_scale,
                    };
                    assert_eq!(value, default, "{}", def.key);
                }
            }
        }
    }

    #[test]
    fn test_clamped_float() {
        let mut p = ClampedFloat::new(0.44, 0.1, 3.0);
        assert!(p.set(5.0));
        assert_eq!(p.value(), 3.0);
        assert!(p.set(-1.0));
        assert_eq!(p.value(), 0.1);
        assert!(!p.set(1.5));
        assert_eq!(p.value(), 1.5);
        assert!(p.set(f32::NAN));
        assert_eq!(p.value(), 0.44);
    }

    #[test]
    fn test_clamped_int() {
        let mut p = ClampedInt::new(2, 1, 5);
        assert!(p.set(0));
        assert_eq!(p.value(), 1);
        assert!(p.set(99));
        assert_eq!(p.value(), 5);
    }

    #[test]
    fn test_clamped_new_orders_bounds_and_clamps_default() {
        let mut p = ClampedFloat::new(0.5, 1.0, 0.0);
        assert_eq!((p.min(), p.max()), (0.0, 1.0));
        assert_eq!(p.value(), 0.5);
        assert!(p.set(2.0));
        assert_eq!(p.value(), 1.0);

        let p = ClampedFloat::new(5.0, 0.1, 3.0);
        assert_eq!(p.value(), 3.0);
        let p = ClampedFloat::new(f32::NAN, 0.1, 3.0);
        assert_eq!(p.value(), 0.1);

        let mut i = ClampedInt::new(9, 5, 1);
        assert_eq!((i.min(), i.max(), i.value()), (1, 5, 5));
        assert!(i.set(-3));
        assert_eq!(i.value(), 1);
    }

    #[test]
    fn test_typed_setters_clamp() {
        let mut settings = NtscSettings::new();
        settings.set_horizontal_carrier_frequency(5.0);
        settings.set_kernel_radius(0);
        settings.set_flicker_scale_y(-2.0);
        settings.set_sharpness(f32::NAN);

        assert_eq!(settings.horizontal_carrier_frequency(), 3.0);
        assert_eq!(settings.kernel_radius(), 1);
        assert_eq!(settings.flicker_scale_y(), 1.0);
        assert_eq!(settings.sharpness(), 0.25);
    }

    #[test]
    fn test_set_by_key() {
        let mut settings = NtscSettings::new();
        settings.set("enabled", "true").unwrap();
        settings.set("horizontal_carrier_frequency", "5.0").unwrap();
        settings.set("kernel_radius", "0").unwrap();
        settings.set("flicker_use_time_scale", "1").unwrap();

        assert!(settings.is_active());
        assert_eq!(settings.horizontal_carrier_frequency(), 3.0);
        assert_eq!(settings.kernel_radius(), 1);
        assert!(settings.flicker_use_time_scale());
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut settings = NtscSettings::new();
        assert!(settings.set("no_such_param", "1.0").is_err());
        assert!(settings.set("sharpness", "lots").is_err());
        assert!(settings.set("enabled", "maybe").is_err());
        assert!(settings.set("kernel_radius", "2.5").is_err());
    }

    #[test]
    fn test_json_partial_and_clamped() {
        let settings = NtscSettings::from_json(
            r#"{ "enabled": true, "sharpness": 4.0, "flicker_scale_y": 0.0 }"#,
        )
        .unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.sharpness.value(), 1.0);
        assert_eq!(settings.flicker_scale_y.value(), 1.0);
        assert_eq!(settings.kernel_width_ratio.value(), 0.203);
    }

    #[test]
    fn test_json_rejects_unknown_keys() {
        assert!(NtscSettings::from_json(r#"{ "brightness": 1.0 }"#).is_err());
    }

    #[test]
    fn test_json_round_trip_preserves_settings() {
        let mut settings = NtscSettings::new();
        settings.set("line_phase_shift", "1.0").unwrap();
        settings.set("kernel_radius", "4").unwrap();
        let json = settings.to_json().unwrap();
        assert_eq!(NtscSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_program_params_exclude_activation_flag() {
        let params = NtscSettings::default().program_params();
        let slots: Vec<_> = params.iter().map(|(slot, _)| *slot).collect();
        assert_eq!(slots, ParamSlot::ALL.to_vec());
        assert!(NtscSettings::param_defs().iter().any(|d| d.key == "enabled"));
        assert!(!slots.iter().any(|s| s.name() == "enabled"));
    }
}
