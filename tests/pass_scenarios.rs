//! Frame-level behaviour of the NTSC pass, driven through the CPU backend.
//!
//! Run with: cargo test --test pass_scenarios

use image::{Rgba, RgbaImage};
use ntsc_pass::cpu::{BackendEvent, CpuBackend};
use ntsc_pass::program::{ParamSlot, ParamValue};
use ntsc_pass::settings::ParamKind;
use ntsc_pass::{
    BufferChain, FrameContext, FrameDescriptor, FrameOutcome, NtscPass, NtscSettings, PassBackend,
    PassState, Slot, SurfaceId,
};

/// Colourful test card with hard edges so the effect visibly changes it.
fn test_card(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let band = (x * 8 / width.max(1)) as u8;
        Rgba([
            band.wrapping_mul(37),
            (255 - band.wrapping_mul(29)),
            ((y * 255) / height.max(1)) as u8,
            255,
        ])
    })
}

fn active_settings() -> NtscSettings {
    let mut settings = NtscSettings::default();
    settings.set_enabled(true);
    settings
}

#[test]
fn disabled_effect_is_bit_identical_passthrough() {
    let input = test_card(64, 36);
    let mut backend = CpuBackend::new(input.clone());
    let mut pass = NtscPass::new();

    let mut settings = NtscSettings::default();
    settings.set("horizontal_carrier_frequency", "2.5").unwrap();
    settings.set("kernel_radius", "5").unwrap();
    settings.set("sharpness", "1.0").unwrap();
    settings.set("flicker_scale_x", "4.0").unwrap();

    for i in 0..3 {
        let frame = FrameContext::new(backend.descriptor(), i as f32 * 0.1);
        assert_eq!(pass.execute(&mut backend, &settings, &frame), FrameOutcome::Bypassed);
        assert_eq!(backend.target().as_raw(), input.as_raw());
    }

    assert_eq!(backend.draw_count(), 0);
    assert_eq!(pass.program().unwrap().invocations(), 0);
}

#[test]
fn active_effect_runs_once_with_fixed_raster_globals() {
    let input = test_card(1920, 1080);
    let mut backend = CpuBackend::new(input.clone());
    let mut pass = NtscPass::new();
    let mut settings = active_settings();
    settings.set("kernel_radius", "2").unwrap();

    let frame = FrameContext::new(backend.descriptor(), 3.0);
    assert_eq!(pass.execute(&mut backend, &settings, &frame), FrameOutcome::Processed);

    let program = pass.program().unwrap();
    assert_eq!(program.invocations(), 1);
    assert_eq!(backend.draw_count(), 1);

    let globals = program.globals().unwrap();
    assert_eq!(globals.raster_size.to_array(), [512.0, 288.0, 1.0 / 512.0, 1.0 / 288.0]);
    assert_eq!(globals.screen_size.to_array(), [1920.0, 1080.0, 1.0 / 1920.0, 1.0 / 1080.0]);
    assert_eq!(globals.time, 3.0);
    assert_eq!(program.param(ParamSlot::KernelRadius), Some(ParamValue::Int(2)));

    assert_ne!(backend.target(), &input);
    assert_eq!(backend.target(), backend.temporary(Slot::A));
}

#[test]
fn failed_program_construction_passes_through_and_retries() {
    let input = test_card(32, 18);
    let mut backend = CpuBackend::new(input.clone());
    backend.fail_next_programs(1);
    let mut pass = NtscPass::new();
    let settings = active_settings();
    let frame = FrameContext::new(backend.descriptor(), 0.0);

    let outcome = pass.execute(&mut backend, &settings, &frame);
    assert_eq!(outcome, FrameOutcome::ProgramUnavailable);
    assert_eq!(pass.state(), PassState::Idle);
    assert_eq!(backend.target(), &input);
    assert_eq!(backend.draw_count(), 0);
    // The frame still completes: resolve, release and submit are recorded.
    assert_eq!(backend.events().last(), Some(&BackendEvent::Submit));

    let outcome = pass.execute(&mut backend, &settings, &frame);
    assert_eq!(outcome, FrameOutcome::Processed);
    assert_eq!(pass.state(), PassState::Ready);
    assert_eq!(backend.program_attempts(), 2);
}

#[test]
fn out_of_range_carrier_frequency_reaches_program_clamped() {
    let mut backend = CpuBackend::new(test_card(16, 9));
    let mut pass = NtscPass::new();
    let mut settings = active_settings();
    settings.set_horizontal_carrier_frequency(5.0);

    let frame = FrameContext::new(backend.descriptor(), 0.0);
    pass.execute(&mut backend, &settings, &frame);

    let observed = pass
        .program()
        .unwrap()
        .param(ParamSlot::HorizontalCarrierFrequency);
    assert_eq!(observed, Some(ParamValue::Float(3.0)));
}

#[test]
fn every_pushed_value_lies_within_its_range() {
    let inputs = ["-1000", "-1", "0", "0.5", "1", "2.9", "3", "6.28", "7", "1000"];
    let mut backend = CpuBackend::new(test_card(8, 8));
    let mut pass = NtscPass::new();
    let frame = FrameContext::new(backend.descriptor(), 0.0);

    for input in inputs {
        let mut settings = active_settings();
        for def in NtscSettings::param_defs() {
            match def.kind {
                ParamKind::Float { .. } => settings.set(def.key, input).unwrap(),
                ParamKind::Int { .. } => {
                    let whole = input.parse::<f32>().unwrap() as i32;
                    settings.set(def.key, &whole.to_string()).unwrap();
                }
                ParamKind::Bool { .. } => {}
            }
        }
        pass.execute(&mut backend, &settings, &frame);

        let program = pass.program().unwrap();
        for def in NtscSettings::param_defs() {
            let Some(slot) = ParamSlot::ALL.iter().find(|s| s.name() == def.key) else {
                continue;
            };
            let value = program.param(*slot).unwrap();
            match def.kind {
                ParamKind::Float { min, max, .. } => {
                    let v = value.as_f32();
                    assert!(v >= min && v <= max, "{} = {} outside [{}, {}]", def.key, v, min, max);
                }
                ParamKind::Int { min, max, .. } => {
                    let v = value.as_i32();
                    assert!(v >= min && v <= max, "{} = {} outside [{}, {}]", def.key, v, min, max);
                }
                ParamKind::Bool { .. } => assert!(matches!(value.as_i32(), 0 | 1)),
            }
        }
    }
}

#[test]
fn chain_steps_alternate_without_aliasing() {
    let mut backend = CpuBackend::new(test_card(16, 16));
    let mut program = backend.create_program().unwrap();
    let descriptor = backend.descriptor();
    let mut chain = BufferChain::acquire(&mut backend, &descriptor);

    let mut previous = chain.latest();
    for step in 0..6 {
        let (read, written) = chain.step(&mut backend, &mut program, 0).unwrap();
        assert_eq!(read, previous);
        assert_ne!(read, written);
        let expected = if step % 2 == 0 { Slot::A } else { Slot::B };
        assert_eq!(written, SurfaceId::Temp(expected));
        previous = written;
    }
    chain.resolve(&mut backend);
    assert_eq!(backend.target(), backend.temporary(Slot::B));
}

#[test]
fn resolve_twice_matches_resolve_once() {
    let mut backend = CpuBackend::new(test_card(16, 16));
    let mut program = backend.create_program().unwrap();
    let descriptor = backend.descriptor();
    let mut chain = BufferChain::acquire(&mut backend, &descriptor);
    chain.step(&mut backend, &mut program, 0);

    chain.resolve(&mut backend);
    let once = backend.target().clone();
    chain.resolve(&mut backend);
    assert_eq!(backend.target(), &once);
}

#[test]
fn temporaries_follow_resolution_changes() {
    let mut backend = CpuBackend::new(test_card(32, 18));
    let mut pass = NtscPass::new();
    let settings = active_settings();

    let frame = FrameContext::new(backend.descriptor(), 0.0);
    pass.execute(&mut backend, &settings, &frame);
    assert_eq!(backend.temporary(Slot::A).dimensions(), (32, 18));

    backend.set_target(test_card(48, 27));
    backend.clear_events();
    let frame = FrameContext::new(backend.descriptor(), 0.0);
    assert_eq!(pass.execute(&mut backend, &settings, &frame), FrameOutcome::Processed);

    assert_eq!(backend.events()[0], BackendEvent::Acquire { descriptor: backend.descriptor() });
    assert_eq!(backend.temporary(Slot::A).dimensions(), (48, 27));
    assert_eq!(backend.target().dimensions(), (48, 27));
}

#[test]
fn depth_is_stripped_before_acquiring_temporaries() {
    let mut backend = CpuBackend::new(test_card(20, 10));
    let mut pass = NtscPass::new();
    let descriptor = FrameDescriptor::new(20, 10, wgpu::TextureFormat::Rgba8Unorm)
        .with_depth(wgpu::TextureFormat::Depth24Plus);
    let frame = FrameContext::new(descriptor, 0.0);

    pass.execute(&mut backend, &active_settings(), &frame);
    let BackendEvent::Acquire { descriptor: acquired } = backend.events()[0] else {
        panic!("first event should be Acquire, got {:?}", backend.events()[0]);
    };
    assert_eq!(acquired.depth_format, None);
    assert_eq!((acquired.width, acquired.height), (20, 10));
    assert_eq!(acquired.format, wgpu::TextureFormat::Rgba8Unorm);
}

#[test]
fn flicker_time_source_follows_setting() {
    let mut backend = CpuBackend::new(test_card(16, 9));
    let mut pass = NtscPass::new();
    let mut settings = active_settings();
    settings.set_flicker_use_time_scale(true);

    let frame = FrameContext::new(backend.descriptor(), 10.0).with_scaled_time(5.0);
    pass.execute(&mut backend, &settings, &frame);

    let program = pass.program().unwrap();
    assert_eq!(program.param(ParamSlot::FlickerUseTimeScale), Some(ParamValue::Int(1)));
    let globals = program.globals().unwrap();
    assert_eq!((globals.time, globals.scaled_time), (10.0, 5.0));
}
