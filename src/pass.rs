//! Per-frame execution of the NTSC pass.
//!
//! Runs after standard post-processing. Each frame:
//! 1. make sure the effect program exists (retrying if construction failed before)
//! 2. acquire the two temporaries and start the chain at the frame target
//! 3. if the settings are active, push parameters and globals and step the chain once
//! 4. resolve the chain head back into the frame target

use crate::backend::PassBackend;
use crate::chain::BufferChain;
use crate::program::{EffectProgram, FrameGlobals};
use crate::settings::NtscSettings;
use crate::surface::FrameContext;

/// Whether the effect program has been built yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Ready,
}

/// What happened to a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The effect ran and its output was resolved into the target.
    Processed,
    /// The settings were inactive; the target is untouched.
    Bypassed,
    /// The program could not be built; the target is untouched.
    ProgramUnavailable,
}

/// The NTSC pass. Owns the lazily built effect program.
pub struct NtscPass<B: PassBackend> {
    program: Option<B::Program>,
    frames: u64,
}

impl<B: PassBackend> Default for NtscPass<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: PassBackend> NtscPass<B> {
    pub fn new() -> Self {
        Self {
            program: None,
            frames: 0,
        }
    }

    pub fn state(&self) -> PassState {
        if self.program.is_some() {
            PassState::Ready
        } else {
            PassState::Idle
        }
    }

    pub fn program(&self) -> Option<&B::Program> {
        self.program.as_ref()
    }

    /// Number of frames executed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn ensure_program(&mut self, backend: &mut B) {
        if self.program.is_some() {
            return;
        }
        log::info!("Creating NTSC program");
        match backend.create_program() {
            Ok(program) => self.program = Some(program),
            Err(e) => log::warn!("NTSC program unavailable, passing frame through: {:#}", e),
        }
    }

    /// Run the pass for one frame.
    ///
    /// Never fails: a missing program degrades to passthrough and is retried
    /// on the next frame.
    pub fn execute(
        &mut self,
        backend: &mut B,
        settings: &NtscSettings,
        frame: &FrameContext,
    ) -> FrameOutcome {
        self.frames += 1;
        self.ensure_program(backend);

        let mut chain = BufferChain::acquire(backend, &frame.descriptor);

        let outcome = match (&mut self.program, settings.is_active()) {
            (_, false) => FrameOutcome::Bypassed,
            (None, true) => FrameOutcome::ProgramUnavailable,
            (Some(program), true) => {
                for (slot, value) in settings.program_params() {
                    program.set_param(slot, value);
                }
                program.set_globals(&FrameGlobals::new(
                    frame.time,
                    frame.scaled_time,
                    frame.screen_width,
                    frame.screen_height,
                ));
                match chain.step(backend, program, 0) {
                    Some(_) => FrameOutcome::Processed,
                    None => FrameOutcome::Bypassed,
                }
            }
        };

        chain.resolve(backend);
        chain.release(backend);
        backend.submit();

        log::debug!("NTSC frame {}: {:?}", self.frames, outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{BackendEvent, CpuBackend};
    use crate::surface::SurfaceId;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[test]
    fn test_program_created_once() {
        let mut backend = CpuBackend::new(gradient(16, 8));
        let mut pass = NtscPass::new();
        let frame = FrameContext::new(backend.descriptor(), 0.0);
        assert_eq!(pass.state(), PassState::Idle);

        pass.execute(&mut backend, &NtscSettings::default(), &frame);
        pass.execute(&mut backend, &NtscSettings::default(), &frame);

        assert_eq!(pass.state(), PassState::Ready);
        assert_eq!(backend.program_attempts(), 1);
        assert_eq!(pass.frames(), 2);
    }

    #[test]
    fn test_inactive_frame_is_passthrough() {
        let input = gradient(16, 8);
        let mut backend = CpuBackend::new(input.clone());
        let mut pass = NtscPass::new();
        let frame = FrameContext::new(backend.descriptor(), 1.0);

        let outcome = pass.execute(&mut backend, &NtscSettings::default(), &frame);

        assert_eq!(outcome, FrameOutcome::Bypassed);
        assert_eq!(backend.target(), &input);
        assert_eq!(backend.draw_count(), 0);
    }

    #[test]
    fn test_active_frame_event_order() {
        let mut backend = CpuBackend::new(gradient(16, 8));
        let mut pass = NtscPass::new();
        let mut settings = NtscSettings::default();
        settings.set_enabled(true);
        let frame = FrameContext::new(backend.descriptor(), 0.5);

        assert_eq!(pass.execute(&mut backend, &settings, &frame), FrameOutcome::Processed);

        let events: Vec<_> = backend.events().to_vec();
        assert_eq!(events[0], BackendEvent::Acquire { descriptor: frame.descriptor });
        assert_eq!(
            events[1..],
            [
                BackendEvent::Draw {
                    pass: 0,
                    src: SurfaceId::Target,
                    dst: SurfaceId::Temp(crate::surface::Slot::A),
                },
                BackendEvent::Copy {
                    src: SurfaceId::Temp(crate::surface::Slot::A),
                    dst: SurfaceId::Target,
                },
                BackendEvent::Release,
                BackendEvent::Submit,
            ]
        );
    }

    #[test]
    fn test_settings_read_every_frame() {
        let input = gradient(16, 8);
        let mut backend = CpuBackend::new(input.clone());
        let mut pass = NtscPass::new();
        let mut settings = NtscSettings::default();
        let frame = FrameContext::new(backend.descriptor(), 0.0);

        settings.set_enabled(true);
        settings.set_kernel_radius(5);
        pass.execute(&mut backend, &settings, &frame);
        assert_eq!(backend.draw_count(), 1);

        backend.set_target(input.clone());
        settings.set_enabled(false);
        pass.execute(&mut backend, &settings, &frame);
        assert_eq!(backend.draw_count(), 1);
        assert_eq!(backend.target(), &input);
    }
}
