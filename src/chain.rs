//! Ping-pong buffer chain.
//!
//! Two temporaries are acquired per frame. Each step reads whichever surface
//! holds the latest image and writes the other temporary, so no step ever
//! samples the surface it renders into.

use crate::backend::PassBackend;
use crate::program::EffectProgram;
use crate::surface::{FrameDescriptor, Slot, SurfaceId};

/// Per-frame chain state: which surface holds the most recent image.
#[derive(Debug)]
pub struct BufferChain {
    latest: SurfaceId,
    steps: u32,
}

impl BufferChain {
    /// Acquire both temporaries for `descriptor` and start at the frame target.
    pub fn acquire<B: PassBackend>(backend: &mut B, descriptor: &FrameDescriptor) -> Self {
        backend.acquire_temporaries(&descriptor.color_only());
        Self {
            latest: SurfaceId::Target,
            steps: 0,
        }
    }

    /// Surface holding the most recently produced image.
    pub fn latest(&self) -> SurfaceId {
        self.latest
    }

    /// Number of steps run so far this frame.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// The temporary the next step will write.
    pub fn next_destination(&self) -> Slot {
        match self.latest {
            SurfaceId::Temp(slot) => slot.other(),
            SurfaceId::Target => Slot::A,
        }
    }

    /// Run one sub-pass of `program` from the latest surface into the other
    /// temporary. Returns the `(read, written)` pair.
    ///
    /// An out-of-range sub-pass or a draw the backend refuses leaves the
    /// chain where it was and returns `None`.
    pub fn step<B: PassBackend>(
        &mut self,
        backend: &mut B,
        program: &mut B::Program,
        pass: u32,
    ) -> Option<(SurfaceId, SurfaceId)> {
        if pass >= program.pass_count() {
            log::warn!(
                "Chain step {}: sub-pass {} out of range (program has {})",
                self.steps,
                pass,
                program.pass_count()
            );
            return None;
        }

        let first = self.latest;
        let last = SurfaceId::Temp(self.next_destination());
        debug_assert_ne!(first, last);

        log::trace!("Chain step {}: pass {} {:?} -> {:?}", self.steps, pass, first, last);
        if !backend.draw(program, pass, first, last) {
            log::warn!("Chain step {}: draw {:?} -> {:?} did not run", self.steps, first, last);
            return None;
        }

        self.latest = last;
        self.steps += 1;
        Some((first, last))
    }

    /// Copy the latest image into the frame target.
    pub fn resolve<B: PassBackend>(&self, backend: &mut B) {
        backend.copy(self.latest, SurfaceId::Target);
    }

    /// End the frame's use of the temporaries.
    pub fn release<B: PassBackend>(self, backend: &mut B) {
        backend.release_temporaries();
    }
}
