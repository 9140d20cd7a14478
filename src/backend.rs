//! Backend seam between the pass and whatever records the frame's work.
//!
//! The pass never touches textures directly. It names surfaces by
//! [`SurfaceId`] and asks the backend to acquire, draw, copy and submit.

use anyhow::Result;

use crate::program::EffectProgram;
use crate::surface::{FrameDescriptor, SurfaceId};

pub trait PassBackend {
    type Program: EffectProgram;

    /// Build the effect program. Failure means the program's resources are
    /// unavailable; the caller decides how to degrade.
    fn create_program(&mut self) -> Result<Self::Program>;

    /// Make both temporaries available at the given size and format.
    fn acquire_temporaries(&mut self, descriptor: &FrameDescriptor);

    /// Run `program`'s sub-pass `pass` reading `src` and writing `dst`.
    /// Returns false when nothing was drawn: `src == dst`, an unknown
    /// sub-pass or a missing surface.
    fn draw(
        &mut self,
        program: &mut Self::Program,
        pass: u32,
        src: SurfaceId,
        dst: SurfaceId,
    ) -> bool;

    /// Copy `src` into `dst` byte for byte. Copying a surface onto itself
    /// leaves it untouched.
    fn copy(&mut self, src: SurfaceId, dst: SurfaceId);

    /// Give the temporaries back at the end of the frame.
    fn release_temporaries(&mut self);

    /// Submit everything recorded since the last submit.
    fn submit(&mut self);
}
