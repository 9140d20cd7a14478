pub mod backend;
pub mod chain;
pub mod cli;
pub mod cpu;
pub mod gpu;
pub mod pass;
pub mod program;
pub mod settings;
pub mod surface;

pub use backend::PassBackend;
pub use chain::BufferChain;
pub use pass::{FrameOutcome, NtscPass, PassState};
pub use settings::NtscSettings;
pub use surface::{FrameContext, FrameDescriptor, Slot, SurfaceId};
