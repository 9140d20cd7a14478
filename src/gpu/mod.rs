pub mod backend;
pub mod ntsc_program;

pub use backend::WgpuBackend;
pub use ntsc_program::NtscProgram;
