// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod exec_sandbox;
pub mod probe_ffprobe;
pub mod process;

#[cfg(feature = "libav")]
pub mod exec_libav;

// Re-export adapters
pub use exec_ffmpeg::LocalProcessStrategy;
pub use exec_sandbox::{EngineHandle, SandboxedStrategy};
pub use probe_ffprobe::FfprobeAdapter;

#[cfg(feature = "libav")]
pub use exec_libav::LibavEngine;
