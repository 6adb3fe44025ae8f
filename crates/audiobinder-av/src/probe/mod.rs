//! Audio file probing.
//!
//! Durations, bitrates and container tags are read with the ffprobe CLI,
//! executed through the process registry like every other tool invocation.

mod ffprobe;
mod types;

pub use ffprobe::{ffprobe_command, parse_ffprobe_output, probe_audio};
pub use types::*;
