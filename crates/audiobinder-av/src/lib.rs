//! # audiobinder-av
//!
//! External tool plumbing for binding audio tracks into a chaptered audiobook.
//!
//! This crate provides functionality for:
//! - Tracking every live tool invocation and worker pool in a process-wide
//!   [`ProcessRegistry`] so cancellation can force-kill them
//! - Running one external command to completion under that registry
//! - Building ffmpeg invocations for split, transcode, concat and embed
//! - Probing durations, bitrates and tags with ffprobe
//! - A temp space with bounded, retrying cleanup
//!
//! ## Features
//!
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use audiobinder_av::{probe_audio, ProcessRegistry, ToolPaths};
//!
//! # async fn example() -> audiobinder_av::Result<()> {
//! let registry = ProcessRegistry::new();
//! let tools = ToolPaths::resolve(None, None)?;
//! let info = probe_audio(&tools, &registry, "/books/01.mp3".as_ref()).await?;
//! println!("Duration: {:?}", info.duration);
//! # Ok(())
//! # }
//! ```

pub mod actions;
mod command;
mod error;
pub mod format;
pub mod metadata;
pub mod probe;
pub mod registry;
pub mod tools;
pub mod workspace;

// Re-exports
pub use actions::{FfmpegToolchain, Toolchain};
pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use format::AudioFormat;
pub use metadata::AlbumMetadata;
pub use probe::{probe_audio, AudioProbe, AudioTags};
pub use registry::{HandleId, HandleKind, ProcessHandle, ProcessRegistry, Registration, Scope, TerminationReport};
pub use tools::{check_tool, check_tools, require_tool, ToolInfo, ToolPaths};
pub use workspace::{CleanupOutcome, CleanupPolicy, TempSpace};
