//! # audiobinder
//!
//! Binds a directory of audio tracks into a single chaptered `.m4b`.
//!
//! Long tracks are split into fixed-length segments that are transcoded in
//! parallel on a bounded [`pipeline::WorkerPool`], then reassembled per
//! chapter purely from their file names. Chapter boundaries come from the
//! source files or from a CUE sheet. An interrupt kills every child through
//! the shared [`audiobinder_av::ProcessRegistry`] and removes the temp space.

pub mod cancel;
pub mod chapters;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod progress;

pub use cancel::{CancelState, CancellationCoordinator, TeardownReport, INTERRUPT_EXIT_CODE};
pub use error::{BindError, Result};
pub use progress::ProgressBoard;
