//! Media operations delegated to external tools.
//!
//! Each operation is expressed as a [`ToolCommand`] built by a [`Toolchain`].
//! The binder never inspects audio itself; it only decides which invocation
//! to run and where its output goes.
//!
//! - Splitting a time range out of a source without re-encoding
//! - Transcoding one segment to AAC
//! - Concatenating files in order
//! - Embedding album metadata and a chapter table

mod concat;
mod ffmpeg;

pub use concat::{escape_concat_path, write_concat_list};
pub use ffmpeg::FfmpegToolchain;

use crate::{AlbumMetadata, Result, ToolCommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Builder of the external invocations the binder needs.
///
/// Every path handed to a toolchain is absolute; implementations must not
/// rely on the process working directory.
pub trait Toolchain: Send + Sync {
    /// Extension (without dot) of files produced by [`transcode_segment`](Self::transcode_segment).
    fn encoded_extension(&self) -> &str;

    /// Copy `[start, start + length)` of `source` into `output` without
    /// re-encoding. `length: None` reads to the end of the input.
    fn split_segment(
        &self,
        source: &Path,
        start: Duration,
        length: Option<Duration>,
        output: &Path,
    ) -> ToolCommand;

    /// Transcode one segment to AAC at the given bitrate.
    fn transcode_segment(&self, source: &Path, bitrate_kbps: u32, output: &Path) -> ToolCommand;

    /// Concatenate `inputs` in order into `output`, optionally tagging the
    /// result with a 1-based track position. May write helper files such as
    /// `list_file` before returning.
    fn concat(
        &self,
        inputs: &[PathBuf],
        list_file: &Path,
        output: &Path,
        track: Option<usize>,
    ) -> Result<ToolCommand>;

    /// Write album metadata and, if given, an FFMETADATA1 chapter file into
    /// `output`.
    fn embed(
        &self,
        input: &Path,
        chapters: Option<&Path>,
        metadata: &AlbumMetadata,
        output: &Path,
    ) -> ToolCommand;
}
