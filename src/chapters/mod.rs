//! Chapter tables for the final container.
//!
//! Offsets are integer ticks of a tenth of a second, the timebase written to
//! the ffmetadata document.

mod cue;
mod ffmetadata;

pub use cue::{chapters_from_cue, parse_cue, read_cue_sheet, CueTrack, FRAMES_PER_SECOND};
pub use ffmetadata::{render_ffmetadata, write_ffmetadata};

use crate::error::{BindError, Result};
use audiobinder_av::{probe_audio, ProcessRegistry, ToolPaths};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Ticks per second of the chapter timebase.
pub const TICKS_PER_SECOND: u64 = 10;

/// How chapter boundaries are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChapterMode {
    /// One chapter per source file.
    #[default]
    Files,
    /// Chapters from a CUE sheet next to the audio.
    Cue,
    /// No chapter table.
    None,
}

impl FromStr for ChapterMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "files" | "file" => Ok(ChapterMode::Files),
            "cue" => Ok(ChapterMode::Cue),
            "none" => Ok(ChapterMode::None),
            other => Err(format!(
                "Unknown chapter mode '{}', expected files, cue or none",
                other
            )),
        }
    }
}

impl fmt::Display for ChapterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChapterMode::Files => "files",
            ChapterMode::Cue => "cue",
            ChapterMode::None => "none",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    pub start: u64,
    pub end: u64,
}

impl Chapter {
    pub fn new(title: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            title: title.into(),
            start,
            end,
        }
    }
}

/// Whole ticks in `d`, truncated.
pub fn to_ticks(d: Duration) -> u64 {
    d.as_secs()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(u64::from(d.subsec_millis()) * TICKS_PER_SECOND / 1000)
}

/// Back-to-back chapters from per-file `(title, duration)` pairs.
pub fn from_file_durations<I>(entries: I) -> Vec<Chapter>
where
    I: IntoIterator<Item = (String, Duration)>,
{
    let mut start = 0;
    entries
        .into_iter()
        .map(|(title, duration)| {
            let end = start + to_ticks(duration);
            let chapter = Chapter::new(title, start, end);
            start = end;
            chapter
        })
        .collect()
}

/// A finished chapter file and its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFile {
    pub path: PathBuf,
    pub title: String,
}

/// Probe every chapter file once for its duration, at most `concurrency`
/// at a time.
pub async fn probe_durations(
    files: &[ChapterFile],
    tools: &ToolPaths,
    registry: &ProcessRegistry,
    concurrency: usize,
) -> Result<Vec<Duration>> {
    let probes: Vec<_> = stream::iter(files)
        .map(|file| probe_audio(tools, registry, &file.path))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    files
        .iter()
        .zip(probes)
        .map(|(file, probe)| {
            let probe = probe?;
            probe.duration.ok_or_else(|| {
                BindError::Tool(audiobinder_av::Error::parse_error(
                    "ffprobe",
                    format!("no duration reported for {:?}", file.path),
                ))
            })
        })
        .collect()
}

/// File-boundary chapters for already ordered chapter files.
pub fn from_chapter_files(files: &[ChapterFile], durations: &[Duration]) -> Vec<Chapter> {
    from_file_durations(
        files
            .iter()
            .zip(durations)
            .map(|(file, duration)| (file.title.clone(), *duration)),
    )
}

/// CUE-sheet chapters for a book of `total` length.
pub fn from_cue_file(path: &Path, total: Duration) -> Result<Vec<Chapter>> {
    let text = read_cue_sheet(path)?;
    let chapters = chapters_from_cue(&text, total);
    if chapters.is_empty() {
        tracing::warn!("CUE sheet {:?} yielded no chapters", path);
    }
    Ok(chapters)
}
