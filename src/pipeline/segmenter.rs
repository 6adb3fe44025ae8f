//! Partitioning chapter sources into fixed-length segments.

use super::job::{Job, JobKind};
use super::naming::{check_index, is_segment_file, parse_segment_file_name, segment_file_name};
use crate::error::Result;
use audiobinder_av::Toolchain;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Remainders shorter than this are folded into the previous segment.
const MIN_TAIL: Duration = Duration::from_millis(1);

/// One audio file that becomes one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterSource {
    /// Zero-based chapter index.
    pub index: usize,
    pub path: PathBuf,
    /// Base name used for the reconstructed chapter file.
    pub stem: String,
    pub duration: Duration,
}

/// A time range of one chapter source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub chapter: usize,
    pub sequence: usize,
    pub start: Duration,
    /// `None` for the final segment, which runs to the end of the source.
    pub length: Option<Duration>,
}

impl Segment {
    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(self.chapter, self.sequence, ext)
    }
}

/// Planned segments for one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPlan {
    pub source: ChapterSource,
    pub segments: Vec<Segment>,
}

impl SegmentPlan {
    /// Whether the source can be transcoded as a whole.
    pub fn is_single(&self) -> bool {
        self.segments.len() == 1
    }
}

/// Split `total` into consecutive segments of `segment_length`.
///
/// Always yields at least one segment. The last one has no length so the
/// segments tile the source exactly.
pub fn plan_segments(
    chapter: usize,
    total: Duration,
    segment_length: Duration,
) -> Result<Vec<Segment>> {
    check_index("chapter", chapter)?;

    let count = if segment_length.is_zero() || total <= segment_length {
        1
    } else {
        let effective = total.saturating_sub(MIN_TAIL).as_secs_f64();
        (effective / segment_length.as_secs_f64()).ceil().max(1.0) as usize
    };
    check_index("segment", count - 1)?;

    Ok((0..count)
        .map(|sequence| Segment {
            chapter,
            sequence,
            start: segment_length * sequence as u32,
            length: (sequence + 1 < count).then_some(segment_length),
        })
        .collect())
}

pub fn plan_chapter(source: ChapterSource, segment_length: Duration) -> Result<SegmentPlan> {
    let segments = plan_segments(source.index, source.duration, segment_length)?;
    Ok(SegmentPlan { source, segments })
}

fn source_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Stream-copy jobs writing each planned segment into `split_dir`.
pub fn split_jobs(toolchain: &dyn Toolchain, plan: &SegmentPlan, split_dir: &Path) -> Vec<Job> {
    let ext = source_extension(&plan.source.path);
    plan.segments
        .iter()
        .map(|segment| {
            let output = split_dir.join(segment.file_name(&ext));
            let cmd = toolchain.split_segment(&plan.source.path, segment.start, segment.length, &output);
            Job::new(JobKind::Split, cmd, output)
        })
        .collect()
}

/// Transcode job writing `input` to `encoded_dir` under the same segment name.
pub fn transcode_job(
    toolchain: &dyn Toolchain,
    input: &Path,
    chapter: usize,
    sequence: usize,
    bitrate_kbps: u32,
    encoded_dir: &Path,
) -> Job {
    let output = encoded_dir.join(segment_file_name(chapter, sequence, toolchain.encoded_extension()));
    let cmd = toolchain.transcode_segment(input, bitrate_kbps, &output);
    Job::new(JobKind::Transcode, cmd, output)
}

/// Segment files present in `dir`, sorted by name.
pub async fn discover_segments(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_segment_file(&path) && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `(chapter, sequence)` encoded in a segment path.
pub fn segment_key(path: &Path) -> Option<(usize, usize)> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_segment_file_name)
}

/// Delete every segment file in `dir`, leaving anything else alone.
pub async fn purge_segments(dir: &Path) -> usize {
    let files = match discover_segments(dir).await {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!("Could not list {:?} for purge: {}", dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    for file in files {
        match tokio::fs::remove_file(&file).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Could not remove {:?}: {}", file, e),
        }
    }
    removed
}
