//! Reassembling transcoded segments into one file per chapter.
//!
//! The directory listing is the source of truth. Segment files are sorted by
//! name, which groups them into contiguous per-chapter runs ordered by
//! sequence. Each run is checked against the plan before anything is joined.

use super::job::{Job, JobKind};
use super::naming::chapter_file_name;
use super::pool::WorkerPool;
use super::segmenter::{discover_segments, purge_segments, segment_key};
use crate::error::{BindError, Result};
use audiobinder_av::Toolchain;
use std::path::{Path, PathBuf};

/// What a chapter is expected to consist of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedChapter {
    pub index: usize,
    pub stem: String,
    pub segments: usize,
}

/// Contiguous run of one chapter's segment files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterGroup {
    pub chapter: usize,
    pub segments: Vec<PathBuf>,
}

/// Sort `files` by name and split them into per-chapter runs.
///
/// Files that do not follow the segment naming contract are skipped.
pub fn group_segments(mut files: Vec<PathBuf>) -> Vec<ChapterGroup> {
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut groups: Vec<ChapterGroup> = Vec::new();
    for file in files {
        let Some((chapter, _)) = segment_key(&file) else {
            continue;
        };
        match groups.last_mut() {
            Some(group) if group.chapter == chapter => group.segments.push(file),
            _ => groups.push(ChapterGroup {
                chapter,
                segments: vec![file],
            }),
        }
    }
    groups
}

/// Check that a run holds sequences `0..expected` with no gaps.
pub fn verify_group(group: &ChapterGroup, expected: usize) -> Result<()> {
    for (position, file) in group.segments.iter().enumerate() {
        match segment_key(file) {
            Some((_, sequence)) if sequence == position => {}
            Some((_, sequence)) => {
                return Err(BindError::incomplete(
                    group.chapter,
                    format!("expected part {} but found part {}", position, sequence),
                ));
            }
            None => {
                return Err(BindError::incomplete(
                    group.chapter,
                    format!("unrecognised segment file {:?}", file),
                ));
            }
        }
    }

    if group.segments.len() != expected {
        return Err(BindError::incomplete(
            group.chapter,
            format!(
                "{} of {} part(s) present",
                group.segments.len(),
                expected
            ),
        ));
    }
    Ok(())
}

/// Rebuilds chapter files from the segments in one directory.
pub struct Reconstructor<'a> {
    toolchain: &'a dyn Toolchain,
    pool: &'a WorkerPool,
}

impl<'a> Reconstructor<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, pool: &'a WorkerPool) -> Self {
        Self { toolchain, pool }
    }

    /// Build one chapter file per expected chapter, in chapter order.
    ///
    /// Segment files in `segment_dir` are purged afterwards whether or not
    /// reconstruction succeeded.
    pub async fn reconstruct(
        &self,
        segment_dir: &Path,
        chapters: &[ExpectedChapter],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let result = self.assemble(segment_dir, chapters, output_dir).await;
        let purged = purge_segments(segment_dir).await;
        tracing::debug!("Purged {} segment file(s) from {:?}", purged, segment_dir);
        result
    }

    async fn assemble(
        &self,
        segment_dir: &Path,
        chapters: &[ExpectedChapter],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut groups = group_segments(discover_segments(segment_dir).await?);
        let ext = self.toolchain.encoded_extension();

        let mut outputs = Vec::with_capacity(chapters.len());
        let mut adopt = Vec::new();
        let mut joins = Vec::new();

        for expected in chapters {
            let position = groups.iter().position(|g| g.chapter == expected.index);
            let Some(group) = position.map(|p| groups.swap_remove(p)) else {
                return Err(BindError::incomplete(expected.index, "no parts present"));
            };
            verify_group(&group, expected.segments)?;

            let output = output_dir.join(chapter_file_name(expected.index, &expected.stem, ext));
            outputs.push(output.clone());

            if group.segments.len() == 1 {
                adopt.push((group.segments[0].clone(), output));
            } else {
                let list_file = segment_dir.join(format!("concat-{:04}.txt", expected.index));
                let cmd = self.toolchain.concat(
                    &group.segments,
                    &list_file,
                    &output,
                    Some(expected.index + 1),
                )?;
                joins.push(Job::new(JobKind::Concat, cmd, output));
            }
        }

        for group in &groups {
            tracing::warn!(
                "Ignoring {} segment(s) of unplanned chapter {}",
                group.segments.len(),
                group.chapter
            );
        }

        // Single-segment chapters are moved as they are; no re-mux.
        for (segment, output) in adopt {
            tokio::fs::rename(&segment, &output).await?;
            tracing::debug!("Adopted {:?} as {:?}", segment, output);
        }

        if !joins.is_empty() {
            tracing::info!("Joining segments of {} chapter(s)", joins.len());
            self.pool.run_all("concat", joins).await.into_outputs()?;
        }

        Ok(outputs)
    }
}
