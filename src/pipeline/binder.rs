//! End-to-end binding of a directory of tracks into one chaptered book.

use super::job::{Job, JobKind};
use super::naming::{chapter_title, check_index};
use super::pool::WorkerPool;
use super::reconstruct::{ExpectedChapter, Reconstructor};
use super::segmenter::{
    discover_segments, plan_chapter, purge_segments, segment_key, split_jobs, transcode_job,
    ChapterSource, SegmentPlan,
};
use crate::chapters::{self, Chapter, ChapterFile, ChapterMode};
use crate::config::{Bitrate, Config};
use crate::discovery::{discover_tracks, find_cue_sheet, Track};
use crate::error::{BindError, Result};
use crate::progress::ProgressBoard;
use audiobinder_av::metadata::DEFAULT_BITRATE_KBPS;
use audiobinder_av::{
    probe_audio, AlbumMetadata, AudioFormat, FfmpegToolchain, ProcessRegistry, TempSpace,
    ToolPaths, Toolchain,
};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Settings for one binding run.
#[derive(Debug, Clone)]
pub struct BindOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub chapter_mode: ChapterMode,
    pub segment_length: Duration,
    pub workers: usize,
    pub bitrate: Bitrate,
    /// Where the temp space is created; the input directory when unset.
    pub temp_root: Option<PathBuf>,
}

impl BindOptions {
    pub fn from_config(
        config: &Config,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        chapter_mode: ChapterMode,
    ) -> Result<Self> {
        Ok(Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            chapter_mode,
            segment_length: config.pipeline.segment_length()?,
            workers: config.pipeline.resolved_workers(),
            bitrate: config.pipeline.bitrate,
            temp_root: config.temp_root.clone(),
        })
    }

    pub fn temp_base(&self) -> &Path {
        self.temp_root.as_deref().unwrap_or(&self.input_dir)
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.segment_length.is_zero() {
            return Err(BindError::configuration(
                "segment length must be greater than zero",
            ));
        }
        if self.workers == 0 {
            return Err(BindError::configuration("workers must be at least 1"));
        }
        if self.bitrate == Bitrate::Kbps(0) {
            return Err(BindError::configuration("bitrate must be greater than zero"));
        }
        if !self.input_dir.is_dir() {
            return Err(BindError::configuration(format!(
                "Input directory does not exist: {:?}",
                self.input_dir
            )));
        }
        if self.output_dir.exists() && !self.output_dir.is_dir() {
            return Err(BindError::configuration(format!(
                "Output path is not a directory: {:?}",
                self.output_dir
            )));
        }
        Ok(())
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct BindOutcome {
    pub output: PathBuf,
    pub tracks: usize,
    pub chapters: Vec<Chapter>,
    pub metadata: AlbumMetadata,
}

/// Runs the whole pipeline: discovery, segmenting, transcoding,
/// reconstruction, chapter table, final assembly.
pub struct Binder {
    options: BindOptions,
    tools: ToolPaths,
    toolchain: Arc<dyn Toolchain>,
    registry: ProcessRegistry,
    progress: Arc<ProgressBoard>,
}

impl Binder {
    pub fn new(
        options: BindOptions,
        tools: ToolPaths,
        registry: ProcessRegistry,
        progress: Arc<ProgressBoard>,
    ) -> Self {
        let toolchain = Arc::new(FfmpegToolchain::new(&tools.ffmpeg));
        Self {
            options,
            tools,
            toolchain,
            registry,
            progress,
        }
    }

    /// Use a different set of invocation builders.
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn options(&self) -> &BindOptions {
        &self.options
    }

    /// Bind the input directory, using `temp` for every intermediate file.
    ///
    /// The caller owns `temp` and is responsible for cleaning it up.
    pub async fn run(&self, temp: &TempSpace) -> Result<BindOutcome> {
        self.options.validate()?;
        let input = &self.options.input_dir;

        let cue_sheet = match self.options.chapter_mode {
            ChapterMode::Cue => Some(find_cue_sheet(input)?),
            _ => None,
        };
        let tracks =
            discover_tracks(input, &self.tools, &self.registry, self.options.workers).await?;
        let first = tracks
            .first()
            .ok_or_else(|| BindError::discovery(format!("No audio files found in {:?}", input)))?;
        let format = first.format();
        let metadata = self.read_metadata(first).await;

        tracing::info!(
            "Binding {} track(s) of \"{}\" by {} at {} kb/s",
            tracks.len(),
            metadata.album,
            metadata.artist,
            metadata.bitrate_kbps
        );

        let pool = WorkerPool::new(&self.registry, self.options.workers)
            .with_progress(self.progress.clone());

        let sources = self.chapter_sources(&tracks, &metadata, temp, &pool).await?;
        let chapter_files = if format.is_aac_container() {
            tracing::info!("Sources are already {}; skipping transcode", format);
            sources
                .into_iter()
                .map(|s| ChapterFile {
                    path: s.path,
                    title: s.stem,
                })
                .collect()
        } else {
            self.encode(sources, metadata.bitrate_kbps, temp, &pool)
                .await?
        };

        let table = self.chapter_table(&chapter_files, cue_sheet.as_deref()).await?;
        let chapters_file = if table.is_empty() {
            None
        } else {
            let path = temp.temp_file("chapters.txt");
            chapters::write_ffmetadata(&path, &table)?;
            Some(path)
        };

        let joined = self.join_chapters(&chapter_files, temp, &pool).await?;

        let bound = temp.temp_file("bound.m4b");
        let embed = self
            .toolchain
            .embed(&joined, chapters_file.as_deref(), &metadata, &bound);
        pool.run_all("embed", vec![Job::new(JobKind::Embed, embed, &bound)])
            .await
            .into_outputs()?;

        let output = self.place(&bound, &metadata).await?;
        tracing::info!("Wrote {:?} with {} chapter(s)", output, table.len());

        Ok(BindOutcome {
            output,
            tracks: tracks.len(),
            chapters: table,
            metadata,
        })
    }

    /// Album tags from the first track, with placeholders on failure.
    async fn read_metadata(&self, track: &Track) -> AlbumMetadata {
        let probe = match track.probe(&self.tools, &self.registry).await {
            Ok(probe) => Some(probe),
            Err(e) => {
                tracing::warn!("Could not read tags from {:?}: {}", track.path(), e);
                None
            }
        };

        let bitrate_kbps = match self.options.bitrate {
            Bitrate::Kbps(kbps) => kbps,
            Bitrate::Source => match probe.and_then(|p| p.bitrate_kbps()) {
                Some(kbps) => kbps,
                None => {
                    tracing::warn!(
                        "Source bitrate unknown; using {} kb/s",
                        DEFAULT_BITRATE_KBPS
                    );
                    DEFAULT_BITRATE_KBPS
                }
            },
        };

        match probe {
            Some(probe) => AlbumMetadata::from_probe(probe, bitrate_kbps),
            None => AlbumMetadata::placeholder(bitrate_kbps),
        }
    }

    /// One source per chapter: each track in files mode, otherwise the whole
    /// book joined into one file.
    async fn chapter_sources(
        &self,
        tracks: &[Track],
        metadata: &AlbumMetadata,
        temp: &TempSpace,
        pool: &WorkerPool,
    ) -> Result<Vec<ChapterSource>> {
        if self.options.chapter_mode == ChapterMode::Files {
            let durations: Vec<_> = stream::iter(tracks)
                .map(|t| t.duration(&self.tools, &self.registry))
                .buffered(self.options.workers.max(1))
                .collect()
                .await;

            let mut sources = Vec::with_capacity(tracks.len());
            for (track, duration) in tracks.iter().zip(durations) {
                check_index("chapter", track.position())?;
                sources.push(ChapterSource {
                    index: track.position(),
                    path: track.path().to_path_buf(),
                    stem: file_stem(track.path()),
                    duration: duration?,
                });
            }
            return Ok(sources);
        }

        let stem = sanitize_filename(&metadata.album);
        let path = match tracks {
            [only] => only.path().to_path_buf(),
            _ => {
                let ext = tracks[0].format().extension();
                let output = temp.subdir("source")?.join(format!("book.{}", ext));
                let inputs: Vec<PathBuf> = tracks.iter().map(|t| t.path().to_path_buf()).collect();
                let cmd = self
                    .toolchain
                    .concat(&inputs, &temp.temp_file("source.txt"), &output, None)?;
                tracing::info!("Joining {} tracks into one source", inputs.len());
                pool.run_all("join", vec![Job::new(JobKind::Concat, cmd, &output)])
                    .await
                    .into_outputs()?;
                output
            }
        };

        let duration = probe_audio(&self.tools, &self.registry, &path)
            .await?
            .duration
            .unwrap_or_default();

        Ok(vec![ChapterSource {
            index: 0,
            path,
            stem,
            duration,
        }])
    }

    /// Segment, transcode and reconstruct every chapter source.
    async fn encode(
        &self,
        sources: Vec<ChapterSource>,
        bitrate_kbps: u32,
        temp: &TempSpace,
        pool: &WorkerPool,
    ) -> Result<Vec<ChapterFile>> {
        let toolchain = self.toolchain.as_ref();
        let split_dir = temp.subdir("split")?;
        let encoded_dir = temp.subdir("encoded")?;
        let chapter_dir = temp.subdir("chapters")?;

        let plans: Vec<SegmentPlan> = sources
            .into_iter()
            .map(|source| plan_chapter(source, self.options.segment_length))
            .collect::<Result<_>>()?;

        let mut splits = Vec::new();
        let mut transcodes = Vec::new();
        for plan in &plans {
            if plan.is_single() {
                transcodes.push(transcode_job(
                    toolchain,
                    &plan.source.path,
                    plan.source.index,
                    0,
                    bitrate_kbps,
                    &encoded_dir,
                ));
            } else {
                splits.extend(split_jobs(toolchain, plan, &split_dir));
            }
        }

        if !splits.is_empty() {
            tracing::info!("Splitting into {} segment(s)", splits.len());
            let report = pool.run_all("split", splits).await;
            if report.was_cancelled() {
                purge_segments(&split_dir).await;
                return Err(BindError::Cancelled);
            }
            for failure in report.failures() {
                tracing::warn!("{} failed; its chapter will be incomplete", failure.label());
            }

            for path in discover_segments(&split_dir).await? {
                if let Some((chapter, sequence)) = segment_key(&path) {
                    transcodes.push(transcode_job(
                        toolchain,
                        &path,
                        chapter,
                        sequence,
                        bitrate_kbps,
                        &encoded_dir,
                    ));
                }
            }
        }

        tracing::info!("Transcoding {} segment(s)", transcodes.len());
        let report = pool.run_all("transcode", transcodes).await;
        purge_segments(&split_dir).await;
        if let Err(e) = report.into_outputs() {
            purge_segments(&encoded_dir).await;
            return Err(e);
        }

        let expected: Vec<ExpectedChapter> = plans
            .iter()
            .map(|plan| ExpectedChapter {
                index: plan.source.index,
                stem: plan.source.stem.clone(),
                segments: plan.segments.len(),
            })
            .collect();

        let paths = Reconstructor::new(toolchain, pool)
            .reconstruct(&encoded_dir, &expected, &chapter_dir)
            .await?;

        Ok(paths
            .into_iter()
            .map(|path| ChapterFile {
                title: chapter_title(&path),
                path,
            })
            .collect())
    }

    async fn probe_durations(&self, files: &[ChapterFile]) -> Result<Vec<Duration>> {
        chapters::probe_durations(files, &self.tools, &self.registry, self.options.workers).await
    }

    async fn chapter_table(
        &self,
        files: &[ChapterFile],
        cue_sheet: Option<&Path>,
    ) -> Result<Vec<Chapter>> {
        match (self.options.chapter_mode, cue_sheet) {
            (ChapterMode::None, _) => Ok(Vec::new()),
            (ChapterMode::Cue, Some(sheet)) => {
                let durations = self.probe_durations(files).await?;
                let total: Duration = durations.iter().sum();
                chapters::from_cue_file(sheet, total)
            }
            (ChapterMode::Cue, None) => Err(BindError::discovery("No CUE sheet to read chapters from")),
            (ChapterMode::Files, _) => {
                let durations = self.probe_durations(files).await?;
                Ok(chapters::from_chapter_files(files, &durations))
            }
        }
    }

    /// Join the chapter files, in order, into one file.
    async fn join_chapters(
        &self,
        files: &[ChapterFile],
        temp: &TempSpace,
        pool: &WorkerPool,
    ) -> Result<PathBuf> {
        match files {
            [] => Err(BindError::discovery("Nothing to bind")),
            [only] => Ok(only.path.clone()),
            _ => {
                let ext = files[0]
                    .path
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_else(|| AudioFormat::M4a.extension().to_string());
                let output = temp.temp_file(&format!("joined.{}", ext));
                let inputs: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
                let cmd = self
                    .toolchain
                    .concat(&inputs, &temp.temp_file("joined.txt"), &output, None)?;
                pool.run_all("join", vec![Job::new(JobKind::Concat, cmd, &output)])
                    .await
                    .into_outputs()?;
                Ok(output)
            }
        }
    }

    /// Move the finished book into the output directory.
    async fn place(&self, bound: &Path, metadata: &AlbumMetadata) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.options.output_dir).await?;
        let dest = self
            .options
            .output_dir
            .join(format!("{}.m4b", sanitize_filename(&metadata.album)));
        move_file(bound, &dest).await?;
        Ok(dest)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Rename, falling back to copy and delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

/// Make `name` safe to use as a file name.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "audiobook".to_string()
    } else {
        trimmed.to_string()
    }
}
