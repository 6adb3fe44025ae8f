//! Units of dispatched work and their terminal states.

use audiobinder_av::ToolCommand;
use std::fmt;
use std::path::{Path, PathBuf};

/// Position of a job within one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Stream-copy one time range of a source into a segment file.
    Split,
    /// Encode one segment.
    Transcode,
    /// Join several files, in order, into one.
    Concat,
    /// Write tags and chapters into the final container.
    Embed,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Split => "split",
            JobKind::Transcode => "transcode",
            JobKind::Concat => "concat",
            JobKind::Embed => "embed",
        };
        f.write_str(s)
    }
}

/// One external invocation producing one output file.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub command: ToolCommand,
    pub output: PathBuf,
}

impl Job {
    pub fn new(kind: JobKind, command: ToolCommand, output: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            command,
            output: output.into(),
        }
    }

    /// Short name used in logs and errors.
    pub fn label(&self) -> String {
        describe(self.kind, &self.output)
    }
}

fn describe(kind: JobKind, output: &Path) -> String {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| output.to_string_lossy().to_string());
    format!("{} {}", kind, name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Completed(PathBuf),
    Failed(String),
    /// Killed or never started because the pool was stopped.
    Cancelled,
    /// Skipped because the pool became unusable.
    Abandoned,
}

impl JobStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobStatus::Completed(_))
    }
}

/// Terminal state of one submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub id: JobId,
    pub kind: JobKind,
    pub output: PathBuf,
    pub status: JobStatus,
}

impl JobResult {
    pub fn label(&self) -> String {
        describe(self.kind, &self.output)
    }
}
