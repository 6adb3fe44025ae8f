//! Segmented parallel transcoding pipeline.

pub mod binder;
pub mod job;
pub mod naming;
pub mod pool;
pub mod reconstruct;
pub mod segmenter;

pub use binder::{sanitize_filename, BindOptions, BindOutcome, Binder};
pub use job::{Job, JobId, JobKind, JobResult, JobStatus};
pub use pool::{JobStream, PoolReport, WorkerPool};
pub use reconstruct::{ExpectedChapter, Reconstructor};
pub use segmenter::{plan_segments, ChapterSource, Segment, SegmentPlan};
