//! Error taxonomy for a binding run.

/// Result type alias using [`BindError`].
pub type Result<T> = std::result::Result<T, BindError>;

/// Errors that end a binding run.
///
/// Temp cleanup failures are deliberately absent: they are retried, logged
/// and abandoned without affecting the outcome.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// A required option is missing or out of range. Raised before any work.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No usable input was found (no audio files, no CUE sheet).
    #[error("discovery error: {0}")]
    Discovery(String),

    /// One job's external invocation failed.
    #[error("job {job} failed: {message}")]
    JobFailure { job: String, message: String },

    /// The worker pool became unusable.
    #[error("worker pool failure: {0}")]
    ProcessPool(String),

    /// A chapter's segment outputs are missing or out of sequence.
    #[error("chapter {chapter} is incomplete: {detail}")]
    IncompleteChapter { chapter: usize, detail: String },

    /// The run was interrupted.
    #[error("cancelled")]
    Cancelled,

    /// External tool error.
    #[error(transparent)]
    Tool(#[from] audiobinder_av::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BindError {
    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a discovery error.
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create an incomplete chapter error.
    pub fn incomplete<S: Into<String>>(chapter: usize, detail: S) -> Self {
        Self::IncompleteChapter {
            chapter,
            detail: detail.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled) || matches!(self, Self::Tool(e) if e.is_killed())
    }
}
