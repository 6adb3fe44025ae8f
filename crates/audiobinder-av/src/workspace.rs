//! Temp space management for a binding run.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Prefix of the temp directory created inside the base directory.
pub const TEMP_PREFIX: &str = ".audiobinder-";

/// How hard to try when removing the temp space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Total number of removal attempts.
    pub max_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    pub backoff: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Result of a cleanup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The directory is gone.
    Removed { attempts: u32 },
    /// Every attempt failed; the directory was left behind.
    Abandoned { attempts: u32 },
    /// Cleanup had already run.
    AlreadyDone,
}

/// Shared scratch directory for one run.
///
/// Workers only write new, uniquely named files into it. Removal happens
/// exactly once, through [`cleanup`](Self::cleanup), from whichever path
/// reaches it first (normal completion or cancellation). If the value is
/// dropped without an explicit cleanup the directory is removed best-effort.
///
/// # Example
///
/// ```no_run
/// use audiobinder_av::{CleanupPolicy, TempSpace};
///
/// # async fn example() -> audiobinder_av::Result<()> {
/// let temp = TempSpace::create_in("/books/Dune")?;
/// let segments = temp.subdir("segments")?;
/// // ... write intermediate files under `segments` ...
/// temp.cleanup(CleanupPolicy::default()).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TempSpace {
    temp_dir: Mutex<Option<TempDir>>,
    path: PathBuf,
    cleaned: AtomicBool,
}

impl TempSpace {
    /// Create a new hidden temp directory inside `base`.
    pub fn create_in<P: AsRef<Path>>(base: P) -> Result<Self> {
        let base = base.as_ref();
        if !base.is_dir() {
            return Err(Error::Workspace(format!(
                "Temp base is not a directory: {:?}",
                base
            )));
        }

        let temp_dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(base)
            .map_err(|e| Error::Workspace(format!("failed to create temp dir: {e}")))?;
        let path = temp_dir.path().to_path_buf();

        Ok(Self {
            temp_dir: Mutex::new(Some(temp_dir)),
            path,
            cleaned: AtomicBool::new(false),
        })
    }

    /// Path to the temp directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a path for a named file inside the temp directory.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Create (if needed) and return a subdirectory.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::SeqCst)
    }

    /// Remove the temp directory, retrying transient failures.
    ///
    /// A file handle still held by a just-killed process can make removal
    /// fail for a moment on some platforms. After `max_attempts` failures the
    /// directory is abandoned; this never escalates to an error.
    pub async fn cleanup(&self, policy: CleanupPolicy) -> CleanupOutcome {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return CleanupOutcome::AlreadyDone;
        }

        let attempts = policy.max_attempts.max(1);
        let mut owned = self.temp_dir.lock().take();

        for attempt in 1..=attempts {
            let result = match owned.take() {
                Some(dir) => dir.close(),
                None => std::fs::remove_dir_all(&self.path),
            };

            match result {
                Ok(()) => return CleanupOutcome::Removed { attempts: attempt },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return CleanupOutcome::Removed { attempts: attempt }
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Temp cleanup attempt {}/{} failed for {:?}: {}",
                        attempt,
                        attempts,
                        self.path,
                        _e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(policy.backoff * attempt).await;
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::warn!("Abandoning temp cleanup for {:?}", self.path);

        CleanupOutcome::Abandoned { attempts }
    }
}
