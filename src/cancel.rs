//! Interrupt handling and teardown.
//!
//! Only the coordinating process reacts to an interrupt. Children run in
//! their own process group, so they never see the terminal's SIGINT and never
//! attempt cleanup of their own.

use crate::progress::ProgressBoard;
use audiobinder_av::{CleanupOutcome, CleanupPolicy, ProcessRegistry, TempSpace, TerminationReport};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Exit status reported after an interrupt.
pub const INTERRUPT_EXIT_CODE: u8 = 130;

/// How long teardown waits for killed children to deregister.
const DRAIN_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CancelState {
    Running = 0,
    CancelRequested = 1,
    Terminating = 2,
    Exited = 3,
}

impl CancelState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CancelState::Running,
            1 => CancelState::CancelRequested,
            2 => CancelState::Terminating,
            _ => CancelState::Exited,
        }
    }
}

/// What a teardown did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownReport {
    pub termination: TerminationReport,
    /// Whether every registered handle was released in time.
    pub drained: bool,
    pub cleanup: CleanupOutcome,
}

/// Drives `Running -> CancelRequested -> Terminating -> Exited`.
pub struct CancellationCoordinator {
    state: AtomicU8,
    requested: CancellationToken,
    registry: ProcessRegistry,
    progress: Arc<ProgressBoard>,
    temp: Arc<TempSpace>,
    policy: CleanupPolicy,
}

impl CancellationCoordinator {
    pub fn new(
        registry: ProcessRegistry,
        progress: Arc<ProgressBoard>,
        temp: Arc<TempSpace>,
        policy: CleanupPolicy,
    ) -> Self {
        Self {
            state: AtomicU8::new(CancelState::Running as u8),
            requested: CancellationToken::new(),
            registry,
            progress,
            temp,
            policy,
        }
    }

    pub fn state(&self) -> CancelState {
        CancelState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn advance(&self, from: CancelState, to: CancelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Record an interrupt. Returns `false` if one was already recorded.
    pub fn request_cancel(&self) -> bool {
        if self.advance(CancelState::Running, CancelState::CancelRequested) {
            tracing::warn!("Interrupt received; stopping");
            self.requested.cancel();
            true
        } else {
            tracing::debug!("Interrupt ignored; already {:?}", self.state());
            false
        }
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.requested.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.is_cancelled()
    }

    /// Kill everything, close progress output and remove the temp space.
    ///
    /// Runs at most once; returns `None` if cancellation was never requested
    /// or teardown already ran.
    pub async fn teardown(&self) -> Option<TeardownReport> {
        if !self.advance(CancelState::CancelRequested, CancelState::Terminating) {
            return None;
        }

        let termination = self.registry.terminate_all();
        self.progress.close();

        let drained = self.registry.wait_until_empty(DRAIN_LIMIT).await;
        if !drained {
            tracing::warn!(
                "{} handle(s) still registered after {:?}",
                self.registry.len(),
                DRAIN_LIMIT
            );
        }

        let cleanup = self.temp.cleanup(self.policy).await;
        match cleanup {
            CleanupOutcome::Removed { attempts } => {
                tracing::debug!("Temp space removed after {} attempt(s)", attempts)
            }
            CleanupOutcome::Abandoned { attempts } => tracing::warn!(
                "Gave up removing {:?} after {} attempt(s)",
                self.temp.path(),
                attempts
            ),
            CleanupOutcome::AlreadyDone => {}
        }

        self.state.store(CancelState::Exited as u8, Ordering::SeqCst);
        Some(TeardownReport {
            termination,
            drained,
            cleanup,
        })
    }

    /// Forward Ctrl-C to [`request_cancel`](Self::request_cancel) until the
    /// returned task is aborted.
    pub fn listen_for_interrupts(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Could not listen for interrupts: {}", e);
                    return;
                }
                coordinator.request_cancel();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiobinder_av::{Scope, ToolCommand};

    fn coordinator(base: &std::path::Path, registry: &ProcessRegistry) -> CancellationCoordinator {
        CancellationCoordinator::new(
            registry.clone(),
            Arc::new(ProgressBoard::hidden()),
            Arc::new(TempSpace::create_in(base).unwrap()),
            CleanupPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_request_cancel_once() {
        let base = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let coord = coordinator(base.path(), &registry);

        assert_eq!(coord.state(), CancelState::Running);
        assert!(coord.request_cancel());
        assert!(!coord.request_cancel());
        assert_eq!(coord.state(), CancelState::CancelRequested);
        coord.cancelled().await;
    }

    #[tokio::test]
    async fn test_teardown_requires_request() {
        let base = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let coord = coordinator(base.path(), &registry);

        assert!(coord.teardown().await.is_none());
        assert_eq!(coord.state(), CancelState::Running);
    }

    #[tokio::test]
    async fn test_teardown_kills_and_cleans() {
        let base = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let coord = coordinator(base.path(), &registry);
        let temp_path = coord.temp.path().to_path_buf();
        std::fs::write(temp_path.join("partial.m4a"), b"data").unwrap();

        let runner = registry.clone();
        let task = tokio::spawn(async move {
            ToolCommand::new("sleep")
                .arg("30")
                .run(&runner, &Scope::root())
                .await
        });
        while registry.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        coord.request_cancel();
        let report = coord.teardown().await.unwrap();

        assert_eq!(report.termination.kill_attempts, 1);
        assert!(report.drained);
        assert_eq!(report.cleanup, CleanupOutcome::Removed { attempts: 1 });
        assert!(!temp_path.exists());
        assert_eq!(coord.state(), CancelState::Exited);
        assert!(task.await.unwrap().unwrap_err().is_killed());

        // A second teardown is a no-op.
        assert!(coord.teardown().await.is_none());
    }
}
