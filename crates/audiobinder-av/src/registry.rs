//! Process-wide bookkeeping of live tool invocations and worker pools.
//!
//! A single [`ProcessRegistry`] is created per run and cloned into every
//! component that spawns work. Cancellation reaches running children through
//! the registry instead of walking call stacks: [`ProcessRegistry::terminate_all`]
//! force-kills every live process and stops every live pool.
//!
//! # Example
//!
//! ```
//! use audiobinder_av::{ProcessRegistry, Scope};
//!
//! let registry = ProcessRegistry::new();
//! let handle = registry.process_handle(None, "ffmpeg", &Scope::root());
//! {
//!     let _registration = registry.enroll(handle);
//!     assert_eq!(registry.len(), 1);
//! }
//! assert!(registry.is_empty());
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Poll interval used while waiting for the registry to drain.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Identifier of a registered handle, unique within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a registered handle stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleKind {
    /// A spawned external command.
    Process {
        /// OS process id, if the platform reported one.
        pid: Option<u32>,
        /// Program name, for diagnostics.
        program: String,
    },
    /// A worker pool dispatching jobs.
    Pool {
        /// Configured number of parallel workers.
        workers: usize,
    },
}

/// A live external invocation or worker pool.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    id: HandleId,
    kind: HandleKind,
    owner: Option<HandleId>,
    cancel: CancellationToken,
}

impl ProcessHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn kind(&self) -> &HandleKind {
        &self.kind
    }

    /// The pool this handle was spawned from, if any.
    pub fn owner(&self) -> Option<HandleId> {
        self.owner
    }

    /// Token that is cancelled when this handle is asked to terminate.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn pid(&self) -> Option<u32> {
        match self.kind {
            HandleKind::Process { pid, .. } => pid,
            HandleKind::Pool { .. } => None,
        }
    }

    pub fn is_process(&self) -> bool {
        matches!(self.kind, HandleKind::Process { .. })
    }
}

/// Cancellation scope under which commands are spawned.
///
/// Commands spawned from a pool carry the pool as their owner and a child of
/// the pool's token, so stopping the pool also kills its in-flight children.
#[derive(Debug, Clone)]
pub struct Scope {
    owner: Option<HandleId>,
    cancel: CancellationToken,
}

impl Scope {
    /// A scope not attached to any pool.
    pub fn root() -> Self {
        Self {
            owner: None,
            cancel: CancellationToken::new(),
        }
    }

    /// A scope owned by the given pool handle.
    pub fn for_pool(pool: &ProcessHandle) -> Self {
        Self {
            owner: Some(pool.id),
            cancel: pool.cancel.clone(),
        }
    }

    pub fn owner(&self) -> Option<HandleId> {
        self.owner
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Summary of one [`ProcessRegistry::terminate_all`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TerminationReport {
    /// Number of processes a forced kill was sent to.
    pub kill_attempts: usize,
    /// Number of pools told to stop dispatching.
    pub pools_stopped: usize,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    live: Mutex<HashMap<HandleId, ProcessHandle>>,
    terminating: AtomicBool,
}

/// Thread-safe set of live processes and pools.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Inner>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> HandleId {
        HandleId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Build a handle for a spawned process running under `scope`.
    pub fn process_handle(
        &self,
        pid: Option<u32>,
        program: impl Into<String>,
        scope: &Scope,
    ) -> ProcessHandle {
        ProcessHandle {
            id: self.allocate_id(),
            kind: HandleKind::Process {
                pid,
                program: program.into(),
            },
            owner: scope.owner,
            cancel: scope.cancel.child_token(),
        }
    }

    /// Build a handle for a worker pool.
    pub fn pool_handle(&self, workers: usize) -> ProcessHandle {
        ProcessHandle {
            id: self.allocate_id(),
            kind: HandleKind::Pool { workers },
            owner: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Add a handle. Returns `false` if it was already present.
    ///
    /// A handle registered after [`terminate_all`](Self::terminate_all) has
    /// started is terminated immediately.
    pub fn register(&self, handle: ProcessHandle) -> bool {
        let late = self.is_terminating();
        let inserted = {
            let mut live = self.inner.live.lock();
            if live.contains_key(&handle.id) {
                false
            } else {
                live.insert(handle.id, handle.clone());
                true
            }
        };

        if late {
            force_terminate(&handle);
        }

        inserted
    }

    /// Remove a handle. Returns `false` if it was not present.
    pub fn deregister(&self, id: HandleId) -> bool {
        self.inner.live.lock().remove(&id).is_some()
    }

    /// Register a handle and return a guard that deregisters it on drop.
    pub fn enroll(&self, handle: ProcessHandle) -> Registration {
        let id = handle.id;
        self.register(handle);
        Registration {
            registry: self.clone(),
            id,
        }
    }

    pub fn contains(&self, id: HandleId) -> bool {
        self.inner.live.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.live.lock().is_empty()
    }

    /// Copy of the live set, sorted by id.
    pub fn snapshot(&self) -> Vec<ProcessHandle> {
        let mut handles: Vec<ProcessHandle> = self.inner.live.lock().values().cloned().collect();
        handles.sort_by_key(|h| h.id);
        handles
    }

    /// Live processes spawned from the given pool.
    pub fn children_of(&self, owner: HandleId) -> Vec<ProcessHandle> {
        self.snapshot()
            .into_iter()
            .filter(|h| h.is_process() && h.owner == Some(owner))
            .collect()
    }

    pub fn is_terminating(&self) -> bool {
        self.inner.terminating.load(Ordering::SeqCst)
    }

    /// Force-kill every live process and stop every live pool.
    ///
    /// Works on a snapshot; handles that exit concurrently are tolerated. The
    /// registry empties only as the owners of the handles deregister them.
    pub fn terminate_all(&self) -> TerminationReport {
        self.inner.terminating.store(true, Ordering::SeqCst);

        let snapshot = self.snapshot();
        let mut report = TerminationReport::default();

        // Processes first: cancelling a pool cascades into its children's
        // tokens, which would hide them from the kill pass.
        for handle in snapshot.iter().filter(|h| h.is_process()) {
            if handle.cancel.is_cancelled() {
                continue;
            }
            force_terminate(handle);
            report.kill_attempts += 1;
        }

        for handle in snapshot.iter().filter(|h| !h.is_process()) {
            if !handle.cancel.is_cancelled() {
                handle.cancel.cancel();
                report.pools_stopped += 1;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Terminated {} process(es) and {} pool(s)",
            report.kill_attempts,
            report.pools_stopped
        );

        report
    }

    /// Wait until every handle has been deregistered, up to `limit`.
    ///
    /// Returns `true` if the registry drained in time.
    pub async fn wait_until_empty(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}

/// Guard that keeps a handle registered for its lifetime.
#[derive(Debug)]
pub struct Registration {
    registry: ProcessRegistry,
    id: HandleId,
}

impl Registration {
    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}

fn force_terminate(handle: &ProcessHandle) {
    if let Some(pid) = handle.pid() {
        kill_process_group(pid);
    }
    handle.cancel.cancel();
}

/// Send SIGKILL to the process group led by `pid`.
///
/// Children are spawned as group leaders, so this also reaches anything they
/// forked. A group that has already exited is not an error.
#[cfg(unix)]
pub(crate) fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    let target = Pid::from_raw(raw);
    match killpg(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(_) => {
            let _ = kill(target, Signal::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_process_group(_pid: u32) {
    // The runner observes the cancelled token and kills its own child.
}
