//! Bounded pool of workers running external jobs.
//!
//! A [`WorkerPool`] is registered in the [`ProcessRegistry`] for its whole
//! lifetime. Every command a worker spawns is registered under the pool's
//! [`Scope`], so stopping the pool (directly or through
//! [`ProcessRegistry::terminate_all`]) kills its in-flight children.
//!
//! Results arrive in completion order. Callers must not depend on that order;
//! every submitted job resolves exactly once.

use super::job::{Job, JobId, JobKind, JobResult, JobStatus};
use crate::error::{BindError, Result};
use crate::progress::ProgressBoard;
use audiobinder_av::{HandleId, ProcessHandle, ProcessRegistry, Registration, Scope};
use futures::{FutureExt, Stream, StreamExt};
use indicatif::ProgressBar;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Bounded set of parallel workers.
pub struct WorkerPool {
    registry: ProcessRegistry,
    scope: Scope,
    workers: usize,
    progress: Option<Arc<ProgressBoard>>,
    registration: Registration,
}

impl WorkerPool {
    /// Create and register a pool with `workers` slots (at least one).
    pub fn new(registry: &ProcessRegistry, workers: usize) -> Self {
        let workers = workers.max(1);
        let handle = registry.pool_handle(workers);
        let scope = Scope::for_pool(&handle);
        let registration = registry.enroll(handle);

        tracing::debug!("Worker pool {} started with {} worker(s)", registration.id(), workers);

        Self {
            registry: registry.clone(),
            scope,
            workers,
            progress: None,
            registration,
        }
    }

    /// A pool sized to the number of logical CPUs.
    pub fn with_default_workers(registry: &ProcessRegistry) -> Self {
        Self::new(registry, num_cpus::get())
    }

    /// Report per-stage progress on `board`.
    pub fn with_progress(mut self, board: Arc<ProgressBoard>) -> Self {
        self.progress = Some(board);
        self
    }

    pub fn id(&self) -> HandleId {
        self.registration.id()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Processes currently running on behalf of this pool.
    pub fn active_children(&self) -> Vec<ProcessHandle> {
        self.registry.children_of(self.id())
    }

    pub fn is_stopped(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Stop dispatching and kill in-flight children.
    pub fn shutdown(&self) {
        self.scope.token().cancel();
    }

    /// Dispatch `jobs` and stream their results as they finish.
    pub fn submit_all(&self, label: &str, jobs: Vec<Job>) -> JobStream {
        let total = jobs.len();
        let bar = match &self.progress {
            Some(board) => board.stage(label, total as u64),
            None => ProgressBar::hidden(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            registry: self.registry.clone(),
            scope: self.scope.clone(),
            workers: self.workers,
            bar,
        };
        let task = tokio::spawn(dispatcher.run(jobs, tx));

        JobStream { rx, total, task }
    }

    /// Dispatch `jobs` and wait for every one of them to resolve.
    pub async fn run_all(&self, label: &str, jobs: Vec<Job>) -> PoolReport {
        let expected: Vec<(JobId, JobKind, PathBuf)> = jobs
            .iter()
            .enumerate()
            .map(|(i, job)| (JobId(i), job.kind, job.output.clone()))
            .collect();

        let results: Vec<JobResult> = self.submit_all(label, jobs).collect().await;
        PoolReport::from_results(expected, results)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        tracing::debug!("Worker pool {} stopped", self.registration.id());
    }
}

/// Stream of job results from one [`WorkerPool::submit_all`] call.
///
/// Dropping the stream stops the dispatcher and kills its in-flight jobs.
pub struct JobStream {
    rx: mpsc::UnboundedReceiver<JobResult>,
    total: usize,
    task: JoinHandle<()>,
}

impl JobStream {
    /// Number of jobs submitted.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Stream for JobStream {
    type Item = JobResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for JobStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Dispatcher {
    registry: ProcessRegistry,
    scope: Scope,
    workers: usize,
    bar: ProgressBar,
}

enum Outcome {
    Finished(JobStatus),
    Panicked(String),
}

impl Dispatcher {
    async fn run(self, jobs: Vec<Job>, tx: mpsc::UnboundedSender<JobResult>) {
        let mut queue: VecDeque<(JobId, Job)> =
            jobs.into_iter().enumerate().map(|(i, j)| (JobId(i), j)).collect();
        let mut running: JoinSet<(JobId, Outcome)> = JoinSet::new();
        let mut in_flight: HashMap<JobId, (JobKind, PathBuf)> = HashMap::new();
        let mut stopped = self.scope.is_cancelled();
        let mut broken = false;

        loop {
            while !stopped && !broken && running.len() < self.workers {
                let Some((id, job)) = queue.pop_front() else {
                    break;
                };
                in_flight.insert(id, (job.kind, job.output.clone()));
                let registry = self.registry.clone();
                let scope = self.scope.clone();
                running.spawn(async move {
                    let outcome = match AssertUnwindSafe(execute(job, registry, scope))
                        .catch_unwind()
                        .await
                    {
                        Ok(status) => Outcome::Finished(status),
                        Err(panic) => Outcome::Panicked(panic_message(panic)),
                    };
                    (id, outcome)
                });
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                joined = running.join_next() => {
                    let Some(joined) = joined else { break };
                    let (id, outcome) = match joined {
                        Ok(done) => done,
                        Err(e) => {
                            if !broken {
                                tracing::error!("Worker task lost: {}", e);
                                broken = true;
                            }
                            continue;
                        }
                    };
                    let Some((kind, output)) = in_flight.remove(&id) else {
                        continue;
                    };
                    let status = match outcome {
                        Outcome::Finished(status) => status,
                        Outcome::Panicked(message) => {
                            tracing::error!("Worker panicked running {} {:?}: {}", kind, output, message);
                            broken = true;
                            // Nothing more is started; children in flight are killed.
                            running.abort_all();
                            JobStatus::Abandoned
                        }
                    };
                    self.bar.inc(1);
                    let _ = tx.send(JobResult { id, kind, output, status });
                }
                _ = self.scope.token().cancelled(), if !stopped => {
                    tracing::debug!("Pool stopped with {} job(s) in flight", running.len());
                    stopped = true;
                }
            }
        }

        let mut unresolved: Vec<(JobId, (JobKind, PathBuf))> = in_flight.into_iter().collect();
        unresolved.sort_by_key(|(id, _)| *id);
        for (id, (kind, output)) in unresolved {
            let _ = tx.send(JobResult {
                id,
                kind,
                output,
                status: JobStatus::Abandoned,
            });
        }

        let leftover = if broken {
            JobStatus::Abandoned
        } else {
            JobStatus::Cancelled
        };
        for (id, job) in queue {
            let _ = tx.send(JobResult {
                id,
                kind: job.kind,
                output: job.output,
                status: leftover.clone(),
            });
        }

        if stopped || broken {
            self.bar.abandon();
        } else {
            self.bar.finish();
        }
    }
}

async fn execute(job: Job, registry: ProcessRegistry, scope: Scope) -> JobStatus {
    let label = job.label();
    match job.command.run(&registry, &scope).await {
        Ok(_) => {
            tracing::trace!("{} done", label);
            JobStatus::Completed(job.output)
        }
        Err(e) => {
            // A partial output must never be mistaken for a finished one.
            if let Err(rm) = tokio::fs::remove_file(&job.output).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Could not remove partial output {:?}: {}", job.output, rm);
                }
            }
            if e.is_killed() || scope.is_cancelled() {
                JobStatus::Cancelled
            } else {
                tracing::warn!("{} failed: {}", label, e);
                JobStatus::Failed(e.to_string())
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Every result of one batch, in completion order.
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub results: Vec<JobResult>,
    /// Set when the pool stopped resolving jobs on its own.
    pub broken: Option<String>,
}

impl PoolReport {
    fn from_results(expected: Vec<(JobId, JobKind, PathBuf)>, mut results: Vec<JobResult>) -> Self {
        let mut broken = None;
        if results.iter().any(|r| r.status == JobStatus::Abandoned) {
            broken = Some("worker pool became unusable".to_string());
        }

        if results.len() < expected.len() {
            let seen: HashSet<JobId> = results.iter().map(|r| r.id).collect();
            for (id, kind, output) in expected {
                if !seen.contains(&id) {
                    results.push(JobResult {
                        id,
                        kind,
                        output,
                        status: JobStatus::Abandoned,
                    });
                }
            }
            broken = Some("dispatcher stopped before resolving every job".to_string());
        }

        Self { results, broken }
    }

    /// Outputs of completed jobs, in completion order.
    pub fn completed(&self) -> impl Iterator<Item = &PathBuf> {
        self.results.iter().filter_map(|r| match &r.status {
            JobStatus::Completed(path) => Some(path),
            _ => None,
        })
    }

    /// First failure to arrive.
    pub fn first_failure(&self) -> Option<&JobResult> {
        self.results
            .iter()
            .find(|r| matches!(r.status, JobStatus::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, JobStatus::Failed(_)))
    }

    pub fn was_cancelled(&self) -> bool {
        self.results.iter().any(|r| r.status == JobStatus::Cancelled)
    }

    pub fn count(&self, pred: impl Fn(&JobStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }

    /// Completed outputs, or the error that should end the run.
    ///
    /// Cancellation wins over failures. A broken pool is logged and the
    /// outputs collected so far are still returned; with nothing collected
    /// it is an error.
    pub fn into_outputs(self) -> Result<Vec<PathBuf>> {
        if self.was_cancelled() {
            return Err(BindError::Cancelled);
        }
        if let Some(failure) = self.first_failure() {
            let message = match &failure.status {
                JobStatus::Failed(message) => message.clone(),
                _ => String::new(),
            };
            return Err(BindError::JobFailure {
                job: failure.label(),
                message,
            });
        }
        if let Some(reason) = &self.broken {
            if self.completed().next().is_none() {
                return Err(BindError::ProcessPool(reason.clone()));
            }
            tracing::warn!(
                "{}; {} job(s) abandoned",
                reason,
                self.count(|s| *s == JobStatus::Abandoned)
            );
        }
        Ok(self.completed().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiobinder_av::ToolCommand;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn touch_job(output: PathBuf) -> Job {
        let cmd = ToolCommand::new("sh")
            .arg("-c")
            .arg("sleep 0.05; : > \"$0\"")
            .path_arg(&output);
        Job::new(JobKind::Transcode, cmd, output)
    }

    fn failing_job(output: PathBuf) -> Job {
        let cmd = ToolCommand::new("sh").args(["-c", "echo nope >&2; exit 1"]);
        Job::new(JobKind::Transcode, cmd, output)
    }

    fn sleeping_job(output: PathBuf) -> Job {
        let cmd = ToolCommand::new("sh").args(["-c", "sleep 30"]);
        Job::new(JobKind::Transcode, cmd, output)
    }

    #[tokio::test]
    async fn test_every_job_resolves() {
        let dir = tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let pool = WorkerPool::new(&registry, 3);

        let jobs: Vec<Job> = (0..8)
            .map(|i| touch_job(dir.path().join(format!("out-{i}"))))
            .collect();
        let report = pool.run_all("transcode", jobs).await;

        assert_eq!(report.results.len(), 8);
        assert_eq!(report.count(JobStatus::is_completed), 8);
        assert!(report.broken.is_none());
        for path in report.completed() {
            assert!(path.exists());
        }

        let mut ids: Vec<usize> = report.results.iter().map(|r| r.id.0).collect();
        ids.sort();
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let dir = tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let pool = WorkerPool::new(&registry, 2);

        let jobs = vec![
            failing_job(dir.path().join("bad")),
            touch_job(dir.path().join("good-1")),
            touch_job(dir.path().join("good-2")),
        ];
        let report = pool.run_all("transcode", jobs).await;

        assert_eq!(report.count(JobStatus::is_completed), 2);
        let failure = report.first_failure().unwrap();
        assert_eq!(failure.id, JobId(0));

        match report.into_outputs() {
            Err(BindError::JobFailure { job, message }) => {
                assert_eq!(job, "transcode bad");
                assert!(message.contains("nope"));
            }
            other => panic!("expected job failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let dir = tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let pool = WorkerPool::new(&registry, 2);

        let jobs: Vec<Job> = (0..4)
            .map(|i| sleeping_job(dir.path().join(format!("slow-{i}"))))
            .collect();
        let stream = pool.submit_all("transcode", jobs);

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.active_children().len() < 2 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.active_children().len(), 2);

        pool.shutdown();
        let results: Vec<JobResult> = stream.collect().await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.status == JobStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_terminate_all_cancels_in_flight_and_queued() {
        let dir = tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let pool = WorkerPool::new(&registry, 2);

        let jobs: Vec<Job> = (0..5)
            .map(|i| sleeping_job(dir.path().join(format!("slow-{i}"))))
            .collect();
        let started = Instant::now();
        let stream = pool.submit_all("transcode", jobs);

        while pool.active_children().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let report = registry.terminate_all();
        assert!(report.kill_attempts <= 2);
        assert_eq!(report.pools_stopped, 1);

        let results: Vec<JobResult> = stream.collect().await;
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.status == JobStatus::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(pool.active_children().is_empty());

        drop(pool);
        assert!(registry.wait_until_empty(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_cancelled_report_maps_to_cancelled_error() {
        let registry = ProcessRegistry::new();
        let pool = WorkerPool::new(&registry, 1);
        pool.shutdown();

        let dir = tempdir().unwrap();
        let report = pool
            .run_all("split", vec![touch_job(dir.path().join("never"))])
            .await;
        assert!(!dir.path().join("never").exists());
        assert!(matches!(report.into_outputs(), Err(BindError::Cancelled)));
    }

    #[tokio::test]
    async fn test_pool_is_registered_for_its_lifetime() {
        let registry = ProcessRegistry::new();
        let pool = WorkerPool::new(&registry, 4);
        assert!(registry.contains(pool.id()));
        assert_eq!(pool.workers(), 4);

        let id = pool.id();
        drop(pool);
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_broken_report_without_outputs_is_pool_error() {
        let expected = vec![(JobId(0), JobKind::Transcode, PathBuf::from("/tmp/a.m4a"))];
        let report = PoolReport::from_results(expected, Vec::new());
        assert!(report.broken.is_some());
        assert!(matches!(
            report.into_outputs(),
            Err(BindError::ProcessPool(_))
        ));
    }

    #[test]
    fn test_broken_report_keeps_collected_outputs() {
        let expected = vec![
            (JobId(0), JobKind::Transcode, PathBuf::from("/tmp/a.m4a")),
            (JobId(1), JobKind::Transcode, PathBuf::from("/tmp/b.m4a")),
        ];
        let done = JobResult {
            id: JobId(0),
            kind: JobKind::Transcode,
            output: PathBuf::from("/tmp/a.m4a"),
            status: JobStatus::Completed(PathBuf::from("/tmp/a.m4a")),
        };
        let report = PoolReport::from_results(expected, vec![done]);
        assert_eq!(
            report.into_outputs().unwrap(),
            vec![PathBuf::from("/tmp/a.m4a")]
        );
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let registry = ProcessRegistry::new();
        let pool = WorkerPool::with_default_workers(&registry);
        let report = pool.run_all("concat", Vec::new()).await;
        assert!(report.results.is_empty());
        assert_eq!(report.into_outputs().unwrap(), Vec::<PathBuf>::new());
    }
}
