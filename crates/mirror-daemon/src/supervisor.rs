//! Job supervision.
//!
//! The supervisor builds one (watcher, worker, slot) triple per job, runs each
//! half as its own tokio task, and tears them down in order. Jobs are
//! independent: one job failing to start never affects the others.

use futures::future::join_all;
use mirror_core::{JobError, JobKey, JobRegistry, JobState, Progress};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::runner::CommandRunner;
use crate::watcher::{Watcher, WatcherOptions};
use crate::worker::{SyncWorker, WorkerOptions, WorkerStats};

/// Settings applied to every job.
#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    pub watcher: WatcherOptions,
    pub worker: WorkerOptions,
}

/// Tasks and lifecycle of one running job.
struct JobHandle {
    /// Child of the supervisor's shutdown token
    cancel: CancellationToken,
    state: watch::Sender<JobState>,
    watcher: JoinHandle<Result<(), JobError>>,
    worker: JoinHandle<WorkerStats>,
}

/// Owns every running job.
pub struct Supervisor {
    registry: Arc<JobRegistry>,
    runner: Arc<dyn CommandRunner>,
    options: SupervisorOptions,
    /// Cancelling this stops every job
    shutdown: CancellationToken,
    progress_tx: Option<mpsc::UnboundedSender<Progress>>,
    jobs: HashMap<JobKey, JobHandle>,
}

impl Supervisor {
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<dyn CommandRunner>,
        options: SupervisorOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            runner,
            options,
            shutdown,
            progress_tx: None,
            jobs: HashMap::new(),
        }
    }

    /// Send every job's progress to `tx`.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<Progress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Register a job and spawn its watcher and worker.
    ///
    /// Returns a receiver that follows the job's `JobState`. Fails with
    /// `DuplicateJob`, `SourceNotFound` or `NotificationStream`, in which
    /// case nothing was spawned and the registry is unchanged.
    pub fn start_job(&mut self, key: JobKey) -> Result<watch::Receiver<JobState>, JobError> {
        let watcher = Watcher::new(&self.registry, key.clone(), &self.options.watcher)?;

        let worker = match SyncWorker::new(
            &self.registry,
            key.clone(),
            Arc::clone(&self.runner),
            self.options.worker.clone(),
        ) {
            Ok(worker) => worker,
            Err(e) => {
                self.registry.deregister(&key);
                return Err(e);
            }
        };
        let worker = match &self.progress_tx {
            Some(tx) => worker.with_progress(tx.clone()),
            None => worker,
        };

        let (state_tx, state_rx) = watch::channel(JobState::Created);
        let cancel = self.shutdown.child_token();

        let watcher_task = tokio::spawn({
            let cancel = cancel.clone();
            let key = key.clone();
            async move {
                let result = watcher.run(cancel).await;
                if let Err(e) = &result {
                    // The worker keeps serving whatever is already pending
                    error!("Watcher for {} stopped: {}", key, e);
                }
                result
            }
        });
        let worker_task = tokio::spawn(worker.run(cancel.clone()));

        state_tx.send_modify(|state| {
            state.advance(JobState::Running);
        });
        info!("Started job {}", key);

        self.jobs.insert(
            key,
            JobHandle {
                cancel,
                state: state_tx,
                watcher: watcher_task,
                worker: worker_task,
            },
        );
        Ok(state_rx)
    }

    /// Start every job, returning the ones that failed.
    ///
    /// Each failure is logged; it doesn't stop the remaining jobs starting.
    pub fn start_all(&mut self, keys: impl IntoIterator<Item = JobKey>) -> Vec<(JobKey, JobError)> {
        let mut failed = Vec::new();
        for key in keys {
            if let Err(e) = self.start_job(key.clone()) {
                error!("Failed to start job {}: {}", key, e);
                failed.push((key, e));
            }
        }
        failed
    }

    /// Stop one job, waiting for an in-flight sync to finish.
    pub async fn stop_job(&mut self, key: &JobKey) -> Result<WorkerStats, JobError> {
        let handle = self
            .jobs
            .remove(key)
            .ok_or_else(|| JobError::UnknownJob(key.clone()))?;
        Ok(stop_handle(Arc::clone(&self.registry), key.clone(), handle).await)
    }

    /// Stop every job.
    ///
    /// Cancels the shutdown token, then waits for all jobs concurrently.
    pub async fn shutdown(&mut self) -> Vec<(JobKey, WorkerStats)> {
        info!("Shutting down {} job(s)", self.jobs.len());
        self.shutdown.cancel();

        let registry = Arc::clone(&self.registry);
        let stopping = self.jobs.drain().map(|(key, handle)| {
            let registry = Arc::clone(&registry);
            async move {
                let stats = stop_handle(registry, key.clone(), handle).await;
                (key, stats)
            }
        });
        join_all(stopping).await
    }

    /// Current state of a supervised job.
    pub fn job_state(&self, key: &JobKey) -> Option<JobState> {
        self.jobs.get(key).map(|handle| *handle.state.borrow())
    }

    /// Supervised jobs, sorted.
    pub fn running_jobs(&self) -> Vec<JobKey> {
        let mut keys: Vec<_> = self.jobs.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

async fn stop_handle(registry: Arc<JobRegistry>, key: JobKey, handle: JobHandle) -> WorkerStats {
    let JobHandle {
        cancel,
        state,
        watcher,
        worker,
    } = handle;

    state.send_modify(|s| {
        s.advance(JobState::ShuttingDown);
    });
    cancel.cancel();

    if let Err(e) = watcher.await {
        warn!("Watcher task for {} panicked: {}", key, e);
    }
    let stats = match worker.await {
        Ok(stats) => stats,
        Err(e) => {
            warn!("Worker task for {} panicked: {}", key, e);
            WorkerStats::default()
        }
    };

    registry.deregister(&key);
    state.send_modify(|s| {
        s.advance(JobState::Stopped);
    });
    info!("Stopped job {}", key);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessRunner;
    use tempfile::TempDir;

    fn supervisor(shutdown: CancellationToken) -> Supervisor {
        let options = SupervisorOptions {
            watcher: WatcherOptions {
                sync_on_start: false,
                ..WatcherOptions::default()
            },
            worker: WorkerOptions {
                program: "true".into(),
                progress: false,
            },
        };
        Supervisor::new(
            Arc::new(JobRegistry::new()),
            Arc::new(ProcessRunner::new()),
            options,
            shutdown,
        )
    }

    #[tokio::test]
    async fn test_start_and_stop_job() {
        let temp_dir = TempDir::new().unwrap();
        let mut supervisor = supervisor(CancellationToken::new());
        let key = JobKey::new(temp_dir.path(), "/tmp/dst").with_nolisten(true);

        let state = supervisor.start_job(key.clone()).unwrap();
        assert_eq!(*state.borrow(), JobState::Running);
        assert_eq!(supervisor.job_state(&key), Some(JobState::Running));
        assert!(supervisor.registry().contains(&key));

        let stats = supervisor.stop_job(&key).await.unwrap();
        assert_eq!(stats.runs, 0);
        assert_eq!(*state.borrow(), JobState::Stopped);
        assert!(!supervisor.registry().contains(&key));
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_job() {
        let mut supervisor = supervisor(CancellationToken::new());
        let result = supervisor.stop_job(&JobKey::new("/src", "/dst")).await;
        assert!(matches!(result, Err(JobError::UnknownJob(_))));
    }

    #[tokio::test]
    async fn test_failed_jobs_do_not_block_others() {
        let temp_dir = TempDir::new().unwrap();
        let mut supervisor = supervisor(CancellationToken::new());

        let good = JobKey::new(temp_dir.path(), "/tmp/dst").with_nolisten(true);
        let missing = JobKey::new(temp_dir.path().join("missing"), "/tmp/dst");

        let failed = supervisor.start_all([missing.clone(), good.clone(), good.clone()]);

        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].0, missing);
        assert!(matches!(failed[0].1, JobError::SourceNotFound(_)));
        assert!(matches!(failed[1].1, JobError::DuplicateJob(_)));
        assert_eq!(supervisor.running_jobs(), vec![good]);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_token_stops_everything() {
        let temp_dir = TempDir::new().unwrap();
        let shutdown = CancellationToken::new();
        let mut supervisor = supervisor(shutdown.clone());

        let a = JobKey::new(temp_dir.path(), "/tmp/a").with_nolisten(true);
        let b = JobKey::new(temp_dir.path(), "/tmp/b").with_nolisten(true);
        let state_a = supervisor.start_job(a).unwrap();
        supervisor.start_job(b).unwrap();

        let stopped = supervisor.shutdown().await;

        assert!(shutdown.is_cancelled());
        assert_eq!(stopped.len(), 2);
        assert!(supervisor.registry().is_empty());
        assert_eq!(*state_a.borrow(), JobState::Stopped);
    }
}
