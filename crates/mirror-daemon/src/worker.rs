//! The per-job sync loop.
//!
//! A `SyncWorker` waits for a token in its job's `SignalSlot` and runs the
//! sync command to completion before waiting again. Because `receive` is the
//! only way into a run and the run is awaited inline, a job can never have two
//! syncs in flight; tokens deposited during a run wake the next iteration.

use mirror_core::{
    parse_progress, JobError, JobKey, JobRegistry, Progress, SignalSlot, SyncCommand,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::runner::CommandRunner;

/// How the worker builds its command.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Sync program to run
    pub program: String,
    /// Pass `--info=progress2`
    pub progress: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            program: "rsync".to_string(),
            progress: true,
        }
    }
}

/// Counters returned when a worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub runs: u64,
    pub failures: u64,
}

/// Drains a job's slot, one sync at a time.
pub struct SyncWorker {
    key: JobKey,
    slot: Arc<SignalSlot>,
    runner: Arc<dyn CommandRunner>,
    options: WorkerOptions,
    progress_tx: Option<mpsc::UnboundedSender<Progress>>,
}

impl SyncWorker {
    /// Attach a worker to an already registered job.
    ///
    /// The slot is looked up, not created, so it is the same one the job's
    /// watcher deposits into. Fails with `UnknownJob` if the key isn't
    /// registered.
    pub fn new(
        registry: &JobRegistry,
        key: JobKey,
        runner: Arc<dyn CommandRunner>,
        options: WorkerOptions,
    ) -> Result<Self, JobError> {
        let slot = registry.lookup(&key)?;
        Ok(Self {
            key,
            slot,
            runner,
            options,
            progress_tx: None,
        })
    }

    /// Forward parsed progress percentages to `tx`.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<Progress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// Serve sync requests until `cancel` fires.
    ///
    /// A worker parked on the slot exits as soon as it is cancelled. A run
    /// already in progress is allowed to finish first. Failed runs are logged
    /// and the loop keeps going.
    pub async fn run(self, cancel: CancellationToken) -> WorkerStats {
        info!("Sync worker started for {}", self.key);
        let mut stats = WorkerStats::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.slot.receive() => {}
            }

            stats.runs += 1;
            info!("Synching: {}", self.key);
            match self.sync_once().await {
                Ok(()) => info!("Synchronization finished: {}", self.key),
                Err(e) => {
                    stats.failures += 1;
                    error!("Sync failed for {}: {}", self.key, e);
                }
            }
        }

        info!(
            "Sync worker stopped for {} ({} runs, {} failed)",
            self.key, stats.runs, stats.failures
        );
        stats
    }

    async fn sync_once(&self) -> Result<(), JobError> {
        if let Some(dir) = self.key.logfile().parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!("Failed to create log directory {}: {}", dir.display(), e);
            }
        }

        let command = SyncCommand::for_job(&self.key, &self.options.program, self.options.progress);
        debug!("Command for {}: {}", self.key, command);

        let key = &self.key;
        let progress_tx = self.progress_tx.as_ref();
        let mut on_line = |line: &str| {
            trace!("{}: {}", key, line);
            if let Some(tx) = progress_tx {
                if let Some(percent) = parse_progress(line) {
                    let _ = tx.send(Progress {
                        job: key.clone(),
                        percent,
                    });
                }
            }
        };

        self.runner.run(&command, &mut on_line).await?;

        if let Some(tx) = progress_tx {
            let _ = tx.send(Progress {
                job: key.clone(),
                percent: 100.0,
            });
        }
        Ok(())
    }
}
