//! Change detection for a job's source path.
//!
//! A `Watcher` turns filesystem activity (or, for `nolisten` jobs, a timer)
//! into deposits on the job's `SignalSlot`. It never looks at what changed
//! beyond filtering event kinds; the sync that follows re-reads everything.

use mirror_core::{JobError, JobKey, JobRegistry, SignalSlot};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Shortest polling period accepted for `nolisten` jobs.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Longest polling period accepted for `nolisten` jobs.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Kind of change that wakes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File closed after being opened for writing
    CloseWrite,
    Create,
    Delete,
    /// Renamed away from a watched location
    MovedFrom,
    /// Renamed into a watched location
    MovedTo,
    /// File contents modified
    Modify,
}

impl ChangeKind {
    /// Classify a notify event kind, returning `None` for kinds that never
    /// trigger a sync (metadata-only changes, opens, reads, ...).
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(Self::CloseWrite),
            EventKind::Create(_) => Some(Self::Create),
            EventKind::Remove(_) => Some(Self::Delete),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Self::MovedFrom),
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
                Some(Self::MovedTo)
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => Some(Self::Modify),
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Some(Self::Modify),
            _ => None,
        }
    }
}

/// Watcher settings shared by every job a supervisor starts.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Queue one sync as soon as the job starts
    pub sync_on_start: bool,
    /// Polling period for `nolisten` jobs
    pub poll_interval: Duration,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            sync_on_start: true,
            poll_interval: Duration::from_secs(5),
        }
    }
}

enum WatchMode {
    /// Timer stands in for filesystem events
    Poll { interval: Duration },
    /// Live notify subscription
    Live {
        /// Watch handle (must keep alive; dropping it removes the watches)
        _watcher: RecommendedWatcher,
        events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    },
}

/// Feeds a job's `SignalSlot` from filesystem events or a poll timer.
pub struct Watcher {
    key: JobKey,
    slot: Arc<SignalSlot>,
    mode: WatchMode,
}

impl Watcher {
    /// Register the job and subscribe to its source.
    ///
    /// Registration happens first and is atomic, so a duplicate job fails
    /// with `DuplicateJob` before any watch is created. If the source is
    /// missing (`SourceNotFound`) or the subscription fails
    /// (`NotificationStream`) the job is deregistered again.
    pub fn new(
        registry: &JobRegistry,
        key: JobKey,
        options: &WatcherOptions,
    ) -> Result<Self, JobError> {
        let slot = Arc::new(SignalSlot::new(options.sync_on_start));
        registry.register(key.clone(), Arc::clone(&slot))?;

        match Self::subscribe(&key, options) {
            Ok(mode) => Ok(Self { key, slot, mode }),
            Err(e) => {
                registry.deregister(&key);
                Err(e)
            }
        }
    }

    fn subscribe(key: &JobKey, options: &WatcherOptions) -> Result<WatchMode, JobError> {
        let source = key.source();
        if !source.exists() {
            return Err(JobError::SourceNotFound(source.to_path_buf()));
        }

        if key.nolisten() {
            return Ok(WatchMode::Poll {
                interval: options.poll_interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL),
            });
        }

        let stream_error = |e: notify::Error| JobError::NotificationStream(e.to_string());

        // Forward raw events into tokio; the callback runs on notify's thread
        let (event_tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            // Receiver dropped means the watcher is shutting down
            let _ = event_tx.send(result);
        })
        .map_err(stream_error)?;

        let recursive = if source.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(source, recursive).map_err(stream_error)?;

        Ok(WatchMode::Live {
            _watcher: watcher,
            events,
        })
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// The slot this watcher deposits into.
    pub fn slot(&self) -> &Arc<SignalSlot> {
        &self.slot
    }

    /// Run until `cancel` fires or the event stream fails.
    ///
    /// Events still queued when cancellation arrives are dropped; the watch
    /// handles are released when this returns.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), JobError> {
        let Self { key, slot, mode } = self;

        match mode {
            WatchMode::Poll { interval } => {
                info!("Polling {} every {:?}", key, interval);
                let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            if slot.try_send() {
                                debug!("Poll queued sync for {}", key);
                            }
                        }
                    }
                }
            }
            WatchMode::Live { _watcher, mut events } => {
                info!("Watching {}", key.source().display());

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        event = events.recv() => match event {
                            Some(Ok(event)) => on_event(&key, &slot, &event),
                            Some(Err(e)) => {
                                error!("File watcher error for {}: {}", key, e);
                                return Err(JobError::NotificationStream(e.to_string()));
                            }
                            None => {
                                return Err(JobError::NotificationStream(
                                    "event stream closed".to_string(),
                                ));
                            }
                        },
                    }
                }
            }
        }

        info!("Watcher stopped for {}", key);
        Ok(())
    }
}

fn on_event(key: &JobKey, slot: &SignalSlot, event: &Event) {
    let Some(change) = ChangeKind::from_event_kind(&event.kind) else {
        return;
    };

    let queued = slot.try_send();
    debug!(
        "{:?} {:?} for {} ({})",
        change,
        event.paths,
        key,
        if queued { "sync queued" } else { "sync already pending" }
    );
}
