//! mirror-core: Building blocks for debounced, single-flight directory mirroring.
//!
//! This crate provides:
//! - `JobKey`, the structural identity of a sync job
//! - `SignalSlot`, the capacity-one "sync requested" handoff
//! - `JobRegistry`, the map from job identity to its slot
//! - `SyncCommand` construction and rsync progress parsing
//!
//! The watcher, worker and supervisor that drive these live in `mirror-daemon`.

pub mod command;
pub mod error;
pub mod job;
pub mod registry;
pub mod slot;
pub mod state;

pub use command::{parse_progress, Progress, SyncCommand};
pub use error::JobError;
pub use job::{JobKey, DEFAULT_LOGFILE};
pub use registry::JobRegistry;
pub use slot::SignalSlot;
pub use state::JobState;
