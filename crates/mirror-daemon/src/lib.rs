//! mirror-daemon library: Exposes the daemon components for testing.
//!
//! This is a thin library layer over the daemon's watcher, worker and
//! supervisor, allowing integration tests to drive them directly.

pub mod config;
pub mod runner;
pub mod supervisor;
pub mod watcher;
pub mod worker;

// Re-export key types for convenience
pub use config::{Config, ConfigError, JobConfig};
pub use runner::{CommandRunner, ProcessRunner};
pub use supervisor::{Supervisor, SupervisorOptions};
pub use watcher::{ChangeKind, Watcher, WatcherOptions};
pub use worker::{SyncWorker, WorkerOptions, WorkerStats};
