//! Error taxonomy shared by every component of a sync job.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobKey;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job is already registered: {0}")]
    DuplicateJob(JobKey),

    #[error("Unknown job: {0}")]
    UnknownJob(JobKey),

    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Notification stream error: {0}")]
    NotificationStream(String),

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sync command `{command}` failed: {status}")]
    SyncCommand { command: String, status: String },
}

impl JobError {
    /// Whether the error only affects a single run and the job should keep serving.
    pub fn is_per_run(&self) -> bool {
        matches!(self, JobError::Spawn { .. } | JobError::SyncCommand { .. })
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
