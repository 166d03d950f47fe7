//! Daemon configuration loaded from a YAML file.
//!
//! ```yaml
//! poll_interval_secs: 5
//! sync_on_start: true
//! rsync: rsync
//! progress: true
//! jobs:
//!   - source: ~/notes
//!     dest: backup:/srv/notes
//!     nolisten: false
//!     logfile: /tmp/psyncd/rsync.log
//!     exclude: [".git"]
//! ```

use mirror_core::JobKey;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::supervisor::SupervisorOptions;
use crate::watcher::{WatcherOptions, MAX_POLL_INTERVAL};
use crate::worker::WorkerOptions;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Polling period for `nolisten` jobs, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Run one sync per job at startup
    #[serde(default = "default_true")]
    pub sync_on_start: bool,
    /// Sync program
    #[serde(default = "default_rsync")]
    pub rsync: String,
    /// Ask rsync for overall progress output
    #[serde(default = "default_true")]
    pub progress: bool,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

/// One job as written in the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    pub source: String,
    pub dest: String,
    #[serde(default)]
    pub nolisten: bool,
    /// Defaults to `mirror_core::DEFAULT_LOGFILE`
    #[serde(default)]
    pub logfile: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_rsync() -> String {
    "rsync".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            sync_on_start: true,
            rsync: default_rsync(),
            progress: true,
            jobs: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }
        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_POLL_INTERVAL.as_secs() {
            return Err(ConfigError::InvalidPollInterval);
        }
        if self.rsync.trim().is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        Ok(())
    }

    /// Job keys in file order. Duplicates are kept; the supervisor rejects them.
    pub fn job_keys(&self) -> Vec<JobKey> {
        self.jobs.iter().map(JobConfig::to_key).collect()
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            watcher: WatcherOptions {
                sync_on_start: self.sync_on_start,
                poll_interval: Duration::from_secs(self.poll_interval_secs),
            },
            worker: WorkerOptions {
                program: self.rsync.clone(),
                progress: self.progress,
            },
        }
    }
}

impl JobConfig {
    pub fn to_key(&self) -> JobKey {
        let key = JobKey::new(expand_tilde(&self.source), expand_tilde(&self.dest))
            .with_nolisten(self.nolisten)
            .with_exclude(self.exclude.iter().cloned());
        match &self.logfile {
            Some(logfile) => key.with_logfile(expand_tilde(logfile)),
            None => key,
        }
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("No jobs configured")]
    NoJobs,

    #[error("poll_interval_secs must be between 1 and {}", MAX_POLL_INTERVAL.as_secs())]
    InvalidPollInterval,

    #[error("rsync program must not be empty")]
    EmptyProgram,
}
