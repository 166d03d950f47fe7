//! Job identity.
//!
//! A job is one configured source → destination mirror. Two jobs are the same
//! job when every option matches, so the whole configuration doubles as the key
//! the registry deduplicates on.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Log file rsync writes to when a job doesn't name one.
pub const DEFAULT_LOGFILE: &str = "/tmp/psyncd/rsync.log";

/// Immutable, structurally hashed identity of a sync job.
///
/// Fields are private and only settable through the consuming `with_*`
/// builders, so a key can't change once it has been handed to a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    source: PathBuf,
    dest: PathBuf,
    nolisten: bool,
    logfile: PathBuf,
    /// Ordered so construction order never affects equality or hashing
    exclude: BTreeSet<String>,
}

impl JobKey {
    /// Create a job with default options (live watching, default log file).
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            nolisten: false,
            logfile: PathBuf::from(DEFAULT_LOGFILE),
            exclude: BTreeSet::new(),
        }
    }

    /// Poll on a timer instead of subscribing to filesystem events.
    pub fn with_nolisten(mut self, nolisten: bool) -> Self {
        self.nolisten = nolisten;
        self
    }

    pub fn with_logfile(mut self, logfile: impl Into<PathBuf>) -> Self {
        self.logfile = logfile.into();
        self
    }

    /// Add rsync exclude patterns. Duplicates collapse.
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn nolisten(&self) -> bool {
        self.nolisten
    }

    pub fn logfile(&self) -> &Path {
        &self.logfile
    }

    pub fn exclude(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(String::as_str)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.dest.display())
    }
}
