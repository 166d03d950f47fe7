//! mirror-daemon: Keeps destinations mirrored to their sources with rsync.
//!
//! Each configured job gets a watcher that notices changes and a worker that
//! runs rsync, with at most one run in flight and at most one queued.

use anyhow::{Context, Result};
use clap::Parser;
use mirror_core::{JobRegistry, Progress};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use mirror_daemon::config::{Config, JobConfig};
use mirror_daemon::{ProcessRunner, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "mirror-daemon")]
#[command(about = "Mirror directories with rsync whenever they change")]
struct Args {
    /// Path to a YAML config file listing jobs
    #[arg(short, long, conflicts_with_all = ["source", "dest"])]
    config: Option<PathBuf>,

    /// Source of a single job (instead of --config)
    #[arg(long, requires = "dest")]
    source: Option<String>,

    /// Destination of a single job (instead of --config)
    #[arg(long, requires = "source")]
    dest: Option<String>,

    /// Poll on a timer instead of watching (single job only)
    #[arg(long, conflicts_with = "config")]
    nolisten: bool,

    /// rsync log file (single job only)
    #[arg(long, conflicts_with = "config")]
    logfile: Option<String>,

    /// Polling period in seconds for nolisten jobs
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Wait for the first change instead of syncing at startup
    #[arg(long)]
    no_sync_on_start: bool,

    /// rsync program to run
    #[arg(long)]
    rsync: Option<String>,

    /// Log sync progress at info level
    #[arg(long)]
    progress: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match (&self.config, &self.source, &self.dest) {
            (Some(path), _, _) => Config::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            (None, Some(source), Some(dest)) => Config {
                jobs: vec![JobConfig {
                    source: source.clone(),
                    dest: dest.clone(),
                    nolisten: self.nolisten,
                    logfile: self.logfile.clone(),
                    exclude: Vec::new(),
                }],
                ..Config::default()
            },
            _ => anyhow::bail!("either --config or --source and --dest is required"),
        };

        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        if self.no_sync_on_start {
            config.sync_on_start = false;
        }
        if let Some(rsync) = &self.rsync {
            config.rsync = rsync.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Log progress updates as they arrive.
async fn report_progress(mut rx: mpsc::UnboundedReceiver<Progress>, at_info: bool) {
    while let Some(progress) = rx.recv().await {
        if at_info {
            info!(job = %progress.job, percent = progress.percent, "Sync progress");
        } else {
            debug!(job = %progress.job, percent = progress.percent, "Sync progress");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,mirror_daemon=debug"
    } else {
        "info,mirror_daemon=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.load_config()?;
    info!("Starting mirror-daemon with {} job(s)", config.jobs.len());

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    tokio::spawn(report_progress(progress_rx, args.progress));

    let shutdown = CancellationToken::new();
    let mut supervisor = Supervisor::new(
        Arc::new(JobRegistry::new()),
        Arc::new(ProcessRunner::new()),
        config.supervisor_options(),
        shutdown.clone(),
    )
    .with_progress(progress_tx);

    let failed = supervisor.start_all(config.job_keys());
    if supervisor.is_empty() {
        anyhow::bail!("no job could be started ({} failed)", failed.len());
    }
    if !failed.is_empty() {
        warn!(
            "{} job(s) failed to start, continuing with {}",
            failed.len(),
            supervisor.len()
        );
    }

    info!("Daemon running. Press Ctrl+C to stop.");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl+C")?;
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => {}
    }

    for (job, stats) in supervisor.shutdown().await {
        info!("{}: {} run(s), {} failed", job, stats.runs, stats.failures);
    }
    info!("Shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("mirror-daemon").chain(args.iter().copied()))
    }

    #[test]
    fn test_single_job_options_conflict_with_config() {
        assert!(parse(&["--config", "mirror.yaml", "--nolisten"]).is_err());
        assert!(parse(&["--config", "mirror.yaml", "--logfile", "/tmp/x.log"]).is_err());
        assert!(parse(&["--config", "mirror.yaml", "--source", "/a", "--dest", "/b"]).is_err());
    }

    #[test]
    fn test_single_job_from_flags() {
        let args = parse(&["--source", "/a", "--dest", "/b", "--nolisten", "--poll-interval", "30"])
            .unwrap();

        let config = args.load_config().unwrap();
        assert_eq!(config.poll_interval_secs, 30);
        let keys = config.job_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].nolisten());
    }

    #[test]
    fn test_config_or_job_is_required() {
        let args = parse(&["--verbose"]).unwrap();
        assert!(args.load_config().is_err());
    }
}
