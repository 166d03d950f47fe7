//! The external sync command and its progress output.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::job::JobKey;

/// Decimal percentage as printed by `rsync --info=progress2`, e.g. `42.0%`.
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("percent pattern is valid"));

/// A fully built program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCommand {
    program: String,
    args: Vec<String>,
}

impl SyncCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build the mirror command for a job.
    ///
    /// `rsync --archive --log-file=<logfile> --delete [--info=progress2]
    /// [--exclude=<pattern>...] <source> <dest>`
    pub fn for_job(job: &JobKey, program: &str, progress: bool) -> Self {
        let mut args = vec![
            "--archive".to_string(),
            format!("--log-file={}", job.logfile().display()),
            "--delete".to_string(),
        ];
        if progress {
            args.push("--info=progress2".to_string());
        }
        args.extend(job.exclude().map(|pattern| format!("--exclude={pattern}")));
        args.push(job.source().to_string_lossy().into_owned());
        args.push(job.dest().to_string_lossy().into_owned());

        Self::new(program, args)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for SyncCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Progress of a running sync, as reported to an optional progress sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub job: JobKey,
    /// Percentage in `[0, 100]`
    pub percent: f32,
}

/// Extract the first percentage from a line of sync output.
///
/// Values are clamped to `[0, 100]`.
pub fn parse_progress(line: &str) -> Option<f32> {
    let caps = PERCENT_RE.captures(line)?;
    let value: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsync_command_for_job() {
        let job = JobKey::new("/data/notes/", "nas:/backup/notes")
            .with_logfile("/var/log/mirror/rsync.log");

        let cmd = SyncCommand::for_job(&job, "rsync", true);

        assert_eq!(cmd.program(), "rsync");
        assert_eq!(
            cmd.args(),
            [
                "--archive",
                "--log-file=/var/log/mirror/rsync.log",
                "--delete",
                "--info=progress2",
                "/data/notes/",
                "nas:/backup/notes",
            ]
        );
    }

    #[test]
    fn test_command_without_progress_with_excludes() {
        let job = JobKey::new("/src", "/dst").with_exclude(["target", ".git"]);

        let cmd = SyncCommand::for_job(&job, "/usr/local/bin/rsync", false);

        assert_eq!(cmd.program(), "/usr/local/bin/rsync");
        assert!(!cmd.args().iter().any(|a| a.starts_with("--info")));
        // Excludes come out sorted, before the paths
        assert_eq!(
            &cmd.args()[3..],
            ["--exclude=.git", "--exclude=target", "/src", "/dst"]
        );
    }

    #[test]
    fn test_display() {
        let cmd = SyncCommand::new("rsync", ["-a", "src", "dst"]);
        assert_eq!(cmd.to_string(), "rsync -a src dst");
    }

    #[test]
    fn test_parse_progress2_line() {
        let line = "    1,234,567  42%   10.21MB/s    0:00:01 (xfr#3, to-chk=12/20)";
        assert_eq!(parse_progress(line), Some(42.0));
    }

    #[test]
    fn test_parse_decimal_percent() {
        assert_eq!(parse_progress("42.5%"), Some(42.5));
        assert_eq!(parse_progress("done 100.0%"), Some(100.0));
    }

    #[test]
    fn test_parse_progress_ignores_other_lines() {
        assert_eq!(parse_progress("sending incremental file list"), None);
        assert_eq!(parse_progress("%"), None);
        assert_eq!(parse_progress(""), None);
    }

    #[test]
    fn test_parse_progress_clamps() {
        assert_eq!(parse_progress("250%"), Some(100.0));
    }
}
