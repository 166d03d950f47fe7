//! Per-job lifecycle.

/// Lifecycle of a job: `Created → Running → ShuttingDown → Stopped`.
///
/// Ordered so that later states compare greater; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobState {
    /// Watcher and worker built, tasks not yet spawned
    Created,
    /// Watcher and worker tasks live
    Running,
    /// Cancellation requested, waiting for tasks to exit
    ShuttingDown,
    /// Both tasks exited and the job is deregistered
    Stopped,
}

impl JobState {
    /// Move to `next` if it is a forward transition.
    ///
    /// Returns whether the state changed.
    pub fn advance(&mut self, next: JobState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn is_running(self) -> bool {
        self == JobState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut state = JobState::Created;
        assert!(state.advance(JobState::Running));
        assert!(state.is_running());
        assert!(state.advance(JobState::ShuttingDown));
        assert!(state.advance(JobState::Stopped));
        assert_eq!(state, JobState::Stopped);
    }

    #[test]
    fn test_backward_transitions_are_ignored() {
        let mut state = JobState::ShuttingDown;
        assert!(!state.advance(JobState::Running));
        assert!(!state.advance(JobState::ShuttingDown));
        assert_eq!(state, JobState::ShuttingDown);
    }

    #[test]
    fn test_skipping_ahead_is_allowed() {
        // A job that fails before spawning goes straight to Stopped
        let mut state = JobState::Created;
        assert!(state.advance(JobState::Stopped));
        assert!(!state.is_running());
    }
}
