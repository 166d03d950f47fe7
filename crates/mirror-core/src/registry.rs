//! Registry of running jobs.
//!
//! Maps each `JobKey` to the `SignalSlot` its watcher and worker share. The
//! registry is how duplicate job definitions are caught: registering a key
//! that is already present is an error, never a silent overwrite.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::{JobError, Result};
use crate::job::JobKey;
use crate::slot::SignalSlot;

/// Thread-safe `JobKey` → `SignalSlot` map.
///
/// Wrap in `Arc` for shared ownership. Only touched when jobs are added or
/// removed, never on the steady-state signal path.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobKey, Arc<SignalSlot>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job's slot.
    ///
    /// Check and insert happen under one write lock, so of two concurrent
    /// registrations of the same key exactly one succeeds.
    pub fn register(&self, key: JobKey, slot: Arc<SignalSlot>) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&key) {
            return Err(JobError::DuplicateJob(key));
        }
        debug!("Registered job {}", key);
        jobs.insert(key, slot);
        Ok(())
    }

    /// Find the slot for a registered job.
    pub fn lookup(&self, key: &JobKey) -> Result<Arc<SignalSlot>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| JobError::UnknownJob(key.clone()))
    }

    /// Remove a job, returning its slot if it was registered.
    pub fn deregister(&self, key: &JobKey) -> Option<Arc<SignalSlot>> {
        let removed = self
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        if removed.is_some() {
            debug!("Deregistered job {}", key);
        }
        removed
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered jobs, sorted.
    pub fn keys(&self) -> Vec<JobKey> {
        let mut keys: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_register_and_lookup_share_slot() {
        let registry = JobRegistry::new();
        let key = JobKey::new("/src", "/dst");
        let slot = Arc::new(SignalSlot::new(false));

        registry.register(key.clone(), Arc::clone(&slot)).unwrap();

        let found = registry.lookup(&key).unwrap();
        assert!(Arc::ptr_eq(&slot, &found));
        assert!(found.try_send());
        assert!(slot.is_pending());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = JobRegistry::new();
        let first = Arc::new(SignalSlot::new(false));

        registry
            .register(JobKey::new("/src", "/dst"), Arc::clone(&first))
            .unwrap();

        let result =
            registry.register(JobKey::new("/src", "/dst"), Arc::new(SignalSlot::new(false)));
        assert!(matches!(result, Err(JobError::DuplicateJob(_))));

        // Original entry is untouched
        let found = registry.lookup(&JobKey::new("/src", "/dst")).unwrap();
        assert!(Arc::ptr_eq(&first, &found));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_jobs_differing_in_one_option_are_distinct() {
        let registry = JobRegistry::new();
        let live = JobKey::new("/src", "/dst");
        let polled = JobKey::new("/src", "/dst").with_nolisten(true);

        registry.register(live, Arc::new(SignalSlot::new(false))).unwrap();
        registry.register(polled, Arc::new(SignalSlot::new(false))).unwrap();

        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_unknown_job() {
        let registry = JobRegistry::new();
        let result = registry.lookup(&JobKey::new("/src", "/dst"));
        assert!(matches!(result, Err(JobError::UnknownJob(_))));
    }

    #[test]
    fn test_deregister() {
        let registry = JobRegistry::new();
        let key = JobKey::new("/src", "/dst");

        registry.register(key.clone(), Arc::new(SignalSlot::new(false))).unwrap();
        assert!(registry.contains(&key));

        assert!(registry.deregister(&key).is_some());
        assert!(registry.deregister(&key).is_none());
        assert!(registry.is_empty());

        // Key can be registered again once removed
        registry.register(key, Arc::new(SignalSlot::new(false))).unwrap();
    }

    #[test]
    fn test_keys_are_sorted() {
        let registry = JobRegistry::new();
        registry
            .register(JobKey::new("/b", "/dst"), Arc::new(SignalSlot::new(false)))
            .unwrap();
        registry
            .register(JobKey::new("/a", "/dst"), Arc::new(SignalSlot::new(false)))
            .unwrap();

        let keys = registry.keys();
        assert_eq!(keys[0].source(), std::path::Path::new("/a"));
        assert_eq!(keys[1].source(), std::path::Path::new("/b"));
    }

    #[test]
    fn test_concurrent_registration_has_one_winner() {
        let registry = Arc::new(JobRegistry::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry
                        .register(JobKey::new("/src", "/dst"), Arc::new(SignalSlot::new(false)))
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
