//! Concurrent job table.
//!
//! Readers (the receive hot path and the dump path) never block: they load
//! an immutable snapshot of the job list and walk it. Writers serialize on
//! a mutex, build the next list, and publish it atomically. A removed job
//! stays alive until the last snapshot or receive registration holding it
//! drops, so in-flight dispatches always complete against valid records.

use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;

use crate::device::CanDevice;
use crate::error::TableFull;
use crate::job::GatewayJob;

/// Default bound on concurrently installed jobs.
pub const DEFAULT_CAPACITY: usize = 256;

/// The set of published gateway jobs. Duplicates are legal; each entry
/// participates in dispatch independently.
pub struct JobTable {
    jobs: ArcSwap<Vec<Arc<GatewayJob>>>,
    write_lock: Mutex<()>,
    capacity: usize,
}

impl JobTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            capacity,
        }
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().expect("job table writer poisoned")
    }

    /// Append a job. Fails when the table is at capacity.
    pub fn insert(&self, job: Arc<GatewayJob>) -> Result<(), TableFull> {
        let _guard = self.write_guard();
        let current = self.jobs.load();
        if current.len() >= self.capacity {
            return Err(TableFull(self.capacity));
        }
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(job);
        self.jobs.store(Arc::new(next));
        Ok(())
    }

    /// Remove and return the first job the predicate accepts.
    pub fn remove_first_match<F>(&self, pred: F) -> Option<Arc<GatewayJob>>
    where
        F: Fn(&GatewayJob) -> bool,
    {
        let _guard = self.write_guard();
        let current = self.jobs.load();
        let pos = current.iter().position(|job| pred(job))?;
        let mut next = Vec::with_capacity(current.len() - 1);
        next.extend(current[..pos].iter().cloned());
        next.extend(current[pos + 1..].iter().cloned());
        let removed = current[pos].clone();
        self.jobs.store(Arc::new(next));
        Some(removed)
    }

    /// Empty the table, returning the removed jobs for teardown.
    pub fn remove_all(&self) -> Vec<Arc<GatewayJob>> {
        let _guard = self.write_guard();
        let old = self.jobs.swap(Arc::new(Vec::new()));
        old.iter().cloned().collect()
    }

    /// Remove every job with the device as either endpoint, returning the
    /// removed jobs for teardown.
    pub fn remove_by_device(&self, dev: &Arc<CanDevice>) -> Vec<Arc<GatewayJob>> {
        let _guard = self.write_guard();
        let current = self.jobs.load();
        let (removed, kept): (Vec<_>, Vec<_>) = current
            .iter()
            .cloned()
            .partition(|job| job.references_device(dev));
        if !removed.is_empty() {
            self.jobs.store(Arc::new(kept));
        }
        removed
    }

    /// A lock-free snapshot of the current job list.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<GatewayJob>>> {
        self.jobs.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.load().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}
