//! In-memory queue store backing fake mode.
//!
//! The store maps queue names to append-only sequences of [`JobRecord`]s.
//! Looking up a queue that has never been seen creates it empty, and clearing
//! empties sequences without forgetting their names. Selection always returns
//! the earliest matching record, and removal always goes through the record's
//! job id, so jobs appended while a drain is running never shift what gets
//! removed.

use crate::job::JobRecord;
use std::{
    collections::BTreeMap,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct QueueStore {
    queues: Arc<Mutex<BTreeMap<String, Vec<JobRecord>>>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking job must not poison the store for the rest of the suite.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<JobRecord>>> {
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Live, mutable access to the named queue, creating it if it does not
    /// exist yet.
    ///
    /// The store stays locked until the guard is dropped, so do not call other
    /// store methods while holding it.
    pub fn get(&self, queue_name: &str) -> QueueGuard<'_> {
        let mut queues = self.lock();
        let jobs = std::mem::take(queues.entry(queue_name.to_string()).or_default());
        QueueGuard {
            queues,
            name: queue_name.to_string(),
            jobs,
        }
    }

    /// Copy of the named queue, creating it if it does not exist yet.
    pub fn snapshot(&self, queue_name: &str) -> Vec<JobRecord> {
        self.lock()
            .entry(queue_name.to_string())
            .or_default()
            .clone()
    }

    /// Run `f` against the live sequence for `queue_name`.
    pub fn with_queue<T>(&self, queue_name: &str, f: impl FnOnce(&mut Vec<JobRecord>) -> T) -> T {
        let mut queues = self.lock();
        f(queues.entry(queue_name.to_string()).or_default())
    }

    /// Append a record to the queue named by its `queue` field.
    pub fn push(&self, job: JobRecord) {
        debug!(
            "Queued {} job {} on {}",
            job.class,
            job.jid().unwrap_or("-"),
            job.queue
        );
        self.lock().entry(job.queue.clone()).or_default().push(job);
    }

    pub fn size(&self, queue_name: &str) -> usize {
        self.lock().get(queue_name).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().values().all(Vec::is_empty)
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Every queue with its records, including queues that are currently empty.
    pub fn jobs_by_queue(&self) -> BTreeMap<String, Vec<JobRecord>> {
        self.lock().clone()
    }

    /// All records of `class`, in queue-name order then insertion order.
    pub fn jobs_by_class(&self, class: &str) -> Vec<JobRecord> {
        self.lock()
            .values()
            .flatten()
            .filter(|job| job.is_class(class))
            .cloned()
            .collect()
    }

    pub fn jobs_for(&self, queue_name: &str, class: &str) -> Vec<JobRecord> {
        self.lock()
            .get(queue_name)
            .map(|jobs| {
                jobs.iter()
                    .filter(|job| job.is_class(class))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<JobRecord> {
        self.lock().values().flatten().cloned().collect()
    }

    /// Earliest record of `class` on `queue_name`.
    pub fn first_for(&self, queue_name: &str, class: &str) -> Option<JobRecord> {
        self.lock()
            .get(queue_name)?
            .iter()
            .find(|job| job.is_class(class))
            .cloned()
    }

    /// Remove the record with this job id from `queue_name`.
    pub fn delete_for(&self, jid: Option<&str>, queue_name: &str, class: &str) -> Option<JobRecord> {
        let mut queues = self.lock();
        let jobs = queues.get_mut(queue_name)?;
        let position = jobs
            .iter()
            .position(|job| job.jid() == jid && job.is_class(class))?;
        Some(jobs.remove(position))
    }

    /// Distinct `(class, queue)` pairs currently holding jobs, in first-seen order.
    pub fn classes(&self) -> Vec<(String, String)> {
        let queues = self.lock();
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (queue_name, jobs) in queues.iter() {
            for job in jobs {
                if !pairs
                    .iter()
                    .any(|(class, queue)| *class == job.class && queue == queue_name)
                {
                    pairs.push((job.class.clone(), queue_name.clone()));
                }
            }
        }
        pairs
    }

    /// Remove every record of `class` from `queue_name`, returning how many went.
    pub fn clear_for(&self, queue_name: &str, class: &str) -> usize {
        let mut queues = self.lock();
        let Some(jobs) = queues.get_mut(queue_name) else {
            return 0;
        };
        let before = jobs.len();
        jobs.retain(|job| !job.is_class(class));
        before - jobs.len()
    }

    /// Empty every queue. Queue names stay known.
    pub fn clear_all(&self) {
        let mut queues = self.lock();
        for jobs in queues.values_mut() {
            jobs.clear();
        }
        debug!("Cleared {} queues", queues.len());
    }

    /// Forget every queue, names included.
    pub fn reset(&self) {
        self.lock().clear();
    }
}

/// A queue checked out of the store by [`QueueStore::get`]. Changes are
/// written back when the guard is dropped.
pub struct QueueGuard<'a> {
    queues: MutexGuard<'a, BTreeMap<String, Vec<JobRecord>>>,
    name: String,
    jobs: Vec<JobRecord>,
}

impl Deref for QueueGuard<'_> {
    type Target = Vec<JobRecord>;

    fn deref(&self) -> &Self::Target {
        &self.jobs
    }
}

impl DerefMut for QueueGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.jobs
    }
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.queues
            .insert(std::mem::take(&mut self.name), std::mem::take(&mut self.jobs));
    }
}
