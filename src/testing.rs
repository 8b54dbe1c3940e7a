//! The testing context: mode, queues, worker registry and server middleware.
//!
//! [`Testing`] ties the pieces together and owns the execution side of the
//! harness: the worker pipeline ([`Testing::process_job`]) and the drain
//! engine ([`Testing::drain`], [`Testing::perform_one`],
//! [`Testing::drain_all`]). Every handle is cheap to clone and clones share
//! state, so a worker that enqueues follow-up jobs can hold a
//! [`Client`](crate::Client) built from the same context it is drained from.
//!
//! Most suites use the process-wide instance from [`Testing::global`] and
//! call [`Testing::reset`] between tests. Suites that run tests in parallel
//! can build an isolated context per test with [`Testing::new`].
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use jobharness::{Client, Result, Testing, Worker};
//! use serde_json::{Value, json};
//!
//! #[derive(Default)]
//! struct HardWorker;
//!
//! #[async_trait]
//! impl Worker for HardWorker {
//!     fn set_jid(&mut self, _jid: String) {}
//!
//!     async fn perform(&mut self, _args: Vec<Value>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let testing = Testing::new();
//! let hard = testing.register::<HardWorker>();
//! let client = Client::new(testing.clone());
//!
//! client.perform_async::<HardWorker>(vec![json!(1), json!(2)]).await?;
//! assert_eq!(testing.jobs(&hard).len(), 1);
//!
//! assert_eq!(testing.drain(&hard).await?, 1);
//! assert!(testing.jobs(&hard).is_empty());
//! # Ok(())
//! # }
//! ```

use crate::{
    HarnessError, Result,
    config::HarnessConfig,
    job::JobRecord,
    middleware::MiddlewareChain,
    mode::{Mode, ModeController, ModeGuard},
    queue::QueueStore,
    worker::{Worker, WorkerRegistry, WorkerType},
};
use serde_json::Value;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{debug, info};

#[derive(Clone, Debug, Default)]
pub struct Testing {
    config: HarnessConfig,
    modes: ModeController,
    queues: QueueStore,
    registry: WorkerRegistry,
    server_middleware: Arc<RwLock<MiddlewareChain>>,
}

static GLOBAL: OnceLock<Testing> = OnceLock::new();

impl Testing {
    /// An isolated context in fake mode.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            config: config.clone(),
            modes: ModeController::new(config.mode),
            ..Self::default()
        }
    }

    /// The process-wide context, created in fake mode on first use.
    pub fn global() -> &'static Testing {
        GLOBAL.get_or_init(Testing::new)
    }

    /// Empty every queue, forget registered workers and middleware and return
    /// to the configured initial mode.
    pub fn reset(&self) {
        self.queues.reset();
        self.registry.clear();
        self.server_middleware
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        self.modes.set_mode(self.config.mode);
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn modes(&self) -> &ModeController {
        &self.modes
    }

    pub fn queues(&self) -> &QueueStore {
        &self.queues
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    // Mode control

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn set_mode(&self, mode: Mode) -> Mode {
        self.modes.set_mode(mode)
    }

    pub fn fake(&self) {
        self.modes.fake();
    }

    pub fn inline(&self) {
        self.modes.inline();
    }

    pub fn disable(&self) {
        self.modes.disable();
    }

    #[must_use = "the previous mode is restored as soon as the guard is dropped"]
    pub fn override_mode(&self, mode: Mode) -> ModeGuard {
        self.modes.override_mode(mode)
    }

    pub fn with_mode<T>(&self, mode: Mode, body: impl FnOnce() -> T) -> T {
        self.modes.with_mode(mode, body)
    }

    pub async fn with_mode_async<F, Fut, T>(&self, mode: Mode, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        self.modes.with_mode_async(mode, body).await
    }

    pub fn is_enabled(&self) -> bool {
        self.modes.is_enabled()
    }

    pub fn is_disabled(&self) -> bool {
        self.modes.is_disabled()
    }

    pub fn is_fake(&self) -> bool {
        self.modes.is_fake()
    }

    pub fn is_inline(&self) -> bool {
        self.modes.is_inline()
    }

    // Workers and middleware

    pub fn register<W>(&self) -> WorkerType
    where
        W: Worker + Default + 'static,
    {
        self.registry.register::<W>()
    }

    pub fn register_type(&self, worker_type: WorkerType) -> WorkerType {
        self.registry.register_type(worker_type)
    }

    pub fn resolve(&self, class: &str) -> Result<WorkerType> {
        self.registry.resolve(class)
    }

    /// Edit the server middleware used by [`process_job`](Self::process_job).
    pub fn server_middleware<T>(&self, f: impl FnOnce(&mut MiddlewareChain) -> T) -> T {
        let mut chain = self
            .server_middleware
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut chain)
    }

    fn middleware_snapshot(&self) -> MiddlewareChain {
        self.server_middleware
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    // Queue views

    /// Snapshot of the named queue; unknown names yield an empty queue.
    /// Use [`QueueStore::get`] through [`queues`](Self::queues) to change it.
    pub fn queue(&self, queue_name: &str) -> Vec<JobRecord> {
        self.queues.snapshot(queue_name)
    }

    /// Jobs of this worker type waiting on its configured queue.
    pub fn jobs(&self, worker_type: &WorkerType) -> Vec<JobRecord> {
        self.queues.jobs_for(worker_type.queue(), worker_type.name())
    }

    /// Every job in every queue.
    pub fn all_jobs(&self) -> Vec<JobRecord> {
        self.queues.all()
    }

    /// Drop this worker type's jobs from its configured queue.
    pub fn clear(&self, worker_type: &WorkerType) -> usize {
        let cleared = self.queues.clear_for(worker_type.queue(), worker_type.name());
        debug!("Cleared {} jobs for {}", cleared, worker_type.name());
        cleared
    }

    pub fn clear_all(&self) {
        self.queues.clear_all();
    }

    // Execution

    /// Build a worker for `job` and run it through the server middleware.
    pub async fn process_job(&self, worker_type: &WorkerType, mut job: JobRecord) -> Result<()> {
        let mut worker = worker_type.build();
        let jid = job.ensure_jid().to_string();
        debug!("Processing {} job {}", worker_type.name(), jid);

        worker.set_jid(jid);
        if let Some(batch) = worker.as_batch_aware() {
            batch.set_bid(job.bid.clone());
        }

        let chain = self.middleware_snapshot();
        chain.invoke(&mut *worker, &job, &job.queue).await
    }

    /// Call the worker's entry point directly, without middleware.
    pub async fn execute_job(&self, worker: &mut dyn Worker, args: Vec<Value>) -> Result<()> {
        worker.perform(args).await
    }

    // Draining

    /// Execute this worker type's jobs until its queue holds none, including
    /// jobs enqueued while draining. Returns the number of jobs executed.
    pub async fn drain(&self, worker_type: &WorkerType) -> Result<usize> {
        let mut processed = 0;
        self.drain_queue(worker_type, worker_type.queue(), &mut processed)
            .await?;
        Ok(processed)
    }

    pub async fn drain_class(&self, class: &str) -> Result<usize> {
        let worker_type = self.resolve(class)?;
        self.drain(&worker_type).await
    }

    /// Remove and execute the earliest job for this worker type.
    pub async fn perform_one(&self, worker_type: &WorkerType) -> Result<()> {
        let job = self
            .queues
            .first_for(worker_type.queue(), worker_type.name())
            .ok_or_else(|| HarnessError::EmptyQueue {
                worker: worker_type.name().to_string(),
                queue: worker_type.queue().to_string(),
            })?;
        self.take_and_process(worker_type, worker_type.queue(), job)
            .await
    }

    pub async fn perform_one_class(&self, class: &str) -> Result<()> {
        let worker_type = self.resolve(class)?;
        self.perform_one(&worker_type).await
    }

    /// Drain every queue until the whole store is empty. Returns the number
    /// of jobs executed.
    ///
    /// `max_drain_iterations` bounds the whole call, not each queue.
    pub async fn drain_all(&self) -> Result<usize> {
        let mut processed = 0;
        loop {
            let pending = self.queues.classes();
            if pending.is_empty() {
                break;
            }
            for (class, queue_name) in pending {
                let worker_type = self.resolve(&class)?;
                self.drain_queue(&worker_type, &queue_name, &mut processed)
                    .await?;
            }
        }
        info!("Drained {} jobs from all queues", processed);
        Ok(processed)
    }

    // `processed` is the running total for the enclosing drain call and is
    // checked against `max_drain_iterations` before every job.
    async fn drain_queue(
        &self,
        worker_type: &WorkerType,
        queue_name: &str,
        processed: &mut usize,
    ) -> Result<()> {
        let start = *processed;
        while let Some(job) = self.queues.first_for(queue_name, worker_type.name()) {
            if let Some(limit) = self.config.max_drain_iterations {
                if *processed as u64 >= limit {
                    return Err(HarnessError::DrainLimitExceeded { limit });
                }
            }
            self.take_and_process(worker_type, queue_name, job).await?;
            *processed += 1;
        }
        if *processed > start {
            debug!(
                "Drained {} {} jobs from {}",
                *processed - start,
                worker_type.name(),
                queue_name
            );
        }
        Ok(())
    }

    // Falls back to the selected copy when the record is already gone.
    async fn take_and_process(
        &self,
        worker_type: &WorkerType,
        queue_name: &str,
        job: JobRecord,
    ) -> Result<()> {
        let job = self
            .queues
            .delete_for(job.jid(), queue_name, worker_type.name())
            .unwrap_or(job);
        self.process_job(worker_type, job).await
    }
}
