//! Worker types and the registry that resolves them by class name.
//!
//! A [`Worker`] is the business logic for one kind of job. The harness never
//! holds worker instances between jobs: every execution builds a fresh
//! instance from a [`WorkerType`], which bundles the class name, the worker
//! options and a factory.
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use jobharness::{Result, Worker, WorkerOpts, WorkerRegistry};
//! use serde_json::Value;
//!
//! #[derive(Default)]
//! struct ReportWorker {
//!     jid: String,
//! }
//!
//! #[async_trait]
//! impl Worker for ReportWorker {
//!     fn opts() -> WorkerOpts {
//!         WorkerOpts::new().queue("reports")
//!     }
//!
//!     fn set_jid(&mut self, jid: String) {
//!         self.jid = jid;
//!     }
//!
//!     async fn perform(&mut self, _args: Vec<Value>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let registry = WorkerRegistry::new();
//! let report = registry.register::<ReportWorker>();
//! assert_eq!(report.name(), "ReportWorker");
//! assert_eq!(report.queue(), "reports");
//! assert!(registry.resolve("ReportWorker").is_ok());
//! ```

use crate::{HarnessError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};
use tracing::debug;

pub const DEFAULT_QUEUE: &str = "default";

/// Per-worker-type configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOpts {
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<Value>,
}

impl Default for WorkerOpts {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            retry: None,
        }
    }
}

impl WorkerOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn retry(mut self, retry: impl Into<Value>) -> Self {
        self.retry = Some(retry.into());
        self
    }
}

/// Business logic for one kind of job.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Identifier stored in the `class` key of this worker's job records.
    fn class_name() -> String
    where
        Self: Sized,
    {
        short_type_name::<Self>()
    }

    fn opts() -> WorkerOpts
    where
        Self: Sized,
    {
        WorkerOpts::default()
    }

    /// Receives the job id of the record being executed.
    fn set_jid(&mut self, jid: String);

    /// Workers that track batch membership return themselves here.
    fn as_batch_aware(&mut self) -> Option<&mut dyn BatchAware> {
        None
    }

    /// Execute the job with the record's `args` as positional arguments.
    async fn perform(&mut self, args: Vec<Value>) -> Result<()>;
}

/// Capability for workers that belong to batches.
pub trait BatchAware {
    fn set_bid(&mut self, bid: Option<String>);
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

type WorkerFactory = Arc<dyn Fn() -> Box<dyn Worker> + Send + Sync>;

/// Descriptor that builds and configures instances of one worker.
#[derive(Clone)]
pub struct WorkerType {
    name: String,
    opts: WorkerOpts,
    factory: WorkerFactory,
}

impl WorkerType {
    pub fn new<F>(name: impl Into<String>, opts: WorkerOpts, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Worker> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            opts,
            factory: Arc::new(factory),
        }
    }

    /// Descriptor for a worker built with `Default`.
    pub fn of<W>() -> Self
    where
        W: Worker + Default + 'static,
    {
        Self::new(W::class_name(), W::opts(), || Box::new(W::default()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &str {
        &self.opts.queue
    }

    pub fn opts(&self) -> &WorkerOpts {
        &self.opts
    }

    pub fn build(&self) -> Box<dyn Worker> {
        (self.factory)()
    }
}

impl fmt::Debug for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerType")
            .field("name", &self.name)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

/// Maps class names to worker types.
#[derive(Clone, Debug, Default)]
pub struct WorkerRegistry {
    types: Arc<RwLock<HashMap<String, WorkerType>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `W` under its class name and return its descriptor.
    pub fn register<W>(&self) -> WorkerType
    where
        W: Worker + Default + 'static,
    {
        self.register_type(WorkerType::of::<W>())
    }

    /// Register a descriptor, replacing any previous one with the same name.
    pub fn register_type(&self, worker_type: WorkerType) -> WorkerType {
        debug!(
            "Registered worker {} on queue {}",
            worker_type.name(),
            worker_type.queue()
        );
        self.types
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(worker_type.name.clone(), worker_type.clone());
        worker_type
    }

    pub fn get(&self, class: &str) -> Option<WorkerType> {
        self.types
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(class)
            .cloned()
    }

    pub fn resolve(&self, class: &str) -> Result<WorkerType> {
        self.get(class).ok_or_else(|| HarnessError::Resolution {
            class: class.to_string(),
        })
    }

    pub fn contains(&self, class: &str) -> bool {
        self.get(class).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .types
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.types
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
