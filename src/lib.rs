//! # jobharness
//!
//! Test-mode harness for background job clients. It sits in front of a job
//! client's enqueue path and lets a test suite decide what enqueuing means:
//!
//! - **fake** (default): jobs are stored in an in-memory queue store where tests
//!   can inspect them, clear them, and drain them on demand
//! - **inline**: jobs run immediately, before the enqueue call returns
//! - **disabled**: jobs go to the real submission path
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use jobharness::{Client, Mode, Result, Testing, Worker, WorkerOpts};
//! use serde_json::{Value, json};
//!
//! #[derive(Default)]
//! struct InvoiceWorker {
//!     jid: String,
//! }
//!
//! #[async_trait]
//! impl Worker for InvoiceWorker {
//!     fn opts() -> WorkerOpts {
//!         WorkerOpts::new().queue("billing")
//!     }
//!
//!     fn set_jid(&mut self, jid: String) {
//!         self.jid = jid;
//!     }
//!
//!     async fn perform(&mut self, args: Vec<Value>) -> Result<()> {
//!         println!("invoicing {:?} as {}", args, self.jid);
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let testing = Testing::new();
//! let invoices = testing.register::<InvoiceWorker>();
//! let client = Client::new(testing.clone());
//!
//! // Fake mode: the job waits in memory.
//! client.perform_async::<InvoiceWorker>(vec![json!(42)]).await?;
//! assert_eq!(testing.queue("billing").len(), 1);
//! testing.perform_one(&invoices).await?;
//! assert!(testing.jobs(&invoices).is_empty());
//!
//! // Inline mode: the job runs before the call returns.
//! testing
//!     .with_mode_async(Mode::Inline, || async {
//!         client.perform_async::<InvoiceWorker>(vec![json!(43)]).await
//!     })
//!     .await?;
//! assert!(testing.queue("billing").is_empty());
//! assert!(testing.is_fake());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Job records
//!
//! A [`JobRecord`] is the string-keyed mapping a client submits: `class`,
//! `args`, `queue`, `jid`, `retry`, `created_at`, and optionally `at` and
//! `bid`. Records entering the fake queue or the inline pipeline are copied
//! through the JSON [`codec`], so tests always see plain JSON values.
//!
//! ### Draining
//!
//! [`Testing::drain`] executes a worker type's jobs until none are left,
//! including jobs enqueued by the jobs it runs. [`Testing::drain_all`] does
//! the same across every queue until the whole store is empty.
//! [`Testing::perform_one`] executes exactly one job, failing with
//! [`HarnessError::EmptyQueue`] when there is nothing to run.
//!
//! ### Middleware
//!
//! Jobs executed by the harness pass through the context's
//! [`MiddlewareChain`] of [`ServerMiddleware`], mirroring what a production
//! worker process would do around each job.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod middleware;
pub mod mode;
pub mod queue;
pub mod testing;
pub mod worker;

pub use client::{Client, Submitter};
pub use config::{HarnessConfig, LoggingConfig};
pub use error::HarnessError;
pub use job::{JobId, JobRecord, generate_jid};
pub use middleware::{MiddlewareChain, Next, ServerMiddleware};
pub use mode::{Mode, ModeController, ModeGuard};
pub use queue::{QueueGuard, QueueStore};
pub use testing::Testing;
pub use worker::{BatchAware, DEFAULT_QUEUE, Worker, WorkerOpts, WorkerRegistry, WorkerType};

/// Convenient type alias for Results with [`HarnessError`] as the error type.
pub type Result<T> = std::result::Result<T, HarnessError>;
