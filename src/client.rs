//! Job submission with the testing mode in front of the real transport.
//!
//! [`Client`] prepares records the way a production client does (job id,
//! creation time, retry policy) and then hands them to [`Client::raw_push`],
//! which decides what happens based on the current [`Mode`]:
//!
//! - `fake` stores a normalized copy in the [`QueueStore`](crate::QueueStore)
//! - `inline` resolves the worker and executes each job before returning
//! - `disabled` forwards the batch to the configured [`Submitter`]

use crate::{
    HarnessError, Result, codec,
    job::{JobId, JobRecord, epoch_seconds},
    mode::Mode,
    testing::Testing,
    worker::{Worker, WorkerType},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// The real submission path used while testing is disabled.
#[async_trait]
pub trait Submitter: Send + Sync {
    /// Submit a batch of records. Returns whether the batch was accepted.
    async fn raw_push(&self, payloads: &[JobRecord]) -> Result<bool>;
}

#[derive(Clone)]
pub struct Client {
    testing: Testing,
    submitter: Option<Arc<dyn Submitter>>,
}

impl Client {
    pub fn new(testing: Testing) -> Self {
        Self {
            testing,
            submitter: None,
        }
    }

    /// A client bound to [`Testing::global`].
    pub fn global() -> Self {
        Self::new(Testing::global().clone())
    }

    pub fn with_submitter<S: Submitter + 'static>(mut self, submitter: S) -> Self {
        self.submitter = Some(Arc::new(submitter));
        self
    }

    pub fn testing(&self) -> &Testing {
        &self.testing
    }

    /// Enqueue `W` on its configured queue.
    pub async fn perform_async<W: Worker>(&self, args: Vec<Value>) -> Result<JobId> {
        self.push(Self::record_for(W::class_name(), W::opts().queue, W::opts().retry, args))
            .await
    }

    /// Enqueue `W` to run after `delay`.
    pub async fn perform_in<W: Worker>(&self, delay: Duration, args: Vec<Value>) -> Result<JobId> {
        let mut job = Self::record_for(W::class_name(), W::opts().queue, W::opts().retry, args);
        if delay > Duration::zero() {
            job = job.scheduled_at(Utc::now() + delay);
        }
        self.push(job).await
    }

    /// Enqueue a job for a worker type known only at runtime.
    pub async fn perform_async_to(
        &self,
        worker_type: &WorkerType,
        args: Vec<Value>,
    ) -> Result<JobId> {
        let opts = worker_type.opts();
        self.push(Self::record_for(
            worker_type.name().to_string(),
            opts.queue.clone(),
            opts.retry.clone(),
            args,
        ))
        .await
    }

    fn record_for(class: String, queue: String, retry: Option<Value>, args: Vec<Value>) -> JobRecord {
        let mut job = JobRecord::new(class, queue, args);
        job.retry = retry;
        job
    }

    /// Submit one record and return its job id.
    pub async fn push(&self, job: JobRecord) -> Result<JobId> {
        let job = self.normalize_item(job);
        let jid = job.jid().unwrap_or_default().to_string();
        self.submit(vec![job]).await?;
        Ok(jid)
    }

    /// Submit several records as one batch and return their job ids in order.
    pub async fn push_bulk(&self, jobs: Vec<JobRecord>) -> Result<Vec<JobId>> {
        let jobs: Vec<JobRecord> = jobs.into_iter().map(|job| self.normalize_item(job)).collect();
        let jids = jobs
            .iter()
            .map(|job| job.jid().unwrap_or_default().to_string())
            .collect();
        self.submit(jobs).await?;
        Ok(jids)
    }

    async fn submit(&self, jobs: Vec<JobRecord>) -> Result<()> {
        let count = jobs.len();
        if self.raw_push(jobs).await? {
            Ok(())
        } else {
            Err(HarnessError::Submit {
                message: format!("submitter rejected a batch of {} jobs", count),
            })
        }
    }

    fn normalize_item(&self, mut job: JobRecord) -> JobRecord {
        job.ensure_jid();
        if job.created_at.is_none() {
            job.created_at = Some(epoch_seconds(Utc::now()));
        }
        if job.retry.is_none() {
            job.retry = Some(Value::Bool(self.testing.config().default_retry));
        }
        job
    }

    /// Route a batch according to the current testing mode.
    pub async fn raw_push(&self, payloads: Vec<JobRecord>) -> Result<bool> {
        match self.testing.mode() {
            Mode::Fake => {
                for job in &payloads {
                    self.testing.queues().push(codec::normalize(job)?);
                }
                Ok(true)
            }
            Mode::Inline => {
                for mut job in payloads {
                    let worker_type = self.testing.resolve(&job.class)?;
                    job.ensure_jid();
                    let job = codec::normalize(&job)?;
                    debug!("Running {} job {} inline", job.class, job.jid().unwrap_or("-"));
                    self.testing.process_job(&worker_type, job).await?;
                }
                Ok(true)
            }
            Mode::Disabled => match &self.submitter {
                Some(submitter) => submitter.raw_push(&payloads).await,
                None => {
                    warn!("Dropping {} jobs: testing is disabled and no submitter is set", payloads.len());
                    Err(HarnessError::SubmitterUnavailable)
                }
            },
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("mode", &self.testing.mode())
            .field("submitter", &self.submitter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::WorkerOpts;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MailerWorker;

    #[async_trait]
    impl Worker for MailerWorker {
        fn opts() -> WorkerOpts {
            WorkerOpts::new().queue("mailers").retry(false)
        }

        fn set_jid(&mut self, _jid: String) {}

        async fn perform(&mut self, _args: Vec<Value>) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CapturingSubmitter {
        batches: Arc<Mutex<Vec<Vec<JobRecord>>>>,
    }

    #[async_trait]
    impl Submitter for CapturingSubmitter {
        async fn raw_push(&self, payloads: &[JobRecord]) -> Result<bool> {
            self.batches.lock().unwrap().push(payloads.to_vec());
            Ok(true)
        }
    }

    struct RejectingSubmitter;

    #[async_trait]
    impl Submitter for RejectingSubmitter {
        async fn raw_push(&self, _payloads: &[JobRecord]) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_push_fills_in_defaults() {
        let testing = Testing::new();
        let client = Client::new(testing.clone());

        let jid = client
            .push(JobRecord::new("MailerWorker", "mailers", vec![json!("hi")]))
            .await
            .unwrap();

        let stored = testing.queue("mailers").remove(0);
        assert_eq!(stored.jid(), Some(jid.as_str()));
        assert_eq!(stored.retry, Some(json!(true)));
        assert!(stored.created_at.is_some());
    }

    #[tokio::test]
    async fn test_perform_async_uses_worker_opts() {
        let testing = Testing::new();
        let client = Client::new(testing.clone());

        client.perform_async::<MailerWorker>(vec![json!(1)]).await.unwrap();

        let stored = testing.queue("mailers").remove(0);
        assert_eq!(stored.class, "MailerWorker");
        assert_eq!(stored.retry, Some(json!(false)));
        assert!(!stored.is_scheduled());
    }

    #[tokio::test]
    async fn test_perform_in_sets_at() {
        let testing = Testing::new();
        let client = Client::new(testing.clone());

        client
            .perform_in::<MailerWorker>(Duration::minutes(5), vec![])
            .await
            .unwrap();
        client
            .perform_in::<MailerWorker>(Duration::zero(), vec![])
            .await
            .unwrap();

        let stored = testing.queue("mailers");
        let at = stored[0].at.unwrap();
        assert!(at > stored[0].created_at.unwrap());
        assert!(!stored[1].is_scheduled());
    }

    #[tokio::test]
    async fn test_disabled_forwards_to_submitter() {
        let testing = Testing::new();
        let submitter = CapturingSubmitter::default();
        let client = Client::new(testing.clone()).with_submitter(submitter.clone());
        testing.disable();

        let jids = client
            .push_bulk(vec![
                JobRecord::new("MailerWorker", "mailers", vec![json!(1)]),
                JobRecord::new("MailerWorker", "mailers", vec![json!(2)]),
            ])
            .await
            .unwrap();

        let batches = submitter.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][1].jid(), Some(jids[1].as_str()));
        assert!(testing.queues().queue_names().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_without_submitter() {
        let testing = Testing::new();
        testing.disable();
        let client = Client::new(testing);

        let result = client
            .push(JobRecord::new("MailerWorker", "mailers", vec![]))
            .await;

        assert!(matches!(result, Err(HarnessError::SubmitterUnavailable)));
    }

    #[tokio::test]
    async fn test_rejected_batch_is_an_error() {
        let testing = Testing::new();
        testing.disable();
        let client = Client::new(testing).with_submitter(RejectingSubmitter);

        let result = client
            .push(JobRecord::new("MailerWorker", "mailers", vec![]))
            .await;

        assert!(matches!(result, Err(HarnessError::Submit { .. })));
    }

    #[tokio::test]
    async fn test_inline_requires_registered_worker() {
        let testing = Testing::new();
        testing.inline();
        let client = Client::new(testing.clone());

        let result = client.perform_async::<MailerWorker>(vec![]).await;
        assert!(matches!(
            result,
            Err(HarnessError::Resolution { ref class }) if class == "MailerWorker"
        ));

        testing.register::<MailerWorker>();
        client.perform_async::<MailerWorker>(vec![]).await.unwrap();
        assert!(testing.queue("mailers").is_empty());
    }

    #[tokio::test]
    async fn test_fake_push_breaks_aliasing() {
        let testing = Testing::new();
        let client = Client::new(testing.clone());
        let mut job = JobRecord::new("MailerWorker", "mailers", vec![json!({"to": "a@b.c"})])
            .with_jid("abc123");

        client.raw_push(vec![job.clone()]).await.unwrap();
        job.args[0] = json!("mutated");

        assert_eq!(testing.queue("mailers")[0].args, vec![json!({"to": "a@b.c"})]);
    }
}
