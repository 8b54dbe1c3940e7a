//! Server middleware wrapped around job execution.
//!
//! The chain is an ordered list of [`ServerMiddleware`]. Each entry receives
//! the worker instance, the job record, the queue name and a [`Next`] handle;
//! calling [`Next::run`] hands control to the following entry and, after the
//! last one, to the worker's `perform`. An entry that returns without calling
//! `next` stops the job from running. Errors are never caught here.

use crate::{Result, job::JobRecord, worker::Worker};
use async_trait::async_trait;
use std::{any::Any, fmt, sync::Arc};

#[async_trait]
pub trait ServerMiddleware: Any + Send + Sync {
    async fn call(
        &self,
        worker: &mut dyn Worker,
        job: &JobRecord,
        queue: &str,
        next: Next<'_>,
    ) -> Result<()>;
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    remaining: &'a [Arc<dyn ServerMiddleware>],
}

impl<'a> Next<'a> {
    pub async fn run(self, worker: &mut dyn Worker, job: &JobRecord, queue: &str) -> Result<()> {
        match self.remaining.split_first() {
            Some((middleware, rest)) => {
                middleware
                    .call(worker, job, queue, Next { remaining: rest })
                    .await
            }
            None => worker.perform(job.args.clone()).await,
        }
    }
}

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    entries: Vec<Arc<dyn ServerMiddleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the end of the chain.
    pub fn add<M: ServerMiddleware>(&mut self, middleware: M) -> &mut Self {
        self.entries.push(Arc::new(middleware));
        self
    }

    /// Insert at the front of the chain.
    pub fn prepend<M: ServerMiddleware>(&mut self, middleware: M) -> &mut Self {
        self.entries.insert(0, Arc::new(middleware));
        self
    }

    pub fn exists<M: ServerMiddleware>(&self) -> bool {
        self.entries.iter().any(|entry| is_type::<M>(entry))
    }

    /// Drop every entry of type `M`.
    pub fn remove<M: ServerMiddleware>(&mut self) -> &mut Self {
        self.entries.retain(|entry| !is_type::<M>(entry));
        self
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `job` through every entry and finally through `worker.perform`.
    pub async fn invoke(&self, worker: &mut dyn Worker, job: &JobRecord, queue: &str) -> Result<()> {
        Next {
            remaining: &self.entries,
        }
        .run(worker, job, queue)
        .await
    }
}

fn is_type<M: ServerMiddleware>(entry: &Arc<dyn ServerMiddleware>) -> bool {
    let entry: &dyn ServerMiddleware = &**entry;
    let entry: &dyn Any = entry;
    entry.is::<M>()
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HarnessError;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWorker {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Worker for RecordingWorker {
        fn set_jid(&mut self, _jid: String) {}

        async fn perform(&mut self, args: Vec<Value>) -> Result<()> {
            self.log.lock().unwrap().push(format!("perform {:?}", args));
            Ok(())
        }
    }

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ServerMiddleware for Tag {
        async fn call(
            &self,
            worker: &mut dyn Worker,
            job: &JobRecord,
            queue: &str,
            next: Next<'_>,
        ) -> Result<()> {
            self.log.lock().unwrap().push(format!("{} before {}", self.name, queue));
            next.run(worker, job, queue).await?;
            self.log.lock().unwrap().push(format!("{} after", self.name));
            Ok(())
        }
    }

    struct Halt;

    #[async_trait]
    impl ServerMiddleware for Halt {
        async fn call(
            &self,
            _worker: &mut dyn Worker,
            _job: &JobRecord,
            _queue: &str,
            _next: Next<'_>,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl ServerMiddleware for Fail {
        async fn call(
            &self,
            _worker: &mut dyn Worker,
            _job: &JobRecord,
            _queue: &str,
            _next: Next<'_>,
        ) -> Result<()> {
            Err(HarnessError::Middleware {
                message: "rejected".to_string(),
            })
        }
    }

    fn job() -> JobRecord {
        JobRecord::new("RecordingWorker", "default", vec![json!(1), json!(2)])
    }

    #[tokio::test]
    async fn test_empty_chain_calls_perform() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut worker = RecordingWorker { log: log.clone() };

        MiddlewareChain::new()
            .invoke(&mut worker, &job(), "default")
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["perform [Number(1), Number(2)]"]);
    }

    #[tokio::test]
    async fn test_chain_wraps_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.add(Tag {
            name: "outer",
            log: log.clone(),
        });
        chain.add(Tag {
            name: "inner",
            log: log.clone(),
        });
        chain.prepend(Tag {
            name: "first",
            log: log.clone(),
        });

        let mut worker = RecordingWorker { log: log.clone() };
        chain.invoke(&mut worker, &job(), "critical").await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first before critical",
                "outer before critical",
                "inner before critical",
                "perform [Number(1), Number(2)]",
                "inner after",
                "outer after",
                "first after",
            ]
        );
    }

    #[tokio::test]
    async fn test_middleware_can_halt_or_fail() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut worker = RecordingWorker { log: log.clone() };

        let mut chain = MiddlewareChain::new();
        chain.add(Halt);
        chain.invoke(&mut worker, &job(), "default").await.unwrap();
        assert!(log.lock().unwrap().is_empty());

        chain.clear();
        chain.add(Fail);
        let result = chain.invoke(&mut worker, &job(), "default").await;
        assert!(matches!(result, Err(HarnessError::Middleware { .. })));
    }

    #[test]
    fn test_exists_and_remove() {
        let mut chain = MiddlewareChain::new();
        chain.add(Halt).add(Fail).add(Halt);

        assert_eq!(chain.len(), 3);
        assert!(chain.exists::<Halt>());

        chain.remove::<Halt>();
        assert_eq!(chain.len(), 1);
        assert!(!chain.exists::<Halt>());
        assert!(chain.exists::<Fail>());
    }
}
