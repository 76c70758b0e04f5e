//! The worker pool: claim loops over queues with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use job_store::{FailOutcome, Job, JobStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::handlers::HandlerSet;

/// Pool shape and polling cadence.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Queues this pool drains.
    pub queues: Vec<String>,
    /// Concurrent claim loops per queue.
    pub workers_per_queue: usize,
    /// Sleep between claim attempts on an empty queue.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queues: vec![
                domain::jobs::QUEUE_PROVIDER.to_string(),
                domain::jobs::QUEUE_WEBHOOKS.to_string(),
                domain::jobs::QUEUE_INTERNAL.to_string(),
            ],
            workers_per_queue: 2,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Runs claim loops against the job store and dispatches claimed jobs to
/// registered handlers.
///
/// The store's exclusive claim is the only inter-worker coordination;
/// loops never talk to each other. A job whose kind has no handler is
/// unroutable and goes straight to the dead-letter set.
pub struct WorkerPool<J>
where
    J: JobStore + Clone + Send + Sync + 'static,
{
    job_store: J,
    handlers: Arc<HandlerSet>,
    config: PoolConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl<J> WorkerPool<J>
where
    J: JobStore + Clone + Send + Sync + 'static,
{
    pub fn new(job_store: J, handlers: HandlerSet, config: PoolConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            job_store,
            handlers: Arc::new(handlers),
            config,
            shutdown_tx,
        }
    }

    /// Spawns every claim loop and returns their handles.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for queue in &self.config.queues {
            for i in 0..self.config.workers_per_queue {
                let worker_id = format!("{queue}-{i}");
                let job_store = self.job_store.clone();
                let handlers = self.handlers.clone();
                let queue = queue.clone();
                let poll_interval = self.config.poll_interval;
                let shutdown_rx = self.shutdown_tx.subscribe();
                handles.push(tokio::spawn(async move {
                    claim_loop(job_store, handlers, queue, worker_id, poll_interval, shutdown_rx)
                        .await;
                }));
            }
        }
        info!(
            queues = self.config.queues.len(),
            workers_per_queue = self.config.workers_per_queue,
            "worker pool started"
        );
        handles
    }

    /// Signals every claim loop to stop after its current job.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn claim_loop<J>(
    job_store: J,
    handlers: Arc<HandlerSet>,
    queue: String,
    worker_id: String,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    J: JobStore,
{
    loop {
        if *shutdown_rx.borrow() {
            debug!(%worker_id, "worker stopping");
            break;
        }
        match job_store.claim(&queue, &worker_id).await {
            Ok(Some(job)) => dispatch(&job_store, &handlers, &worker_id, job).await,
            Ok(None) => {
                tokio::select! {
                    _ = shutdown_rx.changed() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                error!(%worker_id, error = %e, "claim failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

async fn dispatch<J>(job_store: &J, handlers: &HandlerSet, worker_id: &str, job: Job)
where
    J: JobStore,
{
    let Some(handler) = handlers.handler_for(&job.kind) else {
        warn!(%worker_id, job_id = %job.id, kind = %job.kind, "no handler for job kind");
        metrics::counter!("jobs_unroutable_total").increment(1);
        if let Err(e) = job_store
            .discard(job.id, "no handler registered for kind")
            .await
        {
            error!(job_id = %job.id, error = %e, "discard failed");
        }
        return;
    };

    let started = std::time::Instant::now();
    let result = handler.run(&job).await;
    metrics::histogram!("job_duration_seconds", "kind" => job.kind.clone())
        .record(started.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            metrics::counter!("jobs_executed_total", "kind" => job.kind.clone(), "outcome" => "ok")
                .increment(1);
            if let Err(e) = job_store.complete(job.id).await {
                error!(job_id = %job.id, error = %e, "complete failed");
            }
        }
        Err(e) => {
            metrics::counter!("jobs_executed_total", "kind" => job.kind.clone(), "outcome" => "err")
                .increment(1);
            match job_store.fail(job.id, &e.to_string()).await {
                Ok(FailOutcome::Rescheduled(at)) => {
                    warn!(job_id = %job.id, kind = %job.kind, error = %e, retry_at = %at, "job failed, rescheduled");
                }
                Ok(FailOutcome::Discarded) => {
                    error!(job_id = %job.id, kind = %job.kind, error = %e, "job dead-lettered");
                }
                Err(store_err) => {
                    error!(job_id = %job.id, error = %store_err, "fail reporting failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use job_store::{InMemoryJobStore, JobState, NewJob};
    use serde_json::json;

    use super::*;
    use crate::error::{Result, WorkerError};
    use crate::handlers::JobHandler;

    struct CountingHandler {
        calls: Arc<AtomicU32>,
        fail_first: u32,
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _job: &Job) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(WorkerError::Handler("induced".to_string()));
            }
            Ok(())
        }
    }

    fn pool_config(queue: &str) -> PoolConfig {
        PoolConfig {
            queues: vec![queue.to_string()],
            workers_per_queue: 2,
            poll_interval: Duration::from_millis(10),
        }
    }

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..300 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met within 3s");
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_completes_jobs() {
        let store = InMemoryJobStore::new();
        let calls = Arc::new(AtomicU32::new(0));
        let handlers = HandlerSet::new().register(
            "noop",
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail_first: 0,
            }),
        );

        for _ in 0..5 {
            store
                .enqueue(NewJob::new("noop", json!({})).on_queue("q"))
                .await
                .unwrap();
        }

        let pool = WorkerPool::new(store.clone(), handlers, pool_config("q"));
        let handles = pool.start();

        wait_until(|| {
            let store = store.clone();
            async move { store.count_in_state(JobState::Completed).await.unwrap() == 5 }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        pool.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unknown_kind_is_dead_lettered_immediately() {
        let store = InMemoryJobStore::new();
        let handlers = HandlerSet::new();
        store
            .enqueue(NewJob::new("mystery", json!({})).on_queue("q"))
            .await
            .unwrap();

        let pool = WorkerPool::new(store.clone(), handlers, pool_config("q"));
        let handles = pool.start();

        wait_until(|| {
            let store = store.clone();
            async move { store.count_in_state(JobState::Discarded).await.unwrap() == 1 }
        })
        .await;

        let discarded = store.list_discarded(10).await.unwrap();
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].kind, "mystery");
        // Unroutable jobs skip the retry budget entirely.
        assert_eq!(discarded[0].attempt, 1);

        pool.shutdown();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers_promptly() {
        let store = InMemoryJobStore::new();
        let pool = WorkerPool::new(store, HandlerSet::new(), pool_config("q"));
        let handles = pool.start();

        pool.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("worker did not stop")
                .unwrap();
        }
    }
}
