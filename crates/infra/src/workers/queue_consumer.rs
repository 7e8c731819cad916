use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use mediaconv_core::TraceContext;

use crate::queue::{Delivery, JobQueue};
use crate::runner::JobRunner;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// A delivery already being processed is finished first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            error!(error = %e, "queue consumer task panicked");
        }
    }
}

/// Queue consumer loop.
///
/// - Receives one delivery at a time and runs the job it names
/// - Ack on success
/// - Retryable failures are nacked (redelivery, then dead-letter)
/// - Non-retryable failures and undecodable messages are dead-lettered at once
#[derive(Debug)]
pub struct QueueConsumer;

impl QueueConsumer {
    /// Spawn the consumer on the current tokio runtime.
    ///
    /// `poll_interval` bounds how long one receive waits, and therefore how
    /// quickly shutdown is observed while idle.
    pub fn spawn<Q, R>(
        name: &'static str,
        queue: Q,
        runner: R,
        poll_interval: Duration,
    ) -> WorkerHandle
    where
        Q: JobQueue + 'static,
        R: JobRunner + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(consumer_loop(name, queue, runner, poll_interval, shutdown_rx));

        WorkerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

async fn consumer_loop<Q, R>(
    name: &'static str,
    queue: Q,
    runner: R,
    poll_interval: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    Q: JobQueue,
    R: JobRunner,
{
    info!(worker = name, "queue consumer started");

    loop {
        let received = tokio::select! {
            _ = &mut shutdown_rx => break,
            received = queue.receive(poll_interval) => received,
        };

        match received {
            Ok(Some(delivery)) => handle_delivery(name, &queue, &runner, delivery).await,
            Ok(None) => continue,
            Err(e) => {
                warn!(worker = name, error = %e, "queue receive failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    info!(worker = name, "queue consumer stopped");
}

async fn handle_delivery<Q, R>(name: &'static str, queue: &Q, runner: &R, delivery: Delivery)
where
    Q: JobQueue,
    R: JobRunner,
{
    let message = match delivery.decode() {
        Ok(message) => message,
        Err(e) => {
            warn!(worker = name, delivery_id = %delivery.id, error = %e, "undecodable message");
            settle(queue.dead_letter(&delivery, &e.to_string()).await, "dead_letter");
            return;
        }
    };

    let ctx = TraceContext::new(message.trace_id);
    let span = info_span!(
        "process_image_job",
        worker = name,
        trace_id = %ctx.trace_id(),
        job_id = %message.job_id,
        delivery_count = delivery.delivery_count,
    );

    async {
        match runner.run(message.job_id).await {
            Ok(()) => {
                debug!("job run succeeded");
                settle(queue.ack(&delivery).await, "ack");
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "job run failed; requeueing");
                settle(queue.nack(&delivery, &e.to_string()).await, "nack");
            }
            Err(e) => {
                error!(error = %e, kind = e.kind(), "job run failed permanently");
                settle(queue.dead_letter(&delivery, &e.to_string()).await, "dead_letter");
            }
        }
    }
    .instrument(span)
    .await
}

fn settle(result: Result<(), crate::queue::QueueError>, operation: &'static str) {
    if let Err(e) = result {
        error!(operation, error = %e, "queue settlement failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::orchestrator::JobOrchestrator;
    use crate::pipeline::ImageProcessingPipeline;
    use crate::queue::{InMemoryJobQueue, QueueMessage};
    use crate::runner::ProcessImageJobRunner;
    use crate::scheduler::ProcessImageJobScheduler;
    use crate::store::{InMemoryImageStore, InMemoryJobStore};
    use mediaconv_ai::{
        AnalysisRequest, AnalyzerError, CannedImageAnalyzer, ImageAnalysis, ImageAnalyzer,
    };
    use mediaconv_core::JobId;
    use mediaconv_images::ProcessImageInput;
    use mediaconv_jobs::JobStatus;

    const POLL: Duration = Duration::from_millis(10);

    #[derive(Debug)]
    struct DownAnalyzer;

    #[async_trait::async_trait]
    impl ImageAnalyzer for DownAnalyzer {
        async fn analyse(
            &self,
            _request: &AnalysisRequest,
        ) -> Result<ImageAnalysis, AnalyzerError> {
            Err(AnalyzerError::Network("connection refused".into()))
        }
    }

    async fn wait_until_settled(queue: &InMemoryJobQueue) {
        for _ in 0..200 {
            if queue.outstanding().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queue did not settle");
    }

    #[tokio::test]
    async fn scheduled_job_is_processed_to_completion() {
        let jobs = Arc::new(JobOrchestrator::new(InMemoryJobStore::arc()));
        let images = InMemoryImageStore::arc();
        let pipeline = Arc::new(ImageProcessingPipeline::new(
            images.clone(),
            CannedImageAnalyzer::new(),
        ));
        let queue = InMemoryJobQueue::arc();

        let scheduler = ProcessImageJobScheduler::new(jobs.clone(), queue.clone());
        let job = scheduler
            .schedule(
                &TraceContext::new("t-1"),
                ProcessImageInput::new("https://x/a.jpg", "describe"),
            )
            .await
            .unwrap();

        let runner = ProcessImageJobRunner::new(jobs.clone(), pipeline);
        let handle = QueueConsumer::spawn("test-consumer", queue.clone(), runner, POLL);

        wait_until_settled(&queue).await;
        handle.shutdown().await;

        let job = jobs.get(job.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(images.len(), 1);
        assert!(queue.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn retryable_failures_exhaust_deliveries_then_dead_letter() {
        let jobs = Arc::new(JobOrchestrator::new(InMemoryJobStore::arc()));
        let pipeline = Arc::new(ImageProcessingPipeline::new(
            InMemoryImageStore::arc(),
            DownAnalyzer,
        ));
        let queue = Arc::new(InMemoryJobQueue::with_max_deliveries(3));

        let job = jobs
            .create(
                mediaconv_jobs::JobType::ProcessImage,
                json!({"url": "https://x/a.jpg", "prompt": "describe"}),
            )
            .await
            .unwrap();
        queue
            .publish(&QueueMessage {
                trace_id: "t-2".into(),
                job_id: job.id(),
                input: ProcessImageInput::new("https://x/a.jpg", "describe"),
            })
            .await
            .unwrap();

        let runner = ProcessImageJobRunner::new(jobs.clone(), pipeline);
        let handle = QueueConsumer::spawn("test-consumer", queue.clone(), runner, POLL);
        wait_until_settled(&queue).await;
        handle.shutdown().await;

        let job = jobs.get(job.id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.attempts(), 3);
        assert_eq!(job.errors().len(), 3);

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].delivery.delivery_count, 3);
    }

    #[tokio::test]
    async fn unknown_job_and_garbage_are_dead_lettered_immediately() {
        let jobs = Arc::new(JobOrchestrator::new(InMemoryJobStore::arc()));
        let pipeline = Arc::new(ImageProcessingPipeline::new(
            InMemoryImageStore::arc(),
            CannedImageAnalyzer::new(),
        ));
        let queue = InMemoryJobQueue::arc();

        queue.publish_raw("not json").await;
        queue
            .publish(&QueueMessage {
                trace_id: "t-3".into(),
                job_id: JobId::new(),
                input: ProcessImageInput::new("https://x/a.jpg", "describe"),
            })
            .await
            .unwrap();

        let runner = ProcessImageJobRunner::new(jobs, pipeline);
        let handle = QueueConsumer::spawn("test-consumer", queue.clone(), runner, POLL);
        wait_until_settled(&queue).await;
        handle.shutdown().await;

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 2);
        assert!(dead.iter().all(|d| d.delivery.delivery_count == 1));
    }
}
