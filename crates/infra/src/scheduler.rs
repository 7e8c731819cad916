use std::sync::Arc;

use tracing::{info, instrument};

use mediaconv_core::TraceContext;
use mediaconv_images::ProcessImageInput;
use mediaconv_jobs::{Job, JobType};

use crate::orchestrator::{JobOrchestrator, OrchestratorError};
use crate::queue::{JobQueue, QueueError, QueueMessage};
use crate::store::JobStore;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("job input could not be encoded: {0}")]
    Encode(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// The job exists (still `Pending`) but its start signal was not sent.
    #[error("job {job_id} created but not queued: {source}")]
    Publish {
        job_id: mediaconv_core::JobId,
        #[source]
        source: QueueError,
    },
}

/// Creates `process-image` jobs and hands them to the queue.
#[derive(Debug)]
pub struct ProcessImageJobScheduler<S, Q> {
    orchestrator: Arc<JobOrchestrator<S>>,
    queue: Q,
}

impl<S, Q> ProcessImageJobScheduler<S, Q>
where
    S: JobStore,
    Q: JobQueue,
{
    pub fn new(orchestrator: Arc<JobOrchestrator<S>>, queue: Q) -> Self {
        Self {
            orchestrator,
            queue,
        }
    }

    #[instrument(skip(self, ctx, input), fields(trace_id = %ctx.trace_id(), url = %input.url), err)]
    pub async fn schedule(
        &self,
        ctx: &TraceContext,
        input: ProcessImageInput,
    ) -> Result<Job, ScheduleError> {
        let payload =
            serde_json::to_value(&input).map_err(|e| ScheduleError::Encode(e.to_string()))?;
        let job = self
            .orchestrator
            .create(JobType::ProcessImage, payload)
            .await?;

        let message = QueueMessage {
            trace_id: ctx.trace_id().to_string(),
            job_id: job.id(),
            input,
        };
        self.queue
            .publish(&message)
            .await
            .map_err(|source| ScheduleError::Publish {
                job_id: job.id(),
                source,
            })?;

        info!(job_id = %job.id(), "image processing job scheduled");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::queue::InMemoryJobQueue;
    use crate::store::InMemoryJobStore;
    use mediaconv_jobs::JobStatus;

    #[tokio::test]
    async fn schedule_creates_pending_job_and_publishes_it() {
        let orchestrator = Arc::new(JobOrchestrator::new(InMemoryJobStore::arc()));
        let queue = InMemoryJobQueue::arc();
        let scheduler = ProcessImageJobScheduler::new(orchestrator.clone(), queue.clone());
        let ctx = TraceContext::new("trace-42");
        let input = ProcessImageInput::new("https://x/a.jpg", "describe").with_create_speech(false);

        let job = scheduler.schedule(&ctx, input.clone()).await.unwrap();

        let stored = orchestrator.get(job.id()).await.unwrap();
        assert_eq!(stored.status(), JobStatus::Pending);
        assert_eq!(stored.input(), &serde_json::to_value(&input).unwrap());

        let delivery = queue.receive(Duration::from_millis(20)).await.unwrap().unwrap();
        let message = delivery.decode().unwrap();
        assert_eq!(message.trace_id, "trace-42");
        assert_eq!(message.job_id, job.id());
        assert_eq!(message.input, input);
    }
}
