//! Job type dispatcher: start -> pipeline -> complete | fail.

use std::sync::Arc;

use tracing::{error, instrument, warn};

use mediaconv_ai::ImageAnalyzer;
use mediaconv_core::JobId;
use mediaconv_images::{ProcessImageInput, ProcessedImage};
use mediaconv_jobs::{Job, JobErrorEntry, JobType};

use crate::orchestrator::{JobOrchestrator, OrchestratorError};
use crate::pipeline::{ImageProcessingPipeline, PipelineError};
use crate::store::{ImageStore, JobStore};

#[derive(Debug, thiserror::Error)]
pub enum JobRunError {
    #[error("job {job_id} has invalid input: {reason}")]
    InvalidInput { job_id: JobId, reason: String },

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl JobRunError {
    /// Drives the consumer's choice between redelivery and dead-lettering.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobRunError::InvalidInput { .. } => false,
            JobRunError::Orchestrator(e) => e.is_retryable(),
            JobRunError::Pipeline(e) => e.is_retryable(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobRunError::InvalidInput { .. } => "InvalidJobInput",
            JobRunError::Orchestrator(e) => e.kind(),
            JobRunError::Pipeline(e) => e.kind(),
        }
    }
}

/// Executes one job delivery end to end.
#[async_trait::async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job_id: JobId) -> Result<(), JobRunError>;
}

#[async_trait::async_trait]
impl<R> JobRunner for Arc<R>
where
    R: JobRunner + ?Sized,
{
    async fn run(&self, job_id: JobId) -> Result<(), JobRunError> {
        (**self).run(job_id).await
    }
}

#[derive(Debug)]
pub struct ProcessImageJobRunner<S, I, A> {
    orchestrator: Arc<JobOrchestrator<S>>,
    pipeline: Arc<ImageProcessingPipeline<I, A>>,
}

impl<S, I, A> Clone for ProcessImageJobRunner<S, I, A> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<S, I, A> ProcessImageJobRunner<S, I, A>
where
    S: JobStore,
    I: ImageStore,
    A: ImageAnalyzer,
{
    pub fn new(
        orchestrator: Arc<JobOrchestrator<S>>,
        pipeline: Arc<ImageProcessingPipeline<I, A>>,
    ) -> Self {
        Self {
            orchestrator,
            pipeline,
        }
    }

    /// Start the job, run its pipeline, then complete it.
    ///
    /// A failure after a successful start is recorded on the job before it is
    /// returned. Failures before the start leave the record untouched.
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn process(&self, job_id: JobId) -> Result<ProcessedImage, JobRunError> {
        let job = self.orchestrator.start(job_id).await?;

        let outcome = match decode_input(&job) {
            Ok(input) => self.pipeline.process(&input).await.map_err(JobRunError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(image) => {
                self.orchestrator.complete(job_id).await?;
                Ok(image)
            }
            Err(e) => {
                let entry = JobErrorEntry::new(e.kind(), e.to_string());
                if let Err(fail_err) = self.orchestrator.fail(job_id, entry).await {
                    error!(error = %fail_err, "failed to record job failure");
                }
                warn!(error = %e, retryable = e.is_retryable(), "job run failed");
                Err(e)
            }
        }
    }
}

#[async_trait::async_trait]
impl<S, I, A> JobRunner for ProcessImageJobRunner<S, I, A>
where
    S: JobStore,
    I: ImageStore,
    A: ImageAnalyzer,
{
    async fn run(&self, job_id: JobId) -> Result<(), JobRunError> {
        self.process(job_id).await.map(|_| ())
    }
}

fn decode_input(job: &Job) -> Result<ProcessImageInput, JobRunError> {
    match job.job_type() {
        JobType::ProcessImage => serde_json::from_value(job.input().clone()).map_err(|e| {
            JobRunError::InvalidInput {
                job_id: job.id(),
                reason: e.to_string(),
            }
        }),
    }
}
