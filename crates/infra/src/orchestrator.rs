//! Job orchestrator: the only writer of job records.
//!
//! Every operation is load -> guard -> mutate -> persist and writes exactly one
//! updated record.

use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use mediaconv_core::JobId;
use mediaconv_jobs::{Job, JobError, JobErrorEntry, JobStatus, JobType};

use crate::store::{JobStore, StoreError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// Lifecycle violations never heal on redelivery; store outages might.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Job(_) => false,
            OrchestratorError::Store(e) => e.is_retryable(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Job(e) => e.kind(),
            OrchestratorError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobOrchestrator<S> {
    store: S,
}

impl<S> JobOrchestrator<S>
where
    S: JobStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a fresh `Pending` job.
    #[instrument(skip(self, input), fields(job_type = %job_type), err)]
    pub async fn create(
        &self,
        job_type: JobType,
        input: JsonValue,
    ) -> Result<Job, OrchestratorError> {
        let job = Job::new(job_type, input);
        self.store.save(&job).await?;

        info!(job_id = %job.id(), "job created");
        Ok(job)
    }

    /// `Pending | Failed -> InProgress`.
    ///
    /// The write is conditional on the revision observed at load, so of two
    /// concurrent starts only one succeeds, and a start never overwrites a
    /// record written after its load. The loser gets `CannotBeStarted` with
    /// the status it lost to.
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn start(&self, job_id: JobId) -> Result<Job, OrchestratorError> {
        let observed = self.load(job_id).await?;
        let mut job = observed.clone();

        job.start()?;

        match self.store.save_if_unchanged(&job, &observed).await {
            Ok(()) => {
                info!(attempts = job.attempts(), "job started");
                Ok(job)
            }
            Err(StoreError::Conflict { .. }) => {
                let current = self.load(job_id).await?;
                warn!(status = %current.status(), "lost start race");
                Err(JobError::CannotBeStarted {
                    job_id,
                    status: current.status(),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `* -> Completed`. Not guarded by the current status.
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn complete(&self, job_id: JobId) -> Result<Job, OrchestratorError> {
        let mut job = self.load(job_id).await?;
        if job.status() != JobStatus::InProgress {
            warn!(status = %job.status(), "completing a job that is not in progress");
        }

        job.complete();
        self.store.save(&job).await?;

        info!(attempts = job.attempts(), "job completed");
        Ok(job)
    }

    /// Append `error` and move to `Failed`. Rejected once completed.
    #[instrument(skip(self, error), fields(job_id = %job_id, error_kind = %error.kind), err)]
    pub async fn fail(
        &self,
        job_id: JobId,
        error: JobErrorEntry,
    ) -> Result<Job, OrchestratorError> {
        let mut job = self.load(job_id).await?;

        job.fail(error)?;
        self.store.save(&job).await?;

        info!(
            attempts = job.attempts(),
            errors = job.errors().len(),
            "job failed"
        );
        Ok(job)
    }

    /// Read-only query.
    pub async fn get(&self, job_id: JobId) -> Result<Job, OrchestratorError> {
        self.load(job_id).await
    }

    async fn load(&self, job_id: JobId) -> Result<Job, OrchestratorError> {
        let job = self
            .store
            .find_by_id(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))?;

        debug!(job_id = %job_id, status = %job.status(), "job loaded");
        Ok(job)
    }
}
