use thiserror::Error;

use mediaconv_core::JobId;

use crate::job::JobStatus;

/// Lifecycle violations for a job record.
///
/// None of these are retryable: redelivering the same message cannot change
/// the outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("the job for the provided query was not found: {0}")]
    NotFound(JobId),

    #[error("Job cannot be started, Job status should be pending or failed, Given status: {status}")]
    CannotBeStarted { job_id: JobId, status: JobStatus },

    #[error("Job error cannot be registered: {reason}")]
    ErrorCannotBeRegistered { job_id: JobId, reason: String },
}

impl JobError {
    /// Stable name used when recording or reporting the failure.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::NotFound(_) => "JobNotFound",
            JobError::CannotBeStarted { .. } => "JobCannotBeStarted",
            JobError::ErrorCannotBeRegistered { .. } => "JobErrorCannotBeRegistered",
        }
    }
}
