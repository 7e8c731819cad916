//! Job record and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use mediaconv_core::{time, JobId};

use crate::error::JobError;

/// Which processing pipeline applies to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Fetch an image, analyse it, persist the result.
    #[serde(rename = "process-image")]
    ProcessImage,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ProcessImage => "process-image",
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process-image" => Ok(JobType::ProcessImage),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

/// Lifecycle status.
///
/// `Failed` is not terminal: a failed job may be started again (retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "In-Progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "In-Progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "In-Progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// One recorded failure. Entries are append-only and never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorEntry {
    pub message: String,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

impl JobErrorEntry {
    /// Build an entry stamped with the current time.
    ///
    /// An empty message is replaced so every entry stays readable.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message
        };

        Self {
            message,
            kind: kind.into(),
            timestamp: time::now(),
        }
    }
}

/// All fields of a job, for rehydration from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct JobParts {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub input: JsonValue,
    pub attempts: u32,
    pub errors: Vec<JobErrorEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The persisted state of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    id: JobId,
    #[serde(rename = "type")]
    job_type: JobType,
    status: JobStatus,
    input: JsonValue,
    attempts: u32,
    #[serde(
        default,
        serialize_with = "errors_or_null",
        deserialize_with = "errors_from_nullable"
    )]
    errors: Vec<JobErrorEntry>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh `Pending` job with no attempts and no errors.
    pub fn new(job_type: JobType, input: JsonValue) -> Self {
        let now = time::now();
        Self {
            id: JobId::new(),
            job_type,
            status: JobStatus::Pending,
            input,
            attempts: 0,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_parts(parts: JobParts) -> Self {
        Self {
            id: parts.id,
            job_type: parts.job_type,
            status: parts.status,
            input: parts.input,
            attempts: parts.attempts,
            errors: parts.errors,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn into_parts(self) -> JobParts {
        JobParts {
            id: self.id,
            job_type: self.job_type,
            status: self.status,
            input: self.input,
            attempts: self.attempts,
            errors: self.errors,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn input(&self) -> &JsonValue {
        &self.input
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn errors(&self) -> &[JobErrorEntry] {
        &self.errors
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The single guard in front of every start attempt.
    pub fn can_start(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Failed)
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// `Pending | Failed -> InProgress`, counting one attempt.
    pub fn start(&mut self) -> Result<(), JobError> {
        if !self.can_start() {
            return Err(JobError::CannotBeStarted {
                job_id: self.id,
                status: self.status,
            });
        }

        self.status = JobStatus::InProgress;
        self.attempts += 1;
        self.touch();
        Ok(())
    }

    /// `* -> Completed`. Not guarded by the current status.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.touch();
    }

    /// Record a failure and move to `Failed`.
    ///
    /// Rejected (record untouched) once the job is completed.
    pub fn fail(&mut self, error: JobErrorEntry) -> Result<(), JobError> {
        if self.is_completed() {
            return Err(JobError::ErrorCannotBeRegistered {
                job_id: self.id,
                reason: "Job is already completed".to_string(),
            });
        }

        self.errors.push(error);
        self.status = JobStatus::Failed;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = time::now();
    }
}

fn errors_or_null<S>(errors: &[JobErrorEntry], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if errors.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.collect_seq(errors)
    }
}

fn errors_from_nullable<'de, D>(deserializer: D) -> Result<Vec<JobErrorEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<JobErrorEntry>>::deserialize(deserializer)?.unwrap_or_default())
}
