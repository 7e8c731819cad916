//! Persisted item layouts.
//!
//! Opaque payloads (`input`, `errors`, `result_raw`) are stored as JSON text so
//! every adapter shares one representation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mediaconv_images::{ImageParts, ProcessedImage};
use mediaconv_jobs::{Job, JobErrorEntry, JobParts};

use super::StoreError;

/// Job store item.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct JobItem {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub job_type: String,
    pub status: String,
    pub attempts: i32,
    pub input: String,
    pub errors: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobItem {
    pub fn from_job(job: &Job) -> Result<Self, StoreError> {
        let key = job.id().to_string();
        let input = serde_json::to_string(job.input()).map_err(|e| corrupt(&key, e))?;
        let errors = serde_json::to_string(job.errors()).map_err(|e| corrupt(&key, e))?;
        let attempts = i32::try_from(job.attempts()).map_err(|e| corrupt(&key, e))?;

        Ok(Self {
            id: *job.id().as_uuid(),
            job_type: job.job_type().as_str().to_string(),
            status: job.status().as_str().to_string(),
            attempts,
            input,
            errors,
            created_at: job.created_at(),
            updated_at: job.updated_at(),
        })
    }

    /// Fields moved by every job mutation; `id` and payload are not compared.
    pub fn same_revision(&self, other: &JobItem) -> bool {
        self.status == other.status
            && self.attempts == other.attempts
            && self.errors == other.errors
            && self.updated_at == other.updated_at
    }

    pub fn into_job(self) -> Result<Job, StoreError> {
        let key = self.id.to_string();
        let errors: Option<Vec<JobErrorEntry>> =
            serde_json::from_str(&self.errors).map_err(|e| corrupt(&key, e))?;

        Ok(Job::from_parts(JobParts {
            id: self.id.into(),
            job_type: self.job_type.parse().map_err(|e| corrupt(&key, e))?,
            status: self.status.parse().map_err(|e| corrupt(&key, e))?,
            input: serde_json::from_str(&self.input).map_err(|e| corrupt(&key, e))?,
            attempts: u32::try_from(self.attempts).map_err(|e| corrupt(&key, e))?,
            errors: errors.unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

/// Image store item.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ImageItem {
    pub id: Uuid,
    pub url: String,
    pub prompt: String,
    pub result_text: String,
    pub result_vendor: String,
    pub result_raw: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageItem {
    pub fn from_image(image: &ProcessedImage) -> Result<Self, StoreError> {
        let result_raw = serde_json::to_string(image.result_raw())
            .map_err(|e| corrupt(&image.id().to_string(), e))?;

        Ok(Self {
            id: *image.id().as_uuid(),
            url: image.url().to_string(),
            prompt: image.prompt().to_string(),
            result_text: image.result_text().to_string(),
            result_vendor: image.result_vendor().to_string(),
            result_raw,
            created_at: image.created_at(),
            updated_at: image.updated_at(),
        })
    }

    pub fn into_image(self) -> Result<ProcessedImage, StoreError> {
        let result_raw =
            serde_json::from_str(&self.result_raw).map_err(|e| corrupt(&self.id.to_string(), e))?;

        Ok(ProcessedImage::from_parts(ImageParts {
            id: self.id.into(),
            url: self.url,
            prompt: self.prompt,
            result_text: self.result_text,
            result_vendor: self.result_vendor,
            result_raw,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

fn corrupt(key: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaconv_jobs::JobType;
    use serde_json::json;

    #[test]
    fn job_item_keeps_payloads_as_json_text() {
        let mut job = Job::new(
            JobType::ProcessImage,
            json!({"url": "https://x/a.jpg", "prompt": "describe"}),
        );
        job.start().unwrap();
        job.fail(JobErrorEntry::new("Timeout", "timeout")).unwrap();

        let item = JobItem::from_job(&job).unwrap();
        assert_eq!(item.job_type, "process-image");
        assert_eq!(item.status, "failed");
        assert_eq!(item.attempts, 1);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&item.input).unwrap(),
            json!({"url": "https://x/a.jpg", "prompt": "describe"})
        );

        assert_eq!(item.into_job().unwrap(), job);
    }

    #[test]
    fn null_errors_decode_as_empty() {
        let job = Job::new(JobType::ProcessImage, json!({}));
        let mut item = JobItem::from_job(&job).unwrap();
        item.errors = "null".to_string();

        assert!(item.into_job().unwrap().errors().is_empty());
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let job = Job::new(JobType::ProcessImage, json!({}));
        let mut item = JobItem::from_job(&job).unwrap();
        item.status = "paused".to_string();

        assert!(matches!(item.into_job(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn image_item_round_trips() {
        let image = ProcessedImage::new(
            "https://x/a.jpg",
            "describe",
            "a cat",
            "canned",
            json!({"choices": [1, 2]}),
        );
        let item = ImageItem::from_image(&image).unwrap();
        assert_eq!(item.result_raw, r#"{"choices":[1,2]}"#);
        assert_eq!(item.into_image().unwrap(), image);
    }
}
