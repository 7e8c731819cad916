//! Job and processed-image persistence.
//!
//! Both stores are key-value with point lookup by id. The image store adds a
//! unique secondary index on `url`, which is the pipeline's idempotency gate.

mod image_store;
mod job_store;
mod postgres;
mod record;

pub use image_store::{ImageStore, InMemoryImageStore};
pub use job_store::{InMemoryJobStore, JobStore};
pub use postgres::{PostgresImageStore, PostgresJobStore, connect, migrate};
pub use record::{ImageItem, JobItem};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or failed the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write found the record in an unexpected state.
    #[error("conditional write rejected for {key}")]
    Conflict { key: String },

    /// A unique secondary key is already taken by another record.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A persisted item could not be decoded back into a record.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    /// Only transport-level failures can succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "StoreUnavailable",
            StoreError::Conflict { .. } => "StoreConflict",
            StoreError::DuplicateKey(_) => "StoreDuplicateKey",
            StoreError::Corrupt { .. } => "StoreCorruptRecord",
        }
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}
