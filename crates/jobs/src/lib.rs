//! `mediaconv-jobs`
//!
//! **Responsibility:** the persisted state of one unit of asynchronous work and
//! the rules for moving it through its lifecycle.
//!
//! Pure domain: no IO. Loading and persisting records is the orchestrator's job
//! (`mediaconv-infra`), which is also the only caller allowed to mutate them.

pub mod error;
pub mod job;

pub use error::JobError;
pub use job::{Job, JobErrorEntry, JobParts, JobStatus, JobType};
