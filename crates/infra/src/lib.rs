//! Infrastructure layer: stores, job lifecycle orchestration, the image
//! pipeline, the job queue and its consumer, configuration.

pub mod config;
pub mod orchestrator;
pub mod pipeline;
pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod workers;

pub use config::{AnalyzerKind, Config, ConfigError, LogFormat, QueueConfig};
pub use orchestrator::{JobOrchestrator, OrchestratorError};
pub use pipeline::{ImageProcessingPipeline, PipelineError};
pub use queue::{DeadLetter, Delivery, InMemoryJobQueue, JobQueue, QueueError, QueueMessage};
#[cfg(feature = "redis")]
pub use queue::RedisStreamsJobQueue;
pub use runner::{JobRunError, JobRunner, ProcessImageJobRunner};
pub use scheduler::{ProcessImageJobScheduler, ScheduleError};
pub use store::{
    ImageStore, InMemoryImageStore, InMemoryJobStore, JobStore, PostgresImageStore,
    PostgresJobStore, StoreError,
};
pub use workers::{QueueConsumer, WorkerHandle};
