use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tracing::info;

use mediaconv_ai::{CannedImageAnalyzer, ImageAnalyzer, OpenAiConfig, OpenAiImageAnalyzer};
use mediaconv_infra::{
    AnalyzerKind, Config, ImageProcessingPipeline, ImageStore, InMemoryImageStore, InMemoryJobQueue,
    InMemoryJobStore, JobOrchestrator, JobQueue, JobStore, PostgresImageStore, PostgresJobStore,
    ProcessImageJobRunner, ProcessImageJobScheduler, QueueConsumer, WorkerHandle,
};

pub type DynJobStore = Arc<dyn JobStore>;
pub type DynImageStore = Arc<dyn ImageStore>;
pub type DynAnalyzer = Arc<dyn ImageAnalyzer>;
pub type DynQueue = Arc<dyn JobQueue>;

pub type Orchestrator = JobOrchestrator<DynJobStore>;
pub type Pipeline = ImageProcessingPipeline<DynImageStore, DynAnalyzer>;
pub type Runner = ProcessImageJobRunner<DynJobStore, DynImageStore, DynAnalyzer>;
pub type Scheduler = ProcessImageJobScheduler<DynJobStore, DynQueue>;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Application services (wired once, shared by handlers and the queue consumer).
pub struct AppServices {
    jobs: Arc<Orchestrator>,
    pipeline: Arc<Pipeline>,
    scheduler: Scheduler,
    queue: DynQueue,
    poll_interval: Duration,
}

impl AppServices {
    /// All-in-memory wiring for dev and tests.
    pub fn in_memory(analyzer: DynAnalyzer) -> Self {
        Self::from_parts(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryImageStore::new()),
            analyzer,
            Arc::new(InMemoryJobQueue::new()),
            DEFAULT_POLL_INTERVAL,
        )
    }

    pub fn from_parts(
        job_store: DynJobStore,
        image_store: DynImageStore,
        analyzer: DynAnalyzer,
        queue: DynQueue,
        poll_interval: Duration,
    ) -> Self {
        let jobs = Arc::new(JobOrchestrator::new(job_store));
        let pipeline = Arc::new(ImageProcessingPipeline::new(image_store, analyzer));
        let scheduler = ProcessImageJobScheduler::new(jobs.clone(), queue.clone());

        Self {
            jobs,
            pipeline,
            scheduler,
            queue,
            poll_interval,
        }
    }

    /// Wire adapters from process configuration.
    ///
    /// - Postgres stores when `DATABASE_URL` is set, in-memory otherwise
    /// - Redis Streams queue when `REDIS_URL` is set (feature `redis`), in-memory otherwise
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let (job_store, image_store): (DynJobStore, DynImageStore) = match &config.database_url {
            Some(url) => {
                let pool = mediaconv_infra::store::connect(url)
                    .await
                    .context("connecting to Postgres")?;
                mediaconv_infra::store::migrate(&pool)
                    .await
                    .context("applying schema")?;
                info!("using Postgres stores");
                (
                    Arc::new(PostgresJobStore::new(pool.clone())),
                    Arc::new(PostgresImageStore::new(pool)),
                )
            }
            None => {
                info!("using in-memory stores");
                (Arc::new(InMemoryJobStore::new()), Arc::new(InMemoryImageStore::new()))
            }
        };

        let analyzer: DynAnalyzer = match &config.analyzer {
            AnalyzerKind::Canned => Arc::new(CannedImageAnalyzer::new()),
            AnalyzerKind::OpenAi {
                api_key,
                base_url,
                model,
            } => Arc::new(OpenAiImageAnalyzer::new(
                OpenAiConfig::new(api_key.clone())
                    .with_base_url(base_url.clone())
                    .with_model(model.clone()),
            )),
        };

        let queue = build_queue(config).await?;

        Ok(Self::from_parts(
            job_store,
            image_store,
            analyzer,
            queue,
            config.queue.poll_interval,
        ))
    }

    pub fn jobs(&self) -> &Orchestrator {
        &self.jobs
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn runner(&self) -> Runner {
        ProcessImageJobRunner::new(self.jobs.clone(), self.pipeline.clone())
    }

    /// Start the background consumer that runs scheduled jobs.
    pub fn spawn_consumer(&self) -> WorkerHandle {
        QueueConsumer::spawn(
            "process-image-consumer",
            self.queue.clone(),
            self.runner(),
            self.poll_interval,
        )
    }
}

#[cfg(feature = "redis")]
async fn build_queue(config: &Config) -> anyhow::Result<DynQueue> {
    let queue = &config.queue;
    match &queue.redis_url {
        Some(url) => {
            let redis = mediaconv_infra::RedisStreamsJobQueue::connect(
                url,
                queue.stream.clone(),
                queue.group.clone(),
                queue.consumer.clone(),
            )
            .await
            .context("connecting to Redis")?
            .with_max_deliveries(queue.max_deliveries)
            .with_claim_idle(queue.claim_idle);
            info!(stream = %queue.stream, group = %queue.group, "using Redis Streams queue");
            Ok(Arc::new(redis))
        }
        None => Ok(in_memory_queue(config)),
    }
}

#[cfg(not(feature = "redis"))]
async fn build_queue(config: &Config) -> anyhow::Result<DynQueue> {
    if config.queue.redis_url.is_some() {
        anyhow::bail!("REDIS_URL is set but this binary was built without the `redis` feature");
    }
    Ok(in_memory_queue(config))
}

fn in_memory_queue(config: &Config) -> DynQueue {
    info!("using in-memory queue");
    Arc::new(InMemoryJobQueue::with_max_deliveries(config.queue.max_deliveries))
}
