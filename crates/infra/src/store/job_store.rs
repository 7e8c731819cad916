use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use mediaconv_core::JobId;
use mediaconv_jobs::Job;

use super::record::JobItem;
use super::{StoreError, poisoned};

/// Job store abstraction.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Point lookup by id.
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Upsert: the stored item is fully overwritten.
    async fn save(&self, job: &Job) -> Result<(), StoreError>;

    /// Write `job` only if the stored item is still the `observed` revision.
    ///
    /// The revision is `status`, `attempts`, `errors` and `updated_at`; every
    /// mutation moves at least one of them. Fails with `StoreError::Conflict`
    /// when the item is missing or was written since `observed` was loaded.
    async fn save_if_unchanged(&self, job: &Job, observed: &Job) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        (**self).save(job).await
    }

    async fn save_if_unchanged(&self, job: &Job, observed: &Job) -> Result<(), StoreError> {
        (**self).save_if_unchanged(job, observed).await
    }
}

/// In-memory job store for tests/dev.
///
/// Items are kept in their persisted layout so reads go through the same
/// decoding as the durable adapter.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    items: RwLock<HashMap<Uuid, JobItem>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let items = self.items.read().map_err(poisoned)?;
        items.get(id.as_uuid()).cloned().map(JobItem::into_job).transpose()
    }

    async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let item = JobItem::from_job(job)?;
        let mut items = self.items.write().map_err(poisoned)?;
        items.insert(item.id, item);
        Ok(())
    }

    async fn save_if_unchanged(&self, job: &Job, observed: &Job) -> Result<(), StoreError> {
        let item = JobItem::from_job(job)?;
        let expected = JobItem::from_job(observed)?;
        let mut items = self.items.write().map_err(poisoned)?;

        match items.get(&item.id) {
            Some(current) if current.same_revision(&expected) => {
                items.insert(item.id, item);
                Ok(())
            }
            _ => Err(StoreError::Conflict {
                key: job.id().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaconv_jobs::{JobErrorEntry, JobStatus, JobType};
    use serde_json::json;

    fn job() -> Job {
        Job::new(
            JobType::ProcessImage,
            json!({"url": "https://x/a.jpg", "prompt": "describe"}),
        )
    }

    #[tokio::test]
    async fn save_then_find_is_field_for_field_equal() {
        let store = InMemoryJobStore::new();
        let mut job = job();
        job.start().unwrap();
        job.fail(JobErrorEntry::new("Timeout", "timeout")).unwrap();

        store.save(&job).await.unwrap();
        let loaded = store.find_by_id(job.id()).await.unwrap().unwrap();

        assert_eq!(loaded, job);
        assert_eq!(loaded.errors()[0].message, "timeout");
    }

    #[tokio::test]
    async fn missing_job_is_none() {
        let store = InMemoryJobStore::new();
        assert!(store.find_by_id(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_existing_item() {
        let store = InMemoryJobStore::new();
        let mut job = job();
        store.save(&job).await.unwrap();

        job.start().unwrap();
        store.save(&job).await.unwrap();

        let loaded = store.find_by_id(job.id()).await.unwrap().unwrap();
        assert_eq!(loaded.status(), JobStatus::InProgress);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn conditional_save_only_wins_once() {
        let store = InMemoryJobStore::new();
        let job = job();
        store.save(&job).await.unwrap();

        let mut first = job.clone();
        first.start().unwrap();
        let mut second = job.clone();
        second.start().unwrap();

        store.save_if_unchanged(&first, &job).await.unwrap();
        let err = store.save_if_unchanged(&second, &job).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn conditional_save_rejects_a_revision_with_the_same_status() {
        let store = InMemoryJobStore::new();
        let mut observed = job();
        observed.start().unwrap();
        observed.fail(JobErrorEntry::new("Timeout", "first")).unwrap();
        store.save(&observed).await.unwrap();

        // Failed -> InProgress -> Failed elsewhere: same status, newer record.
        let mut newer = observed.clone();
        newer.start().unwrap();
        newer.fail(JobErrorEntry::new("Timeout", "second")).unwrap();
        store.save(&newer).await.unwrap();

        let mut stale = observed.clone();
        stale.start().unwrap();
        let err = store.save_if_unchanged(&stale, &observed).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.find_by_id(observed.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), JobStatus::Failed);
        assert_eq!(stored.errors().len(), 2);
    }

    #[tokio::test]
    async fn conditional_save_of_missing_item_conflicts() {
        let store = InMemoryJobStore::new();
        let err = store
            .save_if_unchanged(&job(), &job())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }
}
