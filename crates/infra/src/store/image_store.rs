use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use mediaconv_core::ImageId;
use mediaconv_images::ProcessedImage;

use super::record::ImageItem;
use super::{StoreError, poisoned};

/// Processed image store with a unique secondary index on `url`.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    async fn find_by_id(&self, id: ImageId) -> Result<Option<ProcessedImage>, StoreError>;

    /// Lookup through the `url` index.
    async fn find_by_url(&self, url: &str) -> Result<Option<ProcessedImage>, StoreError>;

    /// Upsert by id.
    ///
    /// Fails with `StoreError::DuplicateKey` when another record already owns
    /// the same `url`.
    async fn save(&self, image: &ProcessedImage) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> ImageStore for Arc<S>
where
    S: ImageStore + ?Sized,
{
    async fn find_by_id(&self, id: ImageId) -> Result<Option<ProcessedImage>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<ProcessedImage>, StoreError> {
        (**self).find_by_url(url).await
    }

    async fn save(&self, image: &ProcessedImage) -> Result<(), StoreError> {
        (**self).save(image).await
    }
}

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<Uuid, ImageItem>,
    by_url: HashMap<String, Uuid>,
}

/// In-memory image store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryImageStore {
    tables: RwLock<Tables>,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.tables.read().map(|t| t.items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ImageStore for InMemoryImageStore {
    async fn find_by_id(&self, id: ImageId) -> Result<Option<ProcessedImage>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .items
            .get(id.as_uuid())
            .cloned()
            .map(ImageItem::into_image)
            .transpose()
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<ProcessedImage>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        tables
            .by_url
            .get(url)
            .and_then(|id| tables.items.get(id))
            .cloned()
            .map(ImageItem::into_image)
            .transpose()
    }

    async fn save(&self, image: &ProcessedImage) -> Result<(), StoreError> {
        let item = ImageItem::from_image(image)?;
        let mut tables = self.tables.write().map_err(poisoned)?;

        if let Some(owner) = tables.by_url.get(&item.url) {
            if *owner != item.id {
                return Err(StoreError::DuplicateKey(format!("url={}", item.url)));
            }
        }

        let stale_url = tables
            .items
            .get(&item.id)
            .map(|previous| previous.url.clone())
            .filter(|url| *url != item.url);
        if let Some(stale_url) = stale_url {
            tables.by_url.remove(&stale_url);
        }

        tables.by_url.insert(item.url.clone(), item.id);
        tables.items.insert(item.id, item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(url: &str) -> ProcessedImage {
        ProcessedImage::new(url, "describe", "a cat", "canned", json!({"content": "a cat"}))
    }

    #[tokio::test]
    async fn finds_by_id_and_url() {
        let store = InMemoryImageStore::new();
        let image = image("https://x/a.jpg");
        store.save(&image).await.unwrap();

        assert_eq!(store.find_by_id(image.id()).await.unwrap(), Some(image.clone()));
        assert_eq!(
            store.find_by_url("https://x/a.jpg").await.unwrap(),
            Some(image)
        );
        assert!(store.find_by_url("https://x/b.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_record_for_same_url_is_rejected() {
        let store = InMemoryImageStore::new();
        let first = image("https://x/a.jpg");
        store.save(&first).await.unwrap();

        let err = store.save(&image("https://x/a.jpg")).await.unwrap_err();

        assert!(matches!(err, StoreError::DuplicateKey(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.find_by_url("https://x/a.jpg").await.unwrap().map(|i| i.id()),
            Some(first.id())
        );
    }

    #[tokio::test]
    async fn resaving_same_record_is_an_upsert() {
        let store = InMemoryImageStore::new();
        let image = image("https://x/a.jpg");
        store.save(&image).await.unwrap();
        store.save(&image).await.unwrap();

        assert_eq!(store.len(), 1);
    }
}
