//! Idempotent image analysis.
//!
//! The `url` lookup is the idempotency gate: an image already analysed is
//! returned as stored and the analyzer is not called. A concurrent run that
//! loses the insert race adopts the winner's record.

use tracing::{debug, info, instrument, warn};

use mediaconv_ai::{AnalysisRequest, AnalyzerError, ImageAnalyzer};
use mediaconv_images::{ProcessImageInput, ProcessedImage};

use crate::store::{ImageStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Analyzer(e) => e.is_retryable(),
            PipelineError::Store(e) => e.is_retryable(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Analyzer(e) => e.kind(),
            PipelineError::Store(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageProcessingPipeline<I, A> {
    images: I,
    analyzer: A,
}

impl<I, A> ImageProcessingPipeline<I, A>
where
    I: ImageStore,
    A: ImageAnalyzer,
{
    pub fn new(images: I, analyzer: A) -> Self {
        Self { images, analyzer }
    }

    /// Lookup by url, else analyse and persist.
    ///
    /// Analyzer failures propagate unchanged; there is no retry here.
    #[instrument(skip(self, input), fields(url = %input.url), err)]
    pub async fn process(
        &self,
        input: &ProcessImageInput,
    ) -> Result<ProcessedImage, PipelineError> {
        if let Some(existing) = self.images.find_by_url(&input.url).await? {
            debug!(image_id = %existing.id(), "image already processed");
            return Ok(existing);
        }

        let request = AnalysisRequest::new(input.url.as_str(), input.prompt.as_str());
        let analysis = self.analyzer.analyse(&request).await?;

        let image = ProcessedImage::new(
            input.url.as_str(),
            input.prompt.as_str(),
            analysis.text,
            analysis.vendor,
            analysis.raw,
        );

        match self.images.save(&image).await {
            Ok(()) => {
                info!(image_id = %image.id(), vendor = %image.result_vendor(), "image processed");
                Ok(image)
            }
            Err(StoreError::DuplicateKey(key)) => {
                warn!(%key, "image stored concurrently; adopting existing record");
                self.images
                    .find_by_url(&input.url)
                    .await?
                    .ok_or_else(|| StoreError::DuplicateKey(key).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read-only query through the `url` index.
    pub async fn find_by_url(&self, url: &str) -> Result<Option<ProcessedImage>, PipelineError> {
        Ok(self.images.find_by_url(url).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::store::InMemoryImageStore;
    use mediaconv_ai::{CannedImageAnalyzer, ImageAnalysis};
    use serde_json::json;

    /// Counts calls and optionally fails them.
    #[derive(Debug, Default)]
    struct CountingAnalyzer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ImageAnalyzer for CountingAnalyzer {
        async fn analyse(&self, request: &AnalysisRequest) -> Result<ImageAnalysis, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AnalyzerError::Network("timeout".into()));
            }
            Ok(ImageAnalysis::new(
                format!("described {}", request.url),
                "counting",
                json!({"url": request.url}),
            ))
        }
    }

    fn input() -> ProcessImageInput {
        ProcessImageInput::new("https://x/a.jpg", "describe")
    }

    #[tokio::test]
    async fn second_call_returns_stored_record_without_analysis() {
        let analyzer = Arc::new(CountingAnalyzer::default());
        let pipeline = ImageProcessingPipeline::new(InMemoryImageStore::arc(), analyzer.clone());

        let first = pipeline.process(&input()).await.unwrap();
        let second = pipeline.process(&input()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.result_text(), "described https://x/a.jpg");
        assert_eq!(first.result_vendor(), "counting");
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn analyzer_failure_propagates_and_stores_nothing() {
        let images = InMemoryImageStore::arc();
        let analyzer = Arc::new(CountingAnalyzer {
            fail: true,
            ..Default::default()
        });
        let pipeline = ImageProcessingPipeline::new(images.clone(), analyzer);

        let err = pipeline.process(&input()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Analyzer(AnalyzerError::Network(_))));
        assert!(err.is_retryable());
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn losing_insert_race_adopts_existing_record() {
        let images = InMemoryImageStore::arc();
        let winner = ProcessedImage::new("https://x/a.jpg", "first", "a cat", "canned", json!({}));

        // Simulates a concurrent run that saves between our lookup and insert.
        struct RacingStore {
            inner: Arc<InMemoryImageStore>,
            winner: ProcessedImage,
            lookups: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl ImageStore for RacingStore {
            async fn find_by_id(
                &self,
                id: mediaconv_core::ImageId,
            ) -> Result<Option<ProcessedImage>, StoreError> {
                self.inner.find_by_id(id).await
            }

            async fn find_by_url(&self, url: &str) -> Result<Option<ProcessedImage>, StoreError> {
                if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                    let found = self.inner.find_by_url(url).await?;
                    self.inner.save(&self.winner).await?;
                    return Ok(found);
                }
                self.inner.find_by_url(url).await
            }

            async fn save(&self, image: &ProcessedImage) -> Result<(), StoreError> {
                self.inner.save(image).await
            }
        }

        let store = RacingStore {
            inner: images.clone(),
            winner: winner.clone(),
            lookups: AtomicUsize::new(0),
        };
        let pipeline = ImageProcessingPipeline::new(store, CannedImageAnalyzer::new());

        let result = pipeline.process(&input()).await.unwrap();

        assert_eq!(result, winner);
        assert_eq!(images.len(), 1);
    }
}
