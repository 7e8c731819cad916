use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::result::{AnalyzerError, ImageAnalysis};

/// What to analyse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub url: String,
    pub prompt: String,
}

impl AnalysisRequest {
    pub fn new(url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prompt: prompt.into(),
        }
    }
}

/// An external vision-analysis provider, treated as an opaque function.
///
/// Implementations must not retry internally; a failure is returned as-is.
#[async_trait::async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyse(&self, request: &AnalysisRequest) -> Result<ImageAnalysis, AnalyzerError>;
}

#[async_trait::async_trait]
impl<A> ImageAnalyzer for Arc<A>
where
    A: ImageAnalyzer + ?Sized,
{
    async fn analyse(&self, request: &AnalysisRequest) -> Result<ImageAnalysis, AnalyzerError> {
        (**self).analyse(request).await
    }
}
