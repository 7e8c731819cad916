use serde_json::json;

use crate::analyzer::{AnalysisRequest, ImageAnalyzer};
use crate::result::{AnalyzerError, ImageAnalysis};

const DEFAULT_DESCRIPTION: &str = "A brightly lit scene with a large green mascot standing \
in front of a glass building, surrounded by plants and parked bicycles under a blue sky.";

/// Deterministic analyzer that never leaves the process.
///
/// Used for local development and tests so no provider credits are spent.
#[derive(Debug, Clone)]
pub struct CannedImageAnalyzer {
    text: String,
}

impl CannedImageAnalyzer {
    pub fn new() -> Self {
        Self {
            text: DEFAULT_DESCRIPTION.to_string(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

impl Default for CannedImageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ImageAnalyzer for CannedImageAnalyzer {
    async fn analyse(&self, request: &AnalysisRequest) -> Result<ImageAnalysis, AnalyzerError> {
        if request.url.trim().is_empty() {
            return Err(AnalyzerError::InvalidInput("url must not be empty".to_string()));
        }

        Ok(ImageAnalysis::new(
            self.text.clone(),
            "canned",
            json!({
                "object": "canned.analysis",
                "url": request.url,
                "prompt": request.prompt,
                "content": self.text,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_request_into_raw_payload() {
        let analyzer = CannedImageAnalyzer::new().with_text("a cat");
        let result = analyzer
            .analyse(&AnalysisRequest::new("https://x/a.jpg", "describe"))
            .await
            .unwrap();

        assert_eq!(result.text, "a cat");
        assert_eq!(result.vendor, "canned");
        assert_eq!(result.raw["url"], "https://x/a.jpg");
    }

    #[tokio::test]
    async fn rejects_blank_url() {
        let err = CannedImageAnalyzer::new()
            .analyse(&AnalysisRequest::new(" ", "describe"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::InvalidInput(_)));
    }
}
