//! OpenAI-compatible vision analyzer (chat completions with an image part).

use std::time::Instant;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::analyzer::{AnalysisRequest, ImageAnalyzer};
use crate::result::{AnalyzerError, ImageAnalysis};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 300;
const VENDOR: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiImageAnalyzer {
    http_client: Client,
    config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct VisionRequest<'a> {
    model: &'a str,
    messages: Vec<VisionMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct VisionMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    ImageUrl { image_url: ImageUrl<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

impl OpenAiImageAnalyzer {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http_client: Client::new(),
            config,
        }
    }

    fn build_request<'a>(&'a self, request: &'a AnalysisRequest) -> VisionRequest<'a> {
        let mut content = vec![ContentPart::ImageUrl {
            image_url: ImageUrl { url: &request.url },
        }];
        if !request.prompt.trim().is_empty() {
            content.push(ContentPart::Text {
                text: &request.prompt,
            });
        }

        VisionRequest {
            model: &self.config.model,
            messages: vec![VisionMessage {
                role: "user",
                content,
            }],
            max_tokens: MAX_TOKENS,
        }
    }
}

/// First choice's message content, if any.
fn extract_text(response: &JsonValue) -> Result<String, AnalyzerError> {
    let text = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(JsonValue::as_str)
        .ok_or(AnalyzerError::EmptyResponse)?;

    if text.trim().is_empty() {
        return Err(AnalyzerError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[async_trait::async_trait]
impl ImageAnalyzer for OpenAiImageAnalyzer {
    async fn analyse(&self, request: &AnalysisRequest) -> Result<ImageAnalysis, AnalyzerError> {
        let start = Instant::now();
        let body = self.build_request(request);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "vision request failed");
                AnalyzerError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "vision provider error");
            return Err(AnalyzerError::Provider {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let raw: JsonValue = response
            .json()
            .await
            .map_err(|e| AnalyzerError::Parse(e.to_string()))?;
        let text = extract_text(&raw)?;

        debug!(
            model = %self.config.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "vision analysis completed"
        );

        Ok(ImageAnalysis::new(text, VENDOR, raw))
    }
}
