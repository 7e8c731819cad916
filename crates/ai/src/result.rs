use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Provider output for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    /// Human-readable description produced by the provider.
    pub text: String,

    /// Provider name, e.g. `openai`.
    pub vendor: String,

    /// Full provider payload, kept opaque.
    pub raw: JsonValue,
}

impl ImageAnalysis {
    pub fn new(text: impl Into<String>, vendor: impl Into<String>, raw: JsonValue) -> Self {
        Self {
            text: text.into(),
            vendor: vendor.into(),
            raw,
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("invalid analysis input: {0}")]
    InvalidInput(String),

    #[error("analyzer request failed: {0}")]
    Network(String),

    #[error("analyzer returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("analyzer response could not be read: {0}")]
    Parse(String),

    #[error("analyzer returned no content")]
    EmptyResponse,
}

impl AnalyzerError {
    /// Whether a later attempt with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalyzerError::InvalidInput(_) => false,
            AnalyzerError::Provider { status, .. } => *status == 429 || *status >= 500,
            AnalyzerError::Network(_) | AnalyzerError::Parse(_) | AnalyzerError::EmptyResponse => {
                true
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnalyzerError::InvalidInput(_) => "AnalyzerInvalidInput",
            AnalyzerError::Network(_) => "AnalyzerNetworkError",
            AnalyzerError::Provider { .. } => "AnalyzerProviderError",
            AnalyzerError::Parse(_) => "AnalyzerParseError",
            AnalyzerError::EmptyResponse => "AnalyzerEmptyResponse",
        }
    }
}
