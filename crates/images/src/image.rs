use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use mediaconv_core::{time, ImageId};

/// Result of analysing one source image.
///
/// Exists for a `url` only once that image was analysed successfully. Created
/// once by the processing pipeline and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    id: ImageId,
    url: String,
    prompt: String,
    result_text: String,
    result_vendor: String,
    result_raw: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// All fields of a processed image, for rehydration from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageParts {
    pub id: ImageId,
    pub url: String,
    pub prompt: String,
    pub result_text: String,
    pub result_vendor: String,
    pub result_raw: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessedImage {
    /// A new record with a fresh identifier.
    pub fn new(
        url: impl Into<String>,
        prompt: impl Into<String>,
        result_text: impl Into<String>,
        result_vendor: impl Into<String>,
        result_raw: JsonValue,
    ) -> Self {
        let now = time::now();
        Self {
            id: ImageId::new(),
            url: url.into(),
            prompt: prompt.into(),
            result_text: result_text.into(),
            result_vendor: result_vendor.into(),
            result_raw,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_parts(parts: ImageParts) -> Self {
        Self {
            id: parts.id,
            url: parts.url,
            prompt: parts.prompt,
            result_text: parts.result_text,
            result_vendor: parts.result_vendor,
            result_raw: parts.result_raw,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn result_text(&self) -> &str {
        &self.result_text
    }

    pub fn result_vendor(&self) -> &str {
        &self.result_vendor
    }

    pub fn result_raw(&self) -> &JsonValue {
        &self.result_raw
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_flat_camel_case() {
        let image = ProcessedImage::new(
            "https://x/a.jpg",
            "describe",
            "a cat",
            "openai",
            json!({"id": "chatcmpl-1"}),
        );

        let value = serde_json::to_value(&image).unwrap();
        assert_eq!(value["url"], "https://x/a.jpg");
        assert_eq!(value["resultText"], "a cat");
        assert_eq!(value["resultVendor"], "openai");
        assert_eq!(value["resultRaw"]["id"], "chatcmpl-1");
        assert_eq!(value["id"], image.id().to_string());
    }
}
