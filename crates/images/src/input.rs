use serde::{Deserialize, Serialize};

/// Input of one image analysis: where the image lives and what to ask about it.
///
/// Values are validated at the trust boundary (HTTP intake) before one of these
/// is built; the pipeline takes them as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImageInput {
    pub url: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_speech: Option<bool>,
}

impl ProcessImageInput {
    pub fn new(url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prompt: prompt.into(),
            create_speech: None,
        }
    }

    pub fn with_create_speech(mut self, create_speech: bool) -> Self {
        self.create_speech = Some(create_speech);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uses_camel_case_and_omits_missing_flag() {
        let input = ProcessImageInput::new("https://x/a.jpg", "describe");
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"url": "https://x/a.jpg", "prompt": "describe"})
        );

        let input = input.with_create_speech(true);
        assert_eq!(serde_json::to_value(&input).unwrap()["createSpeech"], true);
    }

    #[test]
    fn ignores_unknown_fields() {
        let input: ProcessImageInput = serde_json::from_value(json!({
            "url": "https://x/a.jpg",
            "prompt": "p",
            "extra": 1
        }))
        .unwrap();
        assert_eq!(input.create_speech, None);
    }
}
