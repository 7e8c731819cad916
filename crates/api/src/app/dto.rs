use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use mediaconv_core::ValidationErrors;
use mediaconv_images::ProcessImageInput;

// -------------------------
// Request validation
// -------------------------

/// Validate a `POST /process-image[-async]` body.
///
/// Every field is checked so the caller sees all problems at once. Unknown
/// fields are ignored.
pub fn parse_process_image_request(body: &[u8]) -> Result<ProcessImageInput, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let object = match serde_json::from_slice::<JsonValue>(body) {
        Ok(JsonValue::Object(object)) => object,
        Ok(other) => {
            errors.push("body", format!("Expected object, received {}", type_name(&other)));
            return Err(errors);
        }
        Err(e) => {
            errors.push("body", format!("Malformed JSON: {e}"));
            return Err(errors);
        }
    };

    let url = required_string(&object, "url", &mut errors);
    if let Some(raw) = &url {
        if url::Url::parse(raw).is_err() {
            errors.push("url", "Invalid url");
        }
    }
    let prompt = required_string(&object, "prompt", &mut errors);

    let create_speech = match object.get("createSpeech") {
        None => None,
        Some(JsonValue::Bool(b)) => Some(*b),
        Some(other) => {
            errors.push(
                "createSpeech",
                format!("Expected boolean, received {}", type_name(other)),
            );
            None
        }
    };

    match (url, prompt) {
        (Some(url), Some(prompt)) => errors.into_result(ProcessImageInput {
            url,
            prompt,
            create_speech,
        }),
        _ => Err(errors),
    }
}

fn required_string(
    object: &Map<String, JsonValue>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<String> {
    match object.get(field) {
        Some(JsonValue::String(s)) => Some(s.clone()),
        None => {
            errors.push(field, "Required");
            None
        }
        Some(other) => {
            errors.push(field, format!("Expected string, received {}", type_name(other)));
            None
        }
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobResponse {
    pub message: &'static str,
    pub job_id: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct ImageQuery {
    pub url: Option<String>,
}
