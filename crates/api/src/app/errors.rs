use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use mediaconv_core::ValidationErrors;
use mediaconv_infra::{OrchestratorError, PipelineError, ScheduleError};
use mediaconv_jobs::JobError;

pub const INVALID_INPUT_MESSAGE: &str = "Invalid request input";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error.";

pub fn validation_error(errors: ValidationErrors) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "message": INVALID_INPUT_MESSAGE,
            "errors": errors.errors(),
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, axum::Json(json!({ "message": message.into() }))).into_response()
}

/// Unexpected failure: logged in full, reported without detail.
pub fn internal_error(err: &(dyn std::error::Error + 'static)) -> Response {
    error!(error = %err, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
}

pub fn orchestrator_error_to_response(err: OrchestratorError) -> Response {
    match err {
        OrchestratorError::Job(JobError::NotFound(id)) => {
            json_error(StatusCode::NOT_FOUND, format!("job {id} not found"))
        }
        other => internal_error(&other),
    }
}

pub fn pipeline_error_to_response(err: PipelineError) -> Response {
    error!(kind = err.kind(), retryable = err.is_retryable(), "image processing failed");
    internal_error(&err)
}

pub fn schedule_error_to_response(err: ScheduleError) -> Response {
    internal_error(&err)
}
