use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use mediaconv_core::{TraceContext, ValidationErrors};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

const SCHEDULED_MESSAGE: &str = "Image processing job scheduled";

/// Analyse an image inline and return the processed record.
pub async fn process_image(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> Response {
    let input = match dto::parse_process_image_request(&body) {
        Ok(input) => input,
        Err(e) => return errors::validation_error(e),
    };

    match services.pipeline().process(&input).await {
        Ok(image) => (StatusCode::OK, Json(image)).into_response(),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}

/// Create a pending job and queue it; the result is observed via `GET /jobs/:id`.
pub async fn process_image_async(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<TraceContext>,
    body: Bytes,
) -> Response {
    let input = match dto::parse_process_image_request(&body) {
        Ok(input) => input,
        Err(e) => return errors::validation_error(e),
    };

    match services.scheduler().schedule(&ctx, input).await {
        Ok(job) => {
            info!(job_id = %job.id(), "accepted async image request");
            (
                StatusCode::OK,
                Json(dto::ScheduledJobResponse {
                    message: SCHEDULED_MESSAGE,
                    job_id: job.id().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => errors::schedule_error_to_response(e),
    }
}

pub async fn get_image_by_url(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ImageQuery>,
) -> Response {
    let Some(url) = query.url.filter(|u| !u.is_empty()) else {
        let mut errors = ValidationErrors::new();
        errors.push("url", "Required");
        return errors::validation_error(errors);
    };

    match services.pipeline().find_by_url(&url).await {
        Ok(Some(image)) => (StatusCode::OK, Json(image)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "image not found"),
        Err(e) => errors::pipeline_error_to_response(e),
    }
}
