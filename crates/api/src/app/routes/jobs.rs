use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use mediaconv_core::{JobId, ValidationErrors};

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let job_id: JobId = match id.parse() {
        Ok(id) => id,
        Err(_) => {
            let mut errors = ValidationErrors::new();
            errors.push("id", "Invalid job id");
            return errors::validation_error(errors);
        }
    };

    match services.jobs().get(job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
