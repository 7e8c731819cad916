use axum::{
    routing::{get, post},
    Router,
};

pub mod images;
pub mod jobs;
pub mod system;

/// Router for the intake and query endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/process-image", post(images::process_image))
        .route("/process-image-async", post(images::process_image_async))
        .route("/images", get(images::get_image_by_url))
        .route("/jobs/:id", get(jobs::get_job))
}
