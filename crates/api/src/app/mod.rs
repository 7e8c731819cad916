//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/analyzer/queue wiring and the queue consumer
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request validation and response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::trace_middleware))
                .layer(Extension(services)),
        )
}
