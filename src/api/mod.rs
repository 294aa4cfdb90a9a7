use axum::{Router, routing::post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::coordinator::ExtractionCoordinator;

pub mod handlers;
pub mod models;

pub fn create_router(coordinator: Arc<ExtractionCoordinator>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/search", post(handlers::search_handler))
        .route("/api/ad", post(handlers::ad_handler))
        .with_state(coordinator)
        .layer(cors)
}
