use axum::{Json, extract::State, http::StatusCode};
use std::sync::Arc;
use std::time::Instant;

use crate::coordinator::ExtractionCoordinator;
use crate::data_models::{AdDetail, SearchResponse};
use crate::error::ExtractError;

use super::models::{AdRequest, SearchRequest};

pub async fn search_handler(
    State(coordinator): State<Arc<ExtractionCoordinator>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = Instant::now();

    if request.url.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "url cannot be empty".to_string()));
    }

    let response = coordinator
        .search(request.url.trim(), request.detail)
        .await
        .map_err(error_response)?;

    log::info!(
        "search {} answered in {}ms",
        request.url,
        start.elapsed().as_millis()
    );
    Ok(Json(response))
}

pub async fn ad_handler(
    State(coordinator): State<Arc<ExtractionCoordinator>>,
    Json(request): Json<AdRequest>,
) -> Result<Json<AdDetail>, (StatusCode, String)> {
    let detail = match (request.url, request.id, request.category) {
        (Some(url), _, _) => coordinator.ad_by_url(url.trim()).await,
        (None, Some(id), Some(category)) => coordinator.ad_by_id(id.trim(), category.trim()).await,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "expected either url, or id and category".to_string(),
            ));
        }
    };
    detail.map(Json).map_err(error_response)
}

pub fn error_response(e: ExtractError) -> (StatusCode, String) {
    let status = match &e {
        ExtractError::MalformedUrl { .. } => StatusCode::BAD_REQUEST,
        ExtractError::Structure { .. } | ExtractError::Fetch(_) => StatusCode::BAD_GATEWAY,
        ExtractError::InvalidSelector { .. } | ExtractError::Cancelled => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        log::error!("request failed: {:#}", e);
    }
    (status, e.to_string())
}
