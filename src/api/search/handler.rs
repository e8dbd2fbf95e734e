// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search API endpoint handlers

use axum::{
    extract::{Path, State},
    Json,
};
use std::time::Instant;
use tracing::debug;

use super::request::SearchApiRequest;
use super::response::SearchApiResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;

/// POST /v1/collections/:name/search
///
/// # Errors
/// - 400: empty query, query modality matches no target space, bad topK
/// - 404: unknown collection or target space
/// - 503: every resolved space failed
pub async fn search_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SearchApiRequest>,
) -> Result<Json<SearchApiResponse>, ApiError> {
    let started = Instant::now();
    let request = request.into_search_request();
    debug!("Search on '{}' (top_k={}, merge={:?})", name, request.top_k, request.merge);
    let response = state.pipeline.search(&name, &request).await?;
    Ok(Json(SearchApiResponse::new(
        response,
        started.elapsed().as_millis() as u64,
    )))
}

/// POST /v1/collections/:name/compare
///
/// Queries every compatible space and returns one list per space.
pub async fn compare_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SearchApiRequest>,
) -> Result<Json<SearchApiResponse>, ApiError> {
    let started = Instant::now();
    let response = state
        .pipeline
        .compare(&name, &request.into_search_request())
        .await?;
    Ok(Json(SearchApiResponse::new(
        response,
        started.elapsed().as_millis() as u64,
    )))
}
