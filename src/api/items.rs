// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Item ingestion and lookup endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::errors::{ApiError, ErrorResponse};
use super::http_server::AppState;
use crate::ingest::IngestOptions;
use crate::types::{IngestResult, Item};

/// Largest batch accepted by POST .../items/batch
pub const MAX_BATCH_ITEMS: usize = 256;

/// Body for POST /v1/collections/:name/items
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestApiRequest {
    pub item: Item,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spaces: Option<Vec<String>>,
}

/// Body for POST /v1/collections/:name/items/batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBatchRequest {
    pub items: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spaces: Option<Vec<String>>,
}

/// Per-item outcome of a batch; exactly one of `result` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemOutcome {
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<IngestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestBatchResponse {
    pub stored: usize,
    pub failed: usize,
    pub results: Vec<BatchItemOutcome>,
}

/// POST /v1/collections/:name/items
pub async fn ingest_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<IngestApiRequest>,
) -> Result<Json<IngestResult>, ApiError> {
    let options = IngestOptions {
        spaces: request.spaces,
    };
    let result = state
        .pipeline
        .ingest_with(&name, request.item, &options)
        .await?;
    Ok(Json(result))
}

/// POST /v1/collections/:name/items/batch
pub async fn ingest_batch_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<IngestBatchRequest>,
) -> Result<Json<IngestBatchResponse>, ApiError> {
    if request.items.is_empty() {
        return Err(ApiError::InvalidRequest("items must not be empty".into()));
    }
    if request.items.len() > MAX_BATCH_ITEMS {
        return Err(ApiError::InvalidRequest(format!(
            "batch too large (max {} items)",
            MAX_BATCH_ITEMS
        )));
    }

    let ids: Vec<String> = request.items.iter().map(|i| i.id.clone()).collect();
    let options = IngestOptions {
        spaces: request.spaces,
    };
    let outcomes = state
        .pipeline
        .ingest_batch(&name, request.items, &options)
        .await?;

    let results: Vec<BatchItemOutcome> = ids
        .into_iter()
        .zip(outcomes)
        .map(|(item_id, outcome)| match outcome {
            Ok(result) => BatchItemOutcome {
                item_id,
                result: Some(result),
                error: None,
            },
            Err(e) => BatchItemOutcome {
                item_id,
                result: None,
                error: Some(ApiError::from(e).to_response()),
            },
        })
        .collect();
    let failed = results.iter().filter(|r| r.error.is_some()).count();
    Ok(Json(IngestBatchResponse {
        stored: results.len() - failed,
        failed,
        results,
    }))
}

/// GET /v1/collections/:name/items/:id
pub async fn get_item_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<Json<Item>, ApiError> {
    Ok(Json(state.pipeline.get_item(&name, &id).await?))
}

/// DELETE /v1/collections/:name/items/:id
pub async fn delete_item_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    if state.pipeline.delete_item(&name, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("item '{}' in '{}'", id, name)))
    }
}
