// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Collection administration endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::errors::ApiError;
use super::http_server::AppState;
use crate::registry::Creation;
use crate::types::{Collection, PropertySchema, VectorSpace};

/// Body for POST /v1/collections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<PropertySchema>,
    pub vector_spaces: Vec<VectorSpace>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionsResponse {
    pub collections: Vec<Collection>,
}

/// POST /v1/collections
///
/// 201 when created, 200 when an identical definition already existed,
/// 409 on a conflicting redefinition.
pub async fn create_collection_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateCollectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (collection, creation) = state
        .pipeline
        .create_collection(
            &request.name,
            request.description,
            request.schema.unwrap_or_default(),
            request.vector_spaces,
        )
        .await?;
    let status = match creation {
        Creation::Created => {
            info!("Collection '{}' created via API", collection.name);
            StatusCode::CREATED
        }
        Creation::Unchanged => StatusCode::OK,
    };
    Ok((status, Json(collection.as_ref().clone())))
}

/// GET /v1/collections
pub async fn list_collections_handler(State(state): State<AppState>) -> Json<CollectionsResponse> {
    Json(CollectionsResponse {
        collections: state
            .pipeline
            .list_collections()
            .iter()
            .map(|c| c.as_ref().clone())
            .collect(),
    })
}

/// GET /v1/collections/:name
pub async fn get_collection_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Collection>, ApiError> {
    let collection = state.pipeline.get_collection(&name)?;
    Ok(Json(collection.as_ref().clone()))
}

/// DELETE /v1/collections/:name
pub async fn delete_collection_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.pipeline.delete_collection(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/collections/:name/spaces
pub async fn add_space_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(space): Json<VectorSpace>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state.pipeline.add_vector_space(&name, space).await?;
    Ok((StatusCode::CREATED, Json(updated.as_ref().clone())))
}
