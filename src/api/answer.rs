// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Rerank, answer and one-shot ask endpoints

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::errors::ApiError;
use super::http_server::AppState;
use crate::errors::RagError;
use crate::query::{MergeMode, SearchRequest, DEFAULT_TOP_K, MAX_QUERY_CHARS};
use crate::rerank::RerankOutcome;
use crate::types::{base64_bytes, ItemContent, MetadataFilter, QueryResult};

/// Body for POST /v1/collections/:name/rerank
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankApiRequest {
    pub query: String,
    pub candidates: Vec<QueryResult>,
}

/// Body for POST /v1/collections/:name/answer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerApiRequest {
    pub question: String,
    /// Ranked candidates, best first
    pub retrieved: Vec<QueryResult>,
}

/// Body for POST /v1/collections/:name/ask
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskApiRequest {
    pub question: String,

    /// Search by this image instead of the question text
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub image: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spaces: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    #[serde(default)]
    pub filters: MetadataFilter,

    #[serde(default)]
    pub merge: MergeMode,
}

impl AskApiRequest {
    fn search_request(&self) -> SearchRequest {
        let content = match &self.image {
            Some(image) => ItemContent::image(image.clone()),
            None => ItemContent::text(self.question.clone()),
        };
        SearchRequest {
            content,
            target_spaces: self.spaces.clone(),
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            filters: self.filters.clone(),
            min_score: None,
            merge: self.merge,
        }
    }
}

fn validate_question(question: &str) -> Result<(), ApiError> {
    if question.trim().is_empty() {
        return Err(ApiError::InvalidRequest("question must not be empty".into()));
    }
    if question.chars().count() > MAX_QUERY_CHARS {
        return Err(ApiError::InvalidRequest(format!(
            "question too long (max {} characters)",
            MAX_QUERY_CHARS
        )));
    }
    Ok(())
}

/// NoContext is an expected outcome, not a failure
fn no_context_response() -> Response {
    Json(json!({
        "noContext": true,
        "message": RagError::NoContext.user_message(),
    }))
    .into_response()
}

/// POST /v1/collections/:name/rerank
pub async fn rerank_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<RerankApiRequest>,
) -> Result<Json<RerankOutcome>, ApiError> {
    validate_question(&request.query)?;
    let outcome = state
        .pipeline
        .rerank(&name, &request.query, request.candidates)
        .await?;
    Ok(Json(outcome))
}

/// POST /v1/collections/:name/answer
pub async fn answer_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<AnswerApiRequest>,
) -> Result<Response, ApiError> {
    validate_question(&request.question)?;
    match state
        .pipeline
        .answer(&name, &request.question, &request.retrieved)
        .await
    {
        Ok(answer) => Ok(Json(answer).into_response()),
        Err(RagError::NoContext) => Ok(no_context_response()),
        Err(e) => Err(e.into()),
    }
}

/// POST /v1/collections/:name/ask
///
/// Search, rerank and answer in one call.
pub async fn ask_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<AskApiRequest>,
) -> Result<Response, ApiError> {
    validate_question(&request.question)?;
    match state
        .pipeline
        .ask(&name, &request.question, &request.search_request())
        .await
    {
        Ok(response) => {
            info!(
                "Answered question on '{}' from {} source(s)",
                name,
                response.answer.context_items.len()
            );
            Ok(Json(response).into_response())
        }
        Err(RagError::NoContext) => Ok(no_context_response()),
        Err(e) => Err(e.into()),
    }
}
