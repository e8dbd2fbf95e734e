// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::RagError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_type: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug)]
pub enum ApiError {
    Rag(RagError),
    InvalidRequest(String),
    NotFound(String),
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        ApiError::Rag(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rag(err) => match err {
                RagError::NotFound(_) => StatusCode::NOT_FOUND,
                RagError::AlreadyExists(_) | RagError::SchemaConflict(_) => StatusCode::CONFLICT,
                RagError::InvalidItem(_)
                | RagError::InvalidRequest(_)
                | RagError::InvalidModality(_)
                | RagError::UnsupportedModality { .. }
                | RagError::DimensionMismatch { .. }
                | RagError::UnknownBackend(_) => StatusCode::BAD_REQUEST,
                RagError::IngestFailed { .. } | RagError::NoContext => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                RagError::BackendRejected { .. } => StatusCode::BAD_GATEWAY,
                RagError::BackendUnavailable { .. }
                | RagError::GenerationUnavailable { .. }
                | RagError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                RagError::Storage { retryable, .. } => {
                    if *retryable {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }
            },
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, code, message, details) = match self {
            ApiError::InvalidRequest(msg) => ("invalid_request", "INVALID_REQUEST", msg.clone(), None),
            ApiError::NotFound(msg) => ("not_found", "NOT_FOUND", msg.clone(), None),
            ApiError::Rag(err) => {
                let details = match err {
                    RagError::IngestFailed { reasons, .. } => {
                        let mut details = HashMap::new();
                        details.insert(
                            "failedSpaces".to_string(),
                            serde_json::to_value(reasons).unwrap_or_default(),
                        );
                        Some(details)
                    }
                    RagError::GenerationUnavailable { attempts, .. } => {
                        let mut details = HashMap::new();
                        details.insert("attempts".to_string(), (*attempts).into());
                        Some(details)
                    }
                    _ => None,
                };
                let error_type = match self.status_code() {
                    StatusCode::NOT_FOUND => "not_found",
                    StatusCode::CONFLICT => "conflict",
                    StatusCode::BAD_REQUEST => "invalid_request",
                    StatusCode::UNPROCESSABLE_ENTITY => "unprocessable",
                    StatusCode::BAD_GATEWAY => "backend_rejected",
                    StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
                    _ => "internal_error",
                };
                (error_type, err.error_code(), err.user_message(), details)
            }
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            code: code.to_string(),
            message,
            details,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Rag(err) => write!(f, "{}", err),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, Json(self.to_response())).into_response()
    }
}
