// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error taxonomy for the multimodal RAG pipeline
//!
//! Every top-level operation returns either a well-formed result or one of
//! these kinds. Transient kinds (`BackendUnavailable`, retryable storage
//! failures) are retried with bounded backoff at the adapter boundary;
//! permanent kinds propagate immediately.

use crate::types::SpaceFailure;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RagError {
    /// Content carries a modality the target backend does not support
    #[error("Backend {backend_id} does not support {modality} input")]
    UnsupportedModality { backend_id: String, modality: String },

    /// Backend could not be reached or timed out (retryable)
    #[error("Backend {backend_id} unavailable: {reason}")]
    BackendUnavailable { backend_id: String, reason: String },

    /// Backend refused this input (malformed input, quota exceeded)
    #[error("Backend {backend_id} rejected request: {reason}")]
    BackendRejected { backend_id: String, reason: String },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Every applicable vector space failed for this item
    #[error("Ingestion failed for item {item_id}: {}", summarize(.reasons))]
    IngestFailed {
        item_id: String,
        reasons: Vec<SpaceFailure>,
    },

    /// Query content matches no target space's modalities
    #[error("Invalid modality: {0}")]
    InvalidModality(String),

    #[error("Generation backend unavailable after {attempts} attempt(s): {reason}")]
    GenerationUnavailable { attempts: u32, reason: String },

    /// Retrieval produced nothing to ground an answer on
    #[error("No retrieved context to answer from")]
    NoContext,

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Dimension mismatch for {target}: expected {expected}, got {actual}")]
    DimensionMismatch {
        target: String,
        expected: usize,
        actual: usize,
    },

    #[error("Storage error: {reason}")]
    Storage { reason: String, retryable: bool },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn summarize(reasons: &[SpaceFailure]) -> String {
    if reasons.is_empty() {
        return "no vector space accepted the item".to_string();
    }
    reasons
        .iter()
        .map(|f| format!("{}: {}", f.space_name, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RagError {
    pub fn unavailable(backend_id: impl Into<String>, reason: impl Into<String>) -> Self {
        RagError::BackendUnavailable {
            backend_id: backend_id.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(backend_id: impl Into<String>, reason: impl Into<String>) -> Self {
        RagError::BackendRejected {
            backend_id: backend_id.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>, retryable: bool) -> Self {
        RagError::Storage {
            reason: reason.into(),
            retryable,
        }
    }

    /// Stable code for logs, metrics and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RagError::UnsupportedModality { .. } => "UNSUPPORTED_MODALITY",
            RagError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            RagError::BackendRejected { .. } => "BACKEND_REJECTED",
            RagError::UnknownBackend(_) => "UNKNOWN_BACKEND",
            RagError::AlreadyExists(_) => "ALREADY_EXISTS",
            RagError::SchemaConflict(_) => "SCHEMA_CONFLICT",
            RagError::NotFound(_) => "NOT_FOUND",
            RagError::IngestFailed { .. } => "INGEST_FAILED",
            RagError::InvalidModality(_) => "INVALID_MODALITY",
            RagError::GenerationUnavailable { .. } => "GENERATION_UNAVAILABLE",
            RagError::NoContext => "NO_CONTEXT",
            RagError::InvalidItem(_) => "INVALID_ITEM",
            RagError::InvalidRequest(_) => "INVALID_REQUEST",
            RagError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            RagError::Storage { .. } => "STORAGE_ERROR",
            RagError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::BackendUnavailable { .. } | RagError::GenerationUnavailable { .. } => true,
            RagError::Storage { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Get user-friendly error message for API responses
    pub fn user_message(&self) -> String {
        match self {
            RagError::BackendUnavailable { backend_id, .. } => {
                format!("Embedding backend '{}' is temporarily unavailable", backend_id)
            }
            RagError::GenerationUnavailable { .. } => {
                "Answer generation is temporarily unavailable".to_string()
            }
            RagError::IngestFailed { item_id, reasons } => format!(
                "Item '{}' could not be embedded into any vector space ({} failure(s))",
                item_id,
                reasons.len()
            ),
            RagError::NoContext => {
                "No matching items were retrieved, so no answer was generated".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Classification helpers shared by every HTTP-backed collaborator
pub(crate) mod http {
    use reqwest::StatusCode;

    /// Transport-level failures are always transient
    pub fn describe_transport(err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            err.to_string()
        }
    }

    /// 408, 429 and 5xx are worth retrying; other non-success statuses are not
    pub fn status_is_transient(status: StatusCode) -> bool {
        status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
    }

    /// Map a non-success response onto unavailable/rejected
    pub async fn classify_response(
        backend_id: &str,
        response: reqwest::Response,
    ) -> super::RagError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let reason = format!("HTTP {}: {}", status.as_u16(), truncate(&body, 300));
        if status_is_transient(status) {
            super::RagError::unavailable(backend_id, reason)
        } else {
            super::RagError::rejected(backend_id, reason)
        }
    }

    fn truncate(s: &str, max: usize) -> &str {
        match s.char_indices().nth(max) {
            Some((idx, _)) => &s[..idx],
            None => s,
        }
    }
}
