// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the multimodal RAG node

/// Full version string with feature description
pub const VERSION: &str = "v0.3.0-multimodal-rag-2025-10-17";

/// Semantic version number
pub const VERSION_NUMBER: &str = "0.3.0";

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 3;
pub const VERSION_PATCH: u32 = 0;

/// Build date
pub const BUILD_DATE: &str = "2025-10-17";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "multi-space-collections",
    "text-image-ingestion",
    "partitioned-search",
    "rank-merge",
    "reranking",
    "grounded-answers",
    "citations",
    "image-captioning",
    "weaviate-store",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Multimodal RAG Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
