// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search API response types

use serde::{Deserialize, Serialize};

use crate::query::SearchResponse;

/// Response body for search and compare
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchApiResponse {
    #[serde(flatten)]
    pub response: SearchResponse,

    /// Number of spaces that returned results without error
    pub succeeded_spaces: usize,

    /// Time taken for the whole request in milliseconds
    pub search_time_ms: u64,
}

impl SearchApiResponse {
    pub fn new(response: SearchResponse, search_time_ms: u64) -> Self {
        Self {
            succeeded_spaces: response.per_space.iter().filter(|s| s.succeeded()).count(),
            response,
            search_time_ms,
        }
    }
}
