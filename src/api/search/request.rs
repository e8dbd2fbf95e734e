// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Search API request types

use serde::{Deserialize, Serialize};

use crate::query::{MergeMode, SearchRequest, DEFAULT_TOP_K};
use crate::types::{base64_bytes, ItemContent, MetadataFilter};

/// Request body for POST /v1/collections/:name/search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchApiRequest {
    /// Text query (max 2000 chars)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Base64 image query
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub image: Option<Vec<u8>>,

    /// Restrict to these vector spaces (default: every compatible space)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spaces: Option<Vec<String>>,

    /// Results per space (1-100, default 5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// Exact-match metadata filters
    #[serde(default)]
    pub filters: MetadataFilter,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    /// `partitioned` (default) or `rank`
    #[serde(default)]
    pub merge: MergeMode,
}

impl SearchApiRequest {
    pub fn into_search_request(self) -> SearchRequest {
        SearchRequest {
            content: ItemContent {
                text: self.query,
                image: self.image,
            },
            target_spaces: self.spaces,
            top_k: self.top_k.unwrap_or(DEFAULT_TOP_K),
            filters: self.filters,
            min_score: self.min_score,
            merge: self.merge,
        }
    }
}
