// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multimodal query engine
//!
//! A query (text, image, or both) is resolved against one or more vector
//! spaces of a collection, embedded per space through that space's adapter,
//! and searched per space concurrently. Results stay partitioned by space;
//! a single ranking is produced only on request, by rank merge.

pub mod merge;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::errors::RagError;
use crate::registry::CollectionRegistry;
use crate::retry::with_deadline;
use crate::storage::VectorStore;
use crate::types::{
    describe_modalities, sort_by_score, ItemContent, MetadataFilter, QueryResult, SpaceFailure,
    VectorSpace,
};
use crate::vectorizer::{AdapterRegistry, EmbedPurpose};
use crate::vision::inspect_image;

pub use merge::{rank_merge, MergedResult};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 100;
pub const MAX_QUERY_CHARS: usize = 2000;

/// How results from several spaces are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// One ranked list per space (default)
    #[default]
    Partitioned,
    /// Additionally merge all lists by mean rank
    Rank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub content: ItemContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_spaces: Option<Vec<String>>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: MetadataFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
    #[serde(default)]
    pub merge: MergeMode,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl SearchRequest {
    pub fn new(content: ItemContent) -> Self {
        Self {
            content,
            target_spaces: None,
            top_k: DEFAULT_TOP_K,
            filters: MetadataFilter::new(),
            min_score: None,
            merge: MergeMode::Partitioned,
        }
    }

    pub fn text(query: impl Into<String>) -> Self {
        Self::new(ItemContent::text(query))
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self::new(ItemContent::image(bytes))
    }

    pub fn with_spaces<S: Into<String>>(mut self, spaces: impl IntoIterator<Item = S>) -> Self {
        self.target_spaces = Some(spaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn merged(mut self) -> Self {
        self.merge = MergeMode::Rank;
        self
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(RagError::InvalidRequest(format!(
                "topK must be between 1 and {}",
                MAX_TOP_K
            )));
        }
        if let Some(text) = &self.content.text {
            if text.chars().count() > MAX_QUERY_CHARS {
                return Err(RagError::InvalidRequest(format!(
                    "query text too long (max {} characters)",
                    MAX_QUERY_CHARS
                )));
            }
        }
        if let Some(image) = self.content.image.as_deref().filter(|i| !i.is_empty()) {
            inspect_image(image).map_err(|e| RagError::InvalidRequest(format!("query image: {}", e)))?;
        }
        if let Some(min) = self.min_score {
            if !min.is_finite() {
                return Err(RagError::InvalidRequest("minScore must be finite".into()));
            }
        }
        Ok(())
    }
}

/// Results from one vector space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceResults {
    pub space_name: String,
    pub backend_id: String,
    pub results: Vec<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SpaceFailure>,
    pub elapsed_ms: u64,
}

impl SpaceResults {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub collection: String,
    /// One entry per resolved space, in collection declaration order
    pub per_space: Vec<SpaceResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<Vec<MergedResult>>,
}

impl SearchResponse {
    pub fn space(&self, name: &str) -> Option<&SpaceResults> {
        self.per_space.iter().find(|s| s.space_name == name)
    }

    /// A single candidate list: the merged ranking if requested, else the
    /// first space that succeeded
    pub fn primary_results(&self) -> Vec<QueryResult> {
        match &self.merged {
            Some(merged) => merged.iter().map(|m| m.best.clone()).collect(),
            None => self
                .per_space
                .iter()
                .find(|s| s.succeeded())
                .map(|s| s.results.clone())
                .unwrap_or_default(),
        }
    }
}

pub struct QueryEngine {
    registry: Arc<CollectionRegistry>,
    adapters: Arc<AdapterRegistry>,
    store: Arc<dyn VectorStore>,
    store_timeout: Duration,
}

impl QueryEngine {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        adapters: Arc<AdapterRegistry>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            registry,
            adapters,
            store,
            store_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub async fn search(&self, collection: &str, request: &SearchRequest) -> Result<SearchResponse, RagError> {
        request.validate()?;
        let collection = self.registry.get_collection(collection)?;
        let spaces = resolve_spaces(&collection.vector_spaces, request)?;

        let searches = spaces.iter().map(|space| self.search_space(&collection.name, space, request));
        let outcomes = join_all(searches).await;

        let mut per_space = Vec::with_capacity(outcomes.len());
        let mut first_error = None;
        for (space, (outcome, elapsed_ms)) in spaces.iter().zip(outcomes) {
            let (results, error) = match outcome {
                Ok(results) => (results, None),
                Err(e) => {
                    warn!("Search in space '{}' failed: {}", space.name, e);
                    let failure = SpaceFailure {
                        space_name: space.name.clone(),
                        error_code: e.error_code().to_string(),
                        reason: e.to_string(),
                    };
                    first_error.get_or_insert(e);
                    (Vec::new(), Some(failure))
                }
            };
            per_space.push(SpaceResults {
                space_name: space.name.clone(),
                backend_id: space.backend_id.clone(),
                results,
                error,
                elapsed_ms,
            });
        }

        if per_space.iter().all(|s| !s.succeeded()) {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let merged = match request.merge {
            MergeMode::Partitioned => None,
            MergeMode::Rank => {
                let lists: Vec<(String, Vec<QueryResult>)> = per_space
                    .iter()
                    .filter(|s| s.succeeded())
                    .map(|s| (s.space_name.clone(), s.results.clone()))
                    .collect();
                Some(rank_merge(&lists, request.top_k))
            }
        };

        debug!(
            "Searched '{}' across {} space(s)",
            collection.name,
            per_space.len()
        );
        Ok(SearchResponse {
            collection: collection.name.clone(),
            per_space,
            merged,
        })
    }

    async fn search_space(
        &self,
        collection: &str,
        space: &VectorSpace,
        request: &SearchRequest,
    ) -> (Result<Vec<QueryResult>, RagError>, u64) {
        let start = Instant::now();
        let outcome: Result<Vec<QueryResult>, RagError> = async {
            let vector = self
                .adapters
                .embed(&space.backend_id, &request.content, EmbedPurpose::Query)
                .await?;
            if vector.len() != space.dimensionality {
                return Err(RagError::DimensionMismatch {
                    target: format!("space '{}'", space.name),
                    expected: space.dimensionality,
                    actual: vector.len(),
                });
            }
            let timeout = self.store_timeout;
            let hits = with_deadline(
                timeout,
                self.store
                    .search(collection, space, &vector, request.top_k, &request.filters),
                || RagError::storage(format!("search timed out after {}ms", timeout.as_millis()), true),
            )
            .await?;

            let mut results: Vec<QueryResult> = hits
                .into_iter()
                .filter(|h| request.min_score.map_or(true, |min| h.score >= min))
                .map(|h| QueryResult::new(h.item_id, h.score, space.name.clone()))
                .collect();
            sort_by_score(&mut results);
            results.truncate(request.top_k);
            Ok(results)
        }
        .await;
        (outcome, start.elapsed().as_millis() as u64)
    }
}

/// Concrete list of spaces to query, in declaration order
fn resolve_spaces(spaces: &[VectorSpace], request: &SearchRequest) -> Result<Vec<VectorSpace>, RagError> {
    let query = request.content.modalities();
    if query.is_empty() {
        return Err(RagError::InvalidModality("query content is empty".into()));
    }

    let candidates: Vec<&VectorSpace> = match &request.target_spaces {
        Some(names) if !names.is_empty() => {
            for name in names {
                if !spaces.iter().any(|s| &s.name == name) {
                    return Err(RagError::NotFound(format!("vector space '{}'", name)));
                }
            }
            spaces.iter().filter(|s| names.contains(&s.name)).collect()
        }
        _ => spaces.iter().collect(),
    };

    let resolved: Vec<VectorSpace> = candidates
        .into_iter()
        .filter(|s| s.accepts_query(&query))
        .cloned()
        .collect();
    if resolved.is_empty() {
        return Err(RagError::InvalidModality(format!(
            "no target space supports {} queries",
            describe_modalities(&query)
        )));
    }
    Ok(resolved)
}
