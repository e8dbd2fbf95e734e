// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-process vector store
//!
//! Exact (brute force) similarity search per space, so results are fully
//! deterministic. Suitable for tests, development and small collections.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use super::{rank_hits, StoredItem, VectorHit, VectorStore};
use crate::errors::RagError;
use crate::types::{Collection, Item, MetadataFilter, VectorSpace};

#[derive(Default)]
struct CollectionData {
    dimensions: HashMap<String, usize>,
    items: HashMap<String, StoredItem>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::NotFound(format!("collection '{}' has no storage", collection))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, collection: &Collection) -> Result<(), RagError> {
        let mut collections = self.collections.write().await;
        let data = collections.entry(collection.name.clone()).or_default();
        for space in &collection.vector_spaces {
            data.dimensions
                .entry(space.name.clone())
                .or_insert(space.dimensionality);
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), RagError> {
        self.collections.write().await.remove(collection);
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        item: &Item,
        vectors: &BTreeMap<String, Vec<f32>>,
        touched_spaces: &[String],
    ) -> Result<(), RagError> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        for (space, vector) in vectors {
            let expected = data
                .dimensions
                .get(space)
                .copied()
                .ok_or_else(|| RagError::NotFound(format!("vector space '{}'", space)))?;
            if vector.len() != expected {
                return Err(RagError::DimensionMismatch {
                    target: format!("space '{}'", space),
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut merged = data
            .items
            .remove(&item.id)
            .map(|prev| prev.vectors)
            .unwrap_or_default();
        for space in touched_spaces {
            merged.remove(space);
        }
        merged.extend(vectors.iter().map(|(k, v)| (k.clone(), v.clone())));

        debug!(
            "Stored item '{}' in '{}' with {} vector(s)",
            item.id,
            collection,
            merged.len()
        );
        data.items.insert(
            item.id.clone(),
            StoredItem {
                item: item.clone(),
                vectors: merged,
            },
        );
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        space: &VectorSpace,
        query: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorHit>, RagError> {
        let collections = self.collections.read().await;
        let data = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut hits: Vec<VectorHit> = data
            .items
            .values()
            .filter(|stored| stored.item.matches_filter(filter))
            .filter_map(|stored| {
                stored.vectors.get(&space.name).map(|v| VectorHit {
                    item_id: stored.item.id.clone(),
                    score: space.distance_metric.similarity(query, v),
                })
            })
            .collect();
        rank_hits(&mut hits, top_k);
        Ok(hits)
    }

    async fn get(&self, collection: &str, item_id: &str) -> Result<Option<StoredItem>, RagError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|data| data.items.get(item_id))
            .cloned())
    }

    async fn delete(&self, collection: &str, item_id: &str) -> Result<bool, RagError> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        Ok(data.items.remove(item_id).is_some())
    }

    async fn count(&self, collection: &str) -> Result<usize, RagError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |d| d.items.len()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
