// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Storage collaborator interface
//!
//! The store owns items and their per-space vectors. It exposes collection
//! create/drop with named vector spaces, upsert with per-space vectors, ANN
//! search within one named space, and exact delete by id.

pub mod memory;
pub mod weaviate;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::errors::RagError;
use crate::types::{Collection, Item, MetadataFilter, VectorSpace};

pub use memory::InMemoryVectorStore;
pub use weaviate::{WeaviateConfig, WeaviateStore};

/// One similarity hit within one vector space (higher score is better)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub item_id: String,
    pub score: f32,
}

/// An item together with the vectors stored for it, keyed by space name
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub item: Item,
    pub vectors: BTreeMap<String, Vec<f32>>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create storage for a collection and its spaces; existing storage is kept
    async fn ensure_collection(&self, collection: &Collection) -> Result<(), RagError>;

    /// Remove a collection and everything stored in it
    async fn drop_collection(&self, collection: &str) -> Result<(), RagError>;

    /// Insert or replace an item.
    ///
    /// Spaces listed in `touched_spaces` are fully replaced: a vector in
    /// `vectors` is written, a touched space without one is cleared. Spaces
    /// not touched keep whatever vector they held before.
    async fn upsert(
        &self,
        collection: &str,
        item: &Item,
        vectors: &BTreeMap<String, Vec<f32>>,
        touched_spaces: &[String],
    ) -> Result<(), RagError>;

    /// Top `top_k` items by similarity within one space, filtered by metadata.
    /// Ties are broken by item id ascending.
    async fn search(
        &self,
        collection: &str,
        space: &VectorSpace,
        query: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorHit>, RagError>;

    async fn get(&self, collection: &str, item_id: &str) -> Result<Option<StoredItem>, RagError>;

    /// Exact delete by id; returns whether the item existed
    async fn delete(&self, collection: &str, item_id: &str) -> Result<bool, RagError>;

    async fn count(&self, collection: &str) -> Result<usize, RagError>;

    fn name(&self) -> &'static str;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Resolves item ids referenced by query results into items
#[async_trait]
pub trait ItemLookup: Send + Sync {
    async fn lookup(&self, item_id: &str) -> Result<Option<Item>, RagError>;
}

#[async_trait]
impl ItemLookup for HashMap<String, Item> {
    async fn lookup(&self, item_id: &str) -> Result<Option<Item>, RagError> {
        Ok(self.get(item_id).cloned())
    }
}

/// Lookup over one collection of a store
pub struct CollectionItems {
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl CollectionItems {
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl ItemLookup for CollectionItems {
    async fn lookup(&self, item_id: &str) -> Result<Option<Item>, RagError> {
        Ok(self
            .store
            .get(&self.collection, item_id)
            .await?
            .map(|stored| stored.item))
    }
}

/// Sort hits by score descending then id ascending, keeping `top_k`
pub fn rank_hits(hits: &mut Vec<VectorHit>, top_k: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    hits.truncate(top_k);
}
