// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ingestion pipeline
//!
//! An item is embedded into every vector space of its collection whose
//! modalities intersect the item's. Spaces are attempted concurrently and
//! fail independently; the item is persisted with whatever succeeded, or not
//! at all if nothing did.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::RagError;
use crate::registry::CollectionRegistry;
use crate::storage::VectorStore;
use crate::types::{IngestResult, Item, SpaceFailure, VectorSpace};
use crate::vectorizer::{AdapterRegistry, EmbedPurpose};
use crate::vision::{inspect_image, Captioner};

/// Maximum serialised metadata size per item (10KB)
pub const MAX_METADATA_SIZE: usize = 10 * 1024;

/// Per-call ingestion options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOptions {
    /// Restrict the call to these spaces; others keep their stored vectors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spaces: Option<Vec<String>>,
}

pub struct IngestionPipeline {
    registry: Arc<CollectionRegistry>,
    adapters: Arc<AdapterRegistry>,
    store: Arc<dyn VectorStore>,
    captioner: Option<Arc<dyn Captioner>>,
    max_concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        adapters: Arc<AdapterRegistry>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            registry,
            adapters,
            store,
            captioner: None,
            max_concurrency: 4,
        }
    }

    pub fn with_captioner(mut self, captioner: Arc<dyn Captioner>) -> Self {
        self.captioner = Some(captioner);
        self
    }

    /// Items embedded at once during batch ingestion (minimum 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub async fn ingest(&self, collection: &str, item: Item) -> Result<IngestResult, RagError> {
        self.ingest_with(collection, item, &IngestOptions::default())
            .await
    }

    pub async fn ingest_with(
        &self,
        collection: &str,
        mut item: Item,
        options: &IngestOptions,
    ) -> Result<IngestResult, RagError> {
        let collection = self.registry.get_collection(collection)?;
        validate_item(&item)?;
        self.caption_if_needed(&mut item).await;

        let touched: Vec<&VectorSpace> = match &options.spaces {
            None => collection.vector_spaces.iter().collect(),
            Some(names) => names
                .iter()
                .map(|name| {
                    collection.space(name).ok_or_else(|| {
                        RagError::NotFound(format!(
                            "vector space '{}' in collection '{}'",
                            name, collection.name
                        ))
                    })
                })
                .collect::<Result<_, _>>()?,
        };

        let available = item.modalities();
        let content = item.content();
        let mut applicable = Vec::new();
        let mut skipped_spaces = Vec::new();
        for space in touched.iter().copied() {
            let overlap = space.applicable(&available);
            if overlap.is_empty() {
                skipped_spaces.push(space.name.clone());
            } else {
                applicable.push((space, content.restricted_to(&overlap)));
            }
        }

        let attempts = applicable.iter().map(|(space, restricted)| async move {
            let outcome = self
                .adapters
                .embed(&space.backend_id, restricted, EmbedPurpose::Document)
                .await
                .and_then(|vector| {
                    if vector.len() == space.dimensionality {
                        Ok(vector)
                    } else {
                        Err(RagError::DimensionMismatch {
                            target: format!("space '{}'", space.name),
                            expected: space.dimensionality,
                            actual: vector.len(),
                        })
                    }
                });
            (*space, outcome)
        });

        let mut vectors = BTreeMap::new();
        let mut succeeded_spaces = Vec::new();
        let mut failed_spaces = Vec::new();
        for (space, outcome) in join_all(attempts).await {
            match outcome {
                Ok(vector) => {
                    succeeded_spaces.push(space.name.clone());
                    vectors.insert(space.name.clone(), vector);
                }
                Err(e) => {
                    warn!(
                        "Item '{}' failed for space '{}' in '{}': {}",
                        item.id, space.name, collection.name, e
                    );
                    failed_spaces.push(SpaceFailure {
                        space_name: space.name.clone(),
                        error_code: e.error_code().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if succeeded_spaces.is_empty() {
            return Err(RagError::IngestFailed {
                item_id: item.id,
                reasons: failed_spaces,
            });
        }

        let touched_names: Vec<String> = touched.iter().map(|s| s.name.clone()).collect();
        self.store
            .upsert(&collection.name, &item, &vectors, &touched_names)
            .await?;

        if failed_spaces.is_empty() {
            debug!(
                "Ingested '{}' into '{}' ({} spaces)",
                item.id,
                collection.name,
                succeeded_spaces.len()
            );
        } else {
            info!(
                "Ingested '{}' into '{}' partially: {} succeeded, {} failed",
                item.id,
                collection.name,
                succeeded_spaces.len(),
                failed_spaces.len()
            );
        }

        Ok(IngestResult {
            item_id: item.id,
            succeeded_spaces,
            failed_spaces,
            skipped_spaces,
        })
    }

    /// Ingest items independently; results keep input order
    pub async fn ingest_batch(
        &self,
        collection: &str,
        items: Vec<Item>,
        options: &IngestOptions,
    ) -> Vec<Result<IngestResult, RagError>> {
        let total = items.len();
        let results: Vec<_> = stream::iter(items)
            .map(|item| self.ingest_with(collection, item, options))
            .buffered(self.max_concurrency)
            .collect()
            .await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "Batch ingestion into '{}': {}/{} items stored",
            collection,
            total - failed,
            total
        );
        results
    }

    async fn caption_if_needed(&self, item: &mut Item) {
        let Some(captioner) = &self.captioner else {
            return;
        };
        let Some(image) = item.image.as_deref().filter(|i| !i.is_empty()) else {
            return;
        };
        if item.text_representation().is_some() {
            return;
        }
        match captioner.caption(image).await {
            Ok(caption) => {
                debug!("Captioned image item '{}' via {}", item.id, captioner.name());
                item.metadata.insert("caption".to_string(), caption);
            }
            Err(e) => warn!("Captioning item '{}' failed: {}", item.id, e),
        }
    }
}

/// Reject items violating the item invariants before any backend call
pub fn validate_item(item: &Item) -> Result<(), RagError> {
    if item.id.trim().is_empty() {
        return Err(RagError::InvalidItem("item id must not be empty".into()));
    }
    if item.modalities().is_empty() {
        return Err(RagError::InvalidItem(format!(
            "item '{}' must carry text, an image, or both",
            item.id
        )));
    }
    let metadata_size = serde_json::to_string(&item.metadata)
        .map(|s| s.len())
        .unwrap_or(usize::MAX);
    if metadata_size > MAX_METADATA_SIZE {
        return Err(RagError::InvalidItem(format!(
            "metadata too large: {} bytes (max: {} bytes)",
            metadata_size, MAX_METADATA_SIZE
        )));
    }
    if let Some(image) = item.image.as_deref().filter(|i| !i.is_empty()) {
        inspect_image(image)
            .map_err(|e| RagError::InvalidItem(format!("item '{}': {}", item.id, e)))?;
    }
    Ok(())
}
