// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Collection registry
//!
//! Read-mostly schema cache shared by every ingestion and query call.
//! Mutations build a new map and swap the `Arc`, so readers always see a
//! complete snapshot.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::errors::RagError;
use crate::types::{describe_modalities, Collection, PropertySchema, VectorSpace};
use crate::vectorizer::AdapterRegistry;

type Snapshot = Arc<HashMap<String, Arc<Collection>>>;

/// Whether `create_collection` created a new entry or matched an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    Created,
    Unchanged,
}

pub struct CollectionRegistry {
    adapters: Arc<AdapterRegistry>,
    collections: RwLock<Snapshot>,
}

impl CollectionRegistry {
    pub fn new(adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            adapters,
            collections: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    fn snapshot(&self) -> Snapshot {
        match self.collections.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Apply `change` to a copy of the current map and publish it atomically
    fn update<T>(
        &self,
        change: impl FnOnce(&mut HashMap<String, Arc<Collection>>) -> Result<T, RagError>,
    ) -> Result<T, RagError> {
        let mut guard = self
            .collections
            .write()
            .map_err(|_| RagError::Config("collection registry lock poisoned".into()))?;
        let mut next = (**guard).clone();
        let result = change(&mut next)?;
        *guard = Arc::new(next);
        Ok(result)
    }

    /// Register a collection. Re-creating with an identical definition is a
    /// no-op; a different definition under the same name is a conflict.
    pub fn create_collection(
        &self,
        name: &str,
        description: Option<String>,
        schema: PropertySchema,
        vector_spaces: Vec<VectorSpace>,
    ) -> Result<(Arc<Collection>, Creation), RagError> {
        let candidate = Collection {
            name: name.to_string(),
            description,
            schema,
            vector_spaces,
        };
        self.validate(&candidate)?;

        self.update(|collections| {
            if let Some(existing) = collections.get(name) {
                if existing.same_definition(&candidate) {
                    return Ok((existing.clone(), Creation::Unchanged));
                }
                return Err(RagError::SchemaConflict(format!(
                    "collection '{}' already exists with a different definition",
                    name
                )));
            }
            // Storage class names are compared case-insensitively
            if let Some(existing) = collections.keys().find(|k| k.eq_ignore_ascii_case(name)) {
                return Err(RagError::AlreadyExists(format!(
                    "collection '{}' differs only in case from '{}'",
                    name, existing
                )));
            }
            let collection = Arc::new(candidate);
            collections.insert(name.to_string(), collection.clone());
            info!(
                "Created collection '{}' with spaces [{}]",
                name,
                collection.space_names().join(", ")
            );
            Ok((collection, Creation::Created))
        })
    }

    pub fn get_collection(&self, name: &str) -> Result<Arc<Collection>, RagError> {
        self.snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| RagError::NotFound(format!("collection '{}'", name)))
    }

    /// All collections sorted by name
    pub fn list_collections(&self) -> Vec<Arc<Collection>> {
        let mut all: Vec<_> = self.snapshot().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn delete_collection(&self, name: &str) -> Result<Arc<Collection>, RagError> {
        self.update(|collections| {
            collections
                .remove(name)
                .ok_or_else(|| RagError::NotFound(format!("collection '{}'", name)))
        })
    }

    /// Declare an additional vector space; existing spaces never change
    pub fn add_vector_space(&self, name: &str, space: VectorSpace) -> Result<Arc<Collection>, RagError> {
        self.validate_space(&space)?;
        self.update(|collections| {
            let current = collections
                .get(name)
                .ok_or_else(|| RagError::NotFound(format!("collection '{}'", name)))?;
            if current.space(&space.name).is_some() {
                return Err(RagError::AlreadyExists(format!(
                    "vector space '{}' in collection '{}'",
                    space.name, name
                )));
            }
            let mut next = (**current).clone();
            info!("Added vector space '{}' to collection '{}'", space.name, name);
            next.vector_spaces.push(space);
            let next = Arc::new(next);
            collections.insert(name.to_string(), next.clone());
            Ok(next)
        })
    }

    /// Undo an `add_vector_space` whose storage could not be provisioned.
    /// Only the named space is removed; concurrent additions are kept.
    pub(crate) fn remove_vector_space(&self, name: &str, space_name: &str) {
        let _ = self.update(|collections| {
            let Some(current) = collections.get(name) else {
                return Ok(());
            };
            if current.space(space_name).is_none() {
                return Ok(());
            }
            let mut next = (**current).clone();
            next.vector_spaces.retain(|s| s.name != space_name);
            collections.insert(name.to_string(), Arc::new(next));
            Ok(())
        });
    }

    /// Put back a collection removed by a failed storage operation
    pub(crate) fn restore(&self, collection: Arc<Collection>) -> Result<(), RagError> {
        self.update(|collections| {
            collections.insert(collection.name.clone(), collection);
            Ok(())
        })
    }

    /// Drop a just-created entry if storage could not be provisioned
    pub(crate) fn rollback_create(&self, name: &str) {
        let _ = self.update(|collections| {
            collections.remove(name);
            Ok(())
        });
    }

    fn validate(&self, collection: &Collection) -> Result<(), RagError> {
        if collection.name.trim().is_empty() {
            return Err(RagError::InvalidRequest("collection name must not be empty".into()));
        }
        if collection.vector_spaces.is_empty() {
            return Err(RagError::InvalidRequest(format!(
                "collection '{}' must declare at least one vector space",
                collection.name
            )));
        }
        let mut seen = BTreeSet::new();
        for space in &collection.vector_spaces {
            if !seen.insert(space.name.as_str()) {
                return Err(RagError::InvalidRequest(format!(
                    "duplicate vector space name '{}'",
                    space.name
                )));
            }
            self.validate_space(space)?;
        }
        Ok(())
    }

    fn validate_space(&self, space: &VectorSpace) -> Result<(), RagError> {
        if space.name.trim().is_empty() {
            return Err(RagError::InvalidRequest("vector space name must not be empty".into()));
        }
        if space.dimensionality == 0 {
            return Err(RagError::InvalidRequest(format!(
                "vector space '{}' must have positive dimensionality",
                space.name
            )));
        }
        if space.modalities_covered.is_empty() {
            return Err(RagError::InvalidRequest(format!(
                "vector space '{}' must cover at least one modality",
                space.name
            )));
        }

        let adapter = self.adapters.get(&space.backend_id)?;
        if let Some(modality) = space
            .modalities_covered
            .difference(adapter.modalities())
            .next()
        {
            return Err(RagError::UnsupportedModality {
                backend_id: space.backend_id.clone(),
                modality: format!(
                    "{} (space '{}' covers {})",
                    modality,
                    space.name,
                    describe_modalities(&space.modalities_covered)
                ),
            });
        }
        if adapter.dimensions() != space.dimensionality {
            return Err(RagError::DimensionMismatch {
                target: format!("space '{}'", space.name),
                expected: space.dimensionality,
                actual: adapter.dimensions(),
            });
        }
        Ok(())
    }
}
