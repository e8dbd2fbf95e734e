// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vectorizer adapter trait and the registry that resolves `backend_id`s
//!
//! Adapters own every backend-specific concern (request shaping, auth,
//! response parsing). Ingestion and query code only ever see
//! `AdapterRegistry::embed(backend_id, ..)`.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::errors::RagError;
use crate::retry::{with_deadline, RetryPolicy};
use crate::types::{describe_modalities, ItemContent, Modality};

/// What an embedding is for; some backends embed documents and queries differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPurpose {
    Document,
    Query,
}

/// Converts raw content into a vector via a model or remote service
#[async_trait]
pub trait VectorizerAdapter: Send + Sync {
    /// Unique id under which this adapter is registered
    fn backend_id(&self) -> &str;

    /// Modalities this backend accepts
    fn modalities(&self) -> &BTreeSet<Modality>;

    /// Length of every vector this backend returns
    fn dimensions(&self) -> usize;

    /// Embed content. Callers guarantee every present modality is supported.
    async fn embed(&self, content: &ItemContent, purpose: EmbedPurpose)
        -> Result<Vec<f32>, RagError>;

    /// Check if the backing service is reachable
    async fn health_check(&self) -> bool {
        true
    }
}

/// Registered adapters keyed by backend id, with shared retry and deadline policy
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn VectorizerAdapter>>>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Duration::from_secs(30))
    }
}

impl AdapterRegistry {
    pub fn new(retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
            retry,
            call_timeout,
        }
    }

    /// Register an adapter; ids must be unique
    pub fn register(&self, adapter: Arc<dyn VectorizerAdapter>) -> Result<(), RagError> {
        let id = adapter.backend_id().to_string();
        let mut adapters = self
            .adapters
            .write()
            .map_err(|_| RagError::Config("adapter registry lock poisoned".into()))?;
        if adapters.contains_key(&id) {
            return Err(RagError::AlreadyExists(format!("backend '{}'", id)));
        }
        debug!(
            "Registered vectorizer '{}' ({}, {} dims)",
            id,
            describe_modalities(adapter.modalities()),
            adapter.dimensions()
        );
        adapters.insert(id, adapter);
        Ok(())
    }

    pub fn get(&self, backend_id: &str) -> Result<Arc<dyn VectorizerAdapter>, RagError> {
        self.adapters
            .read()
            .ok()
            .and_then(|a| a.get(backend_id).cloned())
            .ok_or_else(|| RagError::UnknownBackend(backend_id.to_string()))
    }

    pub fn contains(&self, backend_id: &str) -> bool {
        self.adapters
            .read()
            .map(|a| a.contains_key(backend_id))
            .unwrap_or(false)
    }

    /// Registered ids, sorted
    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .adapters
            .read()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Embed through `backend_id` with modality check, deadline and retry.
    ///
    /// Content carrying a modality the backend does not declare fails with
    /// `UnsupportedModality` before any network call.
    pub async fn embed(
        &self,
        backend_id: &str,
        content: &ItemContent,
        purpose: EmbedPurpose,
    ) -> Result<Vec<f32>, RagError> {
        let adapter = self.get(backend_id)?;
        let present = content.modalities();
        if present.is_empty() {
            return Err(RagError::InvalidModality("content is empty".into()));
        }
        if let Some(unsupported) = present.difference(adapter.modalities()).next() {
            return Err(RagError::UnsupportedModality {
                backend_id: backend_id.to_string(),
                modality: unsupported.to_string(),
            });
        }

        let start = Instant::now();
        let label = format!("embed via {}", backend_id);
        let timeout = self.call_timeout;
        let vector = self
            .retry
            .run(&label, || {
                with_deadline(timeout, adapter.embed(content, purpose), || {
                    RagError::unavailable(
                        backend_id,
                        format!("no response within {}ms", timeout.as_millis()),
                    )
                })
            })
            .await
            .map_err(|(e, _)| e)?;

        if vector.len() != adapter.dimensions() {
            return Err(RagError::DimensionMismatch {
                target: format!("backend '{}'", backend_id),
                expected: adapter.dimensions(),
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RagError::rejected(backend_id, "vector contains NaN or Infinity"));
        }

        debug!(
            "Embedded {} content via {} in {}ms",
            describe_modalities(&present),
            backend_id,
            start.elapsed().as_millis()
        );
        Ok(vector)
    }

    pub async fn health(&self) -> Vec<(String, bool)> {
        let adapters: Vec<Arc<dyn VectorizerAdapter>> = self
            .adapters
            .read()
            .map(|a| a.values().cloned().collect())
            .unwrap_or_default();
        let checks = adapters.iter().map(|a| async move {
            (a.backend_id().to_string(), a.health_check().await)
        });
        let mut results = futures::future::join_all(checks).await;
        results.sort();
        results
    }
}

/// Scale a vector to unit length; zero vectors are returned unchanged
pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Weighted mean of equally sized vectors, then L2-normalised
pub fn weighted_mean(parts: &[(f32, Vec<f32>)]) -> Vec<f32> {
    let dims = parts.first().map(|(_, v)| v.len()).unwrap_or(0);
    let total: f32 = parts.iter().map(|(w, _)| *w).sum();
    let mut out = vec![0.0f32; dims];
    if total <= 0.0 {
        return out;
    }
    for (weight, vector) in parts {
        for (o, x) in out.iter_mut().zip(vector) {
            *o += x * weight / total;
        }
    }
    l2_normalize(out)
}
