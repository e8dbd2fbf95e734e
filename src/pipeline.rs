// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caller-facing facade tying registry, store, ingestion, query, rerank and
//! answer synthesis together

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::RagError;
use crate::generate::{Answer, AnswerSynthesizer, GenerationBackend};
use crate::ingest::{IngestOptions, IngestionPipeline};
use crate::query::{MergeMode, QueryEngine, SearchRequest, SearchResponse};
use crate::registry::{CollectionRegistry, Creation};
use crate::rerank::{RerankOutcome, Reranker};
use crate::storage::{CollectionItems, VectorStore};
use crate::types::{Collection, IngestResult, Item, PropertySchema, QueryResult, VectorSpace};
use crate::vectorizer::AdapterRegistry;
use crate::vision::Captioner;

/// Result of the one-shot search, rerank and answer flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub answer: Answer,
    /// Candidates in the order they were handed to the synthesizer
    pub sources: Vec<QueryResult>,
    pub rerank_degraded: bool,
}

/// Health of every collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub store: bool,
    pub vectorizers: Vec<(String, bool)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<bool>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.store
            && self.vectorizers.iter().all(|(_, ok)| *ok)
            && self.reranker.unwrap_or(true)
            && self.generator.unwrap_or(true)
    }
}

pub struct RagPipeline {
    adapters: Arc<AdapterRegistry>,
    registry: Arc<CollectionRegistry>,
    store: Arc<dyn VectorStore>,
    ingestion: IngestionPipeline,
    query: QueryEngine,
    reranker: Option<Reranker>,
    synthesizer: AnswerSynthesizer,
    generator: Option<Arc<dyn GenerationBackend>>,
}

impl RagPipeline {
    pub fn builder(adapters: Arc<AdapterRegistry>, store: Arc<dyn VectorStore>) -> RagPipelineBuilder {
        RagPipelineBuilder {
            adapters,
            store,
            captioner: None,
            reranker: None,
            synthesizer: AnswerSynthesizer::default(),
            generator: None,
            ingest_concurrency: 4,
            store_timeout: None,
        }
    }

    pub fn adapters(&self) -> &Arc<AdapterRegistry> {
        &self.adapters
    }

    pub fn registry(&self) -> &Arc<CollectionRegistry> {
        &self.registry
    }

    /// Register a collection and provision its storage
    pub async fn create_collection(
        &self,
        name: &str,
        description: Option<String>,
        schema: PropertySchema,
        vector_spaces: Vec<VectorSpace>,
    ) -> Result<(Arc<Collection>, Creation), RagError> {
        let (collection, creation) =
            self.registry
                .create_collection(name, description, schema, vector_spaces)?;
        if creation == Creation::Created {
            if let Err(e) = self.store.ensure_collection(&collection).await {
                warn!("Provisioning storage for '{}' failed: {}", name, e);
                self.registry.rollback_create(name);
                return Err(e);
            }
        }
        Ok((collection, creation))
    }

    pub fn get_collection(&self, name: &str) -> Result<Arc<Collection>, RagError> {
        self.registry.get_collection(name)
    }

    pub fn list_collections(&self) -> Vec<Arc<Collection>> {
        self.registry.list_collections()
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), RagError> {
        let removed = self.registry.delete_collection(name)?;
        if let Err(e) = self.store.drop_collection(name).await {
            warn!("Dropping storage for '{}' failed: {}", name, e);
            self.registry.restore(removed)?;
            return Err(e);
        }
        info!("Deleted collection '{}'", name);
        Ok(())
    }

    pub async fn add_vector_space(&self, name: &str, space: VectorSpace) -> Result<Arc<Collection>, RagError> {
        let space_name = space.name.clone();
        let updated = self.registry.add_vector_space(name, space)?;
        if let Err(e) = self.store.ensure_collection(&updated).await {
            warn!("Provisioning space '{}' on '{}' failed: {}", space_name, name, e);
            self.registry.remove_vector_space(name, &space_name);
            return Err(e);
        }
        Ok(updated)
    }

    pub async fn ingest(&self, collection: &str, item: Item) -> Result<IngestResult, RagError> {
        self.ingestion.ingest(collection, item).await
    }

    pub async fn ingest_with(
        &self,
        collection: &str,
        item: Item,
        options: &IngestOptions,
    ) -> Result<IngestResult, RagError> {
        self.ingestion.ingest_with(collection, item, options).await
    }

    pub async fn ingest_batch(
        &self,
        collection: &str,
        items: Vec<Item>,
        options: &IngestOptions,
    ) -> Result<Vec<Result<IngestResult, RagError>>, RagError> {
        self.registry.get_collection(collection)?;
        Ok(self.ingestion.ingest_batch(collection, items, options).await)
    }

    pub async fn get_item(&self, collection: &str, item_id: &str) -> Result<Item, RagError> {
        self.registry.get_collection(collection)?;
        self.store
            .get(collection, item_id)
            .await?
            .map(|stored| stored.item)
            .ok_or_else(|| RagError::NotFound(format!("item '{}' in '{}'", item_id, collection)))
    }

    pub async fn delete_item(&self, collection: &str, item_id: &str) -> Result<bool, RagError> {
        self.registry.get_collection(collection)?;
        self.store.delete(collection, item_id).await
    }

    pub async fn search(&self, collection: &str, request: &SearchRequest) -> Result<SearchResponse, RagError> {
        self.query.search(collection, request).await
    }

    /// Side-by-side comparison of every compatible space, never merged
    pub async fn compare(&self, collection: &str, request: &SearchRequest) -> Result<SearchResponse, RagError> {
        let mut request = request.clone();
        request.target_spaces = None;
        request.merge = MergeMode::Partitioned;
        self.query.search(collection, &request).await
    }

    /// Rerank candidates; without a configured reranker they pass through
    pub async fn rerank(
        &self,
        collection: &str,
        query: &str,
        candidates: Vec<QueryResult>,
    ) -> Result<RerankOutcome, RagError> {
        self.registry.get_collection(collection)?;
        match &self.reranker {
            Some(reranker) => {
                let lookup = CollectionItems::new(self.store.clone(), collection);
                Ok(reranker.rerank(query, candidates, &lookup).await)
            }
            None => Ok(RerankOutcome {
                results: candidates,
                degraded: false,
            }),
        }
    }

    pub async fn answer(
        &self,
        collection: &str,
        question: &str,
        retrieved: &[QueryResult],
    ) -> Result<Answer, RagError> {
        self.registry.get_collection(collection)?;
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| RagError::Config("no generation backend configured".into()))?;
        let lookup = CollectionItems::new(self.store.clone(), collection);
        self.synthesizer
            .answer(question, retrieved, &lookup, generator.as_ref())
            .await
    }

    /// Search, rerank and answer in one call
    pub async fn ask(
        &self,
        collection: &str,
        question: &str,
        request: &SearchRequest,
    ) -> Result<AskResponse, RagError> {
        let response = self.search(collection, request).await?;
        let candidates = response.primary_results();
        let reranked = self.rerank(collection, question, candidates).await?;
        let answer = self
            .answer(collection, question, &reranked.results)
            .await?;
        Ok(AskResponse {
            answer,
            sources: reranked.results,
            rerank_degraded: reranked.degraded,
        })
    }

    pub async fn health(&self) -> HealthReport {
        let (store, vectorizers) = tokio::join!(self.store.health_check(), self.adapters.health());
        let reranker = match &self.reranker {
            Some(r) => Some(r.health_check().await),
            None => None,
        };
        let generator = match &self.generator {
            Some(g) => Some(g.health_check().await),
            None => None,
        };
        HealthReport {
            store,
            vectorizers,
            reranker,
            generator,
        }
    }
}

pub struct RagPipelineBuilder {
    adapters: Arc<AdapterRegistry>,
    store: Arc<dyn VectorStore>,
    captioner: Option<Arc<dyn Captioner>>,
    reranker: Option<Reranker>,
    synthesizer: AnswerSynthesizer,
    generator: Option<Arc<dyn GenerationBackend>>,
    ingest_concurrency: usize,
    store_timeout: Option<std::time::Duration>,
}

impl RagPipelineBuilder {
    pub fn captioner(mut self, captioner: Arc<dyn Captioner>) -> Self {
        self.captioner = Some(captioner);
        self
    }

    pub fn reranker(mut self, reranker: Reranker) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn synthesizer(mut self, synthesizer: AnswerSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn generator(mut self, generator: Arc<dyn GenerationBackend>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn ingest_concurrency(mut self, concurrency: usize) -> Self {
        self.ingest_concurrency = concurrency;
        self
    }

    pub fn store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> RagPipeline {
        let registry = Arc::new(CollectionRegistry::new(self.adapters.clone()));
        let mut ingestion =
            IngestionPipeline::new(registry.clone(), self.adapters.clone(), self.store.clone())
                .with_max_concurrency(self.ingest_concurrency);
        if let Some(captioner) = self.captioner {
            ingestion = ingestion.with_captioner(captioner);
        }
        let mut query = QueryEngine::new(registry.clone(), self.adapters.clone(), self.store.clone());
        if let Some(timeout) = self.store_timeout {
            query = query.with_store_timeout(timeout);
        }
        RagPipeline {
            adapters: self.adapters,
            registry,
            store: self.store,
            ingestion,
            query,
            reranker: self.reranker,
            synthesizer: self.synthesizer,
            generator: self.generator,
        }
    }
}
