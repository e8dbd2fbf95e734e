// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Builds a [`RagPipeline`] from a [`NodeConfig`]

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{GeneratorConfig, NodeConfig, StoreConfig, VectorizerConfig};
use crate::generate::{AnswerSynthesizer, GenerationBackend, OllamaGenerator, OpenAiCompatGenerator};
use crate::pipeline::RagPipeline;
use crate::registry::Creation;
use crate::rerank::{HttpRerankScorer, Reranker};
use crate::storage::{InMemoryVectorStore, VectorStore, WeaviateStore};
use crate::types::PropertySchema;
use crate::vectorizer::{
    AdapterRegistry, ClipInferenceAdapter, CohereEmbedAdapter, FeatureHashAdapter, VectorizerAdapter,
};
use crate::vision::{VlmCaptioner, VlmClient};

fn build_store(config: &NodeConfig) -> Result<Arc<dyn VectorStore>> {
    Ok(match &config.store {
        StoreConfig::Memory => Arc::new(InMemoryVectorStore::new()),
        StoreConfig::Weaviate(weaviate) => {
            let api_key = weaviate
                .api_key_env
                .as_deref()
                .and_then(|var| env::var(var).ok());
            Arc::new(WeaviateStore::new(weaviate, api_key)?)
        }
    })
}

fn build_adapter(config: &VectorizerConfig) -> Result<Arc<dyn VectorizerAdapter>> {
    Ok(match config {
        VectorizerConfig::Clip(clip) => Arc::new(ClipInferenceAdapter::new(clip.clone())?),
        VectorizerConfig::Cohere(cohere) => {
            let api_key = env::var(&cohere.api_key_env).with_context(|| {
                format!(
                    "backend '{}' needs its API key in {}",
                    cohere.backend_id, cohere.api_key_env
                )
            })?;
            Arc::new(CohereEmbedAdapter::new(cohere.clone(), api_key)?)
        }
        VectorizerConfig::FeatureHash {
            backend_id,
            dimensions,
        } => Arc::new(FeatureHashAdapter::new(backend_id.clone(), *dimensions)?),
    })
}

fn build_generator(config: &GeneratorConfig) -> Result<Arc<dyn GenerationBackend>> {
    Ok(match config {
        GeneratorConfig::Ollama(ollama) => Arc::new(OllamaGenerator::new(ollama.clone())?),
        GeneratorConfig::OpenAi {
            backend_id,
            endpoint,
            model,
            max_input_chars,
            timeout_ms,
        } => {
            let client = VlmClient::new(backend_id, endpoint, model, Duration::from_millis(*timeout_ms))?;
            Arc::new(OpenAiCompatGenerator::new(Arc::new(client), *max_input_chars))
        }
    })
}

/// Wire every configured backend into a pipeline
pub fn build_pipeline(config: &NodeConfig) -> Result<RagPipeline> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    let adapters = Arc::new(AdapterRegistry::new(
        config.retry.clone(),
        Duration::from_millis(config.embed_timeout_ms),
    ));
    for vectorizer in &config.vectorizers {
        adapters.register(build_adapter(vectorizer)?)?;
    }
    info!("Registered {} vectorizer backends", config.vectorizers.len());

    let store = build_store(config)?;
    let mut builder = RagPipeline::builder(adapters, store)
        .ingest_concurrency(config.ingest_concurrency)
        .store_timeout(Duration::from_millis(config.store_timeout_ms))
        .synthesizer(AnswerSynthesizer::new(
            config.retry.clone(),
            Duration::from_millis(config.answer.timeout_ms),
            config.answer.max_context_items,
        ));

    if let Some(reranker) = &config.reranker {
        let timeout = Duration::from_millis(reranker.timeout_ms);
        let scorer = HttpRerankScorer::new(&reranker.name, &reranker.url, timeout)?;
        builder = builder.reranker(
            Reranker::new(Arc::new(scorer))
                .with_max_shortlist(reranker.max_shortlist)
                .with_timeout(timeout),
        );
    }
    if let Some(generator) = &config.generator {
        builder = builder.generator(build_generator(generator)?);
    }
    if let Some(captioner) = &config.captioner {
        let client = VlmClient::new(
            "captioner",
            &captioner.endpoint,
            &captioner.model,
            Duration::from_millis(captioner.timeout_ms),
        )?;
        builder = builder.captioner(Arc::new(VlmCaptioner::new(Arc::new(client))));
    }

    Ok(builder.build())
}

/// Create the collections named in the config. Existing identical
/// definitions are left alone.
pub async fn bootstrap_collections(pipeline: &RagPipeline, config: &NodeConfig) -> Result<()> {
    for collection in &config.collections {
        let spaces = collection
            .vector_spaces
            .iter()
            .map(|s| s.to_vector_space())
            .collect();
        let (_, creation) = pipeline
            .create_collection(
                &collection.name,
                collection.description.clone(),
                PropertySchema::multimodal(),
                spaces,
            )
            .await
            .with_context(|| format!("creating collection '{}'", collection.name))?;
        match creation {
            Creation::Created => info!("Created collection '{}'", collection.name),
            Creation::Unchanged => warn!("Collection '{}' already present", collection.name),
        }
    }
    Ok(())
}
