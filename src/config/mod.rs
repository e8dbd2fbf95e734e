// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration
//!
//! Loaded from a TOML file, then overridden by environment variables:
//! `MMRAG_BIND`, `MMRAG_STORE_URL`, `OLLAMA_ENDPOINT`, `OLLAMA_MODEL`,
//! `RERANKER_URL`. API keys are never stored in the file; backends name the
//! env var that holds them.

pub mod factory;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::env;
use std::path::Path;

use crate::generate::OllamaConfig;
use crate::retry::RetryPolicy;
use crate::storage::WeaviateConfig;
use crate::types::{DistanceMetric, Modality, VectorSpace};
use crate::vectorizer::{ClipInferenceConfig, CohereEmbedConfig};

pub use factory::{bootstrap_collections, build_pipeline};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub bind: String,
    pub store: StoreConfig,
    pub retry: RetryPolicy,
    /// Deadline for a single vectorizer call
    pub embed_timeout_ms: u64,
    /// Deadline for a single storage search
    pub store_timeout_ms: u64,
    /// Items embedded concurrently during batch ingestion
    pub ingest_concurrency: usize,
    /// Largest accepted HTTP request body
    pub max_body_bytes: usize,
    pub vectorizers: Vec<VectorizerConfig>,
    pub reranker: Option<RerankerConfig>,
    pub generator: Option<GeneratorConfig>,
    pub answer: AnswerConfig,
    pub captioner: Option<CaptionerConfig>,
    pub collections: Vec<CollectionConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8088".to_string(),
            store: StoreConfig::Memory,
            retry: RetryPolicy::default(),
            embed_timeout_ms: 30_000,
            store_timeout_ms: 10_000,
            ingest_concurrency: 4,
            max_body_bytes: 32 * 1024 * 1024,
            vectorizers: Vec::new(),
            reranker: None,
            generator: None,
            answer: AnswerConfig::default(),
            captioner: None,
            collections: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    Weaviate(WeaviateConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorizerConfig {
    Clip(ClipInferenceConfig),
    Cohere(CohereEmbedConfig),
    FeatureHash { backend_id: String, dimensions: usize },
}

impl VectorizerConfig {
    pub fn backend_id(&self) -> &str {
        match self {
            VectorizerConfig::Clip(c) => &c.backend_id,
            VectorizerConfig::Cohere(c) => &c.backend_id,
            VectorizerConfig::FeatureHash { backend_id, .. } => backend_id,
        }
    }

    pub fn dimensions(&self) -> usize {
        match self {
            VectorizerConfig::Clip(c) => c.dimensions,
            VectorizerConfig::Cohere(c) => c.dimensions,
            VectorizerConfig::FeatureHash { dimensions, .. } => *dimensions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_name")]
    pub name: String,
    pub url: String,
    #[serde(default = "default_shortlist")]
    pub max_shortlist: usize,
    #[serde(default = "default_reranker_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_reranker_name() -> String {
    "reranker".to_string()
}

fn default_shortlist() -> usize {
    50
}

fn default_reranker_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorConfig {
    Ollama(OllamaConfig),
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_openai_name")]
        backend_id: String,
        endpoint: String,
        model: String,
        #[serde(default = "default_max_input_chars")]
        max_input_chars: usize,
        #[serde(default = "default_generation_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_openai_name() -> String {
    "openai".to_string()
}

fn default_max_input_chars() -> usize {
    12_000
}

fn default_generation_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Top-N retrieved items considered for the prompt
    pub max_context_items: usize,
    pub timeout_ms: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_context_items: 5,
            timeout_ms: 120_000,
        }
    }
}

/// VLM used to caption image items that carry no text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionerConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,
}

/// Collection created at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub vector_spaces: Vec<SpaceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceConfig {
    pub name: String,
    pub backend_id: String,
    pub dimensions: usize,
    pub modalities: BTreeSet<Modality>,
    #[serde(default)]
    pub distance: DistanceMetric,
}

impl SpaceConfig {
    pub fn to_vector_space(&self) -> VectorSpace {
        VectorSpace::new(
            self.name.clone(),
            self.backend_id.clone(),
            self.dimensions,
            self.modalities.iter().copied(),
        )
        .with_metric(self.distance)
    }
}

impl NodeConfig {
    /// Parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env(&mut self) {
        if let Ok(bind) = env::var("MMRAG_BIND") {
            self.bind = bind;
        }
        if let Ok(url) = env::var("MMRAG_STORE_URL") {
            match &mut self.store {
                StoreConfig::Weaviate(config) => config.url = url,
                StoreConfig::Memory => {
                    self.store = StoreConfig::Weaviate(WeaviateConfig {
                        url,
                        ..WeaviateConfig::default()
                    })
                }
            }
        }
        let endpoint = env::var("OLLAMA_ENDPOINT").ok();
        let model = env::var("OLLAMA_MODEL").ok();
        if endpoint.is_some() || model.is_some() {
            let mut ollama = match self.generator.take() {
                Some(GeneratorConfig::Ollama(config)) => config,
                _ => OllamaConfig::default(),
            };
            if let Some(endpoint) = endpoint {
                ollama.endpoint = endpoint;
            }
            if let Some(model) = model {
                ollama.model = model;
            }
            self.generator = Some(GeneratorConfig::Ollama(ollama));
        }
        if let Ok(url) = env::var("RERANKER_URL") {
            match &mut self.reranker {
                Some(reranker) => reranker.url = url,
                None => {
                    self.reranker = Some(RerankerConfig {
                        name: default_reranker_name(),
                        url,
                        max_shortlist: default_shortlist(),
                        timeout_ms: default_reranker_timeout_ms(),
                    })
                }
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.bind.trim().is_empty() {
            return Err("Bind address must not be empty".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("Retry max_attempts must be at least 1".to_string());
        }
        if self.embed_timeout_ms == 0 || self.store_timeout_ms == 0 {
            return Err("Timeouts must be greater than 0".to_string());
        }
        if self.ingest_concurrency == 0 {
            return Err("Ingest concurrency must be greater than 0".to_string());
        }

        let mut backend_ids = HashSet::new();
        for vectorizer in &self.vectorizers {
            let id = vectorizer.backend_id();
            if id.trim().is_empty() {
                return Err("Vectorizer backend_id must not be empty".to_string());
            }
            if !backend_ids.insert(id) {
                return Err(format!("Duplicate vectorizer backend_id '{}'", id));
            }
            if vectorizer.dimensions() == 0 {
                return Err(format!("Vectorizer '{}' must have positive dimensions", id));
            }
        }

        if let Some(reranker) = &self.reranker {
            if reranker.max_shortlist == 0 {
                return Err("Reranker shortlist must be greater than 0".to_string());
            }
        }
        if self.answer.max_context_items == 0 {
            return Err("Answer max_context_items must be greater than 0".to_string());
        }

        let mut names = HashSet::new();
        for collection in &self.collections {
            if !names.insert(collection.name.as_str()) {
                return Err(format!("Duplicate collection '{}'", collection.name));
            }
            for space in &collection.vector_spaces {
                if !backend_ids.contains(space.backend_id.as_str()) {
                    return Err(format!(
                        "Space '{}' in '{}' references unknown backend '{}'",
                        space.name, collection.name, space.backend_id
                    ));
                }
            }
        }
        Ok(())
    }
}
