// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cohere embed v2 adapter (embed-v4.0 accepts text, images, and both fused)
//!
//! API docs: https://docs.cohere.com/reference/embed

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use super::adapter::{l2_normalize, EmbedPurpose, VectorizerAdapter};
use super::rate_limiter::EmbedRateLimiter;
use crate::errors::{http, RagError};
use crate::types::{ItemContent, Modality};
use crate::vision::image_utils::data_uri;

const COHERE_API_URL: &str = "https://api.cohere.com/v2/embed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CohereEmbedConfig {
    pub backend_id: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub dimensions: usize,
    /// Env var holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_model() -> String {
    "embed-v4.0".to_string()
}

fn default_api_key_env() -> String {
    "COHERE_API_KEY".to_string()
}

fn default_api_url() -> String {
    COHERE_API_URL.to_string()
}

fn default_rpm() -> u32 {
    100
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input_type: &'static str,
    embedding_types: [&'static str; 1],
    output_dimension: usize,
    inputs: Vec<EmbedInput>,
}

#[derive(Serialize)]
struct EmbedInput {
    content: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbeddingsByType,
}

#[derive(Deserialize)]
struct EmbeddingsByType {
    #[serde(default)]
    float: Vec<Vec<f32>>,
}

pub struct CohereEmbedAdapter {
    client: Client,
    config: CohereEmbedConfig,
    api_key: String,
    rate_limiter: EmbedRateLimiter,
    modalities: BTreeSet<Modality>,
}

impl CohereEmbedAdapter {
    pub fn new(config: CohereEmbedConfig, api_key: String) -> Result<Self, RagError> {
        if api_key.trim().is_empty() {
            return Err(RagError::Config(format!(
                "backend '{}' requires an API key",
                config.backend_id
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Config(format!("http client: {}", e)))?;
        info!(
            "Cohere adapter '{}' configured: model={}, dims={}, rpm={}",
            config.backend_id, config.model, config.dimensions, config.requests_per_minute
        );
        Ok(Self {
            client,
            rate_limiter: EmbedRateLimiter::new(config.requests_per_minute),
            config,
            api_key,
            modalities: BTreeSet::from([Modality::Text, Modality::Image]),
        })
    }

    fn build_request(&self, content: &ItemContent, purpose: EmbedPurpose) -> EmbedRequest<'_> {
        let present = content.modalities();
        let mut parts = Vec::new();
        if let (true, Some(text)) = (present.contains(&Modality::Text), &content.text) {
            parts.push(serde_json::json!({"type": "text", "text": text}));
        }
        if let (true, Some(image)) = (present.contains(&Modality::Image), &content.image) {
            parts.push(serde_json::json!({
                "type": "image_url",
                "image_url": {"url": data_uri(image)}
            }));
        }
        EmbedRequest {
            model: &self.config.model,
            input_type: match purpose {
                EmbedPurpose::Document => "search_document",
                EmbedPurpose::Query => "search_query",
            },
            embedding_types: ["float"],
            output_dimension: self.config.dimensions,
            inputs: vec![EmbedInput { content: parts }],
        }
    }
}

#[async_trait]
impl VectorizerAdapter for CohereEmbedAdapter {
    fn backend_id(&self) -> &str {
        &self.config.backend_id
    }

    fn modalities(&self) -> &BTreeSet<Modality> {
        &self.modalities
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, content: &ItemContent, purpose: EmbedPurpose) -> Result<Vec<f32>, RagError> {
        let id = self.config.backend_id.as_str();
        let request = self.build_request(content, purpose);

        self.rate_limiter.wait().await;
        debug!("{}: embedding ({:?})", id, purpose);

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::unavailable(id, http::describe_transport(&e)))?;

        if !response.status().is_success() {
            return Err(http::classify_response(id, response).await);
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::rejected(id, format!("unparseable response: {}", e)))?;
        parsed
            .embeddings
            .float
            .into_iter()
            .next()
            .map(l2_normalize)
            .ok_or_else(|| RagError::rejected(id, "response carried no float embedding"))
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_empty()
    }
}
