// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Adapter for multi2vec-style inference containers (CLIP, Qwen-VL)
//!
//! Wire format: `POST {url}/vectorize` with `{"texts": [..], "images": [b64..]}`
//! returning `{"textVectors": [[..]], "imageVectors": [[..]]}`. Paired
//! text+image content is combined as a weighted mean of the two vectors.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use super::adapter::{l2_normalize, weighted_mean, EmbedPurpose, VectorizerAdapter};
use crate::errors::{http, RagError};
use crate::types::{ItemContent, Modality};

/// Configuration for one inference container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClipInferenceConfig {
    pub backend_id: String,
    pub url: String,
    pub dimensions: usize,
    #[serde(default = "default_modalities")]
    pub modalities: BTreeSet<Modality>,
    #[serde(default = "default_weight")]
    pub text_weight: f32,
    #[serde(default = "default_weight")]
    pub image_weight: f32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_modalities() -> BTreeSet<Modality> {
    BTreeSet::from([Modality::Text, Modality::Image])
}

fn default_weight() -> f32 {
    0.5
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Serialize)]
struct VectorizeRequest {
    texts: Vec<String>,
    images: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VectorizeResponse {
    #[serde(default)]
    text_vectors: Vec<Vec<f32>>,
    #[serde(default)]
    image_vectors: Vec<Vec<f32>>,
}

pub struct ClipInferenceAdapter {
    client: Client,
    config: ClipInferenceConfig,
    endpoint: String,
}

impl ClipInferenceAdapter {
    pub fn new(config: ClipInferenceConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Config(format!("http client: {}", e)))?;
        let endpoint = config.url.trim_end_matches('/').to_string();
        info!(
            "CLIP inference adapter '{}' configured: endpoint={}, dims={}",
            config.backend_id, endpoint, config.dimensions
        );
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    async fn vectorize(&self, request: &VectorizeRequest) -> Result<VectorizeResponse, RagError> {
        let id = self.config.backend_id.as_str();
        let response = self
            .client
            .post(format!("{}/vectorize", self.endpoint))
            .json(request)
            .send()
            .await
            .map_err(|e| RagError::unavailable(id, http::describe_transport(&e)))?;

        if !response.status().is_success() {
            return Err(http::classify_response(id, response).await);
        }

        response
            .json::<VectorizeResponse>()
            .await
            .map_err(|e| RagError::rejected(id, format!("unparseable response: {}", e)))
    }
}

#[async_trait]
impl VectorizerAdapter for ClipInferenceAdapter {
    fn backend_id(&self) -> &str {
        &self.config.backend_id
    }

    fn modalities(&self) -> &BTreeSet<Modality> {
        &self.config.modalities
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(
        &self,
        content: &ItemContent,
        _purpose: EmbedPurpose,
    ) -> Result<Vec<f32>, RagError> {
        let present = content.modalities();
        let request = VectorizeRequest {
            texts: content
                .text
                .iter()
                .filter(|_| present.contains(&Modality::Text))
                .cloned()
                .collect(),
            images: content
                .image
                .iter()
                .filter(|_| present.contains(&Modality::Image))
                .map(|bytes| STANDARD.encode(bytes))
                .collect(),
        };
        let response = self.vectorize(&request).await?;
        let id = self.config.backend_id.as_str();

        let text_vector = response.text_vectors.into_iter().next();
        let image_vector = response.image_vectors.into_iter().next();
        if !request.texts.is_empty() && text_vector.is_none() {
            return Err(RagError::rejected(id, "response carried no text vector"));
        }
        if !request.images.is_empty() && image_vector.is_none() {
            return Err(RagError::rejected(id, "response carried no image vector"));
        }

        let vector = match (text_vector, image_vector) {
            (Some(t), Some(i)) => {
                debug!("{}: combining text and image vectors", id);
                weighted_mean(&[(self.config.text_weight, t), (self.config.image_weight, i)])
            }
            (Some(v), None) | (None, Some(v)) => l2_normalize(v),
            (None, None) => return Err(RagError::rejected(id, "empty response")),
        };
        Ok(vector)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/.well-known/ready", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("{} health check failed: {}", self.config.backend_id, e);
                false
            }
        }
    }
}
