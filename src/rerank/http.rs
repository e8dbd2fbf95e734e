// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cross-encoder reranking service client
//!
//! Speaks the text-embeddings-inference rerank API:
//! `POST {url}/rerank {"query": .., "texts": [..]}` returning
//! `[{"index": i, "score": s}, ..]` in arbitrary order.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::RelevanceScorer;
use crate::errors::{http, RagError};

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct RankedText {
    index: usize,
    score: f32,
}

pub struct HttpRerankScorer {
    client: Client,
    endpoint: String,
    name: String,
}

impl HttpRerankScorer {
    pub fn new(name: &str, endpoint: &str, timeout: Duration) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("http client: {}", e)))?;
        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!("Reranker '{}' configured: endpoint={}", name, endpoint);
        Ok(Self {
            client,
            endpoint,
            name: name.to_string(),
        })
    }
}

/// Reorder `(index, score)` pairs back into document order
fn scores_in_order(ranked: Vec<RankedText>, count: usize) -> Option<Vec<f32>> {
    let mut scores = vec![None; count];
    for r in ranked {
        *scores.get_mut(r.index)? = Some(r.score);
    }
    scores.into_iter().collect()
}

#[async_trait]
impl RelevanceScorer for HttpRerankScorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RagError> {
        let response = self
            .client
            .post(format!("{}/rerank", self.endpoint))
            .json(&RerankRequest {
                query,
                texts: documents,
                truncate: true,
            })
            .send()
            .await
            .map_err(|e| RagError::unavailable(&self.name, http::describe_transport(&e)))?;

        if !response.status().is_success() {
            return Err(http::classify_response(&self.name, response).await);
        }

        let ranked: Vec<RankedText> = response
            .json()
            .await
            .map_err(|e| RagError::rejected(&self.name, format!("unparseable response: {}", e)))?;
        debug!("{} scored {} documents", self.name, ranked.len());
        scores_in_order(ranked, documents.len())
            .ok_or_else(|| RagError::rejected(&self.name, "scores do not cover every document"))
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("{} health check failed: {}", self.name, e);
                false
            }
        }
    }
}
