// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Ollama generation backend (`/api/generate`, non-streaming)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{Generation, GenerationBackend};
use crate::errors::{http, RagError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OllamaConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Context window passed as `num_ctx`
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_num_ctx() -> u32 {
    4096
}

fn default_max_input_chars() -> usize {
    12_000
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            num_ctx: default_num_ctx(),
            max_input_chars: default_max_input_chars(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_ctx: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

pub struct OllamaGenerator {
    client: Client,
    config: OllamaConfig,
    endpoint: String,
    name: String,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Config(format!("http client: {}", e)))?;
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        info!(
            "Ollama generator configured: endpoint={}, model={}",
            endpoint, config.model
        );
        Ok(Self {
            client,
            name: format!("ollama/{}", config.model),
            config,
            endpoint,
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_input_chars(&self) -> usize {
        self.config.max_input_chars
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, RagError> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_ctx: self.config.num_ctx,
            },
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::unavailable(&self.name, http::describe_transport(&e)))?;

        if !response.status().is_success() {
            return Err(http::classify_response(&self.name, response).await);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RagError::rejected(&self.name, format!("unparseable response: {}", e)))?;
        let tokens_used = parsed.prompt_eval_count.unwrap_or(0) + parsed.eval_count.unwrap_or(0);
        debug!("{} generated {} tokens", self.name, tokens_used);
        Ok(Generation {
            text: parsed.response,
            citations: None,
            model: parsed.model.unwrap_or_else(|| self.config.model.clone()),
            tokens_used,
        })
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.endpoint))
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
