// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Generation through an OpenAI-compatible chat completion endpoint

use async_trait::async_trait;
use std::sync::Arc;

use super::{Generation, GenerationBackend};
use crate::errors::RagError;
use crate::vision::VlmClient;

pub struct OpenAiCompatGenerator {
    client: Arc<VlmClient>,
    max_input_chars: usize,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompatGenerator {
    pub fn new(client: Arc<VlmClient>, max_input_chars: usize) -> Self {
        Self {
            client,
            max_input_chars,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        self.client.backend_id()
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, RagError> {
        let completion = self
            .client
            .complete(prompt, self.max_tokens, self.temperature)
            .await?;
        Ok(Generation {
            text: completion.text,
            citations: None,
            model: completion.model,
            tokens_used: completion.tokens_used,
        })
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}
