// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client for OpenAI-compatible chat completion services (VLM sidecars,
//! vLLM, llama.cpp server)

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{http, RagError};
use crate::vision::image_utils::data_uri;

// --- OpenAI-compatible serde structs ---

#[derive(serde::Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(serde::Serialize)]
struct ChatMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(serde::Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Text returned by one chat completion
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    pub model: String,
    pub processing_time_ms: u64,
    pub tokens_used: u32,
}

const CAPTION_PROMPT: &str = "Describe this image in one sentence.";

pub struct VlmClient {
    client: Client,
    endpoint: String,
    model_name: String,
    backend_id: String,
}

impl VlmClient {
    pub fn new(backend_id: &str, endpoint: &str, model_name: &str, timeout: Duration) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("http client: {}", e)))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Chat client '{}' configured: endpoint={}, model={}",
            backend_id, endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
            backend_id: backend_id.to_string(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("{} health check failed: {}", self.backend_id, e);
                false
            }
        }
    }

    async fn chat(
        &self,
        content: serde_json::Value,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<ChatCompletion, RagError> {
        let start = std::time::Instant::now();
        let request = ChatRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::unavailable(&self.backend_id, http::describe_transport(&e)))?;

        if !response.status().is_success() {
            return Err(http::classify_response(&self.backend_id, response).await);
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            RagError::rejected(&self.backend_id, format!("unparseable response: {}", e))
        })?;
        let text = chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| RagError::rejected(&self.backend_id, "response carried no choices"))?;

        Ok(ChatCompletion {
            text,
            model: self.model_name.clone(),
            processing_time_ms: start.elapsed().as_millis() as u64,
            tokens_used: chat_response.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }

    /// Plain text completion
    pub async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<ChatCompletion, RagError> {
        self.chat(serde_json::json!(prompt), max_tokens, temperature)
            .await
    }

    /// One-sentence caption for raw image bytes
    pub async fn caption(&self, image: &[u8]) -> Result<ChatCompletion, RagError> {
        let content = serde_json::json!([
            {"type": "text", "text": CAPTION_PROMPT},
            {"type": "image_url", "image_url": {"url": data_uri(image)}}
        ]);
        self.chat(content, 100, 0.3).await
    }
}
