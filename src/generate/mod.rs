// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! RAG answer synthesis
//!
//! Retrieved items are assembled into a bounded, tagged context and sent to
//! a generation backend. The generator is never called without retrieved
//! context. Citations come from the backend when it supports structured
//! citations, otherwise from the items included in the prompt.

pub mod ollama;
pub mod openai_compat;
pub mod prompt;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::errors::RagError;
use crate::retry::{with_deadline, RetryPolicy};
use crate::storage::ItemLookup;
use crate::types::QueryResult;

pub use ollama::{OllamaConfig, OllamaGenerator};
pub use openai_compat::OpenAiCompatGenerator;
pub use prompt::{assemble, item_tag, AssembledPrompt, ContextBudget};

/// Output of one generation call
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// Item ids cited by the backend, when it supports structured citations
    pub citations: Option<Vec<String>>,
    pub model: String,
    pub tokens_used: u32,
}

/// Local or remote text generation model
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Largest prompt the backend accepts, in characters
    fn max_input_chars(&self) -> usize;

    fn supports_citations(&self) -> bool {
        false
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, RagError>;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Grounded answer with citations back to source items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub answer_text: String,
    /// Item ids supporting the answer
    pub citations: Vec<String>,
    /// Item ids placed in the prompt, in rank order
    pub context_items: Vec<String>,
    /// True if lower-ranked items were dropped or cut to fit the budget
    pub truncated: bool,
    pub model: String,
}

pub struct AnswerSynthesizer {
    retry: RetryPolicy,
    timeout: Duration,
    max_context_items: usize,
}

impl Default for AnswerSynthesizer {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Duration::from_secs(120), 5)
    }
}

impl AnswerSynthesizer {
    pub fn new(retry: RetryPolicy, timeout: Duration, max_context_items: usize) -> Self {
        Self {
            retry,
            timeout,
            max_context_items: max_context_items.max(1),
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        retrieved: &[QueryResult],
        lookup: &dyn ItemLookup,
        backend: &dyn GenerationBackend,
    ) -> Result<Answer, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidRequest("question must not be empty".into()));
        }
        if retrieved.is_empty() {
            return Err(RagError::NoContext);
        }

        let ranked = self.resolve_context(retrieved, lookup).await?;
        if ranked.is_empty() {
            debug!("None of {} retrieved items has usable text", retrieved.len());
            return Err(RagError::NoContext);
        }

        let budget = ContextBudget {
            max_chars: backend.max_input_chars(),
            max_items: self.max_context_items,
        };
        let assembled = assemble(question, &ranked, budget).ok_or_else(|| {
            RagError::rejected(
                backend.name(),
                format!(
                    "question does not fit the {} character input limit",
                    budget.max_chars
                ),
            )
        })?;
        if assembled.included.is_empty() {
            return Err(RagError::rejected(
                backend.name(),
                "no retrieved item fits the input limit",
            ));
        }
        if assembled.truncated {
            info!(
                "Context truncated to {} of {} item(s) for {}",
                assembled.included.len(),
                ranked.len(),
                backend.name()
            );
        }

        let generation = self.generate_with_retry(backend, &assembled.text).await?;
        let citations = match (backend.supports_citations(), &generation.citations) {
            (true, Some(cited)) => {
                let mut valid: Vec<String> = Vec::new();
                for id in cited {
                    if assembled.included.contains(id) && !valid.contains(id) {
                        valid.push(id.clone());
                    }
                }
                if valid.is_empty() {
                    assembled.included.clone()
                } else {
                    valid
                }
            }
            _ => assembled.included.clone(),
        };

        Ok(Answer {
            answer_text: generation.text.trim().to_string(),
            citations,
            context_items: assembled.included,
            truncated: assembled.truncated,
            model: generation.model,
        })
    }

    /// `(item_id, text)` for retrieved items in rank order, skipping items
    /// that no longer exist or have no text representation
    async fn resolve_context(
        &self,
        retrieved: &[QueryResult],
        lookup: &dyn ItemLookup,
    ) -> Result<Vec<(String, String)>, RagError> {
        let mut seen = std::collections::HashSet::new();
        let unique: Vec<&QueryResult> = retrieved
            .iter()
            .filter(|r| seen.insert(r.item_id.as_str()))
            .collect();
        let found = join_all(unique.iter().map(|r| lookup.lookup(&r.item_id))).await;

        let mut ranked = Vec::new();
        for (result, item) in unique.iter().zip(found) {
            match item? {
                Some(item) => match prompt::context_text(&item) {
                    Some(text) => ranked.push((result.item_id.clone(), text)),
                    None => debug!("Item '{}' has no text for the prompt", result.item_id),
                },
                None => warn!("Retrieved item '{}' no longer exists", result.item_id),
            }
        }
        Ok(ranked)
    }

    async fn generate_with_retry(
        &self,
        backend: &dyn GenerationBackend,
        prompt: &str,
    ) -> Result<Generation, RagError> {
        let timeout = self.timeout;
        let label = format!("generation via {}", backend.name());
        self.retry
            .run(&label, || {
                with_deadline(timeout, backend.generate(prompt), || {
                    RagError::unavailable(
                        backend.name(),
                        format!("no response within {}ms", timeout.as_millis()),
                    )
                })
            })
            .await
            .map_err(|(e, attempts)| {
                if e.is_retryable() {
                    warn!("{} gave up after {} attempt(s): {}", label, attempts, e);
                    RagError::GenerationUnavailable {
                        attempts,
                        reason: e.to_string(),
                    }
                } else {
                    e
                }
            })
    }
}
