// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Second-pass relevance scoring over a bounded shortlist
//!
//! Reranking is an optimization. Any scorer failure returns the candidates
//! in their input order with `degraded` set.

pub mod http;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::RagError;
use crate::retry::with_deadline;
use crate::storage::ItemLookup;
use crate::types::QueryResult;

pub use self::http::HttpRerankScorer;

/// Cross-encoder style relevance model
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn name(&self) -> &str;

    /// One score per document, in document order
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RagError>;

    async fn health_check(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankOutcome {
    pub results: Vec<QueryResult>,
    /// True when the scorer failed and the input order was returned
    pub degraded: bool,
}

pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    max_shortlist: usize,
    timeout: Duration,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self {
            scorer,
            max_shortlist: 50,
            timeout: Duration::from_secs(10),
        }
    }

    /// Candidates beyond this many are appended unscored (minimum 1)
    pub fn with_max_shortlist(mut self, max_shortlist: usize) -> Self {
        self.max_shortlist = max_shortlist.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    pub async fn health_check(&self) -> bool {
        self.scorer.health_check().await
    }

    /// Score candidates against the query and reorder them.
    ///
    /// Candidates without any text representation keep `rerank_score = None`
    /// and follow the scored ones in their original relative order.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<QueryResult>,
        lookup: &dyn ItemLookup,
    ) -> RerankOutcome {
        if candidates.is_empty() {
            return RerankOutcome {
                results: candidates,
                degraded: false,
            };
        }

        let split = candidates.len().min(self.max_shortlist);
        let (shortlist, overflow) = candidates.split_at(split);

        let texts = match self.candidate_texts(shortlist, lookup).await {
            Ok(texts) => texts,
            Err(e) => return self.pass_through(candidates, &e),
        };
        let scorable: Vec<(usize, String)> = texts
            .into_iter()
            .enumerate()
            .filter_map(|(i, text)| text.map(|t| (i, t)))
            .collect();
        if scorable.is_empty() {
            debug!("No candidate has text; rerank skipped");
            return RerankOutcome {
                results: candidates,
                degraded: false,
            };
        }

        let documents: Vec<String> = scorable.iter().map(|(_, t)| t.clone()).collect();
        let scorer = self.scorer.name().to_string();
        let scores = with_deadline(self.timeout, self.scorer.score(query, &documents), || {
            RagError::unavailable(&scorer, "rerank deadline exceeded")
        })
        .await;

        let scores = match scores {
            Ok(scores) if scores.len() == documents.len() => scores,
            Ok(scores) => {
                let e = RagError::rejected(
                    &scorer,
                    format!("{} scores for {} documents", scores.len(), documents.len()),
                );
                return self.pass_through(candidates, &e);
            }
            Err(e) => return self.pass_through(candidates, &e),
        };

        let mut scored: Vec<QueryResult> = Vec::with_capacity(scorable.len());
        let mut unscored: Vec<QueryResult> = Vec::new();
        let mut score_at = vec![None; shortlist.len()];
        for ((index, _), score) in scorable.iter().zip(scores) {
            score_at[*index] = Some(score);
        }
        for (candidate, score) in shortlist.iter().zip(score_at) {
            let mut result = candidate.clone();
            result.rerank_score = score;
            match score {
                Some(_) => scored.push(result),
                None => unscored.push(result),
            }
        }
        // Stable sort keeps retrieval order among equal rerank scores
        scored.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        scored.extend(unscored);
        scored.extend(overflow.iter().cloned());
        RerankOutcome {
            results: scored,
            degraded: false,
        }
    }

    async fn candidate_texts(
        &self,
        shortlist: &[QueryResult],
        lookup: &dyn ItemLookup,
    ) -> Result<Vec<Option<String>>, RagError> {
        let lookups = shortlist.iter().map(|c| lookup.lookup(&c.item_id));
        join_all(lookups)
            .await
            .into_iter()
            .map(|found| {
                found.map(|item| {
                    item.and_then(|i| i.text_representation().map(str::to_string))
                })
            })
            .collect()
    }

    fn pass_through(&self, candidates: Vec<QueryResult>, error: &RagError) -> RerankOutcome {
        warn!(
            "Reranker '{}' failed, keeping retrieval order: {}",
            self.scorer.name(),
            error
        );
        RerankOutcome {
            results: candidates,
            degraded: true,
        }
    }
}
