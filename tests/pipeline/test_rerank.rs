// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Reranking through the pipeline, including pass-through on scorer failure

use super::common::*;
use multimodal_rag_node::types::PropertySchema;
use multimodal_rag_node::{Item, QueryResult, RagPipeline, Reranker};
use std::sync::Arc;

async fn seeded(pipeline: &RagPipeline) {
    pipeline
        .create_collection(
            "Docs",
            None,
            PropertySchema::multimodal(),
            vec![clip_space("clip_space", "clip")],
        )
        .await
        .unwrap();
    for item in [
        Item::new("a").with_text("pizza recipes"),
        Item::new("b").with_text("how to train a dog"),
        Item::new("c").with_image(png(DOG)),
        Item::new("d").with_text("dog food for a dog"),
    ] {
        pipeline.ingest("Docs", item).await.unwrap();
    }
}

fn candidates() -> Vec<QueryResult> {
    vec![
        QueryResult::new("a", 0.9, "clip_space"),
        QueryResult::new("b", 0.8, "clip_space"),
        QueryResult::new("c", 0.7, "clip_space"),
        QueryResult::new("d", 0.6, "clip_space"),
    ]
}

#[tokio::test]
async fn test_rerank_reorders_by_relevance() {
    let pipeline = pipeline_with(Vec::new(), Some(Reranker::new(Arc::new(KeywordScorer))), None);
    seeded(&pipeline).await;

    let outcome = pipeline
        .rerank("Docs", "dog food", candidates())
        .await
        .unwrap();
    assert!(!outcome.degraded);

    let ids: Vec<&str> = outcome.results.iter().map(|r| r.item_id.as_str()).collect();
    // d matches both words, b one, a none; c has no text and keeps its slot after scored items
    assert_eq!(ids, vec!["d", "b", "a", "c"]);
    assert_eq!(outcome.results[0].rerank_score, Some(2.0));
    // Retrieval scores are preserved
    assert_eq!(outcome.results[0].score, 0.6);
    assert_eq!(outcome.results[3].rerank_score, None);
}

#[tokio::test]
async fn test_rerank_falls_back_to_input_order() {
    let pipeline = pipeline_with(Vec::new(), Some(Reranker::new(Arc::new(DownScorer))), None);
    seeded(&pipeline).await;

    let input = candidates();
    let outcome = pipeline.rerank("Docs", "dog", input.clone()).await.unwrap();
    assert!(outcome.degraded);
    assert_eq!(outcome.results, input);
}

#[tokio::test]
async fn test_rerank_without_reranker_passes_through() {
    let pipeline = simple_pipeline();
    seeded(&pipeline).await;

    let outcome = pipeline.rerank("Docs", "dog", candidates()).await.unwrap();
    assert!(!outcome.degraded);
    assert_eq!(outcome.results, candidates());
}

#[tokio::test]
async fn test_shortlist_overflow_keeps_retrieval_order() {
    let reranker = Reranker::new(Arc::new(KeywordScorer)).with_max_shortlist(2);
    let pipeline = pipeline_with(Vec::new(), Some(reranker), None);
    seeded(&pipeline).await;

    let outcome = pipeline.rerank("Docs", "dog", candidates()).await.unwrap();
    let ids: Vec<&str> = outcome.results.iter().map(|r| r.item_id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a", "c", "d"]);
}

#[tokio::test]
async fn test_rerank_empty_and_unknown_collection() {
    let pipeline = pipeline_with(Vec::new(), Some(Reranker::new(Arc::new(KeywordScorer))), None);
    seeded(&pipeline).await;

    let outcome = pipeline.rerank("Docs", "dog", Vec::new()).await.unwrap();
    assert!(outcome.results.is_empty());
    assert!(!outcome.degraded);

    let err = pipeline.rerank("Nope", "dog", candidates()).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}
