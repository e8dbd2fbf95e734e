// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Answer synthesis: grounding, citations, budgets, NoContext and retries

use super::common::*;
use multimodal_rag_node::generate::prompt::frame_overhead;
use multimodal_rag_node::types::PropertySchema;
use multimodal_rag_node::{Item, QueryResult, RagError, RagPipeline};
use std::sync::Arc;

async fn seeded(pipeline: &RagPipeline) {
    pipeline
        .create_collection(
            "Kb",
            None,
            PropertySchema::multimodal(),
            vec![clip_space("clip_space", "clip")],
        )
        .await
        .unwrap();
    for item in [
        Item::new("1").with_text("Golden retrievers love swimming at the beach."),
        Item::new("2").with_text("Retrievers were bred to fetch game for hunters."),
        Item::new("3").with_text("The city skyline glows at night."),
        Item::new("img").with_image(png(DOG)),
        Item::new("captioned")
            .with_image(png(DOG))
            .with_metadata("caption", "a dog chasing a ball"),
    ] {
        pipeline.ingest("Kb", item).await.unwrap();
    }
}

fn hits(ids: &[&str]) -> Vec<QueryResult> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| QueryResult::new(*id, 1.0 - i as f32 * 0.1, "clip_space"))
        .collect()
}

#[tokio::test]
async fn test_answer_is_grounded_and_cited() {
    let generator = Arc::new(MockGenerator::new());
    let pipeline = pipeline_with(Vec::new(), None, Some(generator.clone()));
    seeded(&pipeline).await;

    let answer = pipeline
        .answer("Kb", "What do retrievers like?", &hits(&["1", "2"]))
        .await
        .unwrap();

    assert_eq!(answer.context_items, vec!["1", "2"]);
    assert_eq!(answer.citations, vec!["1", "2"]);
    assert!(!answer.truncated);
    assert_eq!(answer.model, "mock-llm");
    assert_eq!(answer.answer_text, "Based on 1, 2.");

    let prompt = generator.last_prompt();
    assert!(prompt.contains("[item:1] Golden retrievers love swimming"));
    assert!(prompt.contains("Question: What do retrievers like?"));
    let first = prompt.find("[item:1]").unwrap();
    let second = prompt.find("[item:2]").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn test_empty_retrieval_returns_no_context_without_generating() {
    let generator = Arc::new(MockGenerator::new());
    let pipeline = pipeline_with(Vec::new(), None, Some(generator.clone()));
    seeded(&pipeline).await;

    let err = pipeline.answer("Kb", "anything?", &[]).await.unwrap_err();
    assert!(matches!(err, RagError::NoContext));
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_items_without_text_are_not_context() {
    let generator = Arc::new(MockGenerator::new());
    let pipeline = pipeline_with(Vec::new(), None, Some(generator.clone()));
    seeded(&pipeline).await;

    let err = pipeline
        .answer("Kb", "what is shown?", &hits(&["img", "gone"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoContext));
    assert_eq!(generator.call_count(), 0);

    // A caption stands in for missing text
    let answer = pipeline
        .answer("Kb", "what is shown?", &hits(&["img", "captioned"]))
        .await
        .unwrap();
    assert_eq!(answer.context_items, vec!["captioned"]);
    assert!(generator.last_prompt().contains("a dog chasing a ball"));
}

#[tokio::test]
async fn test_context_respects_character_budget() {
    let question = "Why?";
    let first_entry = "[item:1] Golden retrievers love swimming at the beach.\n";
    let budget = frame_overhead(question) + first_entry.chars().count() + 5;
    let generator = Arc::new(MockGenerator::new().with_max_input_chars(budget));
    let pipeline = pipeline_with(Vec::new(), None, Some(generator.clone()));
    seeded(&pipeline).await;

    let answer = pipeline
        .answer("Kb", question, &hits(&["1", "2", "3"]))
        .await
        .unwrap();
    assert_eq!(answer.context_items, vec!["1"]);
    assert_eq!(answer.citations, vec!["1"]);
    assert!(answer.truncated);
    assert!(generator.last_prompt().chars().count() <= budget);
    assert!(!generator.last_prompt().contains("[item:2]"));
}

#[tokio::test]
async fn test_context_item_limit() {
    let generator = Arc::new(MockGenerator::new());
    let pipeline = pipeline_with(Vec::new(), None, Some(generator.clone()));
    pipeline
        .create_collection(
            "Many",
            None,
            PropertySchema::multimodal(),
            vec![clip_space("clip_space", "clip")],
        )
        .await
        .unwrap();
    let ids: Vec<String> = (0..8).map(|i| format!("n{}", i)).collect();
    for id in &ids {
        pipeline
            .ingest("Many", Item::new(id.as_str()).with_text(format!("fact number {}", id)))
            .await
            .unwrap();
    }
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let answer = pipeline.answer("Many", "facts?", &hits(&refs)).await.unwrap();
    assert_eq!(answer.context_items, vec!["n0", "n1", "n2", "n3", "n4"]);
    assert!(answer.truncated);
}

#[tokio::test]
async fn test_transient_generation_failures_are_retried() {
    let generator = Arc::new(MockGenerator::failing_first(2));
    let pipeline = pipeline_with(Vec::new(), None, Some(generator.clone()));
    seeded(&pipeline).await;

    let answer = pipeline.answer("Kb", "beach?", &hits(&["1"])).await.unwrap();
    assert_eq!(answer.citations, vec!["1"]);
    assert_eq!(generator.call_count(), 3);
}

#[tokio::test]
async fn test_generation_unavailable_after_retries() {
    let generator = Arc::new(MockGenerator::failing_first(100));
    let pipeline = pipeline_with(Vec::new(), None, Some(generator.clone()));
    seeded(&pipeline).await;

    let err = pipeline
        .answer("Kb", "beach?", &hits(&["1"]))
        .await
        .unwrap_err();
    match err {
        RagError::GenerationUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected GenerationUnavailable, got {:?}", other),
    }
    assert_eq!(generator.call_count(), 3);
}

#[tokio::test]
async fn test_answer_preconditions() {
    let pipeline = simple_pipeline();
    seeded(&pipeline).await;
    let no_generator = pipeline
        .answer("Kb", "beach?", &hits(&["1"]))
        .await
        .unwrap_err();
    assert_eq!(no_generator.error_code(), "CONFIG_ERROR");

    let pipeline = pipeline_with(Vec::new(), None, Some(Arc::new(MockGenerator::new())));
    seeded(&pipeline).await;
    let blank = pipeline.answer("Kb", "  ", &hits(&["1"])).await.unwrap_err();
    assert_eq!(blank.error_code(), "INVALID_REQUEST");
}
