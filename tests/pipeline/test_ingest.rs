// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Ingestion: per-space isolation, retries, skipped spaces and re-ingestion

use super::common::*;
use async_trait::async_trait;
use multimodal_rag_node::storage::VectorStore;
use multimodal_rag_node::types::PropertySchema;
use multimodal_rag_node::vision::Captioner;
use multimodal_rag_node::{
    AnswerSynthesizer, IngestOptions, InMemoryVectorStore, Item, RagError, RagPipeline,
    VectorizerAdapter,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

async fn collection(pipeline: &RagPipeline, spaces: Vec<multimodal_rag_node::VectorSpace>) {
    pipeline
        .create_collection("Items", None, PropertySchema::multimodal(), spaces)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_item_lands_in_every_applicable_space() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_on(
        store.clone(),
        vec![Arc::new(CoarseText::new("coarse"))],
        None,
        None,
    );
    collection(
        &pipeline,
        vec![clip_space("clip_space", "clip"), text_space("text_space", "coarse")],
    )
    .await;

    let result = pipeline
        .ingest(
            "Items",
            Item::new("1")
                .with_text("a golden retriever")
                .with_image(png(DOG)),
        )
        .await
        .unwrap();

    assert_eq!(result.item_id, "1");
    assert_eq!(result.succeeded_spaces, vec!["clip_space", "text_space"]);
    assert!(result.failed_spaces.is_empty());
    assert!(result.skipped_spaces.is_empty());

    let stored = store.get("Items", "1").await.unwrap().unwrap();
    assert_eq!(stored.vectors.len(), 2);
    assert_eq!(stored.vectors["clip_space"].len(), CONCEPT_DIMS);
}

#[tokio::test]
async fn test_image_only_item_skips_text_space() {
    let pipeline = pipeline_with(vec![Arc::new(CoarseText::new("coarse"))], None, None);
    collection(
        &pipeline,
        vec![clip_space("clip_space", "clip"), text_space("text_space", "coarse")],
    )
    .await;

    let result = pipeline
        .ingest("Items", Item::new("img").with_image(png(CAT)))
        .await
        .unwrap();
    assert_eq!(result.succeeded_spaces, vec!["clip_space"]);
    assert_eq!(result.skipped_spaces, vec!["text_space"]);
}

#[tokio::test]
async fn test_one_failing_space_does_not_abort_siblings() {
    let broken = Arc::new(FailingAdapter::unavailable("broken"));
    let rejecting = Arc::new(FailingAdapter::rejecting("strict"));
    let pipeline = pipeline_with(
        vec![
            broken.clone() as Arc<dyn VectorizerAdapter>,
            rejecting.clone() as Arc<dyn VectorizerAdapter>,
        ],
        None,
        None,
    );
    collection(
        &pipeline,
        vec![
            clip_space("clip_space", "clip"),
            clip_space("broken_space", "broken"),
            clip_space("strict_space", "strict"),
        ],
    )
    .await;

    let result = pipeline
        .ingest("Items", Item::new("1").with_text("a red car"))
        .await
        .unwrap();

    assert_eq!(result.succeeded_spaces, vec!["clip_space"]);
    assert_eq!(result.failed_spaces.len(), 2);
    assert_eq!(result.failed_spaces[0].space_name, "broken_space");
    assert_eq!(result.failed_spaces[0].error_code, "BACKEND_UNAVAILABLE");
    assert_eq!(result.failed_spaces[1].error_code, "BACKEND_REJECTED");

    // Transient errors are retried, permanent ones are not
    assert_eq!(broken.calls.load(Ordering::SeqCst), 3);
    assert_eq!(rejecting.calls.load(Ordering::SeqCst), 1);

    assert!(pipeline.get_item("Items", "1").await.is_ok());
}

#[tokio::test]
async fn test_total_failure_stores_nothing() {
    let pipeline = pipeline_with(vec![Arc::new(FailingAdapter::unavailable("broken"))], None, None);
    collection(&pipeline, vec![clip_space("broken_space", "broken")]).await;

    let err = pipeline
        .ingest("Items", Item::new("1").with_text("anything"))
        .await
        .unwrap_err();
    match err {
        RagError::IngestFailed { item_id, reasons } => {
            assert_eq!(item_id, "1");
            assert_eq!(reasons.len(), 1);
            assert_eq!(reasons[0].space_name, "broken_space");
        }
        other => panic!("expected IngestFailed, got {:?}", other),
    }
    assert_eq!(
        pipeline.get_item("Items", "1").await.unwrap_err().error_code(),
        "NOT_FOUND"
    );
}

#[tokio::test]
async fn test_item_matching_no_space_fails() {
    let pipeline = pipeline_with(vec![Arc::new(CoarseText::new("coarse"))], None, None);
    collection(&pipeline, vec![text_space("text_space", "coarse")]).await;

    let err = pipeline
        .ingest("Items", Item::new("img").with_image(png(DOG)))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INGEST_FAILED");
}

#[tokio::test]
async fn test_transient_failures_are_retried_to_success() {
    let flaky = Arc::new(FlakyAdapter::new("flaky", 2));
    let pipeline = pipeline_with(vec![flaky.clone() as Arc<dyn VectorizerAdapter>], None, None);
    collection(&pipeline, vec![clip_space("flaky_space", "flaky")]).await;

    let result = pipeline
        .ingest("Items", Item::new("1").with_text("a puppy"))
        .await
        .unwrap();
    assert_eq!(result.succeeded_spaces, vec!["flaky_space"]);
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_items_are_rejected_before_embedding() {
    let pipeline = simple_pipeline();
    collection(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    let empty = pipeline.ingest("Items", Item::new("1")).await.unwrap_err();
    assert_eq!(empty.error_code(), "INVALID_ITEM");

    let garbage = pipeline
        .ingest("Items", Item::new("2").with_image(vec![1, 2, 3, 4, 5, 6]))
        .await
        .unwrap_err();
    assert_eq!(garbage.error_code(), "INVALID_ITEM");
}

#[tokio::test]
async fn test_reingestion_replaces_vectors() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_on(store.clone(), Vec::new(), None, None);
    collection(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    pipeline
        .ingest("Items", Item::new("1").with_text("a dog"))
        .await
        .unwrap();
    let before = store.get("Items", "1").await.unwrap().unwrap();

    pipeline
        .ingest("Items", Item::new("1").with_text("city skyline"))
        .await
        .unwrap();
    let after = store.get("Items", "1").await.unwrap().unwrap();

    assert_ne!(before.vectors["clip_space"], after.vectors["clip_space"]);
    assert_eq!(after.item.text.as_deref(), Some("city skyline"));
    assert_eq!(store.count("Items").await.unwrap(), 1);
}

#[tokio::test]
async fn test_identical_reingestion_is_idempotent() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_on(store.clone(), Vec::new(), None, None);
    collection(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    let item = Item::new("1")
        .with_text("a dog on the beach")
        .with_image(png(DOG))
        .with_metadata("source", "camera");
    pipeline.ingest("Items", item.clone()).await.unwrap();
    let before = store.get("Items", "1").await.unwrap().unwrap();

    let result = pipeline.ingest("Items", item).await.unwrap();
    assert_eq!(result.succeeded_spaces, vec!["clip_space"]);
    let after = store.get("Items", "1").await.unwrap().unwrap();

    assert_eq!(before.vectors, after.vectors);
    assert_eq!(before.item, after.item);
    assert_eq!(store.count("Items").await.unwrap(), 1);
}

#[tokio::test]
async fn test_scoped_ingestion_backfills_new_space() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_on(
        store.clone(),
        vec![Arc::new(CoarseText::new("coarse"))],
        None,
        None,
    );
    collection(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    let item = Item::new("1").with_text("a cat on a car");
    pipeline.ingest("Items", item.clone()).await.unwrap();
    let original = store.get("Items", "1").await.unwrap().unwrap();

    pipeline
        .add_vector_space("Items", text_space("coarse_space", "coarse"))
        .await
        .unwrap();
    let options = IngestOptions {
        spaces: Some(vec!["coarse_space".to_string()]),
    };
    let result = pipeline.ingest_with("Items", item, &options).await.unwrap();
    assert_eq!(result.succeeded_spaces, vec!["coarse_space"]);

    let stored = store.get("Items", "1").await.unwrap().unwrap();
    assert_eq!(stored.vectors.len(), 2);
    assert_eq!(stored.vectors["clip_space"], original.vectors["clip_space"]);

    let unknown = IngestOptions {
        spaces: Some(vec!["nope".to_string()]),
    };
    let err = pipeline
        .ingest_with("Items", Item::new("2").with_text("x"), &unknown)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_batch_keeps_order_and_isolates_failures() {
    let pipeline = simple_pipeline();
    collection(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    let items = vec![
        Item::new("a").with_text("dog"),
        Item::new("b"),
        Item::new("c").with_image(png(CAR)),
    ];
    let results = pipeline
        .ingest_batch("Items", items, &IngestOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().item_id, "a");
    assert_eq!(results[1].as_ref().unwrap_err().error_code(), "INVALID_ITEM");
    assert_eq!(results[2].as_ref().unwrap().item_id, "c");

    let missing = pipeline
        .ingest_batch("Nope", Vec::new(), &IngestOptions::default())
        .await;
    assert!(missing.is_err());
}

struct FixedCaptioner;

#[async_trait]
impl Captioner for FixedCaptioner {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn caption(&self, _image: &[u8]) -> Result<String, RagError> {
        Ok("a photo of a dog".to_string())
    }
}

struct BrokenCaptioner;

#[async_trait]
impl Captioner for BrokenCaptioner {
    fn name(&self) -> &str {
        "broken"
    }

    async fn caption(&self, _image: &[u8]) -> Result<String, RagError> {
        Err(RagError::unavailable("broken", "vlm offline"))
    }
}

fn captioned_pipeline(captioner: Arc<dyn Captioner>) -> RagPipeline {
    RagPipeline::builder(
        adapters(vec![Arc::new(ConceptClip::new("clip"))]),
        Arc::new(InMemoryVectorStore::new()),
    )
    .captioner(captioner)
    .synthesizer(AnswerSynthesizer::new(fast_retry(), Duration::from_secs(5), 5))
    .build()
}

#[tokio::test]
async fn test_captioner_adds_text_to_image_items() {
    let pipeline = captioned_pipeline(Arc::new(FixedCaptioner));
    collection(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    pipeline
        .ingest("Items", Item::new("img").with_image(png(DOG)))
        .await
        .unwrap();
    pipeline
        .ingest(
            "Items",
            Item::new("txt").with_text("already described").with_image(png(DOG)),
        )
        .await
        .unwrap();

    let img = pipeline.get_item("Items", "img").await.unwrap();
    assert_eq!(img.metadata["caption"], "a photo of a dog");
    let txt = pipeline.get_item("Items", "txt").await.unwrap();
    assert!(!txt.metadata.contains_key("caption"));
}

#[tokio::test]
async fn test_caption_failure_does_not_fail_ingestion() {
    let pipeline = captioned_pipeline(Arc::new(BrokenCaptioner));
    collection(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    let result = pipeline
        .ingest("Items", Item::new("img").with_image(png(CAT)))
        .await
        .unwrap();
    assert_eq!(result.succeeded_spaces, vec!["clip_space"]);
    let item = pipeline.get_item("Items", "img").await.unwrap();
    assert!(item.metadata.is_empty());
}
