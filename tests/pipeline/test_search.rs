// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Query engine: space resolution, partitioned results, rank merge, failures

use super::common::*;
use multimodal_rag_node::types::PropertySchema;
use multimodal_rag_node::{Item, RagPipeline, SearchRequest, VectorizerAdapter};
use std::sync::Arc;

async fn seeded(pipeline: &RagPipeline, spaces: Vec<multimodal_rag_node::VectorSpace>) {
    pipeline
        .create_collection("Media", None, PropertySchema::multimodal(), spaces)
        .await
        .unwrap();
    let items = vec![
        Item::new("city").with_text("a city skyline at night").with_metadata("source", "web"),
        Item::new("dog").with_text("a dog in the park").with_metadata("source", "camera"),
        Item::new("car").with_text("a red car").with_metadata("source", "web"),
    ];
    for item in items {
        pipeline.ingest("Media", item).await.unwrap();
    }
}

#[tokio::test]
async fn test_results_are_partitioned_per_space() {
    let pipeline = pipeline_with(vec![Arc::new(CoarseText::new("coarse"))], None, None);
    seeded(
        &pipeline,
        vec![clip_space("clip_space", "clip"), text_space("coarse_space", "coarse")],
    )
    .await;

    let response = pipeline
        .search("Media", &SearchRequest::text("dog").with_top_k(3))
        .await
        .unwrap();

    assert_eq!(response.collection, "Media");
    assert!(response.merged.is_none());
    let names: Vec<&str> = response.per_space.iter().map(|s| s.space_name.as_str()).collect();
    assert_eq!(names, vec!["clip_space", "coarse_space"]);

    let clip = response.space("clip_space").unwrap();
    assert_eq!(clip.backend_id, "clip");
    assert_eq!(clip.results[0].item_id, "dog");
    assert!(clip.results.iter().all(|r| r.space_name == "clip_space"));

    // The coarse model confuses cities with dogs
    let coarse = response.space("coarse_space").unwrap();
    assert_eq!(coarse.results[0].item_id, "city");
    assert_eq!(coarse.results[1].item_id, "dog");

    // Zero-score ties in clip_space break by item id
    assert_eq!(clip.results[1].item_id, "car");
    assert_eq!(clip.results[2].item_id, "city");
}

#[tokio::test]
async fn test_rank_merge_is_opt_in_and_ignores_raw_scores() {
    let pipeline = pipeline_with(vec![Arc::new(CoarseText::new("coarse"))], None, None);
    seeded(
        &pipeline,
        vec![clip_space("clip_space", "clip"), text_space("coarse_space", "coarse")],
    )
    .await;

    let response = pipeline
        .search("Media", &SearchRequest::text("dog").with_top_k(3).merged())
        .await
        .unwrap();
    let merged = response.merged.as_ref().unwrap();

    // dog 1+2, city 3+1, car 2+3
    assert_eq!(merged[0].item_id, "dog");
    assert_eq!(merged[0].ranks["clip_space"], 1);
    assert_eq!(merged[0].ranks["coarse_space"], 2);
    assert_eq!(merged[0].mean_rank, 1.5);
    assert_eq!(merged[1].item_id, "city");
    assert_eq!(merged[1].mean_rank, 2.0);
    assert_eq!(merged[2].item_id, "car");
    assert_eq!(response.primary_results()[0].item_id, "dog");
}

#[tokio::test]
async fn test_image_query_uses_only_image_capable_spaces() {
    let pipeline = pipeline_with(vec![Arc::new(CoarseText::new("coarse"))], None, None);
    seeded(
        &pipeline,
        vec![clip_space("clip_space", "clip"), text_space("coarse_space", "coarse")],
    )
    .await;
    pipeline
        .ingest("Media", Item::new("photo").with_image(png(CAT)))
        .await
        .unwrap();

    let response = pipeline
        .search("Media", &SearchRequest::image(png(CAT)))
        .await
        .unwrap();
    assert_eq!(response.per_space.len(), 1);
    assert_eq!(response.per_space[0].space_name, "clip_space");
    assert_eq!(response.per_space[0].results[0].item_id, "photo");

    // Explicitly asking a text-only space for an image query is an error
    let err = pipeline
        .search(
            "Media",
            &SearchRequest::image(png(CAR)).with_spaces(["coarse_space"]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_MODALITY");
}

#[tokio::test]
async fn test_request_validation() {
    let pipeline = simple_pipeline();
    seeded(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    let empty = pipeline
        .search("Media", &SearchRequest::text("   "))
        .await
        .unwrap_err();
    assert_eq!(empty.error_code(), "INVALID_MODALITY");

    let unknown_space = pipeline
        .search("Media", &SearchRequest::text("dog").with_spaces(["nope"]))
        .await
        .unwrap_err();
    assert_eq!(unknown_space.error_code(), "NOT_FOUND");

    let zero = pipeline
        .search("Media", &SearchRequest::text("dog").with_top_k(0))
        .await
        .unwrap_err();
    assert_eq!(zero.error_code(), "INVALID_REQUEST");

    let long = pipeline
        .search("Media", &SearchRequest::text("dog ".repeat(600)))
        .await
        .unwrap_err();
    assert_eq!(long.error_code(), "INVALID_REQUEST");

    let missing = pipeline
        .search("Nope", &SearchRequest::text("dog"))
        .await
        .unwrap_err();
    assert_eq!(missing.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_filters_top_k_and_min_score() {
    let pipeline = simple_pipeline();
    seeded(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    let filtered = pipeline
        .search("Media", &SearchRequest::text("dog").with_filter("source", "web"))
        .await
        .unwrap();
    let ids: Vec<&str> = filtered.per_space[0]
        .results
        .iter()
        .map(|r| r.item_id.as_str())
        .collect();
    assert!(!ids.contains(&"dog"));
    assert_eq!(ids.len(), 2);

    let top1 = pipeline
        .search("Media", &SearchRequest::text("red car").with_top_k(1))
        .await
        .unwrap();
    assert_eq!(top1.per_space[0].results.len(), 1);
    assert_eq!(top1.per_space[0].results[0].item_id, "car");

    let strict = pipeline
        .search("Media", &SearchRequest::text("dog").with_min_score(0.5))
        .await
        .unwrap();
    assert_eq!(strict.per_space[0].results.len(), 1);
    assert_eq!(strict.per_space[0].results[0].item_id, "dog");
}

#[tokio::test]
async fn test_failing_space_is_isolated() {
    let pipeline = pipeline_with(vec![Arc::new(FailingAdapter::unavailable("broken"))], None, None);
    pipeline
        .create_collection(
            "Media",
            None,
            PropertySchema::multimodal(),
            vec![clip_space("clip_space", "clip"), clip_space("broken_space", "broken")],
        )
        .await
        .unwrap();
    pipeline
        .ingest("Media", Item::new("dog").with_text("a dog"))
        .await
        .unwrap();

    let response = pipeline
        .search("Media", &SearchRequest::text("dog"))
        .await
        .unwrap();
    let clip = response.space("clip_space").unwrap();
    let broken = response.space("broken_space").unwrap();
    assert!(clip.succeeded());
    assert_eq!(clip.results[0].item_id, "dog");
    assert!(!broken.succeeded());
    assert!(broken.results.is_empty());
    assert_eq!(
        broken.error.as_ref().unwrap().error_code,
        "BACKEND_UNAVAILABLE"
    );

    let err = pipeline
        .search(
            "Media",
            &SearchRequest::text("dog").with_spaces(["broken_space"]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "BACKEND_UNAVAILABLE");
}

#[tokio::test]
async fn test_compare_forces_every_space_partitioned() {
    let extra: Vec<Arc<dyn VectorizerAdapter>> = vec![Arc::new(CoarseText::new("coarse"))];
    let pipeline = pipeline_with(extra, None, None);
    seeded(
        &pipeline,
        vec![clip_space("clip_space", "clip"), text_space("coarse_space", "coarse")],
    )
    .await;

    let request = SearchRequest::text("dog").with_spaces(["clip_space"]).merged();
    let response = pipeline.compare("Media", &request).await.unwrap();
    assert_eq!(response.per_space.len(), 2);
    assert!(response.merged.is_none());
}

#[tokio::test]
async fn test_deleted_item_disappears_from_results() {
    let pipeline = simple_pipeline();
    seeded(&pipeline, vec![clip_space("clip_space", "clip")]).await;

    assert!(pipeline.delete_item("Media", "dog").await.unwrap());
    assert!(!pipeline.delete_item("Media", "dog").await.unwrap());

    let response = pipeline
        .search("Media", &SearchRequest::text("dog"))
        .await
        .unwrap();
    assert!(response.per_space[0]
        .results
        .iter()
        .all(|r| r.item_id != "dog"));
}

#[tokio::test]
async fn test_repeated_search_returns_same_ordering() {
    let pipeline = pipeline_with(vec![Arc::new(CoarseText::new("coarse"))], None, None);
    seeded(
        &pipeline,
        vec![clip_space("clip_space", "clip"), text_space("coarse_space", "coarse")],
    )
    .await;

    // Zero-score ties in clip_space make the ordering depend on tie-breaking
    let request = SearchRequest::text("a red car")
        .with_spaces(["clip_space", "coarse_space"])
        .with_top_k(3);
    let first = pipeline.search("Media", &request).await.unwrap();
    for _ in 0..5 {
        let again = pipeline.search("Media", &request).await.unwrap();
        for (a, b) in first.per_space.iter().zip(&again.per_space) {
            assert_eq!(a.space_name, b.space_name);
            let ids_a: Vec<&str> = a.results.iter().map(|r| r.item_id.as_str()).collect();
            let ids_b: Vec<&str> = b.results.iter().map(|r| r.item_id.as_str()).collect();
            assert_eq!(ids_a, ids_b);
        }
    }
}

#[tokio::test]
async fn test_search_on_empty_collection_is_ok() {
    let pipeline = pipeline_with(vec![Arc::new(CoarseText::new("coarse"))], None, None);
    pipeline
        .create_collection(
            "Empty",
            None,
            PropertySchema::multimodal(),
            vec![clip_space("clip_space", "clip"), text_space("coarse_space", "coarse")],
        )
        .await
        .unwrap();

    let response = pipeline
        .search("Empty", &SearchRequest::text("dog").merged())
        .await
        .unwrap();
    assert_eq!(response.per_space.len(), 2);
    for space in &response.per_space {
        assert!(space.succeeded());
        assert!(space.results.is_empty());
    }
    assert!(response.merged.unwrap().is_empty());
}
