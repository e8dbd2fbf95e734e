// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{answer, collections, items, search};
use crate::pipeline::RagPipeline;
use crate::version;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
}

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/v1/collections",
            post(collections::create_collection_handler).get(collections::list_collections_handler),
        )
        .route(
            "/v1/collections/:name",
            get(collections::get_collection_handler).delete(collections::delete_collection_handler),
        )
        .route("/v1/collections/:name/spaces", post(collections::add_space_handler))
        .route("/v1/collections/:name/items", post(items::ingest_handler))
        .route("/v1/collections/:name/items/batch", post(items::ingest_batch_handler))
        .route(
            "/v1/collections/:name/items/:id",
            get(items::get_item_handler).delete(items::delete_item_handler),
        )
        .route("/v1/collections/:name/search", post(search::search_handler))
        .route("/v1/collections/:name/compare", post(search::compare_handler))
        .route("/v1/collections/:name/rerank", post(answer::rerank_handler))
        .route("/v1/collections/:name/answer", post(answer::answer_handler))
        .route("/v1/collections/:name/ask", post(answer::ask_handler))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    pipeline: Arc<RagPipeline>,
    addr: SocketAddr,
    max_body_bytes: usize,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(AppState { pipeline }, max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.pipeline.health().await;
    let status = if report.healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let vectorizers: serde_json::Map<String, serde_json::Value> = report
        .vectorizers
        .iter()
        .map(|(id, ok)| (id.clone(), json!(ok)))
        .collect();
    (
        status,
        Json(json!({
            "status": if report.healthy() { "healthy" } else { "degraded" },
            "version": version::VERSION_NUMBER,
            "store": report.store,
            "vectorizers": vectorizers,
            "reranker": report.reranker,
            "generator": report.generator,
            "collections": state.pipeline.list_collections().len(),
        })),
    )
}

