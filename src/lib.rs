// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod errors;
pub mod generate;
pub mod ingest;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod rerank;
pub mod retry;
pub mod storage;
pub mod types;
pub mod vectorizer;
pub mod version;
pub mod vision;

// Re-export main types
pub use errors::RagError;
pub use generate::{Answer, AnswerSynthesizer, GenerationBackend};
pub use ingest::{IngestOptions, IngestionPipeline};
pub use pipeline::{AskResponse, HealthReport, RagPipeline};
pub use query::{MergeMode, QueryEngine, SearchRequest, SearchResponse, SpaceResults};
pub use registry::{CollectionRegistry, Creation};
pub use rerank::{RelevanceScorer, RerankOutcome, Reranker};
pub use storage::{InMemoryVectorStore, VectorStore};
pub use types::{
    Collection, DistanceMetric, IngestResult, Item, ItemContent, Modality, QueryResult, VectorSpace,
};
pub use vectorizer::{AdapterRegistry, EmbedPurpose, VectorizerAdapter};
