// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod answer;
pub mod collections;
pub mod errors;
pub mod http_server;
pub mod items;
pub mod search;

pub use answer::{AnswerApiRequest, AskApiRequest, RerankApiRequest};
pub use collections::{CollectionsResponse, CreateCollectionRequest};
pub use errors::{ApiError, ErrorResponse};
pub use http_server::{create_router, start_server, AppState};
pub use items::{BatchItemOutcome, IngestApiRequest, IngestBatchRequest, IngestBatchResponse};
pub use search::{SearchApiRequest, SearchApiResponse};
