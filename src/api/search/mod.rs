// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multimodal search endpoints
//!
//! `/v1/collections/:name/search` and `/v1/collections/:name/compare`.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{compare_handler, search_handler};
pub use request::SearchApiRequest;
pub use response::SearchApiResponse;
