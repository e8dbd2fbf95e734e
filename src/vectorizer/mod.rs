// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vectorizer adapters
//!
//! Each embedding backend is an adapter registered under a unique
//! `backend_id`. Vector spaces name the backend they are bound to; nothing
//! outside this module inspects backend identity.
//!
//! Backends:
//! - `ClipInferenceAdapter`: local multi2vec inference containers (CLIP, Qwen-VL)
//! - `CohereEmbedAdapter`: Cohere embed v2 API, rate limited
//! - `FeatureHashAdapter`: deterministic offline text encoder

pub mod adapter;
pub mod clip;
pub mod cohere;
pub mod feature_hash;
pub mod rate_limiter;

pub use adapter::{l2_normalize, weighted_mean, AdapterRegistry, EmbedPurpose, VectorizerAdapter};
pub use clip::{ClipInferenceAdapter, ClipInferenceConfig};
pub use cohere::{CohereEmbedAdapter, CohereEmbedConfig};
pub use feature_hash::FeatureHashAdapter;
pub use rate_limiter::EmbedRateLimiter;
