// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deterministic offline text vectorizer (signed feature hashing)
//!
//! Needs no model or network. Texts sharing tokens land near each other,
//! which is enough for lexical retrieval, local development and benchmarks.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use super::adapter::{l2_normalize, EmbedPurpose, VectorizerAdapter};
use crate::errors::RagError;
use crate::types::{ItemContent, Modality};

pub struct FeatureHashAdapter {
    backend_id: String,
    dimensions: usize,
    modalities: BTreeSet<Modality>,
}

impl FeatureHashAdapter {
    pub fn new(backend_id: impl Into<String>, dimensions: usize) -> Result<Self, RagError> {
        if dimensions == 0 {
            return Err(RagError::Config(
                "feature hash dimensions must be greater than 0".into(),
            ));
        }
        Ok(Self {
            backend_id: backend_id.into(),
            dimensions,
            modalities: BTreeSet::from([Modality::Text]),
        })
    }

    /// Hash every lowercase alphanumeric token into a signed bucket
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(vector)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl VectorizerAdapter for FeatureHashAdapter {
    fn backend_id(&self) -> &str {
        &self.backend_id
    }

    fn modalities(&self) -> &BTreeSet<Modality> {
        &self.modalities
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, content: &ItemContent, _purpose: EmbedPurpose) -> Result<Vec<f32>, RagError> {
        let text = content
            .text
            .as_deref()
            .ok_or_else(|| RagError::UnsupportedModality {
                backend_id: self.backend_id.clone(),
                modality: Modality::Image.to_string(),
            })?;
        Ok(self.vectorize(text))
    }
}
