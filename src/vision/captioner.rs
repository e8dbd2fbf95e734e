// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption collaborator for image items without text

use async_trait::async_trait;
use std::sync::Arc;

use super::vlm_client::VlmClient;
use crate::errors::RagError;

/// Produces a short textual description of an image
#[async_trait]
pub trait Captioner: Send + Sync {
    fn name(&self) -> &str;

    async fn caption(&self, image: &[u8]) -> Result<String, RagError>;
}

/// Captions images through a vision-language model
pub struct VlmCaptioner {
    client: Arc<VlmClient>,
}

impl VlmCaptioner {
    pub fn new(client: Arc<VlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Captioner for VlmCaptioner {
    fn name(&self) -> &str {
        self.client.backend_id()
    }

    async fn caption(&self, image: &[u8]) -> Result<String, RagError> {
        let completion = self.client.caption(image).await?;
        let caption = completion.text.trim().to_string();
        if caption.is_empty() {
            return Err(RagError::rejected(self.name(), "empty caption"));
        }
        Ok(caption)
    }
}
