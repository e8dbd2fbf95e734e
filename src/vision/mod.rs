// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision helpers
//!
//! - Image validation and data URIs for vectorizer requests
//! - Captioning of image items so rerankers and prompts have text to work with

pub mod captioner;
pub mod image_utils;
pub mod vlm_client;

pub use captioner::{Captioner, VlmCaptioner};
pub use image_utils::{data_uri, detect_format, inspect_image, ImageError, ImageInfo, MAX_IMAGE_SIZE};
pub use vlm_client::{ChatCompletion, VlmClient};
