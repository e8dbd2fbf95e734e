// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core data model shared by ingestion, query, rerank and answer synthesis
//!
//! - `Item`: one unit of content (text, image or both) plus free-form metadata
//! - `VectorSpace`: a named embedding configuration bound to one backend
//! - `Collection`: a group of items declared against one or more vector spaces
//! - `QueryResult`: a ranked candidate produced per query, never persisted

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Exact-match metadata predicates (`key == value` for every entry)
pub type MetadataFilter = BTreeMap<String, String>;

/// Content modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Text => write!(f, "text"),
            Modality::Image => write!(f, "image"),
        }
    }
}

/// Render a modality set as `text+image` for logs and error messages
pub fn describe_modalities(modalities: &BTreeSet<Modality>) -> String {
    if modalities.is_empty() {
        return "none".to_string();
    }
    modalities
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("+")
}

/// Raw content handed to a vectorizer: text, image bytes, or both
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub image: Option<Vec<u8>>,
}

impl ItemContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            text: None,
            image: Some(bytes),
        }
    }

    /// Modalities actually present (blank text does not count)
    pub fn modalities(&self) -> BTreeSet<Modality> {
        let mut set = BTreeSet::new();
        if self.text.as_deref().map_or(false, |t| !t.trim().is_empty()) {
            set.insert(Modality::Text);
        }
        if self.image.as_ref().map_or(false, |i| !i.is_empty()) {
            set.insert(Modality::Image);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.modalities().is_empty()
    }

    /// Keep only the parts of this content whose modality is in `allowed`
    pub fn restricted_to(&self, allowed: &BTreeSet<Modality>) -> ItemContent {
        ItemContent {
            text: if allowed.contains(&Modality::Text) {
                self.text.clone()
            } else {
                None
            },
            image: if allowed.contains(&Modality::Image) {
                self.image.clone()
            } else {
                None
            },
        }
    }
}

/// One unit of stored content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub image: Option<Vec<u8>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: None,
            image: None,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn content(&self) -> ItemContent {
        ItemContent {
            text: self.text.clone(),
            image: self.image.clone(),
        }
    }

    pub fn modalities(&self) -> BTreeSet<Modality> {
        self.content().modalities()
    }

    /// Textual representation used by rerankers and prompt assembly:
    /// the item text, else a caption or description carried in metadata
    pub fn text_representation(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                ["caption", "description"]
                    .iter()
                    .filter_map(|k| self.metadata.get(*k))
                    .map(|s| s.as_str())
                    .find(|s| !s.trim().is_empty())
            })
    }

    pub fn matches_filter(&self, filter: &MetadataFilter) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.metadata.get(k).map_or(false, |actual| actual == v))
    }
}

/// Distance metric declared per vector space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    L2Squared,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Cosine
    }
}

impl DistanceMetric {
    /// Similarity between two vectors; higher is always more similar
    pub fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 {
                    0.0
                } else {
                    dot / (na * nb)
                }
            }
            DistanceMetric::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            DistanceMetric::L2Squared => -a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>(),
        }
    }

    /// Convert a store-reported distance back into a similarity score
    pub fn score_from_distance(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
            DistanceMetric::Dot | DistanceMetric::L2Squared => -distance,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Dot => "dot",
            DistanceMetric::L2Squared => "l2-squared",
        }
    }
}

/// A named, fixed-dimensionality embedding configuration bound to one backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSpace {
    pub name: String,
    pub backend_id: String,
    pub dimensionality: usize,
    pub modalities_covered: BTreeSet<Modality>,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
}

impl VectorSpace {
    pub fn new(
        name: impl Into<String>,
        backend_id: impl Into<String>,
        dimensionality: usize,
        modalities: impl IntoIterator<Item = Modality>,
    ) -> Self {
        Self {
            name: name.into(),
            backend_id: backend_id.into(),
            dimensionality,
            modalities_covered: modalities.into_iter().collect(),
            distance_metric: DistanceMetric::Cosine,
        }
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    /// Modalities of `available` this space can embed
    pub fn applicable(&self, available: &BTreeSet<Modality>) -> BTreeSet<Modality> {
        self.modalities_covered
            .intersection(available)
            .copied()
            .collect()
    }

    /// True when every modality of the query is covered by this space
    pub fn accepts_query(&self, query: &BTreeSet<Modality>) -> bool {
        !query.is_empty() && query.is_subset(&self.modalities_covered)
    }
}

/// Property data types understood by storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Text,
    Blob,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub name: String,
    pub data_type: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Property schema shared by every item of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub properties: Vec<PropertyDef>,
}

impl PropertySchema {
    /// text / image / metadata, the layout every multimodal collection uses
    pub fn multimodal() -> Self {
        let prop = |name: &str, data_type, description: &str| PropertyDef {
            name: name.to_string(),
            data_type,
            description: Some(description.to_string()),
        };
        Self {
            properties: vec![
                prop("text", PropertyType::Text, "text content"),
                prop("image", PropertyType::Blob, "image content (base64)"),
                prop("metadata", PropertyType::Text, "free-form metadata"),
            ],
        }
    }
}

impl Default for PropertySchema {
    fn default() -> Self {
        Self::multimodal()
    }
}

/// A named group of items declared against one or more vector spaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: PropertySchema,
    pub vector_spaces: Vec<VectorSpace>,
}

impl Collection {
    pub fn space(&self, name: &str) -> Option<&VectorSpace> {
        self.vector_spaces.iter().find(|s| s.name == name)
    }

    pub fn space_names(&self) -> Vec<String> {
        self.vector_spaces.iter().map(|s| s.name.clone()).collect()
    }

    /// Same schema and same vector spaces (description is cosmetic)
    pub fn same_definition(&self, other: &Collection) -> bool {
        self.name == other.name
            && self.schema == other.schema
            && self.vector_spaces == other.vector_spaces
    }
}

/// Ranked candidate produced by a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub item_id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    pub space_name: String,
}

impl QueryResult {
    pub fn new(item_id: impl Into<String>, score: f32, space_name: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            score,
            rerank_score: None,
            space_name: space_name.into(),
        }
    }
}

/// Sort by score descending, then item id ascending
pub fn sort_by_score(results: &mut [QueryResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
}

/// Why one space failed for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceFailure {
    pub space_name: String,
    pub error_code: String,
    pub reason: String,
}

/// Outcome of ingesting one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub item_id: String,
    pub succeeded_spaces: Vec<String>,
    pub failed_spaces: Vec<SpaceFailure>,
    /// Spaces whose modalities do not intersect the item's
    pub skipped_spaces: Vec<String>,
}

/// Serde adapter for optional binary blobs carried as standard base64
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        match encoded {
            Some(s) if !s.is_empty() => STANDARD
                .decode(s.as_bytes())
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
