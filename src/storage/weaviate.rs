// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Weaviate-backed vector store over REST + GraphQL
//!
//! Each collection maps to one Weaviate class with one named vector per
//! vector space (`vectorizer: none`, vectors are computed by our adapters).
//! Object ids are UUIDv5 of `collection/item_id`; the item id itself is kept
//! in the `itemId` property. Metadata is stored as a JSON string and, for
//! filtering, flattened into `meta_<key>` text properties declared with
//! `field` tokenization so filters match whole values only.
//!
//! Names that are not already valid Weaviate identifiers are sanitised and
//! suffixed with a digest of the raw name, keeping the mapping one-to-one.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{rank_hits, StoredItem, VectorHit, VectorStore};
use crate::errors::{http, RagError};
use crate::types::{Collection, Item, MetadataFilter, PropertyType, VectorSpace};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WeaviateConfig {
    pub url: String,
    /// Env var holding an API key, if the instance requires one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for WeaviateConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            api_key_env: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

pub struct WeaviateStore {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    /// Declared property names per class
    known_properties: Mutex<HashMap<String, HashSet<String>>>,
}

impl WeaviateStore {
    pub fn new(config: &WeaviateConfig, api_key: Option<String>) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Config(format!("http client: {}", e)))?;
        let endpoint = config.url.trim_end_matches('/').to_string();
        info!("Weaviate store configured: endpoint={}", endpoint);
        Ok(Self {
            client,
            endpoint,
            api_key,
            known_properties: Mutex::new(HashMap::new()),
        })
    }

    fn cached_properties(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<String>>> {
        match self.known_properties.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Property names declared on `class`; an absent class has none
    async fn class_properties(&self, class: &str, refresh: bool) -> Result<HashSet<String>, RagError> {
        if !refresh {
            let cached = self.cached_properties().get(class).cloned();
            if let Some(known) = cached {
                return Ok(known);
            }
        }
        let response = self
            .send(self.client.get(format!("{}/v1/schema/{}", self.endpoint, class)))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            self.cached_properties().remove(class);
            return Ok(HashSet::new());
        }
        let def = expect_success(response).await?;
        let names: HashSet<String> = def
            .get("properties")
            .and_then(Value::as_array)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|p| p.get("name").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        self.cached_properties()
            .insert(class.to_string(), names.clone());
        Ok(names)
    }

    /// Declare `meta_<key>` properties for `item` before it is written, so
    /// auto-schema never creates them with word tokenization
    async fn declare_metadata_properties(&self, class: &str, item: &Item) -> Result<(), RagError> {
        if item.metadata.is_empty() {
            return Ok(());
        }
        let mut known = self.class_properties(class, false).await?;
        for key in item.metadata.keys() {
            let property = metadata_property(key);
            if known.contains(&property) {
                continue;
            }
            let response = self
                .send(
                    self.client
                        .post(format!("{}/v1/schema/{}/properties", self.endpoint, class))
                        .json(&metadata_property_definition(&property)),
                )
                .await?;
            if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
                // Declared concurrently by another writer
                known = self.class_properties(class, true).await?;
                if known.contains(&property) {
                    continue;
                }
                return Err(RagError::storage(
                    format!("could not declare property {} on {}", property, class),
                    false,
                ));
            }
            expect_success(response).await?;
            debug!("Declared filter property {} on {}", property, class);
            known.insert(property);
        }
        self.cached_properties().insert(class.to_string(), known);
        Ok(())
    }

    /// Whether every filtered key has a declared property on `class`
    async fn filter_is_satisfiable(&self, class: &str, filter: &MetadataFilter) -> Result<bool, RagError> {
        let wanted: Vec<String> = filter.keys().map(|k| metadata_property(k)).collect();
        let known = self.class_properties(class, false).await?;
        if wanted.iter().all(|p| known.contains(p)) {
            return Ok(true);
        }
        let known = self.class_properties(class, true).await?;
        Ok(wanted.iter().all(|p| known.contains(p)))
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, RagError> {
        self.request(builder)
            .send()
            .await
            .map_err(|e| RagError::storage(http::describe_transport(&e), true))
    }

    async fn graphql(&self, query: String) -> Result<Value, RagError> {
        let response = self
            .send(
                self.client
                    .post(format!("{}/v1/graphql", self.endpoint))
                    .json(&json!({ "query": query })),
            )
            .await?;
        let body = expect_success(response).await?;
        if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
            return Err(RagError::storage(format!("graphql: {}", errors), false));
        }
        Ok(body)
    }

    async fn fetch_object(&self, class: &str, id: Uuid) -> Result<Option<Value>, RagError> {
        let response = self
            .send(self.client.get(format!(
                "{}/v1/objects/{}/{}?include=vector",
                self.endpoint, class, id
            )))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        expect_success(response).await.map(Some)
    }
}

async fn expect_success(response: reqwest::Response) -> Result<Value, RagError> {
    let status = response.status();
    if status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|e| RagError::storage(http::describe_transport(&e), true))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_str(&body)
            .map_err(|e| RagError::storage(format!("unparseable response: {}", e), false));
    }
    let body = response.text().await.unwrap_or_default();
    Err(RagError::storage(
        format!("HTTP {}: {}", status.as_u16(), body),
        http::status_is_transient(status),
    ))
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if is_identifier_char(c) { c } else { '_' })
        .collect()
}

/// First 8 hex chars of SHA-256 over the raw name
fn name_digest(raw: &str) -> String {
    Sha256::digest(raw.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Weaviate class names start with an uppercase letter and hold `[A-Za-z0-9_]`.
/// Names already in that form are used as-is.
pub fn class_name(collection: &str) -> String {
    let valid = collection.starts_with(|c: char| c.is_ascii_uppercase())
        && collection.chars().all(is_identifier_char);
    if valid {
        return collection.to_string();
    }
    let sanitized = sanitize(collection);
    let mut chars = sanitized.chars();
    let base = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            first.to_ascii_uppercase().to_string() + chars.as_str()
        }
        _ => format!("C{}", sanitized),
    };
    format!("{}_{}", base, name_digest(collection))
}

pub fn object_uuid(collection: &str, item_id: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}/{}", collection, item_id).as_bytes(),
    )
}

/// Property name carrying one metadata key for filtering
pub fn metadata_property(key: &str) -> String {
    if !key.is_empty() && key.chars().all(is_identifier_char) {
        return format!("meta_{}", key);
    }
    format!("meta_{}_{}", sanitize(key), name_digest(key))
}

/// Exact-match text property used by metadata filters
pub fn metadata_property_definition(property: &str) -> Value {
    json!({
        "name": property,
        "dataType": ["text"],
        "tokenization": "field",
        "indexFilterable": true,
    })
}

fn vector_config(space: &VectorSpace) -> Value {
    json!({
        "vectorizer": { "none": {} },
        "vectorIndexType": "hnsw",
        "vectorIndexConfig": { "distance": space.distance_metric.as_str() }
    })
}

pub fn class_definition(collection: &Collection) -> Value {
    let mut properties: Vec<Value> = vec![
        json!({"name": "itemId", "dataType": ["text"], "tokenization": "field"}),
        json!({"name": "createdAt", "dataType": ["date"]}),
    ];
    for prop in &collection.schema.properties {
        let data_type = match prop.data_type {
            PropertyType::Text => "text",
            PropertyType::Blob => "blob",
            PropertyType::Date => "date",
        };
        let mut def = json!({"name": prop.name, "dataType": [data_type]});
        if let Some(description) = &prop.description {
            def["description"] = json!(description);
        }
        properties.push(def);
    }

    let vectors: Map<String, Value> = collection
        .vector_spaces
        .iter()
        .map(|s| (s.name.clone(), vector_config(s)))
        .collect();

    let mut class = json!({
        "class": class_name(&collection.name),
        "properties": properties,
        "vectorConfig": vectors,
    });
    if let Some(description) = &collection.description {
        class["description"] = json!(description);
    }
    class
}

pub fn object_properties(item: &Item) -> Value {
    let mut props = Map::new();
    props.insert("itemId".into(), json!(item.id));
    props.insert("createdAt".into(), json!(item.created_at.to_rfc3339()));
    if let Some(text) = &item.text {
        props.insert("text".into(), json!(text));
    }
    if let Some(image) = &item.image {
        props.insert("image".into(), json!(STANDARD.encode(image)));
    }
    let metadata = serde_json::to_string(&item.metadata).unwrap_or_else(|_| "{}".to_string());
    props.insert("metadata".into(), json!(metadata));
    for (key, value) in &item.metadata {
        props.insert(metadata_property(key), json!(value));
    }
    Value::Object(props)
}

pub fn item_from_properties(props: &Value) -> Result<Item, RagError> {
    let id = props
        .get("itemId")
        .and_then(Value::as_str)
        .ok_or_else(|| RagError::storage("stored object lacks itemId", false))?;
    let mut item = Item::new(id);
    item.text = props.get("text").and_then(Value::as_str).map(str::to_string);
    item.image = props
        .get("image")
        .and_then(Value::as_str)
        .map(|b64| STANDARD.decode(b64))
        .transpose()
        .map_err(|e| RagError::storage(format!("stored image is not base64: {}", e), false))?;
    item.metadata = props
        .get("metadata")
        .and_then(Value::as_str)
        .map(serde_json::from_str::<BTreeMap<String, String>>)
        .transpose()
        .map_err(|e| RagError::storage(format!("stored metadata is not JSON: {}", e), false))?
        .unwrap_or_default();
    if let Some(created) = props
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        item.created_at = created.with_timezone(&Utc);
    }
    Ok(item)
}

fn vectors_from_object(object: &Value) -> BTreeMap<String, Vec<f32>> {
    object
        .get("vectors")
        .and_then(Value::as_object)
        .map(|vectors| {
            vectors
                .iter()
                .filter_map(|(name, v)| {
                    serde_json::from_value::<Vec<f32>>(v.clone())
                        .ok()
                        .map(|v| (name.clone(), v))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn where_clause(filter: &MetadataFilter) -> Option<String> {
    if filter.is_empty() {
        return None;
    }
    let operands: Vec<String> = filter
        .iter()
        .map(|(key, value)| {
            format!(
                "{{path: [{}], operator: Equal, valueText: {}}}",
                json!(metadata_property(key)),
                json!(value)
            )
        })
        .collect();
    Some(format!(
        "{{operator: And, operands: [{}]}}",
        operands.join(", ")
    ))
}

pub fn near_vector_query(
    collection: &str,
    space: &VectorSpace,
    query: &[f32],
    top_k: usize,
    filter: &MetadataFilter,
) -> String {
    let vector = serde_json::to_string(query).unwrap_or_else(|_| "[]".to_string());
    let mut args = format!(
        "limit: {}, nearVector: {{vector: {}, targetVectors: [{}]}}",
        top_k,
        vector,
        json!(space.name)
    );
    if let Some(clause) = where_clause(filter) {
        args.push_str(&format!(", where: {}", clause));
    }
    format!(
        "{{ Get {{ {}({}) {{ itemId _additional {{ distance }} }} }} }}",
        class_name(collection),
        args
    )
}

pub fn parse_search_response(
    body: &Value,
    collection: &str,
    space: &VectorSpace,
) -> Result<Vec<VectorHit>, RagError> {
    let class = class_name(collection);
    let rows = body
        .pointer(&format!("/data/Get/{}", class))
        .and_then(Value::as_array)
        .ok_or_else(|| RagError::storage("graphql response lacks results", false))?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let item_id = row.get("itemId")?.as_str()?.to_string();
            let distance = row.pointer("/_additional/distance")?.as_f64()? as f32;
            Some(VectorHit {
                item_id,
                score: space.distance_metric.score_from_distance(distance),
            })
        })
        .collect())
}

#[async_trait]
impl VectorStore for WeaviateStore {
    async fn ensure_collection(&self, collection: &Collection) -> Result<(), RagError> {
        let class = class_name(&collection.name);
        let existing = self
            .send(self.client.get(format!("{}/v1/schema/{}", self.endpoint, class)))
            .await?;

        if existing.status() == StatusCode::NOT_FOUND {
            let response = self
                .send(
                    self.client
                        .post(format!("{}/v1/schema", self.endpoint))
                        .json(&class_definition(collection)),
                )
                .await?;
            expect_success(response).await?;
            self.cached_properties().remove(&class);
            info!("Created Weaviate class {}", class);
            return Ok(());
        }

        let mut current = expect_success(existing).await?;
        let declared = current
            .get("vectorConfig")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let missing: Vec<&VectorSpace> = collection
            .vector_spaces
            .iter()
            .filter(|s| !declared.contains_key(&s.name))
            .collect();
        if missing.is_empty() {
            debug!("Weaviate class {} already exists", class);
            return Ok(());
        }

        let mut vectors = declared;
        for space in missing {
            vectors.insert(space.name.clone(), vector_config(space));
        }
        current["vectorConfig"] = Value::Object(vectors);
        let response = self
            .send(
                self.client
                    .put(format!("{}/v1/schema/{}", self.endpoint, class))
                    .json(&current),
            )
            .await?;
        expect_success(response).await?;
        info!("Added named vectors to Weaviate class {}", class);
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), RagError> {
        let class = class_name(collection);
        let response = self
            .send(self.client.delete(format!("{}/v1/schema/{}", self.endpoint, class)))
            .await?;
        self.cached_properties().remove(&class);
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        expect_success(response).await.map(|_| ())
    }

    async fn upsert(
        &self,
        collection: &str,
        item: &Item,
        vectors: &BTreeMap<String, Vec<f32>>,
        touched_spaces: &[String],
    ) -> Result<(), RagError> {
        let class = class_name(collection);
        let id = object_uuid(collection, &item.id);
        self.declare_metadata_properties(&class, item).await?;
        let existing = self.fetch_object(&class, id).await?;

        let mut merged = existing
            .as_ref()
            .map(vectors_from_object)
            .unwrap_or_default();
        for space in touched_spaces {
            merged.remove(space);
        }
        merged.extend(vectors.iter().map(|(k, v)| (k.clone(), v.clone())));

        let body = json!({
            "class": class,
            "id": id,
            "properties": object_properties(item),
            "vectors": merged,
        });
        let builder = if existing.is_some() {
            self.client
                .put(format!("{}/v1/objects/{}/{}", self.endpoint, class, id))
        } else {
            self.client.post(format!("{}/v1/objects", self.endpoint))
        };
        let response = self.send(builder.json(&body)).await?;
        expect_success(response).await?;
        debug!("Upserted {} into {} ({} vectors)", item.id, class, merged.len());
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        space: &VectorSpace,
        query: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorHit>, RagError> {
        if !filter.is_empty() {
            let class = class_name(collection);
            if !self.filter_is_satisfiable(&class, filter).await? {
                debug!("Filter on {} names an undeclared property, no matches", class);
                return Ok(Vec::new());
            }
        }
        let body = self
            .graphql(near_vector_query(collection, space, query, top_k, filter))
            .await?;
        let mut hits = parse_search_response(&body, collection, space)?;
        rank_hits(&mut hits, top_k);
        Ok(hits)
    }

    async fn get(&self, collection: &str, item_id: &str) -> Result<Option<StoredItem>, RagError> {
        let class = class_name(collection);
        let Some(object) = self.fetch_object(&class, object_uuid(collection, item_id)).await? else {
            return Ok(None);
        };
        let props = object.get("properties").cloned().unwrap_or(Value::Null);
        Ok(Some(StoredItem {
            item: item_from_properties(&props)?,
            vectors: vectors_from_object(&object),
        }))
    }

    async fn delete(&self, collection: &str, item_id: &str) -> Result<bool, RagError> {
        let class = class_name(collection);
        let id = object_uuid(collection, item_id);
        let response = self
            .send(
                self.client
                    .delete(format!("{}/v1/objects/{}/{}", self.endpoint, class, id)),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        expect_success(response).await.map(|_| true)
    }

    async fn count(&self, collection: &str) -> Result<usize, RagError> {
        let class = class_name(collection);
        let body = self
            .graphql(format!("{{ Aggregate {{ {} {{ meta {{ count }} }} }} }}", class))
            .await?;
        let count = body
            .pointer(&format!("/data/Aggregate/{}/0/meta/count", class))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(count as usize)
    }

    fn name(&self) -> &'static str {
        "weaviate"
    }

    async fn health_check(&self) -> bool {
        match self
            .send(self.client.get(format!("{}/v1/.well-known/ready", self.endpoint)))
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("Weaviate health check failed: {}", e);
                false
            }
        }
    }
}
