// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Weaviate store against a minimal in-process REST/GraphQL stand-in

use super::mock_server::serve;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use multimodal_rag_node::storage::weaviate::{class_name, metadata_property, object_uuid};
use multimodal_rag_node::storage::{VectorStore, WeaviateConfig, WeaviateStore};
use multimodal_rag_node::types::{MetadataFilter, PropertySchema};
use multimodal_rag_node::{Collection, DistanceMetric, Item, Modality, VectorSpace};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockWeaviate {
    classes: Mutex<HashMap<String, Value>>,
    objects: Mutex<HashMap<String, Value>>,
    queries: Mutex<Vec<String>>,
    /// Schema and object writes in arrival order
    events: Mutex<Vec<String>>,
}

impl MockWeaviate {
    fn property(&self, class: &str, name: &str) -> Option<Value> {
        self.classes.lock().unwrap().get(class).and_then(|def| {
            def["properties"]
                .as_array()?
                .iter()
                .find(|p| p["name"] == name)
                .cloned()
        })
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

type Shared = Arc<MockWeaviate>;

async fn get_class(State(db): State<Shared>, Path(class): Path<String>) -> Response {
    match db.classes.lock().unwrap().get(&class) {
        Some(def) => Json(def.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn create_class(State(db): State<Shared>, Json(def): Json<Value>) -> Json<Value> {
    let class = def["class"].as_str().unwrap_or_default().to_string();
    db.classes.lock().unwrap().insert(class, def.clone());
    Json(def)
}

async fn update_class(
    State(db): State<Shared>,
    Path(class): Path<String>,
    Json(def): Json<Value>,
) -> Json<Value> {
    db.classes.lock().unwrap().insert(class, def.clone());
    Json(def)
}

async fn delete_class(State(db): State<Shared>, Path(class): Path<String>) -> StatusCode {
    match db.classes.lock().unwrap().remove(&class) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

/// Weaviate answers 422 when the property already exists
async fn add_property(
    State(db): State<Shared>,
    Path(class): Path<String>,
    Json(prop): Json<Value>,
) -> Response {
    let mut classes = db.classes.lock().unwrap();
    let Some(def) = classes.get_mut(&class) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !def["properties"].is_array() {
        def["properties"] = json!([]);
    }
    let props = def["properties"].as_array_mut().unwrap();
    if props.iter().any(|p| p["name"] == prop["name"]) {
        return (StatusCode::UNPROCESSABLE_ENTITY, "property already exists").into_response();
    }
    props.push(prop.clone());
    db.events
        .lock()
        .unwrap()
        .push(format!("property {}", prop["name"].as_str().unwrap_or_default()));
    Json(prop).into_response()
}

async fn create_object(State(db): State<Shared>, Json(object): Json<Value>) -> Json<Value> {
    db.events.lock().unwrap().push("object".to_string());
    let id = object["id"].as_str().unwrap_or_default().to_string();
    db.objects.lock().unwrap().insert(id, object.clone());
    Json(object)
}

async fn get_object(State(db): State<Shared>, Path((_, id)): Path<(String, String)>) -> Response {
    match db.objects.lock().unwrap().get(&id) {
        Some(object) => Json(object.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn replace_object(
    State(db): State<Shared>,
    Path((_, id)): Path<(String, String)>,
    Json(object): Json<Value>,
) -> Json<Value> {
    db.objects.lock().unwrap().insert(id, object.clone());
    Json(object)
}

async fn delete_object(State(db): State<Shared>, Path((_, id)): Path<(String, String)>) -> StatusCode {
    match db.objects.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// Every Get query returns "b" then "a"; Aggregate returns the object count
async fn graphql(State(db): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let query = body["query"].as_str().unwrap_or_default().to_string();
    db.queries.lock().unwrap().push(query.clone());
    if query.contains("Aggregate") {
        let count = db.objects.lock().unwrap().len();
        return Json(json!({ "data": { "Aggregate": { "Photos": [{ "meta": { "count": count } }] } } }));
    }
    Json(json!({
        "data": { "Get": { "Photos": [
            { "itemId": "b", "_additional": { "distance": 0.1 } },
            { "itemId": "a", "_additional": { "distance": 0.4 } }
        ] } }
    }))
}

async fn start() -> (WeaviateStore, Shared) {
    let db: Shared = Arc::new(MockWeaviate::default());
    let router = Router::new()
        .route("/v1/.well-known/ready", get(|| async { StatusCode::OK }))
        .route("/v1/schema", post(create_class))
        .route(
            "/v1/schema/:class",
            get(get_class).put(update_class).delete(delete_class),
        )
        .route("/v1/schema/:class/properties", post(add_property))
        .route("/v1/objects", post(create_object))
        .route(
            "/v1/objects/:class/:id",
            get(get_object).put(replace_object).delete(delete_object),
        )
        .route("/v1/graphql", post(graphql))
        .with_state(db.clone());
    let url = serve(router).await;
    let config = WeaviateConfig {
        url,
        ..WeaviateConfig::default()
    };
    (WeaviateStore::new(&config, None).unwrap(), db)
}

fn photos(spaces: Vec<VectorSpace>) -> Collection {
    Collection {
        name: "Photos".into(),
        description: None,
        schema: PropertySchema::multimodal(),
        vector_spaces: spaces,
    }
}

fn clip() -> VectorSpace {
    VectorSpace::new("clip", "clip", 2, [Modality::Text, Modality::Image])
}

#[tokio::test]
async fn test_collection_schema_lifecycle() {
    let (store, db) = start().await;
    assert!(store.health_check().await);

    store.ensure_collection(&photos(vec![clip()])).await.unwrap();
    store.ensure_collection(&photos(vec![clip()])).await.unwrap();
    assert_eq!(db.classes.lock().unwrap().len(), 1);

    let wider = photos(vec![
        clip(),
        VectorSpace::new("text", "hash", 4, [Modality::Text]).with_metric(DistanceMetric::Dot),
    ]);
    store.ensure_collection(&wider).await.unwrap();
    let def = db.classes.lock().unwrap()["Photos"].clone();
    assert_eq!(def["vectorConfig"]["text"]["vectorIndexConfig"]["distance"], "dot");
    assert!(def["vectorConfig"]["clip"].is_object());

    store.drop_collection("Photos").await.unwrap();
    assert!(db.classes.lock().unwrap().is_empty());
    store.drop_collection("Photos").await.unwrap();
}

#[tokio::test]
async fn test_upsert_get_and_delete() {
    let (store, db) = start().await;
    store.ensure_collection(&photos(vec![clip()])).await.unwrap();

    let item = Item::new("dog-1")
        .with_text("a dog")
        .with_image(vec![1, 2, 3])
        .with_metadata("source", "camera");
    let mut vectors = BTreeMap::new();
    vectors.insert("clip".to_string(), vec![0.6, 0.8]);
    store
        .upsert("Photos", &item, &vectors, &["clip".to_string()])
        .await
        .unwrap();

    let id = object_uuid("Photos", "dog-1").to_string();
    let stored_object = db.objects.lock().unwrap()[&id].clone();
    assert_eq!(stored_object["properties"]["meta_source"], "camera");

    let stored = store.get("Photos", "dog-1").await.unwrap().unwrap();
    assert_eq!(stored.item.text.as_deref(), Some("a dog"));
    assert_eq!(stored.item.image, Some(vec![1, 2, 3]));
    assert_eq!(stored.item.metadata["source"], "camera");
    assert_eq!(stored.vectors["clip"], vec![0.6, 0.8]);

    // A scoped re-ingest of another space keeps the clip vector
    let mut text_only = BTreeMap::new();
    text_only.insert("text".to_string(), vec![1.0, 0.0, 0.0, 0.0]);
    store
        .upsert("Photos", &item, &text_only, &["text".to_string()])
        .await
        .unwrap();
    let stored = store.get("Photos", "dog-1").await.unwrap().unwrap();
    assert_eq!(stored.vectors.len(), 2);
    assert_eq!(stored.vectors["clip"], vec![0.6, 0.8]);

    assert_eq!(store.count("Photos").await.unwrap(), 1);
    assert!(store.delete("Photos", "dog-1").await.unwrap());
    assert!(!store.delete("Photos", "dog-1").await.unwrap());
    assert!(store.get("Photos", "dog-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_builds_near_vector_query() {
    let (store, db) = start().await;
    store.ensure_collection(&photos(vec![clip()])).await.unwrap();
    let item = Item::new("a").with_text("x").with_metadata("source", "web");
    let mut vectors = BTreeMap::new();
    vectors.insert("clip".to_string(), vec![1.0, 0.0]);
    store
        .upsert("Photos", &item, &vectors, &["clip".to_string()])
        .await
        .unwrap();

    let mut filter = MetadataFilter::new();
    filter.insert("source".to_string(), "web".to_string());
    let hits = store
        .search("Photos", &clip(), &[0.6, 0.8], 5, &filter)
        .await
        .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].item_id, "b");
    assert!((hits[0].score - 0.9).abs() < 1e-6);
    assert_eq!(hits[1].item_id, "a");

    let query = db.queries.lock().unwrap()[0].clone();
    assert!(query.contains("Photos("));
    assert!(query.contains("nearVector"));
    assert!(query.contains("targetVectors: [\"clip\"]"));
    assert!(query.contains("meta_source"));
}

#[tokio::test]
async fn test_metadata_properties_are_declared_exact_match() {
    let (store, db) = start().await;
    store.ensure_collection(&photos(vec![clip()])).await.unwrap();
    let mut vectors = BTreeMap::new();
    vectors.insert("clip".to_string(), vec![1.0, 0.0]);

    let first = Item::new("1").with_text("x").with_metadata("category", "urban nature");
    store
        .upsert("Photos", &first, &vectors, &["clip".to_string()])
        .await
        .unwrap();
    let prop = db.property("Photos", "meta_category").unwrap();
    assert_eq!(prop["tokenization"], "field");
    assert_eq!(db.events(), vec!["property meta_category", "object"]);

    // Known property: no second declaration
    let second = Item::new("2").with_text("y").with_metadata("category", "urban");
    store
        .upsert("Photos", &second, &vectors, &["clip".to_string()])
        .await
        .unwrap();
    assert_eq!(db.events().len(), 3);

    // Declared meanwhile by another writer: the 422 is tolerated
    db.classes.lock().unwrap().get_mut("Photos").unwrap()["properties"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "meta_region", "dataType": ["text"], "tokenization": "field" }));
    let third = Item::new("3").with_text("z").with_metadata("region", "north");
    store
        .upsert("Photos", &third, &vectors, &["clip".to_string()])
        .await
        .unwrap();
    assert_eq!(db.events().last().unwrap(), "object");
}

#[tokio::test]
async fn test_filter_on_undeclared_key_matches_nothing() {
    let (store, db) = start().await;
    store.ensure_collection(&photos(vec![clip()])).await.unwrap();

    let mut filter = MetadataFilter::new();
    filter.insert("season".to_string(), "winter".to_string());
    let hits = store
        .search("Photos", &clip(), &[0.6, 0.8], 5, &filter)
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert!(db.queries.lock().unwrap().is_empty());

    // Unknown class behaves the same way
    let hits = store
        .search("Missing", &clip(), &[0.6, 0.8], 5, &filter)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_similar_names_map_to_distinct_classes() {
    let (store, db) = start().await;
    for name in ["my-docs", "my_docs", "My docs"] {
        let collection = Collection {
            name: name.into(),
            description: None,
            schema: PropertySchema::multimodal(),
            vector_spaces: vec![clip()],
        };
        store.ensure_collection(&collection).await.unwrap();
    }
    assert_eq!(db.classes.lock().unwrap().len(), 3);

    store.drop_collection("my-docs").await.unwrap();
    let classes = db.classes.lock().unwrap();
    assert_eq!(classes.len(), 2);
    assert!(classes.contains_key(&class_name("my_docs")));
    assert!(classes.contains_key(&class_name("My docs")));

    let props: Vec<String> = ["a.b", "a_b", "a b"].iter().map(|k| metadata_property(k)).collect();
    assert_ne!(props[0], props[1]);
    assert_ne!(props[0], props[2]);
    assert_ne!(props[1], props[2]);
}

#[tokio::test]
async fn test_unreachable_store_is_transient() {
    let config = WeaviateConfig {
        url: "http://127.0.0.1:9".into(),
        timeout_ms: 500,
        ..WeaviateConfig::default()
    };
    let store = WeaviateStore::new(&config, None).unwrap();
    assert!(!store.health_check().await);

    let err = store.get("Photos", "x").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.error_code(), "STORAGE_ERROR");
}
