#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use connector_proxy::index::{IndexDocument, IndexError, SemanticIndex};
use connector_proxy::llm::{LanguageModel, LlmSettings};
use connector_proxy::stores::{
    ConnectorStore, InMemoryConnectorStore, InMemorySecretStore, SecretStore,
};
use connector_proxy::types::{Candidate, Credentials, OperationRef};
use connector_proxy::{ConnectorDescriptor, ConnectorProxy, ConnectorStatus};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const API_KEY: &str = "petstore-secret";
pub const OWNER: &str = "demo-user";

/// Serve `app` on an ephemeral loopback port and return its base URL.
pub async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A loopback URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

pub type Recorder = Arc<Mutex<Vec<Recorded>>>;

/// Mock pet store. Every request is recorded.
///
/// - `GET /pets/404` -> 404
/// - `GET /pets/{id}` -> the pet as JSON
/// - `GET /pets` -> a list
/// - `POST /pets` -> 201 echoing the body
/// - `GET /ping` -> plain text `pong`
pub async fn spawn_petstore() -> (String, Recorder) {
    let recorder: Recorder = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(petstore_handler).with_state(recorder.clone());
    (spawn(app).await, recorder)
}

async fn petstore_handler(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = String::from_utf8_lossy(&body).to_string();
    recorder.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(|q| q.to_string()),
        headers: headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect(),
        body: body.clone(),
    });

    let path = uri.path();
    match (method.as_str(), path) {
        ("GET", "/ping") => (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], "pong".to_string())
            .into_response(),
        ("GET", "/pets") => axum::Json(json!([{"id": 1, "name": "Rex"}, {"id": 2, "name": "Tom"}]))
            .into_response(),
        ("POST", "/pets") => {
            let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            (StatusCode::CREATED, axum::Json(json!({"created": parsed}))).into_response()
        }
        ("GET", "/pets/404") => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({"message": "Pet not found"})),
        )
            .into_response(),
        ("GET", p) if p.starts_with("/pets/") => {
            let id = p.trim_start_matches("/pets/");
            match id.parse::<i64>() {
                Ok(id) => axum::Json(json!({"id": id, "name": "Rex"})).into_response(),
                Err(_) => axum::Json(json!({"id": id})).into_response(),
            }
        }
        _ => (StatusCode::NOT_FOUND, "no route").into_response(),
    }
}

/// API description for the mock pet store.
pub fn petstore_document(base_url: &str) -> Value {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Pet Store API", "version": "1.0.0"},
        "servers": [{"url": base_url}],
        "components": {
            "securitySchemes": {
                "ApiKeyAuth": {"type": "apiKey", "in": "header", "name": "X-API-KEY"}
            }
        },
        "paths": {
            "/pets": {
                "get": {
                    "operationId": "listPets",
                    "summary": "List all pets",
                    "parameters": [
                        {"name": "limit", "in": "query", "schema": {"type": "integer"}}
                    ],
                    "responses": {"200": {"description": "ok"}}
                },
                "post": {
                    "operationId": "createPet",
                    "summary": "Create a pet",
                    "responses": {"201": {"description": "created"}}
                }
            },
            "/pets/{petId}": {
                "get": {
                    "operationId": "getPetById",
                    "summary": "Get a pet by ID",
                    "parameters": [
                        {"name": "petId", "in": "path", "required": true,
                         "description": "The id of the pet", "schema": {"type": "integer"}}
                    ],
                    "responses": {"200": {"description": "ok"}}
                },
                "patch": {
                    "operationId": "updatePet",
                    "summary": "Update a pet",
                    "responses": {"200": {"description": "ok"}}
                }
            },
            "/ping": {
                "get": {"operationId": "ping", "summary": "Health check", "responses": {}}
            }
        }
    })
}

pub fn petstore_connector(base_url: &str) -> ConnectorDescriptor {
    ConnectorDescriptor::from_document("petstore", OWNER, petstore_document(base_url))
        .with_status(ConnectorStatus::Active)
}

pub fn candidate(operation_id: &str, path: &str, method: &str, similarity: f64) -> Candidate {
    Candidate {
        operation: OperationRef {
            connector_id: "petstore".to_string(),
            operation_id: operation_id.to_string(),
            path: path.to_string(),
            method: method.to_string(),
        },
        description: format!(
            "Connector: Pet Store API. Function: {}. Path: {} {}.",
            operation_id,
            method.to_uppercase(),
            path
        ),
        distance: 1.0 - similarity,
    }
}

/// Index double returning a fixed ranked list.
pub struct FixedIndex {
    pub candidates: Vec<Candidate>,
}

#[async_trait]
impl SemanticIndex for FixedIndex {
    async fn search(&self, _query: &str, top_k: usize) -> Result<Vec<Candidate>, IndexError> {
        Ok(self.candidates.iter().take(top_k).cloned().collect())
    }

    async fn add(&self, _documents: Vec<IndexDocument>) -> Result<(), IndexError> {
        Ok(())
    }

    async fn delete_by_connector(&self, _connector_id: &str) -> Result<usize, IndexError> {
        Ok(0)
    }
}

pub struct PanickingIndex;

#[async_trait]
impl SemanticIndex for PanickingIndex {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<Candidate>, IndexError> {
        panic!("index exploded");
    }

    async fn add(&self, _documents: Vec<IndexDocument>) -> Result<(), IndexError> {
        Ok(())
    }

    async fn delete_by_connector(&self, _connector_id: &str) -> Result<usize, IndexError> {
        Ok(0)
    }
}

pub fn api_key(value: &str) -> Credentials {
    let mut credentials = Credentials::new();
    credentials.insert("api_key".to_string(), value.to_string());
    credentials
}

pub struct Harness {
    pub proxy: ConnectorProxy,
    pub connectors: Arc<InMemoryConnectorStore>,
    pub secrets: Arc<InMemorySecretStore>,
}

/// Proxy over a fixed candidate list with `connector` stored and the owner's key saved.
pub async fn harness(
    index: Arc<dyn SemanticIndex>,
    connector: ConnectorDescriptor,
    model: LanguageModel,
) -> Harness {
    let connectors = Arc::new(InMemoryConnectorStore::new());
    let secrets = Arc::new(InMemorySecretStore::new());
    secrets
        .store(&connector.user_id, &connector.id, api_key(API_KEY))
        .await
        .unwrap();
    connectors.insert(connector).await.unwrap();

    let proxy = ConnectorProxy::new(
        connectors.clone(),
        secrets.clone(),
        index,
        Arc::new(model),
    )
    .unwrap();
    Harness {
        proxy,
        connectors,
        secrets,
    }
}

pub fn fixed(candidates: Vec<Candidate>) -> Arc<dyn SemanticIndex> {
    Arc::new(FixedIndex { candidates })
}

/// Scripted OpenAI-compatible endpoint.
///
/// Assessment prompts get `assessment`, every other prompt gets `extraction`.
/// Returns the base URL and a counter of requests served.
pub async fn spawn_openai_mock(assessment: Value, extraction: Value) -> (String, Arc<Mutex<usize>>) {
    let calls = Arc::new(Mutex::new(0usize));
    let state = (calls.clone(), assessment.to_string(), extraction.to_string());
    let app = Router::new()
        .route(
            "/chat/completions",
            post(
                |State((calls, assessment, extraction)): State<(Arc<Mutex<usize>>, String, String)>,
                 axum::Json(body): axum::Json<Value>| async move {
                    *calls.lock().unwrap() += 1;
                    let prompt = body["messages"][1]["content"].as_str().unwrap_or("").to_string();
                    let content = if prompt.contains("Candidate functions") {
                        format!("```json\n{}\n```", assessment)
                    } else {
                        extraction
                    };
                    axum::Json(json!({
                        "choices": [{"message": {"role": "assistant", "content": content}}]
                    }))
                },
            ),
        )
        .with_state(state);
    (spawn(app).await, calls)
}

/// OpenAI-compatible endpoint that always fails with 500.
pub async fn spawn_failing_model() -> (String, Arc<Mutex<usize>>) {
    let calls = Arc::new(Mutex::new(0usize));
    let app = Router::new()
        .route(
            "/chat/completions",
            post(|State(calls): State<Arc<Mutex<usize>>>| async move {
                *calls.lock().unwrap() += 1;
                (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded")
            }),
        )
        .with_state(calls.clone());
    (spawn(app).await, calls)
}

pub fn openai_model(base_url: &str) -> LanguageModel {
    LanguageModel::from_settings(&LlmSettings {
        provider: Some("openai".to_string()),
        model: Some("gpt-test".to_string()),
        api_key: Some("sk-test".to_string()),
        base_url: Some(base_url.to_string()),
        ..LlmSettings::default()
    })
}
