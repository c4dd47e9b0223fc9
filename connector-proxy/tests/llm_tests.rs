mod common;

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use common::{spawn, Recorded, Recorder};
use connector_proxy::llm::{LanguageModel, LlmError, LlmSettings};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

async fn scripted(
    State((recorder, status, reply)): State<(Recorder, StatusCode, Value)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    recorder.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(|q| q.to_string()),
        headers: headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect(),
        body: String::from_utf8_lossy(&body).to_string(),
    });
    (status, axum::Json(reply)).into_response()
}

async fn spawn_provider(status: StatusCode, reply: Value) -> (String, Recorder) {
    let recorder: Recorder = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .fallback(scripted)
        .with_state((recorder.clone(), status, reply));
    (spawn(app).await, recorder)
}

fn settings(provider: &str, model: &str, base_url: &str) -> LlmSettings {
    LlmSettings {
        provider: Some(provider.to_string()),
        model: Some(model.to_string()),
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url.to_string()),
        ..LlmSettings::default()
    }
}

fn body_of(call: &Recorded) -> Value {
    serde_json::from_str(&call.body).unwrap()
}

#[tokio::test]
async fn openai_chat_completion() {
    let (url, recorder) = spawn_provider(
        StatusCode::OK,
        json!({"choices": [{"message": {"role": "assistant", "content": "hi there"}}]}),
    )
    .await;
    let model = LanguageModel::from_settings(&settings("openai", "gpt-4o-mini", &url));
    assert_eq!(model.name(), "openai");

    let reply = model.complete("say hi").await.unwrap();
    assert_eq!(reply, "hi there");

    let calls = recorder.lock().unwrap().clone();
    assert_eq!(calls[0].method, "POST");
    assert_eq!(calls[0].path, "/chat/completions");
    assert_eq!(
        calls[0].headers.get("authorization").map(String::as_str),
        Some("Bearer test-key")
    );
    let body = body_of(&calls[0]);
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["max_tokens"], 200);
    assert_eq!(body["temperature"], 0.1);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.last().unwrap()["role"], "user");
    assert_eq!(messages.last().unwrap()["content"], "say hi");
}

#[tokio::test]
async fn anthropic_messages() {
    let (url, recorder) = spawn_provider(
        StatusCode::OK,
        json!({"content": [{"type": "text", "text": "{\"selected\": true}"}]}),
    )
    .await;
    let model = LanguageModel::from_settings(&settings("anthropic", "claude-test", &url));

    let reply = model.complete("pick one").await.unwrap();
    assert_eq!(reply, "{\"selected\": true}");

    let calls = recorder.lock().unwrap().clone();
    assert_eq!(calls[0].path, "/v1/messages");
    assert_eq!(calls[0].headers.get("x-api-key").map(String::as_str), Some("test-key"));
    assert_eq!(
        calls[0].headers.get("anthropic-version").map(String::as_str),
        Some("2023-06-01")
    );
    assert!(!calls[0].headers.contains_key("authorization"));
    assert_eq!(body_of(&calls[0])["model"], "claude-test");
}

#[tokio::test]
async fn google_generate_content_strips_models_prefix() {
    let (url, recorder) = spawn_provider(
        StatusCode::OK,
        json!({"candidates": [{"content": {"parts": [{"text": "ok"}]}}]}),
    )
    .await;
    let model = LanguageModel::from_settings(&settings("google", "models/gemini-1.5-pro", &url));

    assert_eq!(model.complete("hello").await.unwrap(), "ok");

    let calls = recorder.lock().unwrap().clone();
    assert_eq!(calls[0].path, "/v1beta/models/gemini-1.5-pro:generateContent");
    assert_eq!(calls[0].query.as_deref(), Some("key=test-key"));
    let body = body_of(&calls[0]);
    assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 200);
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let (url, _recorder) =
        spawn_provider(StatusCode::TOO_MANY_REQUESTS, json!({"error": "slow down"})).await;
    let model = LanguageModel::from_settings(&settings("openai", "gpt-4o", &url));

    match model.complete("anything").await {
        Err(LlmError::Status { status, body }) => {
            assert_eq!(status, 429);
            assert!(body.contains("slow down"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_reply_is_invalid_response() {
    let (url, _recorder) = spawn_provider(StatusCode::OK, json!({"unexpected": true})).await;
    let model = LanguageModel::from_settings(&settings("anthropic", "claude-test", &url));

    assert!(matches!(
        model.complete("anything").await,
        Err(LlmError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn disabled_model_is_not_configured() {
    let model = LanguageModel::from_settings(&LlmSettings {
        provider: Some("mystery".to_string()),
        api_key: Some("key".to_string()),
        ..LlmSettings::default()
    });
    assert!(!model.is_configured());
    assert!(matches!(
        model.complete("anything").await,
        Err(LlmError::NotConfigured)
    ));
}

#[tokio::test]
async fn transport_error_does_not_leak_query_key() {
    let closed = common::closed_port_url().await;
    let model = LanguageModel::from_settings(&LlmSettings {
        provider: Some("google".to_string()),
        api_key: Some("SUPER-SECRET-KEY".to_string()),
        base_url: Some(closed),
        ..LlmSettings::default()
    });

    let err = model.complete("hi").await.unwrap_err();
    let message = err.to_string();
    assert!(!message.contains("SUPER-SECRET-KEY"), "{}", message);
    assert!(!format!("{:?}", err).contains("SUPER-SECRET-KEY"));
}
